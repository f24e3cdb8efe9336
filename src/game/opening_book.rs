use super::pgn::parse_pgn_file;
use chess::ChessMove;
use rand::Rng;
use rand::seq::IndexedRandom;
use std::path::Path;

/// Shortest stored line worth keeping as an opening.
pub const MIN_OPENING_PLIES: usize = 4;

/// Longest prefix of a stored line that is actually played.
pub const DEFAULT_MAX_OPENING_PLIES: usize = 8;

pub type Opening = Vec<ChessMove>;

/// A fixed set of opening lines sampled with replacement.
#[derive(Debug, Clone)]
pub struct OpeningBook {
    openings: Vec<Opening>,
    max_plies: usize,
}

impl Default for OpeningBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OpeningBook {
    pub fn new() -> Self {
        Self {
            openings: Vec::new(),
            max_plies: DEFAULT_MAX_OPENING_PLIES,
        }
    }

    pub fn from_openings(openings: Vec<Opening>) -> Self {
        let mut book = Self::new();
        book.openings = openings
            .into_iter()
            .filter(|opening| opening.len() >= MIN_OPENING_PLIES)
            .collect();
        book
    }

    pub fn with_max_plies(mut self, max_plies: usize) -> Self {
        self.max_plies = max_plies;
        self
    }

    /// Never fails: an unreadable book only costs us opening diversity.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            log::warn!("Opening book not found at {}", path.display());
            return Self::new();
        }

        log::info!("Loading opening book from {}...", path.display());
        match parse_pgn_file(path) {
            Ok(games) => {
                let book = Self::from_openings(games.into_iter().map(|game| game.moves).collect());
                log::info!("Loaded {} openings", book.len());
                book
            }
            Err(e) => {
                log::warn!("Failed to read opening book {}: {}", path.display(), e);
                Self::new()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.openings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.openings.is_empty()
    }

    /// One random opening, cut to an even number of plies so White is to move
    /// when the engines take over.
    pub fn get_opening<R: Rng + ?Sized>(&self, rng: &mut R) -> Opening {
        let Some(opening) = self.openings.choose(rng) else {
            return Vec::new();
        };

        let mut n = opening.len().min(self.max_plies);
        if n % 2 == 1 {
            n -= 1;
        }
        opening[..n].to_vec()
    }

    pub fn get_openings<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<Opening> {
        (0..count).map(|_| self.get_opening(rng)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::Position;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::io::Write;

    fn line(moves: &[&str]) -> Opening {
        let mut position = Position::initial();
        moves
            .iter()
            .map(|notation| {
                let board_move = position.parse_uci_move(notation).unwrap();
                position.apply(board_move).unwrap();
                board_move
            })
            .collect()
    }

    #[test]
    fn test_empty_book_yields_empty_openings() {
        let book = OpeningBook::new();
        let mut rng = StdRng::seed_from_u64(1);

        let openings = book.get_openings(5, &mut rng);
        assert_eq!(openings.len(), 5);
        assert!(openings.iter().all(|opening| opening.is_empty()));
    }

    #[test]
    fn test_short_lines_are_dropped() {
        let book = OpeningBook::from_openings(vec![
            line(&["e2e4", "e7e5", "g1f3"]),
            line(&["d2d4", "d7d5", "c2c4", "e7e6"]),
        ]);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_truncates_to_even_prefix() {
        let long = line(&[
            "e2e4", "c7c5", "g1f3", "d7d6", "d2d4", "c5d4", "f3d4", "g8f6", "b1c3", "a7a6",
        ]);
        let odd = line(&["d2d4", "d7d5", "c2c4", "e7e6", "b1c3"]);
        let mut rng = StdRng::seed_from_u64(7);

        let book = OpeningBook::from_openings(vec![long.clone()]);
        assert_eq!(book.get_opening(&mut rng), long[..8].to_vec());

        let book = OpeningBook::from_openings(vec![odd.clone()]);
        assert_eq!(book.get_opening(&mut rng), odd[..4].to_vec());

        let book = OpeningBook::from_openings(vec![long.clone()]).with_max_plies(5);
        assert_eq!(book.get_opening(&mut rng).len(), 4);
    }

    #[test]
    fn test_samples_with_replacement() {
        let book = OpeningBook::from_openings(vec![
            line(&["e2e4", "e7e5", "g1f3", "b8c6"]),
            line(&["d2d4", "d7d5", "c2c4", "e7e6"]),
        ]);
        let mut rng = StdRng::seed_from_u64(42);

        let openings = book.get_openings(64, &mut rng);
        assert_eq!(openings.len(), 64);
        assert!(openings.iter().all(|opening| opening.len() == 4));

        let first_moves: std::collections::HashSet<String> =
            openings.iter().map(|opening| opening[0].to_string()).collect();
        assert_eq!(first_moves.len(), 2);
    }

    #[test]
    fn test_load_missing_file_is_soft() {
        let book = OpeningBook::load("/definitely/not/here.pgn");
        assert!(book.is_empty());
    }

    #[test]
    fn test_load_from_pgn_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[Event \"a\"]\n\n1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 *\n").unwrap();
        writeln!(file, "[Event \"b\"]\n\n1. d4 d5 *\n").unwrap();

        let book = OpeningBook::load(file.path());
        assert_eq!(book.len(), 1);
    }
}
