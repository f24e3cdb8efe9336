use super::opening_book::MIN_OPENING_PLIES;
use chess::{Board, ChessMove};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug)]
pub struct PgnGame {
    pub moves: Vec<ChessMove>,
}

#[derive(Debug)]
pub enum PgnParseError {
    InvalidMove(String),
    NonStandardStart,
    IoError(std::io::Error),
}

impl From<std::io::Error> for PgnParseError {
    fn from(error: std::io::Error) -> Self {
        PgnParseError::IoError(error)
    }
}

impl fmt::Display for PgnParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgnParseError::InvalidMove(token) => write!(f, "invalid move '{}'", token),
            PgnParseError::NonStandardStart => write!(f, "game does not start from the initial position"),
            PgnParseError::IoError(error) => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for PgnParseError {}

/// Games whose movetext could not be resolved are skipped; only I/O failures abort.
pub fn parse_pgn_file<P: AsRef<Path>>(path: P) -> Result<Vec<PgnGame>, PgnParseError> {
    let file = File::open(path)?;
    parse_pgn(BufReader::new(file))
}

pub fn parse_pgn<R: BufRead>(mut reader: R) -> Result<Vec<PgnGame>, PgnParseError> {
    let mut games = Vec::new();
    let mut movetext = String::new();
    let mut custom_start = false;
    let mut skipped = 0usize;

    let mut finish_game = |movetext: &mut String, custom_start: &mut bool| {
        if !movetext.trim().is_empty() {
            let parsed = if *custom_start {
                Err(PgnParseError::NonStandardStart)
            } else {
                parse_moves(movetext)
            };

            match parsed {
                Ok(moves) => games.push(PgnGame { moves }),
                Err(e) => {
                    skipped += 1;
                    log::debug!("Skipping PGN game: {}", e);
                }
            }
        }

        movetext.clear();
        *custom_start = false;
    };

    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            break;
        }

        // Old databases are often Latin-1; undecodable bytes are replaced, the moves kept
        let line = String::from_utf8_lossy(&buffer);
        let line = line.trim();

        if line.is_empty() || line.starts_with('%') {
            continue;
        }

        // Header line (starts with '['); a header after movetext starts a new game
        if line.starts_with('[') {
            if !movetext.trim().is_empty() {
                finish_game(&mut movetext, &mut custom_start);
            }

            if line.starts_with("[FEN ") {
                custom_start = true;
            }
            continue;
        }

        movetext.push('\n');
        movetext.push_str(line);
    }

    finish_game(&mut movetext, &mut custom_start);

    if skipped > 0 {
        log::debug!("Skipped {} unparsable PGN games", skipped);
    }

    Ok(games)
}

fn parse_moves(moves_text: &str) -> Result<Vec<ChessMove>, PgnParseError> {
    let mut moves = Vec::new();
    let mut board = Board::default();

    // Clean up the moves text - remove comments and variations
    let cleaned = clean_moves_text(moves_text);

    let tokens = cleaned
        .split_whitespace()
        .map(strip_move_number)
        .filter(|token| !token.is_empty() && !token.starts_with('$'));

    for token in tokens {
        if is_result(token) {
            break;
        }

        let clean_move = match strip_annotations(token) {
            "0-0" => "O-O",
            "0-0-0" => "O-O-O",
            other => other,
        };
        let Ok(board_move) = ChessMove::from_san(&board, clean_move) else {
            // A long enough legal prefix still makes a usable opening
            if moves.len() >= MIN_OPENING_PLIES {
                log::debug!("Truncating PGN game at invalid move '{}'", token);
                break;
            }
            return Err(PgnParseError::InvalidMove(token.to_string()));
        };

        moves.push(board_move);
        board = board.make_move_new(board_move);
    }

    Ok(moves)
}

fn clean_moves_text(text: &str) -> String {
    let mut result = String::new();
    let mut brace_depth = 0;
    let mut variation_depth = 0;
    let mut in_line_comment = false;

    for ch in text.chars() {
        if in_line_comment {
            if ch == '\n' {
                in_line_comment = false;
                result.push(' ');
            }
            continue;
        }

        match ch {
            '{' => brace_depth += 1,
            '}' if brace_depth > 0 => brace_depth -= 1,
            '(' if brace_depth == 0 => variation_depth += 1,
            ')' if brace_depth == 0 && variation_depth > 0 => variation_depth -= 1,
            ';' if brace_depth == 0 => in_line_comment = true,
            _ if brace_depth == 0 && variation_depth == 0 => result.push(ch),
            _ => {}
        }

        // Comments and variations still separate tokens
        if brace_depth > 0 || variation_depth > 0 {
            if !result.ends_with(' ') {
                result.push(' ');
            }
        }
    }

    result
}

/// `12.e4` and `12...` style prefixes; returns what follows the dots.
fn strip_move_number(token: &str) -> &str {
    let digits = token.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && token[digits..].starts_with('.') {
        token[digits..].trim_start_matches('.')
    } else {
        token
    }
}

fn strip_annotations(token: &str) -> &str {
    token.trim_end_matches(['+', '#', '!', '?'])
}

fn is_result(token: &str) -> bool {
    matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*")
}
