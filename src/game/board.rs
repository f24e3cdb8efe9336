use super::history::PositionHistory;
use chess::{BitBoard, Board, BoardStatus, ChessMove, Color, MoveGen, Piece};
use std::fmt;
use strum_macros::Display;

/// Halfmove count after which the game is drawn without a claim.
const SEVENTY_FIVE_MOVE_PLIES: u32 = 150;

/// Final result of a game, from White's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum GameOutcome {
    WhiteWin,
    Draw,
    BlackWin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Ongoing,
    Checkmate { winner: Color },
    Stalemate,
    InsufficientMaterial,
    SeventyFiveMoves,
    FivefoldRepetition,
}

impl GameStatus {
    pub fn outcome(self) -> Option<GameOutcome> {
        match self {
            GameStatus::Ongoing => None,
            GameStatus::Checkmate {
                winner: Color::White,
            } => Some(GameOutcome::WhiteWin),
            GameStatus::Checkmate {
                winner: Color::Black,
            } => Some(GameOutcome::BlackWin),
            _ => Some(GameOutcome::Draw),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalMove(pub ChessMove);

impl fmt::Display for IllegalMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal move {}", self.0)
    }
}

impl std::error::Error for IllegalMove {}

/// A game in progress from the standard starting position.
///
/// Wraps [`chess::Board`] with what the board itself does not track: the moves
/// played so far (needed to describe the position to an engine), the halfmove
/// clock and repetition counts.
#[derive(Debug, Clone)]
pub struct Position {
    board: Board,
    moves: Vec<ChessMove>,
    halfmove_clock: u32,
    history: PositionHistory,
}

impl Default for Position {
    fn default() -> Self {
        Self::initial()
    }
}

impl Position {
    pub fn initial() -> Self {
        let board = Board::default();
        let mut history = PositionHistory::new();
        history.push(board.get_hash());

        Self {
            board,
            moves: Vec::new(),
            halfmove_clock: 0,
            history,
        }
    }

    pub fn moves(&self) -> &[ChessMove] {
        &self.moves
    }

    pub fn side_to_move(&self) -> Color {
        self.board.side_to_move()
    }

    pub fn legal_moves(&self) -> Vec<ChessMove> {
        MoveGen::new_legal(&self.board).collect()
    }

    pub fn is_legal(&self, board_move: ChessMove) -> bool {
        self.board.legal(board_move)
    }

    pub fn apply(&mut self, board_move: ChessMove) -> Result<(), IllegalMove> {
        if !self.is_legal(board_move) {
            return Err(IllegalMove(board_move));
        }

        let is_pawn_move = self.board.piece_on(board_move.get_source()) == Some(Piece::Pawn);
        let is_capture = self.board.piece_on(board_move.get_dest()).is_some();

        self.board = self.board.make_move_new(board_move);
        self.moves.push(board_move);
        self.history.push(self.board.get_hash());

        if is_pawn_move || is_capture {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock += 1;
        }

        Ok(())
    }

    /// Resolve a long algebraic move (`e2e4`, `e7e8q`) against the legal moves.
    pub fn parse_uci_move(&self, notation: &str) -> Option<ChessMove> {
        MoveGen::new_legal(&self.board).find(|m| m.to_string() == notation)
    }

    /// The played moves in long algebraic notation, space separated.
    pub fn uci_moves(&self) -> String {
        self.moves
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn status(&self) -> GameStatus {
        match self.board.status() {
            BoardStatus::Checkmate => {
                return GameStatus::Checkmate {
                    winner: !self.board.side_to_move(),
                };
            }
            BoardStatus::Stalemate => return GameStatus::Stalemate,
            BoardStatus::Ongoing => {}
        }

        if self.is_insufficient_material() {
            GameStatus::InsufficientMaterial
        } else if self.halfmove_clock >= SEVENTY_FIVE_MOVE_PLIES {
            GameStatus::SeventyFiveMoves
        } else if self.history.is_fivefold_repetition(self.board.get_hash()) {
            GameStatus::FivefoldRepetition
        } else {
            GameStatus::Ongoing
        }
    }

    /// Neither side can possibly mate: bare kings, a single minor piece, or
    /// bishops that all stand on the same square color.
    fn is_insufficient_material(&self) -> bool {
        let board = &self.board;
        let heavy = *board.pieces(Piece::Pawn) | *board.pieces(Piece::Rook) | *board.pieces(Piece::Queen);
        if heavy.popcnt() != 0 {
            return false;
        }

        let knights = *board.pieces(Piece::Knight);
        let bishops = *board.pieces(Piece::Bishop);
        if (knights | bishops).popcnt() <= 1 {
            return true;
        }

        knights.popcnt() == 0 && bishops_on_one_color(bishops)
    }
}

fn bishops_on_one_color(bishops: BitBoard) -> bool {
    let mut colors = bishops.map(|square| (square.get_rank().to_index() + square.get_file().to_index()) % 2);
    match colors.next() {
        Some(first) => colors.all(|color| color == first),
        None => true,
    }
}
