use super::board::{GameOutcome, IllegalMove, Position};
use crate::engine::{CandidateSet, ConfigureOutcome, Engine, EngineError, EngineGuard, EngineLauncher};
use chess::{ChessMove, Color};
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum GameError {
    Launch(EngineError),
    Engine { side: Color, error: EngineError },
    IllegalMove { side: Color, error: IllegalMove },
}

impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameError::Launch(e) => write!(f, "failed to start engine: {}", e),
            GameError::Engine { side, error } => write!(f, "{:?} engine failed: {}", side, error),
            GameError::IllegalMove { side, error } => write!(f, "{:?} engine: {}", side, error),
        }
    }
}

impl std::error::Error for GameError {}

/// Plays a single game between two parameter sets.
pub trait GamePlayer: Sync {
    fn play(
        &self,
        white_params: &CandidateSet,
        black_params: &CandidateSet,
        opening: &[ChessMove],
    ) -> Result<GameOutcome, GameError>;
}

/// Plays games between two freshly launched engines under a fixed time per move.
pub struct GameExecutor<L> {
    launcher: L,
    move_time: Duration,
}

impl<L: EngineLauncher> GameExecutor<L> {
    pub fn new(launcher: L, move_time: Duration) -> Self {
        Self { launcher, move_time }
    }
}

impl<L: EngineLauncher> GamePlayer for GameExecutor<L> {
    fn play(
        &self,
        white_params: &CandidateSet,
        black_params: &CandidateSet,
        opening: &[ChessMove],
    ) -> Result<GameOutcome, GameError> {
        // Guards stop the engines on every return path below
        let mut white = EngineGuard::new(self.launcher.launch().map_err(GameError::Launch)?);
        let mut black = EngineGuard::new(self.launcher.launch().map_err(GameError::Launch)?);

        configure(white.engine(), white_params);
        configure(black.engine(), black_params);

        let mut position = Position::initial();
        for &board_move in opening {
            if position.apply(board_move).is_err() {
                log::debug!("Skipping illegal opening move {}", board_move);
            }
        }

        loop {
            let status = position.status();
            if let Some(outcome) = status.outcome() {
                log::debug!(
                    "Game over after {} plies: {:?} ({})",
                    position.moves().len(),
                    status,
                    outcome
                );
                return Ok(outcome);
            }

            let side = position.side_to_move();
            let engine = match side {
                Color::White => white.engine(),
                Color::Black => black.engine(),
            };

            let board_move = engine
                .request_move(&position, self.move_time)
                .map_err(|error| GameError::Engine { side, error })?;

            position
                .apply(board_move)
                .map_err(|error| GameError::IllegalMove { side, error })?;
        }
    }
}

/// Best effort: a rejected option leaves the engine's default in place.
fn configure(engine: &mut dyn Engine, params: &CandidateSet) {
    for (name, value) in params.iter() {
        if let ConfigureOutcome::Ignored(reason) = engine.configure(name, value) {
            log::debug!("Ignoring {}={}: {}", name, value, reason);
        }
    }
}
