//! Engine control: the capability set the tuner needs from a playing engine,
//! plus the UCI child-process implementation of it.

pub mod params;
pub mod uci;

use crate::game::board::Position;
use chess::ChessMove;
use std::fmt;
use std::time::Duration;

pub use params::*;
pub use uci::{UciEngine, UciLauncher};

#[derive(Debug)]
pub enum EngineError {
    Io(std::io::Error),
    /// The engine closed its output or exited.
    Exited,
    Timeout(&'static str),
    NoMove,
    IllegalMove(String),
}

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        EngineError::Io(error)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Io(e) => write!(f, "engine I/O error: {}", e),
            EngineError::Exited => write!(f, "engine exited"),
            EngineError::Timeout(waiting_for) => write!(f, "timed out waiting for {}", waiting_for),
            EngineError::NoMove => write!(f, "engine returned no move"),
            EngineError::IllegalMove(m) => write!(f, "engine played illegal move {}", m),
        }
    }
}

impl std::error::Error for EngineError {}

/// Whether a `configure` call took effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigureOutcome {
    Applied,
    Ignored(String),
}

/// One running engine instance.
pub trait Engine: Send {
    fn configure(&mut self, name: &str, value: i64) -> ConfigureOutcome;

    fn request_move(&mut self, position: &Position, budget: Duration) -> Result<ChessMove, EngineError>;

    /// Release the underlying process; must be safe to call more than once.
    fn stop(&mut self);
}

/// Starts fresh engine instances; shared by all worker threads.
pub trait EngineLauncher: Send + Sync {
    fn launch(&self) -> Result<Box<dyn Engine>, EngineError>;
}

/// Stops the wrapped engine when dropped, so every exit path releases it.
pub struct EngineGuard(Box<dyn Engine>);

impl EngineGuard {
    pub fn new(engine: Box<dyn Engine>) -> Self {
        Self(engine)
    }

    pub fn engine(&mut self) -> &mut dyn Engine {
        self.0.as_mut()
    }
}

impl Drop for EngineGuard {
    fn drop(&mut self) {
        self.0.stop();
    }
}
