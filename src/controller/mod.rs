pub mod match_runner;
pub mod state;
pub mod tuner;

pub use match_runner::*;
pub use state::*;
pub use tuner::*;
