pub mod board;
pub mod executor;
pub mod history;
pub mod opening_book;
pub mod pgn;

pub use board::*;
pub use executor::*;
pub use opening_book::*;
