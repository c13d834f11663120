pub mod board;
pub mod diag;
pub mod port;
pub mod protocol;

pub use board::{Error, ZeroBorg};
