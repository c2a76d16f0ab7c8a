//! Minesweeper engine where the mines carry the avatars of a player's
//! followers.
//!
//! Mines are placed lazily on the first reveal so the first click is always
//! safe. The engine is synchronous and single-owner; callers that share a
//! game between tasks have to serialize commands themselves.

pub use board::{Cell, MAX_CELLS};
pub use engine::*;
pub use error::*;

mod board;
mod engine;
mod error;
