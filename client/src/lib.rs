//! Followsweeper Client Library
//!
//! Talks to the followsweeper server over HTTP (game creation, followers,
//! share text, board images) and over a WebSocket for live play.
//!
//! ## Usage
//!
//! [`FollowsweeperGame`] keeps a local copy of the board and reports what
//! happens as [`GameEvent`]s:
//!
//! ```rust,no_run
//! use followsweeper_client::{FollowsweeperGame, GameEvent, GameParams, Pos};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let game = FollowsweeperGame::new("http://localhost:8000")?;
//!     let mut events = game.subscribe_to_events().await;
//!
//!     game.start_game(Some(3), GameParams::default()).await?;
//!     game.reveal(Pos::new(0, 0)).await?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let GameEvent::Killed { by } = event {
//!             println!("Killed by {:?}", by.map(|avatar| avatar.mention()));
//!             break;
//!         }
//!     }
//!
//!     game.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! [`FollowsweeperClient`] and [`FollowsweeperWebSocket`] are the lower-level
//! pieces it is built from.

mod client;
mod game;
mod websocket;

pub use client::FollowsweeperClient;
pub use game::{FollowsweeperGame, GameEvent, GameState, apply_message};
pub use websocket::FollowsweeperWebSocket;

pub use followsweeper_common::{models::*, protocol::*};

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
