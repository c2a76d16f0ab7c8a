//! Types shared between the followsweeper server, engine and client.

pub mod models;
pub mod protocol;
