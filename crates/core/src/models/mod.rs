//! Data models for the lobby client

mod message;
mod player;
mod state;

pub use message::*;
pub use player::*;
pub use state::*;
