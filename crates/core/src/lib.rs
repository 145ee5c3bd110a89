//! Lobby Core Library
//!
//! Models, input validation, invariants and configuration shared by the
//! lobby network client and its front-ends.

pub mod config;
pub mod error;
pub mod invariants;
pub mod models;
pub mod validation;

pub use config::{ClientConfig, TransportKind, DEFAULT_HOST, DEFAULT_PORT};
pub use error::{Error, Result};
pub use models::*;
pub use validation::{is_valid_message, is_valid_nickname, MAX_NICKNAME_LEN};
