//! Network error types

use std::io;
use std::time::Duration;

use lobby_core::{ConnectionState, MessageId, PlayerId};

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to connect to the server: {0}")]
    Connect(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Wrong state: expected {expected}, current state is {actual}")]
    WrongState {
        expected: &'static str,
        actual: ConnectionState,
    },

    #[error("Invalid nickname: {0:?}")]
    InvalidNickname(String),

    #[error("Invalid message: {0:?}")]
    InvalidMessage(String),

    #[error("Unknown player id: {0}")]
    UnknownPlayer(PlayerId),

    #[error("Unknown message id: {0}")]
    UnknownMessage(MessageId),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Connection lost")]
    ConnectionLost,

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Message history is disabled")]
    HistoryDisabled,
}
