//! Client-visible connection state

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a connection to the matchmaking server
///
/// `NotConnected -> Registration -> Searching <-> InGame`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Transport failed or the connection was shut down
    NotConnected,
    /// Connected, nickname not yet registered
    Registration,
    /// Registered and waiting for an opponent
    Searching,
    /// Paired with an opponent; only chat traffic flows
    InGame,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self != ConnectionState::NotConnected
    }

    pub fn is_registered(self) -> bool {
        matches!(self, ConnectionState::Searching | ConnectionState::InGame)
    }

    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::NotConnected => "Not connected",
            ConnectionState::Registration => "Registration",
            ConnectionState::Searching => "Searching",
            ConnectionState::InGame => "In game",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
