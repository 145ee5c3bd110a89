//! Lobby Network Library
//!
//! Client side of the matchmaking/chat line protocol.
//!
//! # Architecture
//!
//! - **Transport**: one frame per WebSocket text message, or per line over TCP
//! - **Protocol**: `<tag>@<payload>` frames, tagged with a request id or `server`
//! - **Correlation**: request ids matched to their replies
//! - **Session**: `Registration -> Searching <-> InGame` state and its data
//! - **Receive loop**: background task routing replies and applying pushes
//! - **Connection**: the public operations, each checked against the state first
//!
//! # Usage
//!
//! ```ignore
//! let config = ClientConfig::default();
//! let conn = Connection::connect(&config).await?;
//!
//! conn.register("Alice").await?;
//! for player in conn.players().await? {
//!     println!("{}:{}", player.id, player.nickname);
//! }
//! ```

pub mod client;
pub mod correlation;
pub mod error;
mod frame;
pub mod protocol;
mod receiver;
pub mod session;
pub mod transport;

pub use client::Connection;
pub use correlation::CorrelationTable;
pub use error::{Error, Result};
pub use protocol::{Command, Frame, RequestId, ServerMessage};
pub use session::Session;
pub use transport::{
    ChannelTransport, LineTransport, TcpTransport, Transport, TransportReader, TransportWriter,
    WsTransport,
};
