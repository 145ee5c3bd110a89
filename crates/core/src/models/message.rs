//! Chat message model for an active session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PlayerId;

/// Locally assigned message number, unique for the lifetime of a connection
pub type MessageId = u64;

/// A chat line received from the current opponent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender_id: PlayerId,
    pub id: MessageId,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

impl Message {
    pub fn new(sender_id: PlayerId, id: MessageId, body: String) -> Self {
        Self {
            sender_id,
            id,
            body,
            received_at: Utc::now(),
        }
    }

    pub fn format_timestamp(&self) -> String {
        self.received_at.format("%H:%M:%S").to_string()
    }
}
