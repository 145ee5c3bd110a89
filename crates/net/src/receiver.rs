//! Background receive loop
//!
//! Pulls frames off the transport, routes replies to the correlation table
//! and applies server pushes to the session. A frame that cannot be decoded is
//! recorded and skipped. The loop runs until the stop signal fires, the writer
//! reports a dead transport, or the transport closes or fails; in every case it
//! leaves the session `NotConnected` and releases every caller still waiting
//! for a reply.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tokio::sync::{oneshot, watch, Notify, RwLock};
use tracing::{debug, error, info, warn};

use crate::correlation::CorrelationTable;
use crate::error::Error;
use crate::protocol::{decode_frame, parse_server_message, Frame, ServerMessage};
use crate::session::Session;
use crate::transport::TransportReader;

/// Protocol violations kept for inspection
const MAX_PROTOCOL_ERRORS: usize = 32;

/// State shared between the façade and the receive loop
pub(crate) struct Shared {
    pub session: RwLock<Session>,
    pub table: CorrelationTable,
    /// Bumped whenever the session changes so waiters can re-check it
    updates: watch::Sender<u64>,
    protocol_errors: Mutex<VecDeque<Error>>,
    /// Raised by the writer when the transport can no longer be written to
    transport_failed: Notify,
}

impl Shared {
    pub fn new(session: Session) -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            session: RwLock::new(session),
            table: CorrelationTable::new(),
            updates,
            protocol_errors: Mutex::new(VecDeque::new()),
            transport_failed: Notify::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    pub fn notify(&self) {
        self.updates.send_modify(|revision| *revision += 1);
    }

    /// Tear the session down after the transport failed
    ///
    /// Releases pending requests, moves the session to `NotConnected` and
    /// tells the receive loop to stop.
    pub async fn transport_lost(&self) {
        self.disconnect().await;
        self.transport_failed.notify_one();
    }

    async fn disconnect(&self) {
        self.table.close();
        self.session.write().await.disconnect();
        self.notify();
    }

    fn record_protocol_error(&self, error: Error) {
        warn!(error = %error, "Protocol violation");
        let mut errors = self
            .protocol_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if errors.len() == MAX_PROTOCOL_ERRORS {
            errors.pop_front();
        }
        errors.push_back(error);
    }

    pub fn take_protocol_errors(&self) -> Vec<Error> {
        self.protocol_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}

/// Main receive task
pub(crate) async fn receive_loop<R: TransportReader>(
    mut reader: R,
    shared: std::sync::Arc<Shared>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = reader.recv() => {
                match result {
                    Ok(Some(line)) => {
                        debug!(frame = %line, "Received frame");
                        dispatch(&line, &shared).await;
                    }
                    Ok(None) => {
                        debug!("Server closed connection");
                        break;
                    }
                    // An undecodable frame does not end the session
                    Err(e @ Error::Protocol(_)) => shared.record_protocol_error(e),
                    Err(e) => {
                        error!(error = %e, "Read error");
                        break;
                    }
                }
            }

            _ = shared.transport_failed.notified() => {
                debug!("Writer lost the transport");
                break;
            }

            // Fires on an explicit stop and when the connection handle is dropped
            _ = &mut stop_rx => {
                debug!("Stop requested");
                break;
            }
        }
    }

    // Cleanup
    shared.disconnect().await;
    info!("Receive loop stopped");
}

/// Route a single inbound frame
async fn dispatch(line: &str, shared: &Shared) {
    let frame = match decode_frame(line) {
        Ok(frame) => frame,
        Err(e) => {
            shared.record_protocol_error(e);
            return;
        }
    };

    match frame {
        Frame::Reply {
            request_id,
            payload,
        } => {
            if let Err(e) = shared.table.deposit(request_id, payload) {
                shared.record_protocol_error(e);
            } else {
                debug!(request_id, "Reply routed");
            }
        }
        Frame::Push(payload) => match parse_server_message(&payload) {
            Ok(msg) => apply_push(msg, shared).await,
            Err(e) => shared.record_protocol_error(e),
        },
    }
}

/// Apply a server push to the session
async fn apply_push(msg: ServerMessage, shared: &Shared) {
    let result = {
        let mut session = shared.session.write().await;
        match msg {
            ServerMessage::PlayerId(id) => session.bind_player_id(id),
            ServerMessage::PlayerList(players) => {
                session.update_players(players);
                Ok(())
            }
            ServerMessage::Offer(from) => session.push_offer(from),
            ServerMessage::GameStarted { opponent } => session.start_game(opponent),
            ServerMessage::GameEnded => session.end_game(),
            ServerMessage::Chat(body) => session.push_chat(body).map(|id| {
                debug!(message_id = id, "Chat message queued");
            }),
            ServerMessage::Error(reason) => {
                warn!(reason = %reason, "Server reported an error outside a request");
                Ok(())
            }
        }
    };

    match result {
        Ok(()) => shared.notify(),
        Err(e @ Error::Protocol(_)) => shared.record_protocol_error(e),
        Err(e) => warn!(error = %e, "Ignoring push"),
    }
}
