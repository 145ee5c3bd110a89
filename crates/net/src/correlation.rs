//! Request/reply correlation
//!
//! Each outbound request reserves a fresh id. The receive loop deposits the
//! reply under that id and the caller blocks in [`CorrelationTable::wait`]
//! until it arrives. Replies may be deposited before anyone waits for them.
//!
//! The table is guarded by a plain mutex: every critical section is short and
//! no lock is held across an await point.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::RequestId;

struct Slot {
    /// Taken by the receive loop when the reply is deposited
    tx: Option<oneshot::Sender<String>>,
    /// Taken by the caller when it starts waiting
    rx: Option<oneshot::Receiver<String>>,
}

struct Inner {
    next_id: RequestId,
    slots: HashMap<RequestId, Slot>,
    closed: bool,
}

/// Pending requests keyed by request id
pub struct CorrelationTable {
    inner: Mutex<Inner>,
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                slots: HashMap::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a request id that is never reused by this table
    pub fn reserve(&self) -> Result<RequestId> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(Error::ConnectionLost);
        }

        let id = inner.next_id;
        inner.next_id += 1;

        let (tx, rx) = oneshot::channel();
        inner.slots.insert(
            id,
            Slot {
                tx: Some(tx),
                rx: Some(rx),
            },
        );
        Ok(id)
    }

    /// Store the reply for `id`
    ///
    /// A second reply for the same id, or a reply for an id that is not
    /// pending, is a protocol violation.
    pub fn deposit(&self, id: RequestId, payload: String) -> Result<()> {
        let mut inner = self.lock();
        let next_id = inner.next_id;

        let slot = match inner.slots.get_mut(&id) {
            Some(slot) => slot,
            None if id < next_id => {
                return Err(Error::Protocol(format!(
                    "Reply for request {} which is no longer pending",
                    id
                )));
            }
            None => {
                return Err(Error::Protocol(format!(
                    "Reply for request {} which was never issued",
                    id
                )));
            }
        };

        let tx = slot
            .tx
            .take()
            .ok_or_else(|| Error::Protocol(format!("Duplicate reply for request {}", id)))?;

        if tx.send(payload).is_err() {
            // Waiter gave up (timeout or cancellation) between lookup and send
            inner.slots.remove(&id);
            debug!(request_id = id, "Reply arrived after waiter left");
        }
        Ok(())
    }

    /// Wait for the reply to `id`, removing the entry once it is consumed
    pub async fn wait(&self, id: RequestId, timeout: Option<Duration>) -> Result<String> {
        let rx = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(Error::ConnectionLost);
            }
            inner
                .slots
                .get_mut(&id)
                .and_then(|slot| slot.rx.take())
                .ok_or_else(|| Error::Protocol(format!("No pending request {}", id)))?
        };

        // Removes the slot however this future ends, including cancellation
        let _guard = SlotGuard { table: self, id };

        let reply = match timeout {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => rx.await,
        };

        reply.map_err(|_| Error::ConnectionLost)
    }

    /// Drop a reservation whose request was never sent
    pub fn forget(&self, id: RequestId) {
        self.lock().slots.remove(&id);
    }

    /// Release every waiter with [`Error::ConnectionLost`] and refuse new requests
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        let dropped = inner.slots.len();
        // Dropping the senders wakes the waiters
        inner.slots.clear();
        if dropped > 0 {
            debug!(dropped, "Released pending requests");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of requests still awaiting a reply or a waiter
    pub fn pending(&self) -> usize {
        self.lock().slots.len()
    }
}

struct SlotGuard<'a> {
    table: &'a CorrelationTable,
    id: RequestId,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.table.forget(self.id);
    }
}
