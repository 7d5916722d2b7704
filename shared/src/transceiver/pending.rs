//! Pending request table and correlation id allocation

use crate::error::ExchangeError;
use crate::protocol::{CorrelationId, DeviceReply, UNSOLICITED_MSG_ID};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Outcome delivered to the caller awaiting a request
pub type ReplyOutcome = Result<DeviceReply, ExchangeError>;

/// A request awaiting its reply
#[derive(Debug)]
pub struct PendingRequest {
    pub id: CorrelationId,
    pub created_at: Instant,
    reply_tx: oneshot::Sender<ReplyOutcome>,
}

impl PendingRequest {
    /// Check if this request has outlived the timeout
    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > timeout
    }

    /// Deliver the outcome, consuming the request
    fn settle(self, outcome: ReplyOutcome) {
        // The caller may have stopped waiting; nothing to do then
        let _ = self.reply_tx.send(outcome);
    }
}

/// In-flight requests keyed by correlation id
///
/// Every entry leaves the table through exactly one of [`resolve`],
/// [`sweep`] or [`discard`]; removal consumes the reply sender, so an entry
/// can never be settled twice.
///
/// Ids are `u32` and wrap around after `u32::MAX`. Id 0 is reserved for
/// unsolicited traffic, and ids still in the table are skipped, so an id is
/// never reused while its request is pending.
///
/// [`resolve`]: PendingTable::resolve
/// [`sweep`]: PendingTable::sweep
/// [`discard`]: PendingTable::discard
#[derive(Debug)]
pub struct PendingTable {
    entries: HashMap<CorrelationId, PendingRequest>,
    last_id: CorrelationId,
    timeout: Duration,
}

impl PendingTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            last_id: UNSOLICITED_MSG_ID,
            timeout,
        }
    }

    /// Start counting from a specific id (the next allocation is `last_id + 1`)
    #[cfg(test)]
    pub fn with_last_id(timeout: Duration, last_id: CorrelationId) -> Self {
        Self {
            last_id,
            ..Self::new(timeout)
        }
    }

    fn next_id(&mut self) -> CorrelationId {
        loop {
            self.last_id = self.last_id.wrapping_add(1);
            if self.last_id != UNSOLICITED_MSG_ID && !self.entries.contains_key(&self.last_id) {
                return self.last_id;
            }
        }
    }

    /// Allocate an id and register a pending request for it
    pub fn register(&mut self, now: Instant) -> (CorrelationId, oneshot::Receiver<ReplyOutcome>) {
        let id = self.next_id();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.entries.insert(
            id,
            PendingRequest {
                id,
                created_at: now,
                reply_tx,
            },
        );
        (id, reply_rx)
    }

    /// Resolve a request with its reply. Returns false if the id is not pending.
    pub fn resolve(&mut self, id: CorrelationId, reply: DeviceReply) -> bool {
        match self.entries.remove(&id) {
            Some(request) => {
                request.settle(Ok(reply));
                true
            }
            None => false,
        }
    }

    /// Drop a request without settling it (its caller already has an error)
    pub fn discard(&mut self, id: CorrelationId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Fail every request older than the timeout and return their ids
    pub fn sweep(&mut self, now: Instant) -> Vec<CorrelationId> {
        let timeout = self.timeout;
        let expired: Vec<CorrelationId> = self
            .entries
            .values()
            .filter(|r| r.is_timed_out(now, timeout))
            .map(|r| r.id)
            .collect();

        for id in &expired {
            if let Some(request) = self.entries.remove(id) {
                request.settle(Err(ExchangeError::Timeout {
                    msg_id: *id,
                    timeout_ms: timeout.as_millis() as u64,
                }));
            }
        }

        expired
    }

    pub fn contains(&self, id: CorrelationId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
