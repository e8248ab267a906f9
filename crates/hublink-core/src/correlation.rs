// ── Command correlation table ──
//
// Pairs outbound commands with their acknowledgments. Identifiers are
// monotonic within a session and never reused, so a late ack can never
// resolve a newer command. Resolution and expiry are mutually exclusive:
// whichever removes the pending entry first wins, and the loser becomes a
// no-op.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use hublink_api::{AttributeValue, CorrelationId};
use tokio::sync::oneshot;
use tracing::trace;

use crate::error::EngineError;

/// What the hub confirmed in a successful ack. Fields the ack omitted fall
/// back to the requested attribute/value at the call site.
#[derive(Debug)]
pub(crate) struct ConfirmedChange {
    pub attribute: Option<String>,
    pub value: Option<AttributeValue>,
}

pub(crate) type CommandOutcome = Result<ConfirmedChange, EngineError>;

pub(crate) struct CorrelationTable {
    next_id: AtomicU64,
    pending: DashMap<CorrelationId, oneshot::Sender<CommandOutcome>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
        }
    }

    /// Allocate a fresh identifier and park a waiter for its outcome.
    pub fn register(&self) -> (CorrelationId, oneshot::Receiver<CommandOutcome>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        (id, rx)
    }

    /// Deliver an outcome to the waiter, if the entry is still pending.
    /// Returns `false` for unknown or already-settled identifiers.
    pub fn resolve(&self, id: CorrelationId, outcome: CommandOutcome) -> bool {
        match self.pending.remove(&id) {
            Some((_, tx)) => {
                // A dropped receiver just means the caller stopped waiting.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Remove a pending entry after its deadline passed. Returns `false`
    /// when an ack resolved it first.
    pub fn expire(&self, id: CorrelationId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Drop a pending entry whose command never reached the wire.
    pub fn cancel(&self, id: CorrelationId) {
        self.pending.remove(&id);
    }

    /// Settle every pending command with an error. Used on connection loss.
    pub fn fail_all(&self, err: impl Fn() -> EngineError) {
        let ids: Vec<CorrelationId> = self.pending.iter().map(|entry| *entry.key()).collect();
        trace!(pending = ids.len(), "failing all pending commands");
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(err()));
            }
        }
    }

    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
