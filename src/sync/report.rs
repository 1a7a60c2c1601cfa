//! Outcome of one flush cycle.

use super::error::SyncError;
use crate::types::EntityKind;

/// A write the remote refused as invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// The entity an upsert targeted; `None` for run appends.
    pub entity: Option<EntityKind>,
    /// Human-readable operation, e.g. `upsert profile`.
    pub operation: String,
    pub message: String,
}

/// What a flush cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Queued writes acknowledged by the remote.
    pub queue_sent: usize,
    /// Queued writes dropped after exhausting their attempts.
    pub queue_dropped: usize,
    /// Queue draining stopped at a transient failure.
    pub queue_interrupted: bool,

    /// Entities whose dirty flag was cleared.
    pub flushed: Vec<EntityKind>,
    /// Entities sent successfully but mutated again while in flight.
    pub retained: Vec<EntityKind>,
    /// Entities whose upsert failed transiently and was queued.
    pub enqueued: Vec<EntityKind>,

    pub rejections: Vec<Rejection>,
}

impl FlushReport {
    /// True if nothing was sent, queued or rejected.
    pub fn is_noop(&self) -> bool {
        self == &FlushReport::default()
    }

    /// True if every attempted write reached the remote.
    pub fn is_complete(&self) -> bool {
        !self.queue_interrupted
            && self.queue_dropped == 0
            && self.enqueued.is_empty()
            && self.rejections.is_empty()
    }

    /// Fails with [`SyncError::Rejected`] if the remote rejected anything.
    ///
    /// Transient failures are not errors: their writes are queued and retried.
    pub fn into_result(self) -> Result<FlushReport, SyncError> {
        if self.rejections.is_empty() {
            Ok(self)
        } else {
            Err(SyncError::Rejected(self.rejections))
        }
    }
}
