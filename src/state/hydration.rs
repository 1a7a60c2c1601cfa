//! The records known to be on the remote, used to recognise echoed writes.
//!
//! Populating the container notifies every [`StateView`](super::StateView)
//! subscriber. A subscriber that echoes what it sees back through a save entry
//! point would otherwise mark the freshly fetched data dirty and write it
//! straight back to the remote. The engine skips marking an entity whose new
//! payload equals the record the remote already holds.

use crate::types::{AccountSnapshot, EntityKind, EntityPayload};

/// Per-entity copy of the last payload the remote returned or acknowledged.
#[derive(Debug, Clone, Default)]
pub struct SyncedRecords {
    synced: AccountSnapshot,
}

impl SyncedRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a snapshot fetched from the remote.
    pub fn hydrated(snapshot: AccountSnapshot) -> Self {
        SyncedRecords { synced: snapshot }
    }

    /// Replaces every record with a freshly fetched snapshot.
    pub fn hydrate(&mut self, snapshot: AccountSnapshot) {
        self.synced = snapshot;
    }

    /// Records a payload the remote acknowledged.
    pub fn record(&mut self, payload: EntityPayload) {
        self.synced.set(payload);
    }

    /// True if `payload` is exactly what the remote holds for its entity.
    pub fn matches(&self, payload: &EntityPayload) -> bool {
        self.synced.payload(payload.kind()) == *payload
    }

    pub fn payload(&self, kind: EntityKind) -> EntityPayload {
        self.synced.payload(kind)
    }
}
