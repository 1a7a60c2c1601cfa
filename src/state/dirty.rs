//! Per-entity dirty flags and write-versions.
//!
//! The tracker is the only state shared between the mutation path and the
//! flush path. Every mutation bumps the entity's write-version; a flush
//! snapshots `(payload, version)` before its network call and, on success,
//! clears the dirty flag only through [`DirtyTracker::clear_if_version`]. A
//! mutation that lands while the call is in flight therefore keeps the entity
//! dirty for the next cycle.

use crate::types::{EntityKind, EntityPayload};

/// A payload captured for flushing, with the version it was captured at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub payload: EntityPayload,
    pub version: u64,
}

#[derive(Debug, Clone, Default)]
struct EntitySlot {
    dirty: bool,
    version: u64,
    payload: Option<EntityPayload>,
    /// Version the remote rejected as invalid; not resent until superseded.
    rejected_version: Option<u64>,
}

/// Dirty flags, write-versions and pending payloads for every entity.
#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    slots: [EntitySlot; 3],
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: EntityKind) -> &EntitySlot {
        &self.slots[kind.index()]
    }

    fn slot_mut(&mut self, kind: EntityKind) -> &mut EntitySlot {
        &mut self.slots[kind.index()]
    }

    /// Records a mutation: bumps the version, sets the dirty flag and stores
    /// the payload. Returns the new version.
    pub fn mark_dirty(&mut self, payload: EntityPayload) -> u64 {
        let slot = self.slot_mut(payload.kind());
        slot.version += 1;
        slot.dirty = true;
        slot.payload = Some(payload);
        slot.version
    }

    /// Returns the payload to flush for `kind`, if it is dirty and its current
    /// version has not already been rejected by the remote.
    pub fn pending(&self, kind: EntityKind) -> Option<PendingWrite> {
        let slot = self.slot(kind);
        if !slot.dirty || slot.rejected_version == Some(slot.version) {
            return None;
        }
        slot.payload.clone().map(|payload| PendingWrite {
            payload,
            version: slot.version,
        })
    }

    /// Clears the dirty flag and pending payload, but only if no mutation has
    /// happened since `version` was captured. Returns whether it cleared.
    pub fn clear_if_version(&mut self, kind: EntityKind, version: u64) -> bool {
        let slot = self.slot_mut(kind);
        if slot.version != version {
            return false;
        }
        slot.dirty = false;
        slot.payload = None;
        slot.rejected_version = None;
        true
    }

    /// Records that the remote rejected `version` of `kind`.
    pub fn mark_rejected(&mut self, kind: EntityKind, version: u64) {
        self.slot_mut(kind).rejected_version = Some(version);
    }

    /// True if the current version of `kind` was rejected and is being held back.
    pub fn is_rejected(&self, kind: EntityKind) -> bool {
        let slot = self.slot(kind);
        slot.dirty && slot.rejected_version == Some(slot.version)
    }

    pub fn is_dirty(&self, kind: EntityKind) -> bool {
        self.slot(kind).dirty
    }

    pub fn version(&self, kind: EntityKind) -> u64 {
        self.slot(kind).version
    }

    pub fn payload(&self, kind: EntityKind) -> Option<&EntityPayload> {
        self.slot(kind).payload.as_ref()
    }

    pub fn dirty_count(&self) -> usize {
        self.slots.iter().filter(|s| s.dirty).count()
    }

    pub fn has_dirty(&self) -> bool {
        self.slots.iter().any(|s| s.dirty)
    }

    /// Entities with unflushed mutations, in flush order.
    pub fn dirty_kinds(&self) -> Vec<EntityKind> {
        EntityKind::ALL
            .into_iter()
            .filter(|k| self.is_dirty(*k))
            .collect()
    }
}
