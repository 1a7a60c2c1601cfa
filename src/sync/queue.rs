//! Bounded, durable FIFO of remote writes that failed transiently.
//!
//! The queue is drained oldest-first at the start of every flush cycle, before
//! any dirty entity is sent. Draining stops at the first transient failure so
//! that entries keep their order while the remote is unreachable.
//!
//! # Bounds
//!
//! - At most `capacity` entries. Enqueueing into a full queue evicts the
//!   oldest entry, which is logged and counted as data loss.
//! - At most `max_attempts` transient failures per entry. An entry that
//!   exhausts its attempts is dropped, logged and counted.
//!
//! # Coalescing
//!
//! Entity upserts are full-document writes, so a newer upsert of an entity
//! replaces a queued older one in place (keeping its attempt count). Run
//! appends are never coalesced.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::persistence::{read_json, remove_file_durable, write_json_atomic};
use crate::remote::RemoteWrite;
use crate::types::EntityKind;

/// Current on-disk queue schema version.
pub const QUEUE_SCHEMA_VERSION: u32 = 1;

/// One queued remote write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub write: RemoteWrite,

    /// Write-version the upsert payload was captured at, used to clear the
    /// dirty flag when the entry is finally acknowledged.
    #[serde(default)]
    pub version: Option<u64>,

    /// Transient failures so far.
    pub attempts: u32,

    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    fn new(write: RemoteWrite, version: Option<u64>) -> Self {
        QueueEntry {
            id: Uuid::new_v4(),
            write,
            version,
            attempts: 0,
            enqueued_at: Utc::now(),
        }
    }
}

/// Counters for queue activity since the queue was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub coalesced: u64,
    pub completed: u64,
    pub superseded: u64,
    /// Entries evicted because the queue was full.
    pub evicted: u64,
    /// Entries dropped after exhausting their attempts.
    pub exhausted: u64,
}

impl QueueStats {
    /// Writes lost without ever reaching the remote.
    pub fn dropped(&self) -> u64 {
        self.evicted + self.exhausted
    }
}

/// What happened to an entry after a transient failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still queued, with the given attempt count.
    Retained { attempts: u32 },
    /// Removed after reaching the attempt cap.
    Exhausted(QueueEntry),
    /// No entry with that id was queued.
    Missing,
}

#[derive(Debug, Serialize, Deserialize)]
struct QueueFile {
    schema_version: u32,
    entries: VecDeque<QueueEntry>,
}

/// The offline write queue for one account.
#[derive(Debug)]
pub struct OfflineQueue {
    entries: VecDeque<QueueEntry>,
    capacity: usize,
    max_attempts: u32,
    path: Option<PathBuf>,
    stats: QueueStats,
}

impl OfflineQueue {
    /// Creates an empty queue that is never persisted.
    pub fn in_memory(capacity: usize, max_attempts: u32) -> Self {
        OfflineQueue {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            max_attempts: max_attempts.max(1),
            path: None,
            stats: QueueStats::default(),
        }
    }

    /// Opens the queue persisted at `path`.
    ///
    /// An unreadable or schema-mismatched file is logged and discarded; it
    /// never prevents the account from loading.
    pub fn open(path: impl Into<PathBuf>, capacity: usize, max_attempts: u32) -> Self {
        let path = path.into();
        let mut queue = Self::in_memory(capacity, max_attempts);

        match read_json::<QueueFile>(&path) {
            Ok(Some(file)) if file.schema_version == QUEUE_SCHEMA_VERSION => {
                queue.entries = file.entries;
            }
            Ok(Some(file)) => {
                warn!(
                    path = %path.display(),
                    expected = QUEUE_SCHEMA_VERSION,
                    got = file.schema_version,
                    "Discarding offline queue with unknown schema"
                );
                discard(&path);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding unreadable offline queue");
                discard(&path);
            }
        }

        while queue.entries.len() > queue.capacity {
            if let Some(evicted) = queue.entries.pop_front() {
                queue.log_eviction(&evicted);
            }
        }

        queue.path = Some(path);
        debug!(entries = queue.entries.len(), "Opened offline queue");
        queue
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    /// Entries in drain order.
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    /// The next entry to drain.
    pub fn front(&self) -> Option<&QueueEntry> {
        self.entries.front()
    }

    /// Queues a write, coalescing entity upserts and evicting the oldest entry
    /// if the queue is full.
    pub fn enqueue(&mut self, write: RemoteWrite, version: Option<u64>) {
        self.stats.enqueued += 1;

        if let Some(kind) = write.entity() {
            if let Some(existing) = self
                .entries
                .iter_mut()
                .find(|e| e.write.entity() == Some(kind))
            {
                // Fresh id, so an in-flight send of the old payload cannot
                // complete the replacement.
                existing.id = Uuid::new_v4();
                existing.write = write;
                existing.version = version;
                self.stats.coalesced += 1;
                debug!(entity = %kind, attempts = existing.attempts, "Coalesced queued upsert");
                self.persist();
                return;
            }
        }

        if self.entries.len() >= self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                self.log_eviction(&evicted);
            }
        }

        let entry = QueueEntry::new(write, version);
        debug!(op = %entry.write, queued = self.entries.len() + 1, "Queued write");
        self.entries.push_back(entry);
        self.persist();
    }

    /// Removes an acknowledged (or permanently rejected) entry.
    pub fn complete(&mut self, id: Uuid) -> Option<QueueEntry> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        let entry = self.entries.remove(index)?;
        self.stats.completed += 1;
        self.persist();
        Some(entry)
    }

    /// Records a transient failure of entry `id`, dropping it once it reaches
    /// the attempt cap.
    pub fn record_failure(&mut self, id: Uuid) -> FailureOutcome {
        let Some(index) = self.entries.iter().position(|e| e.id == id) else {
            return FailureOutcome::Missing;
        };

        let attempts = {
            let entry = &mut self.entries[index];
            entry.attempts += 1;
            entry.attempts
        };

        if attempts < self.max_attempts {
            self.persist();
            return FailureOutcome::Retained { attempts };
        }

        let Some(entry) = self.entries.remove(index) else {
            return FailureOutcome::Missing;
        };
        self.stats.exhausted += 1;
        error!(
            op = %entry.write,
            attempts = entry.attempts,
            enqueued_at = %entry.enqueued_at,
            total_exhausted = self.stats.exhausted,
            "Dropping queued write after exhausting retries"
        );
        self.persist();
        FailureOutcome::Exhausted(entry)
    }

    /// Removes queued upserts of `kind`. Called once a newer record of the
    /// entity has been acknowledged. Returns how many were removed.
    pub fn remove_superseded(&mut self, kind: EntityKind) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.write.entity() != Some(kind));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.stats.superseded += removed as u64;
            debug!(entity = %kind, removed, "Removed superseded queued upserts");
            self.persist();
        }
        removed
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        self.entries.clear();
        self.persist();
    }

    fn log_eviction(&mut self, evicted: &QueueEntry) {
        self.stats.evicted += 1;
        error!(
            op = %evicted.write,
            attempts = evicted.attempts,
            enqueued_at = %evicted.enqueued_at,
            capacity = self.capacity,
            total_evicted = self.stats.evicted,
            "Offline queue full; evicted oldest write"
        );
    }

    /// Writes the queue to disk. Failures are logged; the in-memory queue stays
    /// authoritative for this session.
    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let file = QueueFile {
            schema_version: QUEUE_SCHEMA_VERSION,
            entries: self.entries.clone(),
        };
        if let Err(e) = write_json_atomic(path, &file) {
            warn!(path = %path.display(), error = %e, "Failed to persist offline queue");
        }
    }
}

fn discard(path: &Path) {
    if let Err(e) = remove_file_durable(path) {
        warn!(path = %path.display(), error = %e, "Failed to delete offline queue file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountProfile, AccountSettings, CompletedRun, EntityPayload};
    use proptest::prelude::*;

    fn profile_upsert(currency: i64) -> RemoteWrite {
        RemoteWrite::Upsert {
            record: EntityPayload::Profile(AccountProfile {
                currency,
                ..Default::default()
            }),
        }
    }

    fn settings_upsert() -> RemoteWrite {
        RemoteWrite::Upsert {
            record: EntityPayload::Settings(AccountSettings::default()),
        }
    }

    fn run(score: u64) -> RemoteWrite {
        RemoteWrite::AppendRun {
            run: CompletedRun::new(score, 1_000, 1, "test"),
        }
    }

    #[test]
    fn upserts_coalesce_in_place_keeping_attempts() {
        let mut queue = OfflineQueue::in_memory(10, 5);
        queue.enqueue(profile_upsert(1), Some(1));
        queue.enqueue(settings_upsert(), Some(1));
        let first_id = queue.front().unwrap().id;
        assert_eq!(
            queue.record_failure(first_id),
            FailureOutcome::Retained { attempts: 1 }
        );

        queue.enqueue(profile_upsert(2), Some(2));

        assert_eq!(queue.len(), 2);
        let front = queue.front().unwrap();
        assert_eq!(front.write, profile_upsert(2));
        assert_eq!(front.version, Some(2));
        assert_eq!(front.attempts, 1);
        assert_ne!(front.id, first_id);
        assert_eq!(queue.stats().coalesced, 1);
    }

    #[test]
    fn run_appends_never_coalesce() {
        let mut queue = OfflineQueue::in_memory(10, 5);
        queue.enqueue(run(1), None);
        queue.enqueue(run(2), None);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut queue = OfflineQueue::in_memory(3, 5);
        for score in 0..5 {
            queue.enqueue(run(score), None);
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.stats().evicted, 2);
        let scores: Vec<u64> = queue
            .iter()
            .map(|e| match &e.write {
                RemoteWrite::AppendRun { run } => run.score,
                RemoteWrite::Upsert { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(scores, vec![2, 3, 4]);
    }

    #[test]
    fn entry_is_dropped_after_max_attempts() {
        let mut queue = OfflineQueue::in_memory(10, 3);
        queue.enqueue(run(1), None);
        let id = queue.front().unwrap().id;

        assert_eq!(queue.record_failure(id), FailureOutcome::Retained { attempts: 1 });
        assert_eq!(queue.record_failure(id), FailureOutcome::Retained { attempts: 2 });
        assert!(matches!(queue.record_failure(id), FailureOutcome::Exhausted(e) if e.attempts == 3));
        assert!(queue.is_empty());
        assert_eq!(queue.stats().exhausted, 1);
        assert_eq!(queue.stats().dropped(), 1);
        assert_eq!(queue.record_failure(id), FailureOutcome::Missing);
    }

    #[test]
    fn remove_superseded_leaves_runs_and_other_entities() {
        let mut queue = OfflineQueue::in_memory(10, 5);
        queue.enqueue(profile_upsert(1), Some(1));
        queue.enqueue(run(1), None);
        queue.enqueue(settings_upsert(), Some(1));

        assert_eq!(queue.remove_superseded(EntityKind::Profile), 1);
        assert_eq!(queue.remove_superseded(EntityKind::Profile), 0);
        assert_eq!(queue.len(), 2);
        assert!(queue.iter().all(|e| e.write.entity() != Some(EntityKind::Profile)));
    }

    #[test]
    fn complete_removes_only_matching_id() {
        let mut queue = OfflineQueue::in_memory(10, 5);
        queue.enqueue(run(1), None);
        queue.enqueue(run(2), None);
        let id = queue.front().unwrap().id;

        assert!(queue.complete(id).is_some());
        assert!(queue.complete(id).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn persisted_queue_reloads_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline_queue.json");

        {
            let mut queue = OfflineQueue::open(&path, 10, 5);
            queue.enqueue(run(1), None);
            queue.enqueue(profile_upsert(9), Some(4));
        }

        let reopened = OfflineQueue::open(&path, 10, 5);
        assert_eq!(reopened.len(), 2);
        assert!(matches!(reopened.front().unwrap().write, RemoteWrite::AppendRun { .. }));
    }

    #[test]
    fn corrupt_queue_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline_queue.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let queue = OfflineQueue::open(&path, 10, 5);
        assert!(queue.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn reopening_with_smaller_capacity_trims_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline_queue.json");
        {
            let mut queue = OfflineQueue::open(&path, 10, 5);
            for score in 0..6 {
                queue.enqueue(run(score), None);
            }
        }

        let reopened = OfflineQueue::open(&path, 4, 5);
        assert_eq!(reopened.len(), 4);
        assert_eq!(reopened.stats().evicted, 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Run,
        Profile,
        Settings,
        FailFront,
        CompleteFront,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Run),
            Just(Op::Profile),
            Just(Op::Settings),
            Just(Op::FailFront),
            Just(Op::CompleteFront),
        ]
    }

    proptest! {
        /// The queue never exceeds its capacity, never holds two upserts of the
        /// same entity, and never keeps an entry past its attempt cap.
        #[test]
        fn queue_bounds_hold(ops in prop::collection::vec(op(), 0..200), capacity in 1usize..8) {
            let max_attempts = 3;
            let mut queue = OfflineQueue::in_memory(capacity, max_attempts);
            for (i, op) in ops.iter().enumerate() {
                match op {
                    Op::Run => queue.enqueue(run(i as u64), None),
                    Op::Profile => queue.enqueue(profile_upsert(i as i64), Some(i as u64)),
                    Op::Settings => queue.enqueue(settings_upsert(), Some(i as u64)),
                    Op::FailFront => {
                        if let Some(id) = queue.front().map(|e| e.id) {
                            queue.record_failure(id);
                        }
                    }
                    Op::CompleteFront => {
                        if let Some(id) = queue.front().map(|e| e.id) {
                            queue.complete(id);
                        }
                    }
                }

                prop_assert!(queue.len() <= capacity);
                prop_assert!(queue.iter().all(|e| e.attempts < max_attempts));
                for kind in EntityKind::ALL {
                    let count = queue.iter().filter(|e| e.write.entity() == Some(kind)).count();
                    prop_assert!(count <= 1);
                }
            }
        }
    }
}
