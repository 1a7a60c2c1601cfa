//! The sync engine: single writer from local account state to the remote.
//!
//! # Write path
//!
//! ```text
//! save_* / apply_economy / record_run
//!   -> update StateContainer
//!   -> skip entities whose payload the remote already holds
//!   -> DirtyTracker::mark_dirty (version += 1)
//!   -> CrashSafeCache::write            (durable before returning)
//!   -> DebounceScheduler::arm
//!
//! debounce fires / lifecycle event / flush()
//!   -> flush lock
//!   -> drain OfflineQueue oldest-first
//!   -> for each dirty entity: snapshot (payload, version), upsert,
//!      clear_if_version on success
//!   -> on transient failure, retry after an exponential backoff
//! ```
//!
//! # Concurrency
//!
//! Session state (tracker, cache handle, queue) sits behind a `std::sync::Mutex`
//! that is never held across an `.await`. Flush cycles are serialized by a
//! `tokio::sync::Mutex<()>`, so no two upserts for the same entity are ever in
//! flight together. Every completion re-checks the session epoch: a flush that
//! finishes after sign-out (or after another account was loaded) is discarded.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, error, info, instrument, warn};

use super::debounce::DebounceScheduler;
use super::error::{Result, SyncError};
use super::queue::{FailureOutcome, OfflineQueue, QueueStats};
use super::report::{FlushReport, Rejection};
use crate::config::SyncConfig;
use crate::persistence::{CacheEntry, CrashSafeCache, reconcile};
use crate::remote::{RemoteError, RemoteStore, RemoteWrite};
use crate::state::{DirtyTracker, StateContainer, StateView, SyncedRecords};
use crate::types::{
    AccountId, AccountProfile, AccountSettings, AccountSnapshot, CompletedRun, EntityKind,
    EntityPayload, ExtendedUpdate, ItemId, ProfileDelta,
};

/// Handle to the sync engine. Cheap to clone; all clones share one engine.
pub struct SyncEngine<R: RemoteStore> {
    inner: Arc<EngineInner<R>>,
}

impl<R: RemoteStore> Clone for SyncEngine<R> {
    fn clone(&self) -> Self {
        SyncEngine {
            inner: self.inner.clone(),
        }
    }
}

struct EngineInner<R: RemoteStore> {
    remote: R,
    config: SyncConfig,
    container: StateContainer,
    session: Mutex<Option<Session>>,
    flush_lock: tokio::sync::Mutex<()>,
    debounce: DebounceScheduler,
    next_epoch: AtomicU64,
    /// Consecutive cycles that ended with a transient failure.
    failed_cycles: AtomicU32,
}

/// Everything that belongs to the signed-in account.
struct Session {
    account: AccountId,
    epoch: u64,
    tracker: DirtyTracker,
    cache: CrashSafeCache,
    queue: OfflineQueue,
    synced: SyncedRecords,
    /// The currency value the remote last acknowledged.
    currency_baseline: i64,
    /// Currency values sent since the last acknowledgement. Any of them may
    /// have landed even though the response never arrived.
    unacked_currencies: Vec<i64>,
}

impl Session {
    /// Marks the current container value of `kind` dirty and persists it.
    fn mark_dirty(&mut self, snapshot: &AccountSnapshot, kind: EntityKind) -> u64 {
        let payload = snapshot.payload(kind);
        let version = self.tracker.mark_dirty(payload.clone());
        self.write_cache(payload, version);
        version
    }

    fn write_cache(&self, payload: EntityPayload, version: u64) {
        let kind = payload.kind();
        let entry = if kind == EntityKind::Profile {
            CacheEntry::new(payload, version, Some(self.currency_baseline))
                .with_unacked_currencies(self.unacked_currencies.clone())
        } else {
            CacheEntry::new(payload, version, None)
        };
        if let Err(e) = self.cache.write(&entry) {
            warn!(
                account = %self.account,
                entity = %kind,
                version,
                error = %e,
                "Failed to write cache entry; mutation kept in memory only"
            );
        }
    }

    /// Notes an upsert about to be sent. The cached profile learns the sent
    /// currency first, so recovery after a crash can tell whether it landed.
    fn note_sent(&mut self, record: &EntityPayload) {
        let Some(currency) = record.currency() else {
            return;
        };
        if self.unacked_currencies.contains(&currency) {
            return;
        }
        self.unacked_currencies.push(currency);

        if let Some(pending) = self.tracker.payload(EntityKind::Profile).cloned()
            && self.tracker.is_dirty(EntityKind::Profile)
        {
            let version = self.tracker.version(EntityKind::Profile);
            self.write_cache(pending, version);
        }
    }

    /// Records an acknowledged upsert. Returns true if it cleared the entity.
    fn acknowledge(&mut self, payload: &EntityPayload, version: Option<u64>) -> bool {
        let kind = payload.kind();
        if let Some(currency) = payload.currency() {
            self.currency_baseline = currency;
            self.unacked_currencies.clear();
        }
        self.synced.record(payload.clone());

        let cleared = version.is_some_and(|v| self.tracker.clear_if_version(kind, v));
        if cleared {
            if let Err(e) = self.cache.remove(kind) {
                warn!(account = %self.account, entity = %kind, error = %e, "Failed to clear cache entry");
            }
            return true;
        }

        // The entity moved on while the write was in flight. The cached entry
        // must carry the new baseline so recovery adds only the unflushed delta.
        if kind == EntityKind::Profile
            && let Some(pending) = self.tracker.payload(kind).cloned()
        {
            let version = self.tracker.version(kind);
            self.write_cache(pending, version);
        }
        false
    }

    fn pending_count(&self) -> usize {
        self.tracker.dirty_count() + self.queue.len()
    }
}

impl<R: RemoteStore> SyncEngine<R> {
    /// Creates an engine with no account loaded.
    ///
    /// Must be called from within a tokio runtime: the debounce timer runs as
    /// a background task.
    pub fn new(remote: R, config: SyncConfig) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<EngineInner<R>>| {
            let weak = weak.clone();
            let debounce = DebounceScheduler::spawn(config.debounce_delay, move || {
                let weak = weak.clone();
                async move {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    let engine = SyncEngine { inner };
                    let report = engine.flush().await;
                    if !report.rejections.is_empty() {
                        warn!(
                            rejections = report.rejections.len(),
                            "Debounced flush had rejected writes"
                        );
                    }
                }
            });

            EngineInner {
                remote,
                config,
                container: StateContainer::new(),
                session: Mutex::new(None),
                flush_lock: tokio::sync::Mutex::new(()),
                debounce,
                next_epoch: AtomicU64::new(1),
                failed_cycles: AtomicU32::new(0),
            }
        });
        SyncEngine { inner }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn remote(&self) -> &R {
        &self.inner.remote
    }

    /// Read-only, subscribable view of the account state.
    pub fn view(&self) -> StateView {
        self.inner.container.view()
    }

    /// The current account state.
    pub fn snapshot(&self) -> Arc<AccountSnapshot> {
        self.inner.container.current()
    }

    /// The signed-in account, if any.
    pub fn account(&self) -> Option<AccountId> {
        self.inner.lock_session().as_ref().map(|s| s.account.clone())
    }

    /// True if any entity is dirty or any write is queued.
    pub fn has_pending_writes(&self) -> bool {
        self.pending_write_count() > 0
    }

    /// Dirty entities plus queued writes, for a "writes pending" indicator.
    pub fn pending_write_count(&self) -> usize {
        self.inner
            .lock_session()
            .as_ref()
            .map_or(0, |s| s.pending_count())
    }

    /// Offline queue counters for the signed-in account.
    pub fn queue_stats(&self) -> Option<QueueStats> {
        self.inner.lock_session().as_ref().map(|s| s.queue.stats())
    }

    /// Signs `account` in: recovers its cache against the remote snapshot and
    /// hydrates the container.
    ///
    /// The cache is read before the remote so nothing written by a crashed
    /// session can be lost to a slow fetch. Recovered entities are marked dirty
    /// and flushed by the next cycle.
    ///
    /// # Errors
    ///
    /// Fails if an account is already loaded, the cache directory cannot be
    /// created, or the remote fetch fails. No session is installed on failure.
    #[instrument(skip(self), fields(account = %account))]
    pub async fn load(&self, account: AccountId) -> Result<AccountSnapshot> {
        let _flush = self.inner.flush_lock.lock().await;

        if let Some(current) = self.account() {
            return Err(SyncError::AlreadyLoaded(current));
        }

        let cache = CrashSafeCache::open(&self.inner.config.cache_dir, &account)?;
        let cached = cache.load_all();
        let mut queue = OfflineQueue::open(
            cache.queue_path(),
            self.inner.config.queue_capacity,
            self.inner.config.max_attempts,
        );

        let remote = self.inner.remote.fetch(&account).await?;
        let synced = SyncedRecords::hydrated(remote.clone().into_account());
        let reconciled = reconcile(remote, &cached);

        // Cache entries always hold the newest unconfirmed payload of their
        // entity, so queued upserts from the previous session are redundant.
        for kind in EntityKind::ALL {
            queue.remove_superseded(kind);
        }

        for kind in &reconciled.superseded {
            if let Err(e) = cache.remove(*kind) {
                warn!(entity = %kind, error = %e, "Failed to remove superseded cache entry");
            }
        }

        let mut session = Session {
            account: account.clone(),
            epoch: self.inner.next_epoch.fetch_add(1, Ordering::SeqCst),
            tracker: DirtyTracker::new(),
            cache,
            queue,
            synced,
            currency_baseline: reconciled.remote_currency,
            unacked_currencies: Vec::new(),
        };
        for kind in &reconciled.recovered {
            let version = session.mark_dirty(&reconciled.snapshot, *kind);
            info!(entity = %kind, version, "Recovered unflushed cache entry");
        }

        let needs_flush = session.pending_count() > 0;
        {
            let mut slot = self.inner.lock_session();
            if let Some(current) = slot.as_ref() {
                return Err(SyncError::AlreadyLoaded(current.account.clone()));
            }
            self.inner.container.replace(reconciled.snapshot.clone());
            *slot = Some(session);
        }
        self.inner.failed_cycles.store(0, Ordering::SeqCst);

        if needs_flush {
            self.inner.debounce.arm();
        }

        info!(
            recovered = reconciled.recovered.len(),
            superseded = reconciled.superseded.len(),
            "Account loaded"
        );
        Ok(reconciled.snapshot)
    }

    /// Re-reads the remote and re-hydrates, but only when nothing is pending.
    ///
    /// Returns whether the state was replaced.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<bool> {
        let _flush = self.inner.flush_lock.lock().await;

        let (account, epoch) = self.inner.session_key().ok_or(SyncError::NotLoaded)?;
        if self.has_pending_writes() {
            debug!("Skipping refresh with pending writes");
            return Ok(false);
        }

        let remote = self.inner.remote.fetch(&account).await?;

        let mut slot = self.inner.lock_session();
        let Some(session) = slot.as_mut().filter(|s| s.epoch == epoch) else {
            return Ok(false);
        };
        if session.pending_count() > 0 {
            debug!("Mutation arrived during refresh; keeping local state");
            return Ok(false);
        }

        let snapshot = remote.into_account();
        session.currency_baseline = snapshot.profile.currency;
        session.unacked_currencies.clear();
        session.synced.hydrate(snapshot.clone());
        self.inner.container.replace(snapshot);
        debug!("Refreshed account from remote");
        Ok(true)
    }

    /// Replaces the profile. Monotonic stats never drop below their current value.
    pub fn save_profile(&self, profile: AccountProfile) -> Result<()> {
        self.mutate(&[EntityKind::Profile], |snapshot| {
            snapshot.profile = profile.with_monotonic_floor(&snapshot.profile);
        })
    }

    /// Replaces the settings.
    pub fn save_settings(&self, settings: AccountSettings) -> Result<()> {
        self.mutate(&[EntityKind::Settings], |snapshot| {
            snapshot.settings = settings;
        })
    }

    /// Replaces one sub-document of the extended state.
    pub fn save_extended(&self, update: ExtendedUpdate) -> Result<()> {
        self.mutate(&[EntityKind::Extended], |snapshot| {
            update.apply(&mut snapshot.extended);
        })
    }

    /// Applies a currency change and grants items.
    ///
    /// The extended state is only marked dirty if an item was new.
    pub fn apply_economy(
        &self,
        currency_delta: i64,
        granted: impl IntoIterator<Item = ItemId>,
    ) -> Result<()> {
        let granted: Vec<ItemId> = granted.into_iter().collect();
        let mut guard = self.inner.lock_session();
        let session = guard.as_mut().ok_or(SyncError::NotLoaded)?;

        let (snapshot, new_items) = self.inner.container.update(|snapshot| {
            snapshot.profile.currency = snapshot.profile.currency.saturating_add(currency_delta);
            let new_items = snapshot.extended.grant(granted);
            (snapshot.clone(), new_items)
        });

        let mut kinds = vec![EntityKind::Profile];
        if new_items {
            kinds.push(EntityKind::Extended);
        }
        let marked = self.mark(session, &snapshot, &kinds);
        drop(guard);

        if marked {
            self.inner.debounce.arm();
        }
        Ok(())
    }

    /// Records a completed run and folds its stats into the profile.
    ///
    /// The run is queued durably as an append; it is never coalesced and is
    /// sent before the profile on the next flush.
    #[instrument(skip(self, run, delta), fields(run_id = %run.run_id))]
    pub fn record_run(&self, run: CompletedRun, delta: ProfileDelta) -> Result<()> {
        let mut guard = self.inner.lock_session();
        let session = guard.as_mut().ok_or(SyncError::NotLoaded)?;

        session.queue.enqueue(RemoteWrite::AppendRun { run }, None);
        let snapshot = self.inner.container.update(|snapshot| {
            snapshot.profile.apply_delta(&delta);
            snapshot.clone()
        });
        self.mark(session, &snapshot, &[EntityKind::Profile]);
        drop(guard);

        self.inner.debounce.arm();
        Ok(())
    }

    fn mutate(&self, kinds: &[EntityKind], f: impl FnOnce(&mut AccountSnapshot)) -> Result<()> {
        let mut guard = self.inner.lock_session();
        let session = guard.as_mut().ok_or(SyncError::NotLoaded)?;

        let snapshot = self.inner.container.update(|snapshot| {
            f(snapshot);
            snapshot.clone()
        });
        let marked = self.mark(session, &snapshot, kinds);
        drop(guard);

        if marked {
            self.inner.debounce.arm();
        }
        Ok(())
    }

    /// Marks `kinds` dirty, skipping clean entities whose payload the remote
    /// already holds. Returns whether anything was marked.
    fn mark(&self, session: &mut Session, snapshot: &AccountSnapshot, kinds: &[EntityKind]) -> bool {
        let mut marked = false;
        for kind in kinds {
            let payload = snapshot.payload(*kind);
            if !session.tracker.is_dirty(*kind) && session.synced.matches(&payload) {
                debug!(entity = %kind, "Payload already on remote; not marked dirty");
                continue;
            }
            let version = session.mark_dirty(snapshot, *kind);
            debug!(account = %session.account, entity = %kind, version, "Marked dirty");
            marked = true;
        }
        marked
    }

    /// Runs one flush cycle, waiting for any cycle already in progress.
    ///
    /// Never fails: transient failures are queued, rejections are reported.
    /// Use [`FlushReport::into_result`] to treat rejections as errors.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> FlushReport {
        let _flush = self.inner.flush_lock.lock().await;
        self.inner.flush_cycle().await
    }

    /// Signs out: makes a final flush attempt, then discards every trace of
    /// the account locally (tracker, cache, queue, in-memory state).
    ///
    /// Returns the report of the final flush.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<FlushReport> {
        let _flush = self.inner.flush_lock.lock().await;
        let report = self.inner.flush_cycle().await;

        let session = self.inner.lock_session().take();
        let Some(session) = session else {
            return Err(SyncError::NotLoaded);
        };
        self.inner.debounce.disarm();

        let pending = session.pending_count();
        if pending > 0 {
            warn!(
                account = %session.account,
                dirty = ?session.tracker.dirty_kinds(),
                queued = session.queue.len(),
                "Signing out with unflushed writes; discarding them"
            );
        }

        self.inner.container.replace(AccountSnapshot::default());
        session.cache.clear()?;

        info!(account = %session.account, "Signed out");
        Ok(report)
    }
}

impl<R: RemoteStore> EngineInner<R> {
    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_key(&self) -> Option<(AccountId, u64)> {
        self.lock_session()
            .as_ref()
            .map(|s| (s.account.clone(), s.epoch))
    }

    /// Runs `f` on the session if it is still the one the cycle started with.
    fn with_session<T>(&self, epoch: u64, f: impl FnOnce(&mut Session) -> T) -> Option<T> {
        let mut guard = self.lock_session();
        match guard.as_mut() {
            Some(session) if session.epoch == epoch => Some(f(session)),
            _ => None,
        }
    }

    /// One flush cycle. The caller holds the flush lock.
    async fn flush_cycle(&self) -> FlushReport {
        let mut report = FlushReport::default();
        let Some((account, epoch)) = self.session_key() else {
            return report;
        };

        // Anything marked dirty from here on re-arms the timer itself.
        self.debounce.disarm();

        self.drain_queue(&account, epoch, &mut report).await;

        for kind in EntityKind::ALL {
            let pending = self.with_session(epoch, |s| {
                let pending = s.tracker.pending(kind);
                if let Some(pending) = &pending {
                    s.note_sent(&pending.payload);
                }
                pending
            });
            let Some(pending) = pending else {
                debug!("Session ended during flush; discarding remainder");
                return report;
            };
            let Some(pending) = pending else {
                continue;
            };

            let record = pending.payload;
            let write = RemoteWrite::Upsert {
                record: record.clone(),
            };
            let operation = write.to_string();
            let result = self.remote.write(&account, &write).await;

            let handled = self.with_session(epoch, |session| match result {
                Ok(()) => {
                    if session.acknowledge(&record, Some(pending.version)) {
                        debug!(entity = %kind, version = pending.version, "Flushed");
                        report.flushed.push(kind);
                    } else {
                        debug!(
                            entity = %kind,
                            sent = pending.version,
                            live = session.tracker.version(kind),
                            "Flushed stale version; entity stays dirty"
                        );
                        report.retained.push(kind);
                    }
                    session.queue.remove_superseded(kind);
                }
                Err(e) if e.is_rejection() => {
                    session.tracker.mark_rejected(kind, pending.version);
                    warn!(entity = %kind, version = pending.version, error = %e, "Remote rejected upsert");
                    report.rejections.push(rejection(Some(kind), operation, &e));
                }
                Err(e) => {
                    warn!(entity = %kind, version = pending.version, error = %e, "Upsert failed; queued for retry");
                    session.queue.enqueue(write, Some(pending.version));
                    report.enqueued.push(kind);
                }
            });
            if handled.is_none() {
                debug!("Session ended during flush; discarding completion");
                return report;
            }
        }

        if !report.is_noop() {
            info!(
                queue_sent = report.queue_sent,
                queue_dropped = report.queue_dropped,
                flushed = ?report.flushed,
                retained = ?report.retained,
                enqueued = ?report.enqueued,
                rejected = report.rejections.len(),
                "Flush cycle complete"
            );
        }

        // A version that moved on mid-flight is picked up by the next cycle.
        if !report.retained.is_empty() {
            self.debounce.arm();
        }

        if report.queue_interrupted || !report.enqueued.is_empty() {
            let failed = self.failed_cycles.fetch_add(1, Ordering::SeqCst);
            let delay = self.config.retry_delay(failed);
            debug!(failed_cycles = failed + 1, ?delay, "Scheduling retry");
            self.debounce.arm_within(delay);
        } else {
            self.failed_cycles.store(0, Ordering::SeqCst);
        }

        report
    }

    /// Sends queued writes oldest-first, stopping at the first transient failure.
    async fn drain_queue(&self, account: &AccountId, epoch: u64, report: &mut FlushReport) {
        loop {
            let front = self.with_session(epoch, |s| {
                let front = s.queue.front().cloned();
                if let Some(RemoteWrite::Upsert { record }) = front.as_ref().map(|e| &e.write) {
                    s.note_sent(record);
                }
                front
            });
            let Some(entry) = front.flatten() else {
                return;
            };

            let result = self.remote.write(account, &entry.write).await;

            let stop = self.with_session(epoch, |session| match result {
                Ok(()) => {
                    session.queue.complete(entry.id);
                    report.queue_sent += 1;
                    if let RemoteWrite::Upsert { record } = &entry.write {
                        let kind = record.kind();
                        if session.acknowledge(record, entry.version) {
                            report.flushed.push(kind);
                        }
                    }
                    false
                }
                Err(e) if e.is_rejection() => {
                    session.queue.complete(entry.id);
                    let entity = entry.write.entity();
                    if let (Some(kind), Some(version)) = (entity, entry.version) {
                        session.tracker.mark_rejected(kind, version);
                    }
                    error!(op = %entry.write, error = %e, "Remote rejected queued write; dropping it");
                    report.rejections.push(rejection(entity, entry.write.to_string(), &e));
                    false
                }
                Err(e) => {
                    match session.queue.record_failure(entry.id) {
                        FailureOutcome::Retained { attempts } => {
                            debug!(op = %entry.write, attempts, error = %e, "Queued write still failing");
                        }
                        FailureOutcome::Exhausted(_) => report.queue_dropped += 1,
                        FailureOutcome::Missing => {}
                    }
                    report.queue_interrupted = true;
                    true
                }
            });

            match stop {
                Some(false) => continue,
                _ => return,
            }
        }
    }
}

fn rejection(entity: Option<EntityKind>, operation: String, err: &RemoteError) -> Rejection {
    Rejection {
        entity,
        operation,
        message: err.message.clone(),
    }
}
