//! In-process reference remote.
//!
//! [`MemoryRemote`] holds every account's records and run log and enforces the
//! same rules a production backend would:
//!
//! - profile upserts are validated (negative currency is rejected) and merged
//!   onto a monotonic floor, so a stale write can never lower a stat
//! - extended-state upserts never drop owned items
//! - run appends are deduplicated by `run_id`
//!
//! It backs the HTTP service and doubles as the store in engine tests. With
//! [`MemoryRemote::persistent`] the whole store is written atomically to a JSON
//! file after every change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::RemoteError;
use super::store::{RemoteStore, RemoteWrite};
use crate::persistence::{PersistError, read_json, write_json_atomic};
use crate::types::{AccountId, CompletedRun, EntityPayload, RemoteSnapshot};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoredAccount {
    records: RemoteSnapshot,
    runs: Vec<CompletedRun>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoreData {
    accounts: BTreeMap<String, StoredAccount>,
}

/// Reference remote store.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    data: Mutex<StoreData>,
    path: Option<PathBuf>,
}

impl MemoryRemote {
    /// Creates an empty, purely in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a store persisted at `path`, loading existing data if present.
    pub fn persistent(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref().to_path_buf();
        let data = read_json::<StoreData>(&path)?.unwrap_or_default();
        debug!(path = %path.display(), accounts = data.accounts.len(), "Opened remote store");
        Ok(MemoryRemote {
            data: Mutex::new(data),
            path: Some(path),
        })
    }

    fn lock(&self) -> MutexGuard<'_, StoreData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns every record held for `account`.
    pub fn snapshot(&self, account: &AccountId) -> RemoteSnapshot {
        self.lock()
            .accounts
            .get(account.as_str())
            .map(|a| a.records.clone())
            .unwrap_or_default()
    }

    /// Returns the run log for `account`, in append order.
    pub fn runs(&self, account: &AccountId) -> Vec<CompletedRun> {
        self.lock()
            .accounts
            .get(account.as_str())
            .map(|a| a.runs.clone())
            .unwrap_or_default()
    }

    /// Applies one write, enforcing the store's merge and validation rules.
    ///
    /// # Errors
    ///
    /// Returns a rejection for invalid records and a transient error if the
    /// store could not be persisted.
    pub fn apply(&self, account: &AccountId, write: &RemoteWrite) -> Result<(), RemoteError> {
        let mut data = self.lock();
        let key = account.as_str().to_string();
        let mut next = data.accounts.get(&key).cloned().unwrap_or_default();

        match write {
            RemoteWrite::Upsert { record } => match record {
                EntityPayload::Profile(profile) => {
                    profile
                        .validate()
                        .map_err(|e| RemoteError::rejected(e.to_string()))?;
                    let merged = match &next.records.profile {
                        Some(current) => profile.with_monotonic_floor(current),
                        None => profile.clone(),
                    };
                    next.records.profile = Some(merged);
                }
                EntityPayload::Settings(settings) => {
                    next.records.settings = Some(settings.clone());
                }
                EntityPayload::Extended(extended) => {
                    let merged = match &next.records.extended {
                        Some(current) => extended.with_ownership_floor(current),
                        None => extended.clone(),
                    };
                    next.records.extended = Some(merged);
                }
            },
            RemoteWrite::AppendRun { run } => {
                if next.runs.iter().any(|r| r.run_id == run.run_id) {
                    debug!(account = %account, run_id = %run.run_id, "Duplicate run append ignored");
                    return Ok(());
                }
                next.runs.push(run.clone());
            }
        }

        let previous = data.accounts.insert(key.clone(), next);
        if let Some(path) = &self.path
            && let Err(e) = write_json_atomic(path, &*data)
        {
            // Memory must keep matching the file.
            match previous {
                Some(previous) => data.accounts.insert(key, previous),
                None => data.accounts.remove(&key),
            };
            warn!(path = %path.display(), error = %e, "Failed to persist remote store");
            return Err(RemoteError::transient(format!("failed to persist store: {}", e)));
        }

        debug!(account = %account, op = %write, "Applied remote write");
        Ok(())
    }
}

impl RemoteStore for MemoryRemote {
    async fn fetch(&self, account: &AccountId) -> Result<RemoteSnapshot, RemoteError> {
        Ok(self.snapshot(account))
    }

    async fn write(&self, account: &AccountId, write: &RemoteWrite) -> Result<(), RemoteError> {
        self.apply(account, write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountProfile, ExtendedState, ItemId};

    fn account() -> AccountId {
        AccountId::parse("player-1").unwrap()
    }

    fn upsert(record: EntityPayload) -> RemoteWrite {
        RemoteWrite::Upsert { record }
    }

    #[test]
    fn unknown_account_has_empty_snapshot() {
        let remote = MemoryRemote::new();
        assert_eq!(remote.snapshot(&account()), RemoteSnapshot::default());
        assert!(remote.runs(&account()).is_empty());
    }

    #[test]
    fn profile_upsert_never_lowers_monotonic_stats() {
        let remote = MemoryRemote::new();
        let high = AccountProfile {
            currency: 500,
            experience: 900,
            best_score: 70,
            ..Default::default()
        };
        remote.apply(&account(), &upsert(EntityPayload::Profile(high))).unwrap();

        let stale = AccountProfile {
            currency: 100,
            experience: 10,
            best_score: 80,
            ..Default::default()
        };
        remote.apply(&account(), &upsert(EntityPayload::Profile(stale))).unwrap();

        let stored = remote.snapshot(&account()).profile.unwrap();
        assert_eq!(stored.currency, 100);
        assert_eq!(stored.experience, 900);
        assert_eq!(stored.best_score, 80);
    }

    #[test]
    fn negative_currency_is_rejected() {
        let remote = MemoryRemote::new();
        let bad = AccountProfile {
            currency: -1,
            ..Default::default()
        };
        let err = remote
            .apply(&account(), &upsert(EntityPayload::Profile(bad)))
            .unwrap_err();
        assert!(err.is_rejection());
        assert!(remote.snapshot(&account()).profile.is_none());
    }

    #[test]
    fn extended_upsert_keeps_owned_items() {
        let remote = MemoryRemote::new();
        let mut first = ExtendedState::default();
        first.grant([ItemId::from("hat")]);
        remote.apply(&account(), &upsert(EntityPayload::Extended(first))).unwrap();

        let mut second = ExtendedState::default();
        second.grant([ItemId::from("cape")]);
        remote.apply(&account(), &upsert(EntityPayload::Extended(second))).unwrap();

        let owned = remote.snapshot(&account()).extended.unwrap().owned_items;
        assert!(owned.contains(&ItemId::from("hat")));
        assert!(owned.contains(&ItemId::from("cape")));
    }

    #[test]
    fn run_appends_are_idempotent() {
        let remote = MemoryRemote::new();
        let run = CompletedRun::new(42, 60_000, 5, "asia");
        let write = RemoteWrite::AppendRun { run: run.clone() };

        remote.apply(&account(), &write).unwrap();
        remote.apply(&account(), &write).unwrap();

        assert_eq!(remote.runs(&account()), vec![run]);
    }

    #[test]
    fn persistent_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let remote = MemoryRemote::persistent(&path).unwrap();
            let profile = AccountProfile {
                currency: 77,
                ..Default::default()
            };
            remote.apply(&account(), &upsert(EntityPayload::Profile(profile))).unwrap();
        }

        let reopened = MemoryRemote::persistent(&path).unwrap();
        assert_eq!(reopened.snapshot(&account()).profile.unwrap().currency, 77);
    }

    #[test]
    fn failed_persist_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        std::fs::create_dir(&data_dir).unwrap();
        let remote = MemoryRemote::persistent(data_dir.join("store.json")).unwrap();

        // Replace the data directory with a file so the next write cannot land.
        std::fs::remove_dir(&data_dir).unwrap();
        std::fs::write(&data_dir, b"not a directory").unwrap();

        let profile = AccountProfile {
            currency: 12,
            ..Default::default()
        };
        let err = remote
            .apply(&account(), &upsert(EntityPayload::Profile(profile)))
            .unwrap_err();

        assert!(err.is_retriable());
        assert_eq!(remote.snapshot(&account()), RemoteSnapshot::default());
    }

    #[tokio::test]
    async fn store_trait_round_trips_records() {
        let remote = MemoryRemote::new();
        let profile = AccountProfile {
            currency: 3,
            ..Default::default()
        };
        remote
            .write(&account(), &upsert(EntityPayload::Profile(profile.clone())))
            .await
            .unwrap();

        let fetched = remote.fetch(&account()).await.unwrap();
        assert_eq!(fetched.profile, Some(profile));
    }
}
