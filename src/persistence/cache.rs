//! Crash-safe local cache of unflushed entity payloads.
//!
//! Every mutation writes the entity's full payload here, synchronously, before
//! the mutation entry point returns. An entry is removed only when a flush of
//! exactly that write-version has been acknowledged by the remote, so whatever
//! is on disk after an abrupt termination is the newest unconfirmed state.
//!
//! # File Layout
//!
//! ```text
//! <cache_dir>/<account>/
//!   profile.json         # CacheEntry for the profile
//!   settings.json        # CacheEntry for the settings
//!   extended.json        # CacheEntry for the extended state
//!   offline_queue.json   # persisted offline write queue
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::atomic::{PersistError, Result, read_json, write_json_atomic};
use super::fsync::{fsync_dir, remove_file_durable};
use crate::types::{AccountId, EntityKind, EntityPayload};

/// Current cache schema version. Increment when making breaking changes.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

const QUEUE_FILE: &str = "offline_queue.json";

/// One cached, unflushed entity payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub schema_version: u32,

    /// Write-version of the mutation that produced `payload`.
    pub version: u64,

    pub payload: EntityPayload,

    /// Profile only: the currency value the remote last acknowledged.
    ///
    /// Recovery applies `local - last_flushed_currency` on top of the fetched
    /// remote value instead of overwriting it.
    #[serde(default)]
    pub last_flushed_currency: Option<i64>,

    /// Profile only: currency values sent since the last acknowledgement.
    ///
    /// A send whose acknowledgement was lost may still have landed. If the
    /// remote holds one of these values at recovery, that value is the real
    /// baseline.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unacked_currencies: Vec<i64>,

    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(payload: EntityPayload, version: u64, last_flushed_currency: Option<i64>) -> Self {
        CacheEntry {
            schema_version: CACHE_SCHEMA_VERSION,
            version,
            payload,
            last_flushed_currency,
            unacked_currencies: Vec::new(),
            cached_at: Utc::now(),
        }
    }

    /// Records the currency values sent but not yet acknowledged.
    pub fn with_unacked_currencies(mut self, sent: Vec<i64>) -> Self {
        self.unacked_currencies = sent;
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.payload.kind()
    }
}

/// The cache entries found for an account at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedEntries {
    pub profile: Option<CacheEntry>,
    pub settings: Option<CacheEntry>,
    pub extended: Option<CacheEntry>,
}

impl CachedEntries {
    pub fn get(&self, kind: EntityKind) -> Option<&CacheEntry> {
        match kind {
            EntityKind::Profile => self.profile.as_ref(),
            EntityKind::Settings => self.settings.as_ref(),
            EntityKind::Extended => self.extended.as_ref(),
        }
    }

    fn slot(&mut self, kind: EntityKind) -> &mut Option<CacheEntry> {
        match kind {
            EntityKind::Profile => &mut self.profile,
            EntityKind::Settings => &mut self.settings,
            EntityKind::Extended => &mut self.extended,
        }
    }

    pub fn is_empty(&self) -> bool {
        EntityKind::ALL.iter().all(|k| self.get(*k).is_none())
    }
}

/// Per-account directory of cache entries.
#[derive(Debug, Clone)]
pub struct CrashSafeCache {
    dir: PathBuf,
}

impl CrashSafeCache {
    /// Opens (creating if needed) the cache directory for `account` under `root`.
    pub fn open(root: &Path, account: &AccountId) -> Result<Self> {
        let dir = root.join(account.as_str());
        fs::create_dir_all(&dir)?;
        Ok(CrashSafeCache { dir })
    }

    /// Returns the account's cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the cache entry for `kind`.
    pub fn entry_path(&self, kind: EntityKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.as_str()))
    }

    /// Path of the persisted offline queue.
    pub fn queue_path(&self) -> PathBuf {
        self.dir.join(QUEUE_FILE)
    }

    /// Durably writes an entry, replacing any previous entry for the same entity.
    pub fn write(&self, entry: &CacheEntry) -> Result<()> {
        write_json_atomic(&self.entry_path(entry.kind()), entry)
    }

    /// Loads the entry for `kind`, if present.
    ///
    /// # Errors
    ///
    /// Fails on IO errors, malformed JSON, a schema mismatch, or an entry whose
    /// payload belongs to a different entity than its file name says.
    pub fn load(&self, kind: EntityKind) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(kind);
        let Some(entry) = read_json::<CacheEntry>(&path)? else {
            return Ok(None);
        };

        if entry.schema_version != CACHE_SCHEMA_VERSION {
            return Err(PersistError::SchemaMismatch {
                path,
                expected: CACHE_SCHEMA_VERSION,
                got: entry.schema_version,
            });
        }
        if entry.kind() != kind {
            return Err(PersistError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} holds a {} payload", path.display(), entry.kind()),
            )));
        }

        Ok(Some(entry))
    }

    /// Loads every entry, discarding (and deleting) any that cannot be read.
    ///
    /// A corrupt entry must never block login, so failures are logged rather
    /// than returned.
    pub fn load_all(&self) -> CachedEntries {
        let mut entries = CachedEntries::default();
        for kind in EntityKind::ALL {
            match self.load(kind) {
                Ok(entry) => *entries.slot(kind) = entry,
                Err(e) => {
                    warn!(entity = %kind, error = %e, "Discarding unreadable cache entry");
                    if let Err(e) = remove_file_durable(&self.entry_path(kind)) {
                        warn!(entity = %kind, error = %e, "Failed to delete unreadable cache entry");
                    }
                }
            }
        }
        entries
    }

    /// Removes the entry for `kind`.
    pub fn remove(&self, kind: EntityKind) -> Result<()> {
        remove_file_durable(&self.entry_path(kind))?;
        debug!(entity = %kind, "Cleared cache entry");
        Ok(())
    }

    /// Deletes the whole account directory, including the offline queue.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        if let Some(parent) = self.dir.parent() {
            fsync_dir(parent)?;
        }
        Ok(())
    }
}
