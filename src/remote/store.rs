//! The remote store seam.
//!
//! The flush engine is the only caller of [`RemoteStore::write`]. Keeping the
//! store behind a trait lets the engine run against the in-process
//! [`MemoryRemote`](super::MemoryRemote), the HTTP client, or scripted stores
//! in tests.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::RemoteError;
use crate::types::{AccountId, CompletedRun, EntityKind, EntityPayload, RemoteSnapshot};

/// One write operation against the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RemoteWrite {
    /// Full-document upsert of one entity.
    Upsert { record: EntityPayload },

    /// Append of a completed run to the run log. Idempotent by `run_id`.
    AppendRun { run: CompletedRun },
}

impl RemoteWrite {
    /// Returns the entity an upsert targets. Run appends target none.
    pub fn entity(&self) -> Option<EntityKind> {
        match self {
            RemoteWrite::Upsert { record } => Some(record.kind()),
            RemoteWrite::AppendRun { .. } => None,
        }
    }
}

impl fmt::Display for RemoteWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteWrite::Upsert { record } => write!(f, "upsert {}", record.kind()),
            RemoteWrite::AppendRun { run } => write!(f, "append run {}", run.run_id),
        }
    }
}

/// Reads and writes per-account records on the remote.
///
/// # Example (scripted store for testing)
///
/// ```ignore
/// struct AlwaysOffline;
///
/// impl RemoteStore for AlwaysOffline {
///     async fn fetch(&self, _: &AccountId) -> Result<RemoteSnapshot, RemoteError> {
///         Err(RemoteError::transient("offline"))
///     }
///
///     async fn write(&self, _: &AccountId, _: &RemoteWrite) -> Result<(), RemoteError> {
///         Err(RemoteError::transient("offline"))
///     }
/// }
/// ```
pub trait RemoteStore: Send + Sync + 'static {
    /// Fetches every record the remote holds for `account`.
    fn fetch(
        &self,
        account: &AccountId,
    ) -> impl Future<Output = Result<RemoteSnapshot, RemoteError>> + Send;

    /// Applies one write for `account`.
    fn write(
        &self,
        account: &AccountId,
        write: &RemoteWrite,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}

impl<R: RemoteStore> RemoteStore for Arc<R> {
    fn fetch(
        &self,
        account: &AccountId,
    ) -> impl Future<Output = Result<RemoteSnapshot, RemoteError>> + Send {
        (**self).fetch(account)
    }

    fn write(
        &self,
        account: &AccountId,
        write: &RemoteWrite,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send {
        (**self).write(account, write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountSettings;

    #[test]
    fn upsert_targets_its_entity() {
        let write = RemoteWrite::Upsert {
            record: EntityPayload::Settings(AccountSettings::default()),
        };
        assert_eq!(write.entity(), Some(EntityKind::Settings));
        assert_eq!(write.to_string(), "upsert settings");

        let run = CompletedRun::new(10, 1_000, 3, "europe");
        let append = RemoteWrite::AppendRun { run: run.clone() };
        assert_eq!(append.entity(), None);
        assert_eq!(append.to_string(), format!("append run {}", run.run_id));
    }

    #[test]
    fn write_json_is_tagged_by_op() {
        let write = RemoteWrite::Upsert {
            record: EntityPayload::Settings(AccountSettings::default()),
        };
        let json = serde_json::to_value(&write).unwrap();
        assert_eq!(json["op"], "upsert");
        assert_eq!(json["record"]["entity"], "settings");

        let back: RemoteWrite = serde_json::from_value(json).unwrap();
        assert_eq!(back, write);
    }
}
