//! Completed gameplay runs, appended to the remote run log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable record of a finished run.
///
/// `run_id` is generated on the client and used by the remote to make appends
/// idempotent: a retry after an ambiguous timeout never produces a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedRun {
    pub run_id: Uuid,
    pub score: u64,
    pub elapsed_ms: u64,
    pub rounds: u32,
    pub region: String,
    pub completed_at: DateTime<Utc>,
}

impl CompletedRun {
    /// Creates a run record with a fresh id, completed now.
    pub fn new(score: u64, elapsed_ms: u64, rounds: u32, region: impl Into<String>) -> Self {
        CompletedRun {
            run_id: Uuid::new_v4(),
            score,
            elapsed_ms,
            rounds,
            region: region.into(),
            completed_at: Utc::now(),
        }
    }
}
