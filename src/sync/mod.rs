//! Write-through synchronization of account state.
//!
//! - [`engine`]: the [`SyncEngine`], sole writer to the remote
//! - [`debounce`]: the shared timer that coalesces bursts of mutations
//! - [`queue`]: the bounded, durable offline write queue
//! - [`lifecycle`]: forced flushes on background/terminate
//! - [`report`]: per-cycle flush outcome

pub mod debounce;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod queue;
pub mod report;


pub use debounce::DebounceScheduler;
pub use engine::SyncEngine;
pub use error::{Result, SyncError};
pub use lifecycle::LifecycleEvent;
pub use queue::{FailureOutcome, OfflineQueue, QueueEntry, QueueStats};
pub use report::{FlushReport, Rejection};
