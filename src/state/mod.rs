//! In-memory account state and the bookkeeping around it.
//!
//! - [`container`]: the reactive holder of the canonical snapshot
//! - [`dirty`]: per-entity dirty flags and write-versions
//! - [`hydration`]: the records known to be on the remote, for echo suppression

pub mod container;
pub mod dirty;
pub mod hydration;

pub use container::{StateContainer, StateView};
pub use dirty::{DirtyTracker, PendingWrite};
pub use hydration::SyncedRecords;
