//! Core domain types for account synchronization.
//!
//! These types describe the account records the engine tracks, caches and
//! upserts, and encode the merge invariants (monotonic stats, append-only
//! ownership) next to the data they protect.

pub mod extended;
pub mod ids;
pub mod profile;
pub mod run;
pub mod settings;
pub mod snapshot;

// Re-export commonly used types at the module level
pub use extended::{
    AvatarConfig, ChallengeSnapshot, ExtendedState, ExtendedUpdate, RerollLicense, StreakRecord,
};
pub use ids::{AccountId, EntityKind, InvalidAccountId, ItemId};
pub use profile::{AccountProfile, ProfileDelta, ProfileValidationError};
pub use run::CompletedRun;
pub use settings::{AccountSettings, Difficulty};
pub use snapshot::{AccountSnapshot, EntityPayload, RemoteSnapshot};
