//! Local durability for unflushed account state.
//!
//! This module provides the crash-safe cache that backs every mutation, the
//! atomic JSON document primitives it is built on, and the merge rules used
//! to fold cached state into a freshly fetched remote snapshot at login.
//!
//! # Crash Safety
//!
//! - Cache entries and the offline queue are written atomically
//!   (temp file, fsync, rename, fsync of the directory)
//! - A mutation's cache write completes before the mutation entry point returns
//! - An entry is removed only by a flush that was acknowledged for exactly the
//!   write-version the entry holds

pub mod atomic;
pub mod cache;
pub mod fsync;
pub mod merge;

pub use atomic::{PersistError, read_json, write_json_atomic};
pub use cache::{CACHE_SCHEMA_VERSION, CacheEntry, CachedEntries, CrashSafeCache};
pub use fsync::{fsync_dir, fsync_file, remove_file_durable};
pub use merge::{Reconciled, flushed_baseline, reconcile, recover_currency, recover_profile};
