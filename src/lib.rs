//! Account Sync - crash-safe, debounced synchronization of player account state.
//!
//! Clients mutate account state locally through a [`sync::SyncEngine`]. Every
//! mutation is cached durably before it returns, coalesced behind a debounce
//! window, and upserted to a [`remote::RemoteStore`] by a single writer that
//! never loses a mutation made while a flush is in flight. Writes that fail
//! for connectivity reasons wait in a bounded offline queue.
//!
//! The crate also ships the account service itself ([`server`]), which
//! enforces the merge rules the client depends on.

pub mod config;
pub mod persistence;
pub mod remote;
pub mod server;
pub mod state;
pub mod sync;
pub mod types;

#[cfg(test)]
mod test_utils;
