//! The remote store: the source of truth the engine flushes to.
//!
//! - [`store`]: the [`RemoteStore`] trait and the [`RemoteWrite`] operations
//! - [`error`]: transient vs. rejected failure categorization
//! - [`memory`]: the in-process reference store
//! - [`http`]: the reqwest client for the account service

pub mod error;
pub mod http;
pub mod memory;
pub mod store;

pub use error::{RemoteError, RemoteErrorKind};
pub use http::HttpRemote;
pub use memory::MemoryRemote;
pub use store::{RemoteStore, RemoteWrite};
