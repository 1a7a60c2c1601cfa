//! Errors surfaced by the sync engine.

use thiserror::Error;

use super::report::Rejection;
use crate::persistence::PersistError;
use crate::remote::RemoteError;
use crate::types::AccountId;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no account is loaded")]
    NotLoaded,

    #[error("account {0} is already loaded; sign out first")]
    AlreadyLoaded(AccountId),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    /// The remote refused one or more writes as invalid.
    #[error("remote rejected {} write(s): {}", .0.len(), summarize(.0))]
    Rejected(Vec<Rejection>),
}

fn summarize(rejections: &[Rejection]) -> String {
    rejections
        .iter()
        .map(|r| format!("{}: {}", r.operation, r.message))
        .collect::<Vec<_>>()
        .join("; ")
}
