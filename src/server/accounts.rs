//! Account record endpoints.
//!
//! Every write goes through [`MemoryRemote::apply`](crate::remote::MemoryRemote::apply),
//! so the service enforces the same merge rules the client relies on:
//! monotonic stats never decrease, owned items are never removed, and run
//! appends are idempotent by run id.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, warn};

use super::AppState;
use crate::remote::{RemoteError, RemoteErrorKind, RemoteWrite};
use crate::types::{
    AccountId, AccountProfile, AccountSettings, CompletedRun, EntityPayload, ExtendedState,
    InvalidAccountId, RemoteSnapshot,
};

/// Errors returned by the account endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The account path segment is not a valid identifier.
    #[error("{0}")]
    InvalidAccount(#[from] InvalidAccountId),

    /// The store refused or failed to apply the write.
    #[error("{}", store_message(.0))]
    Store(#[from] RemoteError),
}

/// The store's own message, without the client-side category label.
fn store_message(err: &RemoteError) -> &str {
    &err.message
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidAccount(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(e) => match e.kind {
                RemoteErrorKind::Rejected => StatusCode::UNPROCESSABLE_ENTITY,
                RemoteErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
            },
        };

        (status, self.to_string()).into_response()
    }
}

/// Returns every record stored for the account.
///
/// Accounts that were never written return an empty snapshot rather than 404:
/// a first login is not an error.
pub async fn get_account(
    State(app_state): State<AppState>,
    Path(account): Path<String>,
) -> Result<Json<RemoteSnapshot>, ApiError> {
    let account = AccountId::parse(account)?;
    Ok(Json(app_state.store().snapshot(&account)))
}

pub async fn put_profile(
    State(app_state): State<AppState>,
    Path(account): Path<String>,
    Json(profile): Json<AccountProfile>,
) -> Result<StatusCode, ApiError> {
    upsert(&app_state, account, EntityPayload::Profile(profile))
}

pub async fn put_settings(
    State(app_state): State<AppState>,
    Path(account): Path<String>,
    Json(settings): Json<AccountSettings>,
) -> Result<StatusCode, ApiError> {
    upsert(&app_state, account, EntityPayload::Settings(settings))
}

pub async fn put_extended(
    State(app_state): State<AppState>,
    Path(account): Path<String>,
    Json(extended): Json<ExtendedState>,
) -> Result<StatusCode, ApiError> {
    upsert(&app_state, account, EntityPayload::Extended(extended))
}

/// Appends a completed run. Re-sending a run id already stored is a no-op.
pub async fn append_run(
    State(app_state): State<AppState>,
    Path(account): Path<String>,
    Json(run): Json<CompletedRun>,
) -> Result<StatusCode, ApiError> {
    apply(&app_state, account, RemoteWrite::AppendRun { run })
}

fn upsert(
    app_state: &AppState,
    account: String,
    record: EntityPayload,
) -> Result<StatusCode, ApiError> {
    apply(app_state, account, RemoteWrite::Upsert { record })
}

fn apply(
    app_state: &AppState,
    account: String,
    write: RemoteWrite,
) -> Result<StatusCode, ApiError> {
    let account = AccountId::parse(account)?;
    match app_state.store().apply(&account, &write) {
        Ok(()) => {
            debug!(account = %account, op = %write, "Applied write");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            warn!(account = %account, op = %write, error = %e, "Write refused");
            Err(e.into())
        }
    }
}
