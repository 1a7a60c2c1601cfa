//! HTTP server for the account service.
//!
//! This module serves the remote side of account synchronization: per-account
//! records that clients read on login and upsert when they flush.
//!
//! # Endpoints
//!
//! - `GET /api/v1/accounts/{account}` - Returns every stored record as JSON
//! - `PUT /api/v1/accounts/{account}/profile` - Upserts the profile (204)
//! - `PUT /api/v1/accounts/{account}/settings` - Upserts the settings (204)
//! - `PUT /api/v1/accounts/{account}/extended` - Upserts the extended state (204)
//! - `POST /api/v1/accounts/{account}/runs` - Appends a completed run (204)
//! - `GET /health` - Returns 200 if server is running

use std::sync::Arc;

pub mod accounts;
pub mod health;

pub use accounts::{
    ApiError, append_run, get_account, put_extended, put_profile, put_settings,
};
pub use health::health_handler;

use crate::remote::MemoryRemote;

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// The record store every handler reads and writes.
    store: Arc<MemoryRemote>,
}

impl AppState {
    pub fn new(store: Arc<MemoryRemote>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner { store }),
        }
    }

    /// Returns the record store.
    pub fn store(&self) -> &MemoryRemote {
        &self.inner.store
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post, put};

    axum::Router::new()
        .route("/api/v1/accounts/{account}", get(get_account))
        .route("/api/v1/accounts/{account}/profile", put(put_profile))
        .route("/api/v1/accounts/{account}/settings", put(put_settings))
        .route("/api/v1/accounts/{account}/extended", put(put_extended))
        .route("/api/v1/accounts/{account}/runs", post(append_run))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
