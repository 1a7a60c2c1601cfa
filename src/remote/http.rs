//! HTTP client for the account service.
//!
//! Talks to the routes served by [`crate::server`]:
//!
//! ```text
//! GET  {base}/api/v1/accounts/{account}            -> RemoteSnapshot
//! PUT  {base}/api/v1/accounts/{account}/profile    -> 204
//! PUT  {base}/api/v1/accounts/{account}/settings   -> 204
//! PUT  {base}/api/v1/accounts/{account}/extended   -> 204
//! POST {base}/api/v1/accounts/{account}/runs       -> 204
//! ```

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use tracing::trace;

use super::error::RemoteError;
use super::store::{RemoteStore, RemoteWrite};
use crate::types::{AccountId, EntityPayload, RemoteSnapshot};

/// [`RemoteStore`] backed by the account service's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

impl HttpRemote {
    /// Creates a client for the service at `base_url`.
    ///
    /// Every request is bounded by `request_timeout`; a timeout surfaces as a
    /// transient error.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(RemoteError::from_reqwest)?;
        Ok(HttpRemote {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn account_url(&self, account: &AccountId) -> String {
        format!("{}/api/v1/accounts/{}", self.base_url, account)
    }

    fn request_for(&self, account: &AccountId, write: &RemoteWrite) -> RequestBuilder {
        let base = self.account_url(account);
        match write {
            RemoteWrite::Upsert { record } => match record {
                EntityPayload::Profile(profile) => {
                    self.client.put(format!("{}/profile", base)).json(profile)
                }
                EntityPayload::Settings(settings) => {
                    self.client.put(format!("{}/settings", base)).json(settings)
                }
                EntityPayload::Extended(extended) => {
                    self.client.put(format!("{}/extended", base)).json(extended)
                }
            },
            RemoteWrite::AppendRun { run } => self.client.post(format!("{}/runs", base)).json(run),
        }
    }
}

/// Turns a non-success response into a categorized error carrying the body.
async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        status.to_string()
    } else {
        body
    };
    Err(RemoteError::from_status(status.as_u16(), message))
}

impl RemoteStore for HttpRemote {
    async fn fetch(&self, account: &AccountId) -> Result<RemoteSnapshot, RemoteError> {
        let response = self
            .client
            .get(self.account_url(account))
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;
        let response = check_status(response).await?;
        response
            .json::<RemoteSnapshot>()
            .await
            .map_err(RemoteError::from_reqwest)
    }

    async fn write(&self, account: &AccountId, write: &RemoteWrite) -> Result<(), RemoteError> {
        trace!(account = %account, op = %write, "Sending remote write");
        let response = self
            .request_for(account, write)
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;
        check_status(response).await?;
        Ok(())
    }
}
