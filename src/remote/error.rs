//! Remote store error types.
//!
//! Every failed remote call is categorized for the flush engine:
//!
//! - **Transient** errors are retried later through the offline queue (5xx,
//!   429, connection failures, timeouts)
//! - **Rejected** errors mean the remote refused the record as invalid (400,
//!   422). Resending the same payload would fail again, so it is held back
//!   until a newer mutation replaces it.

use std::fmt;
use thiserror::Error;

/// The kind of remote error, categorized for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Connectivity or server-side failure. Safe to retry.
    Transient,

    /// Validation failure. The payload itself is bad.
    Rejected,
}

impl RemoteErrorKind {
    /// Returns true if this error is retriable.
    pub fn is_retriable(&self) -> bool {
        matches!(self, RemoteErrorKind::Transient)
    }
}

/// A remote store error with categorization for retry decisions.
#[derive(Debug, Error)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,

    /// The HTTP status code, if the failure came from an HTTP response.
    pub status_code: Option<u16>,

    pub message: String,

    /// The underlying HTTP client error, if available.
    #[source]
    pub source: Option<reqwest::Error>,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            RemoteErrorKind::Transient => "remote unavailable",
            RemoteErrorKind::Rejected => "remote rejected write",
        };
        match self.status_code {
            Some(code) => write!(f, "{} (HTTP {}): {}", label, code, self.message),
            None => write!(f, "{}: {}", label, self.message),
        }
    }
}

impl RemoteError {
    /// Creates a transient error without an HTTP source.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Transient,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a rejection without an HTTP source.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Rejected,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Categorizes a non-success HTTP status.
    ///
    /// 400 and 422 are validation failures. Everything else (5xx, 429, and
    /// unexpected 4xx such as auth failures) is treated as transient so the
    /// write is kept and retried rather than silently abandoned.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            400 | 422 => RemoteErrorKind::Rejected,
            _ => RemoteErrorKind::Transient,
        };
        Self {
            kind,
            status_code: Some(status),
            message: message.into(),
            source: None,
        }
    }

    /// Categorizes an HTTP client error.
    ///
    /// Connection failures, timeouts and body decoding failures are transient.
    /// A status error is categorized by its status code.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let status_code = err.status().map(|s| s.as_u16());
        let kind = match status_code {
            Some(400) | Some(422) => RemoteErrorKind::Rejected,
            _ => RemoteErrorKind::Transient,
        };
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            err.to_string()
        };
        Self {
            kind,
            status_code,
            message,
            source: Some(err),
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }

    pub fn is_rejection(&self) -> bool {
        self.kind == RemoteErrorKind::Rejected
    }
}
