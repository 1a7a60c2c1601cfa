//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., passing an
//! item identifier where an account identifier is expected) and make the code
//! more self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error returned when parsing an invalid account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid account id {value:?}: {reason}")]
pub struct InvalidAccountId {
    pub value: String,
    pub reason: &'static str,
}

/// Maximum accepted length of an account identifier.
const MAX_ACCOUNT_ID_LEN: usize = 128;

/// An account identifier.
///
/// Account identifiers double as directory names in the crash-safe cache and as
/// path segments in the remote API, so [`AccountId::parse`] rejects anything
/// that could escape a directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Parses and validates an account identifier.
    ///
    /// Accepted characters are ASCII alphanumerics, `-`, `_` and `.`; the
    /// identifier may not start with `.` and may not be empty.
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidAccountId> {
        let value = s.into();
        let reason = if value.is_empty() {
            Some("must not be empty")
        } else if value.len() > MAX_ACCOUNT_ID_LEN {
            Some("too long")
        } else if value.starts_with('.') {
            Some("must not start with '.'")
        } else if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            Some("contains characters outside [A-Za-z0-9._-]")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(InvalidAccountId { value, reason }),
            None => Ok(AccountId(value)),
        }
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A cosmetic item identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(s: impl Into<String>) -> Self {
        ItemId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId(s.to_string())
    }
}

/// The logical entities the engine tracks and upserts independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Numeric and ordinal stats, including the currency balance.
    Profile,
    /// Preference record.
    Settings,
    /// Avatar, licenses, owned and equipped items, streaks.
    Extended,
}

impl EntityKind {
    /// All entity kinds, in flush order.
    pub const ALL: [EntityKind; 3] = [EntityKind::Profile, EntityKind::Settings, EntityKind::Extended];

    /// Returns the stable lowercase name used in file names and URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Profile => "profile",
            EntityKind::Settings => "settings",
            EntityKind::Extended => "extended",
        }
    }

    /// Dense index for per-entity arrays.
    pub(crate) fn index(&self) -> usize {
        match self {
            EntityKind::Profile => 0,
            EntityKind::Settings => 1,
            EntityKind::Extended => 2,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
