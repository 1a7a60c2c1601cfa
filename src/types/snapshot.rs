//! Whole-account views and the per-entity payload envelope.

use serde::{Deserialize, Serialize};

use super::extended::ExtendedState;
use super::ids::EntityKind;
use super::profile::AccountProfile;
use super::settings::AccountSettings;

/// The full record of one entity, as tracked, cached and upserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "record", rename_all = "snake_case")]
pub enum EntityPayload {
    Profile(AccountProfile),
    Settings(AccountSettings),
    Extended(ExtendedState),
}

impl EntityPayload {
    /// Returns which entity this payload belongs to.
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityPayload::Profile(_) => EntityKind::Profile,
            EntityPayload::Settings(_) => EntityKind::Settings,
            EntityPayload::Extended(_) => EntityKind::Extended,
        }
    }

    /// Returns the currency carried by a profile payload.
    pub fn currency(&self) -> Option<i64> {
        match self {
            EntityPayload::Profile(profile) => Some(profile.currency),
            _ => None,
        }
    }
}

/// Canonical in-memory account state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub profile: AccountProfile,
    pub settings: AccountSettings,
    pub extended: ExtendedState,
}

impl AccountSnapshot {
    /// Extracts the payload for one entity.
    pub fn payload(&self, kind: EntityKind) -> EntityPayload {
        match kind {
            EntityKind::Profile => EntityPayload::Profile(self.profile.clone()),
            EntityKind::Settings => EntityPayload::Settings(self.settings.clone()),
            EntityKind::Extended => EntityPayload::Extended(self.extended.clone()),
        }
    }

    /// Replaces one entity with the given payload.
    pub fn set(&mut self, payload: EntityPayload) {
        match payload {
            EntityPayload::Profile(profile) => self.profile = profile,
            EntityPayload::Settings(settings) => self.settings = settings,
            EntityPayload::Extended(extended) => self.extended = extended,
        }
    }
}

/// What the remote holds for an account. Absent records were never written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSnapshot {
    pub profile: Option<AccountProfile>,
    pub settings: Option<AccountSettings>,
    pub extended: Option<ExtendedState>,
}

impl RemoteSnapshot {
    /// Fills absent records with defaults.
    pub fn into_account(self) -> AccountSnapshot {
        AccountSnapshot {
            profile: self.profile.unwrap_or_default(),
            settings: self.settings.unwrap_or_default(),
            extended: self.extended.unwrap_or_default(),
        }
    }
}
