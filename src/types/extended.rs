//! Extended account state: avatar, reroll license, cosmetics and streaks.
//!
//! `owned_items` is append-only: an item is never removed once granted, so
//! merges take the union. Everything else is freely reassignable.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ItemId;

/// Avatar appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarConfig {
    pub body: String,
    pub palette: String,
    #[serde(default)]
    pub features: BTreeMap<String, String>,
}

/// Reroll license data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerollLicense {
    pub tier: u32,
    pub rerolls_remaining: u32,
    pub renewed_at: Option<DateTime<Utc>>,
}

/// Daily play streak.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakRecord {
    pub current: u32,
    pub longest: u32,
    pub last_played_on: Option<NaiveDate>,
}

impl StreakRecord {
    /// Records play on `day`, extending or restarting the streak.
    ///
    /// Playing twice on the same day is a no-op.
    pub fn record_play(&mut self, day: NaiveDate) {
        match self.last_played_on {
            Some(last) if last == day => return,
            Some(last) if last.succ_opt() == Some(day) => self.current += 1,
            _ => self.current = 1,
        }
        self.last_played_on = Some(day);
        self.longest = self.longest.max(self.current);
    }
}

/// The most recently completed challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeSnapshot {
    pub challenge_id: String,
    pub score: u64,
    pub completed_at: DateTime<Utc>,
}

/// Structured extended account state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtendedState {
    pub avatar: AvatarConfig,
    pub reroll_license: RerollLicense,
    pub owned_items: BTreeSet<ItemId>,
    /// Slot name to equipped item.
    pub equipped: BTreeMap<String, ItemId>,
    pub streak: StreakRecord,
    pub last_challenge: Option<ChallengeSnapshot>,
}

impl ExtendedState {
    /// Returns `self` with `owned_items` extended by everything `floor` owns and
    /// `streak.longest` raised to `floor`'s.
    pub fn with_ownership_floor(&self, floor: &ExtendedState) -> ExtendedState {
        let mut merged = self.clone();
        merged
            .owned_items
            .extend(floor.owned_items.iter().cloned());
        merged.streak.longest = merged.streak.longest.max(floor.streak.longest);
        merged
    }

    /// Adds newly granted items. Returns true if anything was new.
    pub fn grant<I>(&mut self, items: I) -> bool
    where
        I: IntoIterator<Item = ItemId>,
    {
        let before = self.owned_items.len();
        self.owned_items.extend(items);
        self.owned_items.len() != before
    }
}

/// A replacement of one extended-state sub-document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "part", content = "value", rename_all = "snake_case")]
pub enum ExtendedUpdate {
    Avatar(AvatarConfig),
    RerollLicense(RerollLicense),
    Equipped(BTreeMap<String, ItemId>),
    Streak(StreakRecord),
    LastChallenge(Option<ChallengeSnapshot>),
}

impl ExtendedUpdate {
    /// Applies the replacement to `state`.
    pub fn apply(self, state: &mut ExtendedState) {
        match self {
            ExtendedUpdate::Avatar(avatar) => state.avatar = avatar,
            ExtendedUpdate::RerollLicense(license) => state.reroll_license = license,
            ExtendedUpdate::Equipped(equipped) => state.equipped = equipped,
            ExtendedUpdate::Streak(streak) => state.streak = streak,
            ExtendedUpdate::LastChallenge(challenge) => state.last_challenge = challenge,
        }
    }
}
