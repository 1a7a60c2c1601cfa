//! Account profile: currency plus progression stats.
//!
//! Every field except `currency` is a monotonic record. Merges of two profiles
//! (crash recovery on the client, the floor enforced by the remote) take the
//! per-field maximum, so a stale write can never make progress go backwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric and ordinal account stats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    /// Consumable balance. The only field allowed to decrease.
    pub currency: i64,
    pub experience: u64,
    pub level: u32,
    pub games_played: u64,
    pub best_score: u64,
    pub best_time_ms: u64,
    /// Correct answers per category. Keys are never removed.
    #[serde(default)]
    pub correct_by_category: BTreeMap<String, u64>,
    pub best_streak: u32,
}

/// Validation failures the remote reports as rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileValidationError {
    #[error("currency cannot be negative (got {0})")]
    NegativeCurrency(i64),
}

impl AccountProfile {
    /// Returns `self` with every monotonic field raised to at least `floor`'s value.
    ///
    /// `currency` is taken from `self` unchanged.
    pub fn with_monotonic_floor(&self, floor: &AccountProfile) -> AccountProfile {
        let mut correct_by_category = floor.correct_by_category.clone();
        for (category, count) in &self.correct_by_category {
            let entry = correct_by_category.entry(category.clone()).or_insert(0);
            *entry = (*entry).max(*count);
        }

        AccountProfile {
            currency: self.currency,
            experience: self.experience.max(floor.experience),
            level: self.level.max(floor.level),
            games_played: self.games_played.max(floor.games_played),
            best_score: self.best_score.max(floor.best_score),
            best_time_ms: self.best_time_ms.max(floor.best_time_ms),
            correct_by_category,
            best_streak: self.best_streak.max(floor.best_streak),
        }
    }

    /// Returns true if no monotonic field of `self` is below the one in `other`.
    pub fn dominates(&self, other: &AccountProfile) -> bool {
        self.experience >= other.experience
            && self.level >= other.level
            && self.games_played >= other.games_played
            && self.best_score >= other.best_score
            && self.best_time_ms >= other.best_time_ms
            && self.best_streak >= other.best_streak
            && other
                .correct_by_category
                .iter()
                .all(|(k, v)| self.correct_by_category.get(k).is_some_and(|mine| mine >= v))
    }

    /// Folds a stat delta into the profile.
    pub fn apply_delta(&mut self, delta: &ProfileDelta) {
        self.currency = self.currency.saturating_add(delta.currency);
        self.experience = self.experience.saturating_add(delta.experience);
        self.games_played = self.games_played.saturating_add(delta.games_played);
        if let Some(level) = delta.level {
            self.level = self.level.max(level);
        }
        if let Some(score) = delta.score {
            self.best_score = self.best_score.max(score);
        }
        if let Some(time_ms) = delta.time_ms {
            self.best_time_ms = self.best_time_ms.max(time_ms);
        }
        if let Some(streak) = delta.streak {
            self.best_streak = self.best_streak.max(streak);
        }
        for (category, count) in &delta.correct_by_category {
            let entry = self.correct_by_category.entry(category.clone()).or_insert(0);
            *entry = entry.saturating_add(*count);
        }
    }

    /// Checks the invariants the remote enforces on every upsert.
    pub fn validate(&self) -> Result<(), ProfileValidationError> {
        if self.currency < 0 {
            return Err(ProfileValidationError::NegativeCurrency(self.currency));
        }
        Ok(())
    }
}

/// A change to profile stats produced by gameplay or the economy.
///
/// Counters are added; `Option` fields are candidate records and only raise
/// the stored best.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDelta {
    pub currency: i64,
    pub experience: u64,
    pub games_played: u64,
    pub level: Option<u32>,
    pub score: Option<u64>,
    pub time_ms: Option<u64>,
    pub streak: Option<u32>,
    #[serde(default)]
    pub correct_by_category: BTreeMap<String, u64>,
}

impl ProfileDelta {
    /// A pure currency change.
    pub fn currency(amount: i64) -> Self {
        ProfileDelta {
            currency: amount,
            ..Default::default()
        }
    }
}
