//! Merge rules applied when recovering cached state against a fresh remote snapshot.
//!
//! | Field kind                  | Rule                                   |
//! |-----------------------------|----------------------------------------|
//! | Monotonic stats             | `max(remote, local)`                   |
//! | Currency                    | `remote + (local - last_flushed)`      |
//! | Owned items                 | `remote ∪ local`                       |
//! | Preferences / reassignables | local wins                             |
//!
//! The currency rule applies only the delta that was never acknowledged, so
//! earnings already confirmed by a previous flush are not counted twice.

use crate::types::{
    AccountProfile, AccountSettings, AccountSnapshot, EntityKind, EntityPayload, ExtendedState,
    RemoteSnapshot,
};

use super::cache::{CacheEntry, CachedEntries};

/// Result of folding cached entries into a remote snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// The merged account state to hydrate.
    pub snapshot: AccountSnapshot,

    /// Entities whose merged value differs from the remote; they must be flushed.
    pub recovered: Vec<EntityKind>,

    /// Entities that had a cache entry already reflected by the remote.
    pub superseded: Vec<EntityKind>,

    /// The currency the remote currently holds (the new flush baseline).
    pub remote_currency: i64,
}

/// `remote + (local - last_flushed)`, saturating.
pub fn recover_currency(remote: i64, local: i64, last_flushed: i64) -> i64 {
    remote.saturating_add(local.saturating_sub(last_flushed))
}

/// Recovers a cached profile against the remote one.
///
/// Without a recorded baseline the unflushed currency delta is unknown, and the
/// remote balance is kept.
pub fn recover_profile(
    remote: &AccountProfile,
    local: &AccountProfile,
    last_flushed: Option<i64>,
) -> AccountProfile {
    let mut merged = local.with_monotonic_floor(remote);
    merged.currency = match last_flushed {
        Some(baseline) => recover_currency(remote.currency, local.currency, baseline),
        None => remote.currency,
    };
    merged
}

/// The currency the remote had acknowledged when `entry` was cached.
///
/// If the remote now holds a value that was sent without an acknowledgement,
/// that send landed and its value is the baseline. Otherwise the last
/// acknowledged value is.
pub fn flushed_baseline(entry: &CacheEntry, remote_currency: i64) -> Option<i64> {
    if entry.unacked_currencies.contains(&remote_currency) {
        return Some(remote_currency);
    }
    entry.last_flushed_currency
}

/// Cached preferences reflect the latest user intent.
pub fn recover_settings(local: &AccountSettings) -> AccountSettings {
    local.clone()
}

/// Union of ownership; everything else from the cache.
pub fn recover_extended(remote: &ExtendedState, local: &ExtendedState) -> ExtendedState {
    local.with_ownership_floor(remote)
}

/// Folds every cached entry into the remote snapshot.
pub fn reconcile(remote: RemoteSnapshot, cached: &CachedEntries) -> Reconciled {
    let remote = remote.into_account();
    let mut merged = remote.clone();
    let mut recovered = Vec::new();
    let mut superseded = Vec::new();

    for kind in EntityKind::ALL {
        let Some(entry) = cached.get(kind) else {
            continue;
        };

        match &entry.payload {
            EntityPayload::Profile(local) => {
                let baseline = flushed_baseline(entry, remote.profile.currency);
                merged.profile = recover_profile(&remote.profile, local, baseline);
            }
            EntityPayload::Settings(local) => {
                merged.settings = recover_settings(local);
            }
            EntityPayload::Extended(local) => {
                merged.extended = recover_extended(&remote.extended, local);
            }
        }

        if merged.payload(kind) == remote.payload(kind) {
            superseded.push(kind);
        } else {
            recovered.push(kind);
        }
    }

    Reconciled {
        remote_currency: remote.profile.currency,
        snapshot: merged,
        recovered,
        superseded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::arb_profile;
    use crate::types::ItemId;
    use proptest::prelude::*;

    fn profile(currency: i64, experience: u64) -> AccountProfile {
        AccountProfile {
            currency,
            experience,
            ..Default::default()
        }
    }

    proptest! {
        #[test]
        fn monotonic_recovery_never_goes_below_remote(remote in arb_profile(), local in arb_profile()) {
            let merged = recover_profile(&remote, &local, Some(local.currency));
            prop_assert!(merged.dominates(&remote));
            prop_assert!(merged.dominates(&local));
            prop_assert_eq!(merged.experience, remote.experience.max(local.experience));
        }

        #[test]
        fn currency_recovery_applies_only_unflushed_delta(
            remote in -1_000_000i64..1_000_000,
            local in -1_000_000i64..1_000_000,
            flushed in -1_000_000i64..1_000_000,
        ) {
            prop_assert_eq!(recover_currency(remote, local, flushed), remote + (local - flushed));
        }

        #[test]
        fn repeated_recovery_is_idempotent(
            remote in 0i64..1_000_000,
            local in 0i64..1_000_000,
            flushed in 0i64..1_000_000,
        ) {
            // After the first recovery the cache holds the recovered value with
            // the remote value as its new baseline.
            let first = recover_currency(remote, local, flushed);
            let second = recover_currency(remote, first, remote);
            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn currency_without_baseline_keeps_remote() {
        let merged = recover_profile(&profile(300, 0), &profile(900, 0), None);
        assert_eq!(merged.currency, 300);
    }

    #[test]
    fn reconcile_marks_changed_entities_recovered() {
        let remote = RemoteSnapshot {
            profile: Some(profile(500, 100)),
            ..Default::default()
        };
        let cached = CachedEntries {
            profile: Some(CacheEntry::new(
                EntityPayload::Profile(profile(450, 120)),
                3,
                Some(500),
            )),
            ..Default::default()
        };

        let result = reconcile(remote, &cached);
        assert_eq!(result.snapshot.profile.currency, 450);
        assert_eq!(result.snapshot.profile.experience, 120);
        assert_eq!(result.recovered, vec![EntityKind::Profile]);
        assert!(result.superseded.is_empty());
        assert_eq!(result.remote_currency, 500);
    }

    #[test]
    fn reconcile_detects_entries_already_on_remote() {
        let remote = RemoteSnapshot {
            profile: Some(profile(450, 120)),
            ..Default::default()
        };
        // The upsert of 450 landed but its acknowledgement never arrived, so
        // the entry still carries the previous baseline of 500.
        let cached = CachedEntries {
            profile: Some(
                CacheEntry::new(EntityPayload::Profile(profile(450, 120)), 3, Some(500))
                    .with_unacked_currencies(vec![450]),
            ),
            ..Default::default()
        };

        let result = reconcile(remote, &cached);
        assert!(result.recovered.is_empty());
        assert_eq!(result.superseded, vec![EntityKind::Profile]);
    }

    #[test]
    fn landed_send_becomes_baseline_for_later_mutations() {
        // 450 landed unacknowledged, then a further -20 was made locally.
        let remote = RemoteSnapshot {
            profile: Some(profile(450, 0)),
            ..Default::default()
        };
        let cached = CachedEntries {
            profile: Some(
                CacheEntry::new(EntityPayload::Profile(profile(430, 0)), 4, Some(500))
                    .with_unacked_currencies(vec![450, 430]),
            ),
            ..Default::default()
        };

        let result = reconcile(remote, &cached);
        assert_eq!(result.snapshot.profile.currency, 430);
        assert_eq!(result.recovered, vec![EntityKind::Profile]);
    }

    #[test]
    fn unacked_values_not_on_remote_keep_acknowledged_baseline() {
        // Another device moved the remote to 600; the 450 send never landed.
        let entry = CacheEntry::new(EntityPayload::Profile(profile(450, 0)), 2, Some(500))
            .with_unacked_currencies(vec![450]);
        assert_eq!(flushed_baseline(&entry, 600), Some(500));
        assert_eq!(flushed_baseline(&entry, 450), Some(450));
    }

    #[test]
    fn reconcile_unions_owned_items_and_prefers_local_settings() {
        let mut remote_ext = ExtendedState::default();
        remote_ext.grant([ItemId::from("boots")]);
        let remote = RemoteSnapshot {
            extended: Some(remote_ext),
            settings: Some(AccountSettings::default()),
            ..Default::default()
        };

        let mut local_ext = ExtendedState::default();
        local_ext.grant([ItemId::from("hat")]);
        let local_settings = AccountSettings {
            music_volume: 5,
            ..Default::default()
        };
        let cached = CachedEntries {
            settings: Some(CacheEntry::new(
                EntityPayload::Settings(local_settings.clone()),
                1,
                None,
            )),
            extended: Some(CacheEntry::new(EntityPayload::Extended(local_ext), 1, None)),
            ..Default::default()
        };

        let result = reconcile(remote, &cached);
        assert_eq!(result.snapshot.settings, local_settings);
        assert!(result.snapshot.extended.owned_items.contains(&ItemId::from("boots")));
        assert!(result.snapshot.extended.owned_items.contains(&ItemId::from("hat")));
        assert_eq!(
            result.recovered,
            vec![EntityKind::Settings, EntityKind::Extended]
        );
    }

    #[test]
    fn empty_cache_returns_remote() {
        let remote = RemoteSnapshot {
            profile: Some(profile(10, 10)),
            ..Default::default()
        };
        let result = reconcile(remote.clone(), &CachedEntries::default());
        assert_eq!(result.snapshot, remote.into_account());
        assert!(result.recovered.is_empty());
    }
}
