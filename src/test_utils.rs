//! Shared test utilities: arbitrary generators for property-based testing and
//! a scripted remote store for engine tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use tokio::sync::Notify;

use crate::remote::{MemoryRemote, RemoteError, RemoteStore, RemoteWrite};
use crate::types::{
    AccountId, AccountProfile, AccountSettings, Difficulty, EntityPayload, ExtendedState, ItemId,
    RemoteSnapshot,
};

pub fn arb_profile() -> impl Strategy<Value = AccountProfile> {
    (
        -1_000_000i64..1_000_000,
        any::<u32>().prop_map(u64::from),
        0u32..500,
        0u64..100_000,
        any::<u32>().prop_map(u64::from),
        0u64..10_000_000,
        prop::collection::btree_map("[a-z]{1,8}", 0u64..1_000, 0..4),
        0u32..1_000,
    )
        .prop_map(
            |(
                currency,
                experience,
                level,
                games_played,
                best_score,
                best_time_ms,
                correct_by_category,
                best_streak,
            )| AccountProfile {
                currency,
                experience,
                level,
                games_played,
                best_score,
                best_time_ms,
                correct_by_category,
                best_streak,
            },
        )
}

pub fn arb_settings() -> impl Strategy<Value = AccountSettings> {
    (
        any::<bool>(),
        0u8..=100,
        any::<bool>(),
        "[a-z]{2}",
        any::<bool>(),
        prop_oneof![
            Just(Difficulty::Easy),
            Just(Difficulty::Normal),
            Just(Difficulty::Hard)
        ],
    )
        .prop_map(
            |(sound_enabled, music_volume, haptics_enabled, language, colorblind_mode, difficulty)| {
                AccountSettings {
                    sound_enabled,
                    music_volume,
                    haptics_enabled,
                    language,
                    colorblind_mode,
                    difficulty,
                }
            },
        )
}

pub fn arb_item_id() -> impl Strategy<Value = ItemId> {
    "[a-z]{1,6}-[0-9]{1,3}".prop_map(ItemId)
}

pub fn arb_extended() -> impl Strategy<Value = ExtendedState> {
    (
        prop::collection::btree_set(arb_item_id(), 0..6),
        0u32..100,
    )
        .prop_map(|(owned_items, longest)| {
            let mut state = ExtendedState {
                owned_items,
                equipped: BTreeMap::new(),
                ..Default::default()
            };
            state.streak.longest = longest;
            state
        })
}

pub fn arb_payload() -> impl Strategy<Value = EntityPayload> {
    prop_oneof![
        arb_profile().prop_map(EntityPayload::Profile),
        arb_settings().prop_map(EntityPayload::Settings),
        arb_extended().prop_map(EntityPayload::Extended),
    ]
}

pub fn account(name: &str) -> AccountId {
    AccountId::parse(name).unwrap()
}

/// How the scripted remote answers one write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Apply to the backing store and acknowledge.
    Succeed,
    /// Fail without applying, as if the network were down.
    Transient,
    /// Refuse the write as invalid.
    Reject,
    /// Apply to the backing store, then fail as if the response was lost.
    LostAck,
}

/// A pause point for the next write: `reached` is notified when the write
/// arrives, and the write proceeds once `release` is notified.
#[derive(Debug, Default)]
pub struct Gate {
    pub reached: Notify,
    pub release: Notify,
}

/// A [`RemoteStore`] wrapping a [`MemoryRemote`] whose answers can be scripted.
#[derive(Debug)]
pub struct ScriptedRemote {
    pub store: MemoryRemote,
    script: Mutex<VecDeque<Outcome>>,
    default: Mutex<Outcome>,
    fetch_fails: AtomicBool,
    hold: Mutex<Option<Arc<Gate>>>,
    writes: Mutex<Vec<RemoteWrite>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for ScriptedRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRemote {
    pub fn new() -> Self {
        ScriptedRemote {
            store: MemoryRemote::new(),
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(Outcome::Succeed),
            fetch_fails: AtomicBool::new(false),
            hold: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Seeds a record directly into the backing store.
    pub fn seed(&self, account: &AccountId, record: EntityPayload) {
        self.store
            .apply(account, &RemoteWrite::Upsert { record })
            .unwrap();
    }

    /// Queues outcomes for the next writes, consumed in order.
    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.script.lock().unwrap().extend(outcomes);
    }

    /// Sets the outcome used once the script is exhausted.
    pub fn set_default(&self, outcome: Outcome) {
        *self.default.lock().unwrap() = outcome;
    }

    pub fn set_fetch_fails(&self, fails: bool) {
        self.fetch_fails.store(fails, Ordering::SeqCst);
    }

    /// Pauses the next write until the returned gate is released.
    pub fn hold_next_write(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.hold.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Every write attempted, in arrival order.
    pub fn writes(&self) -> Vec<RemoteWrite> {
        self.writes.lock().unwrap().clone()
    }

    /// Profile currencies of every attempted profile upsert, in order.
    pub fn profile_writes(&self) -> Vec<i64> {
        self.writes()
            .iter()
            .filter_map(|w| match w {
                RemoteWrite::Upsert { record } => record.currency(),
                RemoteWrite::AppendRun { .. } => None,
            })
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn remote_snapshot(&self, account: &AccountId) -> RemoteSnapshot {
        self.store.snapshot(account)
    }
}

impl RemoteStore for ScriptedRemote {
    async fn fetch(&self, account: &AccountId) -> Result<RemoteSnapshot, RemoteError> {
        if self.fetch_fails.load(Ordering::SeqCst) {
            return Err(RemoteError::transient("scripted fetch outage"));
        }
        Ok(self.store.snapshot(account))
    }

    async fn write(&self, account: &AccountId, write: &RemoteWrite) -> Result<(), RemoteError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.writes.lock().unwrap().push(write.clone());

        let gate = self.hold.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        let outcome = scripted.unwrap_or_else(|| *self.default.lock().unwrap());
        let result = match outcome {
            Outcome::Succeed => self.store.apply(account, write),
            Outcome::Transient => Err(RemoteError::transient("scripted outage")),
            Outcome::Reject => Err(RemoteError::rejected("scripted rejection")),
            Outcome::LostAck => self
                .store
                .apply(account, write)
                .and(Err(RemoteError::transient("scripted lost acknowledgement"))),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
