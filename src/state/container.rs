//! Reactive holder of the canonical account state.
//!
//! The container is owned by the sync engine. Presentation code receives a
//! [`StateView`], which can read the current snapshot and await changes but
//! cannot mutate; all writes go through the engine's save entry points.

use std::sync::Arc;

use tokio::sync::watch;

use crate::types::AccountSnapshot;

/// Owner of the current [`AccountSnapshot`].
#[derive(Debug)]
pub struct StateContainer {
    tx: watch::Sender<Arc<AccountSnapshot>>,
}

impl Default for StateContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl StateContainer {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(AccountSnapshot::default()));
        StateContainer { tx }
    }

    /// Returns a read-only, subscribable view.
    pub fn view(&self) -> StateView {
        StateView {
            rx: self.tx.subscribe(),
        }
    }

    /// Returns the current snapshot.
    pub fn current(&self) -> Arc<AccountSnapshot> {
        self.tx.borrow().clone()
    }

    /// Replaces the whole snapshot and notifies views.
    pub(crate) fn replace(&self, snapshot: AccountSnapshot) {
        self.tx.send_replace(Arc::new(snapshot));
    }

    /// Applies `f` to a copy of the current snapshot, publishes the result and
    /// returns whatever `f` returned.
    ///
    /// Callers serialize updates themselves (the engine holds its session lock).
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut AccountSnapshot) -> R) -> R {
        let mut next = AccountSnapshot::clone(&self.tx.borrow());
        let result = f(&mut next);
        self.tx.send_replace(Arc::new(next));
        result
    }
}

/// Read-only view of the account state for UI and other consumers.
#[derive(Debug, Clone)]
pub struct StateView {
    rx: watch::Receiver<Arc<AccountSnapshot>>,
}

impl StateView {
    /// Returns the current snapshot.
    pub fn current(&self) -> Arc<AccountSnapshot> {
        self.rx.borrow().clone()
    }

    /// Waits for the next published snapshot.
    ///
    /// Returns `None` once the owning container is gone.
    pub async fn changed(&mut self) -> Option<Arc<AccountSnapshot>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}
