//! Host lifecycle hooks that force an immediate flush.
//!
//! Backgrounding and hiding are not final: the flush runs as a detached task
//! and the host carries on. Terminating and unloading are final: the flush is
//! bounded by the configured unload budget so a dead network cannot hold up
//! shutdown, and the host may await the returned handle before exiting.
//! Whatever does not make it out stays in the crash-safe cache.

use std::fmt;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

use super::engine::SyncEngine;
use super::report::FlushReport;
use crate::remote::RemoteStore;

/// A host lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Backgrounded,
    Hidden,
    Terminating,
    Unloading,
}

impl LifecycleEvent {
    /// True for transitions after which the process may be gone.
    pub fn is_final(&self) -> bool {
        matches!(self, LifecycleEvent::Terminating | LifecycleEvent::Unloading)
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleEvent::Backgrounded => "backgrounded",
            LifecycleEvent::Hidden => "hidden",
            LifecycleEvent::Terminating => "terminating",
            LifecycleEvent::Unloading => "unloading",
        };
        f.write_str(name)
    }
}

impl<R: RemoteStore> SyncEngine<R> {
    /// Flushes immediately, bypassing the debounce window.
    ///
    /// Never blocks. The handle resolves to the flush report, or `None` if a
    /// final flush ran out of its budget.
    pub fn on_lifecycle(&self, event: LifecycleEvent) -> JoinHandle<Option<FlushReport>> {
        let engine = self.clone();
        let budget = self.config().unload_flush_budget;
        let pending = self.pending_write_count();
        info!(%event, pending, "Lifecycle flush");

        tokio::spawn(async move {
            if !event.is_final() {
                return Some(engine.flush().await);
            }
            match timeout(budget, engine.flush()).await {
                Ok(report) => Some(report),
                Err(_) => {
                    warn!(
                        %event,
                        budget_ms = budget.as_millis() as u64,
                        pending = engine.pending_write_count(),
                        "Final flush exceeded its budget; unflushed writes remain cached"
                    );
                    None
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_terminate_and_unload_are_final() {
        assert!(!LifecycleEvent::Backgrounded.is_final());
        assert!(!LifecycleEvent::Hidden.is_final());
        assert!(LifecycleEvent::Terminating.is_final());
        assert!(LifecycleEvent::Unloading.is_final());
    }
}
