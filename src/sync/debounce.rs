//! Single shared debounce timer.
//!
//! Every mutation re-arms the timer; when the window elapses without a new
//! mutation the callback runs once. A retry arms it with a deadline that may
//! only move earlier. The timer lives in a background task that
//! selects over a command channel, the current deadline and a cancellation
//! token, so arming and disarming never block the caller.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebounceCommand {
    Arm,
    ArmWithin(Duration),
    Disarm,
}

/// Handle to the debounce task. Dropping it stops the task.
#[derive(Debug)]
pub struct DebounceScheduler {
    tx: mpsc::UnboundedSender<DebounceCommand>,
    cancel: CancellationToken,
    delay: Duration,
}

impl DebounceScheduler {
    /// Spawns the timer task. `on_fire` runs each time a window elapses.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(delay: Duration, on_fire: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        tokio::spawn(run(delay, rx, cancel.clone(), on_fire));
        DebounceScheduler { tx, cancel, delay }
    }

    /// (Re)starts the window. The callback fires `delay` after the last arm.
    pub fn arm(&self) {
        let _ = self.tx.send(DebounceCommand::Arm);
    }

    /// Makes sure the callback fires within `delay`. An earlier pending
    /// deadline is kept.
    pub fn arm_within(&self, delay: Duration) {
        let _ = self.tx.send(DebounceCommand::ArmWithin(delay));
    }

    /// Cancels a pending fire, if any.
    pub fn disarm(&self) {
        let _ = self.tx.send(DebounceCommand::Disarm);
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Drop for DebounceScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<F, Fut>(
    delay: Duration,
    mut rx: mpsc::UnboundedReceiver<DebounceCommand>,
    cancel: CancellationToken,
    on_fire: F,
) where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            cmd = rx.recv() => match cmd {
                Some(DebounceCommand::Arm) => deadline = Some(Instant::now() + delay),
                Some(DebounceCommand::ArmWithin(within)) => {
                    let at = Instant::now() + within;
                    deadline = Some(deadline.map_or(at, |current| current.min(at)));
                }
                Some(DebounceCommand::Disarm) => deadline = None,
                None => break,
            },

            _ = async {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            } => {
                deadline = None;
                trace!("Debounce window elapsed");
                // An in-flight flush is never interrupted; cancellation is
                // observed on the next iteration.
                on_fire().await;
            }
        }
    }

    trace!("Debounce task stopped");
}
