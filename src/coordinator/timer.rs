//! Round deadline timers.
//!
//! One timer task per encounter sleeps until the round deadline and then
//! runs its expiry future. Cancellation is cooperative: the task selects on
//! a [`CancellationToken`] and is never aborted. A task is never asked to
//! cancel itself; a cancellation request issued from inside the timer's
//! own task is skipped and the task finishes naturally.

use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCancel {
    /// The timer was signalled to stop.
    Cancelled,
    /// The request came from the timer's own task; it was left to finish.
    SkippedSelf,
    /// No timer was registered for the encounter.
    NotScheduled,
}

#[derive(Debug)]
struct RoundTimer {
    round: u32,
    task_id: tokio::task::Id,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Per-encounter deadline timers.
#[derive(Debug, Default)]
pub struct RoundTimers {
    timers: DashMap<String, RoundTimer>,
}

impl RoundTimers {
    /// Creates an empty timer set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the timer for `round` of `combat_id`, replacing any previous one.
    ///
    /// `on_expiry` runs once `delay` (measured from this call) has elapsed
    /// unless the timer is cancelled first.
    pub fn schedule<F>(&self, combat_id: &str, round: u32, delay: Duration, on_expiry: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let id = combat_id.to_string();
        let deadline = tokio::time::Instant::now() + delay;

        let handle = tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {
                    debug!(combat_id = %id, round, "round timer cancelled");
                }
                () = tokio::time::sleep_until(deadline) => {
                    debug!(combat_id = %id, round, "round deadline reached");
                    on_expiry.await;
                }
            }
        });

        let timer = RoundTimer {
            round,
            task_id: handle.id(),
            cancel: token,
            handle,
        };
        if let Some(previous) = self.timers.insert(combat_id.to_string(), timer) {
            stop(combat_id, &previous);
        }
    }

    /// Cancels and forgets the timer of `combat_id`.
    pub fn cancel(&self, combat_id: &str) -> TimerCancel {
        self.timers
            .remove(combat_id)
            .map_or(TimerCancel::NotScheduled, |(_, timer)| stop(combat_id, &timer))
    }

    /// Round the registered timer belongs to.
    #[must_use]
    pub fn round_of(&self, combat_id: &str) -> Option<u32> {
        self.timers.get(combat_id).map(|t| t.round)
    }

    /// Whether the registered timer task is still running.
    #[must_use]
    pub fn is_running(&self, combat_id: &str) -> bool {
        self.timers
            .get(combat_id)
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Number of registered timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether no timer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Cancels every timer.
    pub fn shutdown(&self) {
        let ids: Vec<String> = self.timers.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.cancel(&id);
        }
    }
}

fn stop(combat_id: &str, timer: &RoundTimer) -> TimerCancel {
    if tokio::task::try_id() == Some(timer.task_id) {
        debug!(
            combat_id,
            round = timer.round,
            "timer cancellation requested from its own task; skipping"
        );
        return TimerCancel::SkippedSelf;
    }
    timer.cancel.cancel();
    TimerCancel::Cancelled
}
