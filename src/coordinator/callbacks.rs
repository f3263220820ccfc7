//! Callback contract between the coordinator and the rest of the system.
//!
//! The coordinator never talks to storage, the event broadcaster or the
//! economy directly; it calls the four hooks of [`CombatCallbacks`].

use async_trait::async_trait;
use tracing::{error, warn};

use crate::error::CallbackError;
use crate::model::{CombatEncounter, CombatRoundOutcome};
use crate::observability::metrics;

/// Hooks the coordinator calls to notify the rest of the system.
///
/// The "resolved", "waiting" and "ended" hooks run after the encounter
/// lock has been released, on a snapshot of the encounter. They may call
/// back into the coordinator.
///
/// `on_pay_action` runs while the encounter lock is held, because the
/// payment decides how the round resolves. It must not call back into the
/// coordinator for the same encounter.
#[async_trait]
pub trait CombatCallbacks: Send + Sync {
    /// A new round is accepting actions.
    async fn on_round_waiting(&self, encounter: &CombatEncounter) -> Result<(), CallbackError>;

    /// A round was resolved.
    async fn on_round_resolved(
        &self,
        encounter: &CombatEncounter,
        outcome: &CombatRoundOutcome,
    ) -> Result<(), CallbackError>;

    /// The encounter reached a terminal state.
    async fn on_combat_ended(
        &self,
        encounter: &CombatEncounter,
        outcome: &CombatRoundOutcome,
    ) -> Result<(), CallbackError>;

    /// Deducts `amount` credits from `payer_id`; returns whether it succeeded.
    async fn on_pay_action(&self, payer_id: &str, amount: u64) -> bool;
}

/// Callbacks that accept everything and refuse every payment.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

#[async_trait]
impl CombatCallbacks for NoopCallbacks {
    async fn on_round_waiting(&self, _encounter: &CombatEncounter) -> Result<(), CallbackError> {
        Ok(())
    }

    async fn on_round_resolved(
        &self,
        _encounter: &CombatEncounter,
        _outcome: &CombatRoundOutcome,
    ) -> Result<(), CallbackError> {
        Ok(())
    }

    async fn on_combat_ended(
        &self,
        _encounter: &CombatEncounter,
        _outcome: &CombatRoundOutcome,
    ) -> Result<(), CallbackError> {
        Ok(())
    }

    async fn on_pay_action(&self, _payer_id: &str, _amount: u64) -> bool {
        false
    }
}

/// What to do with a cancellation reported by a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnCancel {
    /// Log it and carry on with the batch.
    Continue,
    /// Surface it to the caller.
    Raise,
}

/// Logs a callback failure and decides whether it propagates.
///
/// Failures other than cancellation always propagate.
pub(crate) fn settle(
    callback: &'static str,
    combat_id: &str,
    on_cancel: OnCancel,
    result: Result<(), CallbackError>,
) -> Result<(), CallbackError> {
    let Err(err) = result else {
        return Ok(());
    };
    metrics::record_callback_error(callback, err.is_cancelled());

    if err.is_cancelled() && on_cancel == OnCancel::Continue {
        warn!(combat_id, callback, error = %err, "callback cancelled; continuing");
        return Ok(());
    }
    error!(combat_id, callback, error = %err, "callback failed");
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_swallowed_when_continuing() {
        let result = settle(
            "on_round_resolved",
            "c1",
            OnCancel::Continue,
            Err(CallbackError::Cancelled("shutdown".into())),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn cancellation_is_raised_when_requested() {
        let result = settle(
            "on_combat_ended",
            "c1",
            OnCancel::Raise,
            Err(CallbackError::Cancelled("shutdown".into())),
        );
        assert_eq!(result, Err(CallbackError::Cancelled("shutdown".into())));
    }

    #[test]
    fn failures_always_propagate() {
        let result = settle(
            "on_round_waiting",
            "c1",
            OnCancel::Continue,
            Err(CallbackError::Failed("db down".into())),
        );
        assert_eq!(result, Err(CallbackError::Failed("db down".into())));
    }

    #[tokio::test]
    async fn noop_callbacks_refuse_payment() {
        let callbacks = NoopCallbacks;
        assert!(!callbacks.on_pay_action("p1", 10).await);
        let enc = CombatEncounter::new("c1", 1);
        assert!(callbacks.on_round_waiting(&enc).await.is_ok());
    }
}
