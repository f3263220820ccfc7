//! Combat coordinator
//!
//! Owns the lifecycle of every encounter: registration, action intake,
//! deadline timers, round resolution, the toll protocol and callback
//! dispatch.
//!
//! # Locking
//!
//! Each active encounter sits behind its own async mutex
//! ([`EncounterHandle`]). All round state is read and written under that
//! lock. A separate registry mutex guards only insertion and removal of
//! encounters and is never held across an `.await`.
//!
//! # Round flow
//!
//! ```text
//! ROUND_WAITING ──(all actions | deadline)──▶ RESOLVING ──▶ ROUND_WAITING(n+1)
//!                                                      └──▶ TERMINAL
//! ```
//!
//! Resolution happens under the encounter lock. Callbacks run afterwards on
//! a snapshot, "resolved" before "waiting"/"ended", and the next round's
//! timer is armed only once they have returned.

pub mod callbacks;
pub mod registry;
pub mod timer;
pub(crate) mod toll;

use std::collections::BTreeMap;
use std::sync::{Arc, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::engine;
use crate::error::{CallbackError, CombatError};
use crate::garrison::plan_garrison_action;
use crate::model::{
    ActionKind, CombatEncounter, CombatRoundOutcome, CombatantState, EndState,
    ParticipantDelta, ResolveTrigger, RoundAction, RoundLog,
};
use crate::observability::metrics;

pub use callbacks::{CombatCallbacks, NoopCallbacks};
pub use registry::{EncounterHandle, Lookup, Registry};
pub use timer::{RoundTimers, TimerCancel};

use callbacks::{OnCancel, settle};
use toll::PayDecision;

/// A committed round waiting to be published to the callbacks.
#[derive(Debug)]
struct Resolution {
    encounter: CombatEncounter,
    outcome: CombatRoundOutcome,
    terminal: bool,
}

// ============================================================================
// Coordinator
// ============================================================================

/// Runs concurrent combat encounters.
///
/// Create it with [`CombatCoordinator::new`] and share the returned `Arc`;
/// timer tasks keep their own reference while they are pending.
pub struct CombatCoordinator {
    config: CoordinatorConfig,
    registry: std::sync::Mutex<Registry>,
    timers: RoundTimers,
    callbacks: RwLock<Arc<dyn CombatCallbacks>>,
}

impl std::fmt::Debug for CombatCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombatCoordinator")
            .field("config", &self.config)
            .field("timers", &self.timers.len())
            .finish_non_exhaustive()
    }
}

impl CombatCoordinator {
    /// Creates a coordinator with [`NoopCallbacks`].
    #[must_use]
    pub fn new(config: CoordinatorConfig) -> Arc<Self> {
        Self::with_callbacks(config, Arc::new(NoopCallbacks))
    }

    /// Creates a coordinator wired to `callbacks`.
    #[must_use]
    pub fn with_callbacks(config: CoordinatorConfig, callbacks: Arc<dyn CombatCallbacks>) -> Arc<Self> {
        let capacity = config.completed_capacity;
        Arc::new(Self {
            config,
            registry: std::sync::Mutex::new(Registry::new(capacity)),
            timers: RoundTimers::new(),
            callbacks: RwLock::new(callbacks),
        })
    }

    /// Replaces the callbacks used for subsequent notifications.
    pub fn configure_callbacks(&self, callbacks: Arc<dyn CombatCallbacks>) {
        *self.callbacks.write().unwrap_or_else(PoisonError::into_inner) = callbacks;
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn callbacks(&self) -> Arc<dyn CombatCallbacks> {
        Arc::clone(&self.callbacks.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active_handle(&self, combat_id: &str) -> Option<EncounterHandle> {
        self.registry().active(combat_id)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Registers `encounter` and opens round 1.
    ///
    /// Pending actions, round number and terminal flags are reset. When
    /// `notify` is set the "round waiting" callback runs before returning.
    ///
    /// # Errors
    ///
    /// Returns `CombatError::DuplicateEncounter` if the id is already
    /// active, or `CombatError::Callback` if the waiting notification failed
    /// (the encounter stays registered).
    pub async fn start_encounter(
        self: &Arc<Self>,
        mut encounter: CombatEncounter,
        notify: bool,
    ) -> Result<CombatEncounter, CombatError> {
        let combat_id = encounter.combat_id.clone();
        encounter.round_number = 1;
        encounter.pending_actions.clear();
        encounter.ended = false;
        encounter.end_state = None;
        encounter.deadline = Some(deadline_after(self.config.round_timeout));

        let handle: EncounterHandle = Arc::new(Mutex::new(encounter));
        let snapshot = {
            let guard = handle.lock().await;
            self.registry().insert_active(&combat_id, Arc::clone(&handle))?;
            self.arm(&combat_id, 1);
            guard.clone()
        };

        metrics::record_encounter_started();
        metrics::set_encounters_active(self.active_count());
        info!(
            combat_id = %combat_id,
            sector_id = snapshot.sector_id,
            participants = snapshot.participants.len(),
            "combat started"
        );

        if notify {
            self.notify_waiting(&snapshot).await?;
        }
        if self.config.auto_garrison_actions {
            self.submit_garrison_actions(&combat_id).await?;
        }
        Ok(snapshot)
    }

    /// Records `action` for `combatant_id` in the current round.
    ///
    /// Resolves the round immediately once every participant has a pending
    /// action and returns that round's outcome. A second submission in the
    /// same round replaces the first.
    ///
    /// # Errors
    ///
    /// Usage errors (unknown or ended encounter, unknown combatant, invalid
    /// ATTACK or FLEE) are returned before anything is recorded. A
    /// `CombatError::Callback` means the round was resolved and committed
    /// but a notification failed.
    pub async fn submit_action(
        self: &Arc<Self>,
        combat_id: &str,
        combatant_id: &str,
        mut action: RoundAction,
    ) -> Result<Option<CombatRoundOutcome>, CombatError> {
        let handle = self.active_handle(combat_id);
        let Some(handle) = handle else {
            return Err(self.missing(combat_id));
        };

        let resolution = {
            let mut enc = handle.lock().await;
            self.ensure_open(combat_id, &handle, &enc)?;
            let participant =
                enc.participants
                    .get(combatant_id)
                    .ok_or_else(|| CombatError::UnknownCombatant {
                        combat_id: combat_id.to_string(),
                        combatant_id: combatant_id.to_string(),
                    })?;
            validate_action(&enc, participant, &action)?;

            action.timed_out = false;
            debug!(
                combat_id,
                combatant_id,
                round = enc.round_number,
                action = %action.action,
                "action received"
            );
            enc.pending_actions.insert(combatant_id.to_string(), action);
            if !enc.all_actions_submitted() {
                return Ok(None);
            }
            self.resolve_locked(&handle, &mut enc, ResolveTrigger::Submission)
                .await
        };

        self.publish(resolution).await.map(Some)
    }

    /// Adds a participant to an open encounter.
    ///
    /// Returns `false` when the id is already present or the character fled
    /// this encounter earlier. No callback runs; announcing the newcomer is
    /// up to the caller.
    ///
    /// # Errors
    ///
    /// Returns `CombatError::UnknownEncounter` or
    /// `CombatError::EncounterEnded`.
    pub async fn add_participant(
        &self,
        combat_id: &str,
        state: CombatantState,
    ) -> Result<bool, CombatError> {
        let handle = self.active_handle(combat_id);
        let Some(handle) = handle else {
            return Err(self.missing(combat_id));
        };
        let mut enc = handle.lock().await;
        self.ensure_open(combat_id, &handle, &enc)?;

        if enc.context.recent_flee_character_ids.contains(&state.id) {
            debug!(combat_id, combatant_id = %state.id, "refusing to re-add fled character");
            return Ok(false);
        }
        let id = state.id.clone();
        let added = enc.add_participant(state);
        if added {
            info!(combat_id, combatant_id = %id, round = enc.round_number, "participant joined");
        }
        Ok(added)
    }

    /// Removes an encounter from both registries and stops its timer.
    ///
    /// Returns whether anything was removed. When called from the
    /// encounter's own timer task the timer is left to finish on its own.
    pub async fn cancel_encounter(&self, combat_id: &str) -> bool {
        let (handle, was_completed) = self.registry().remove(combat_id);

        // Timers are armed under the encounter lock, so cancel under it too
        let timer = if let Some(handle) = &handle {
            let mut enc = handle.lock().await;
            let timer = self.timers.cancel(combat_id);
            enc.ended = true;
            enc.pending_actions.clear();
            enc.deadline = None;
            metrics::record_encounter_cancelled();
            metrics::set_encounters_active(self.active_count());
            timer
        } else {
            self.timers.cancel(combat_id)
        };

        let removed = handle.is_some() || was_completed;
        if removed {
            info!(combat_id, ?timer, "combat cancelled");
        }
        removed
    }

    /// Stops every pending timer.
    pub fn shutdown(&self) {
        self.timers.shutdown();
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Snapshot of an active or retained completed encounter.
    pub async fn get_encounter(&self, combat_id: &str) -> Option<CombatEncounter> {
        let handle = self.active_handle(combat_id);
        if let Some(handle) = handle {
            return Some(handle.lock().await.clone());
        }
        self.registry().completed(combat_id).cloned()
    }

    /// First open encounter that `combatant_id` takes part in.
    pub async fn find_encounter_for(&self, combatant_id: &str) -> Option<CombatEncounter> {
        self.find_active(|enc| enc.has_participant(combatant_id))
            .await
    }

    /// First open encounter in `sector_id`.
    pub async fn find_encounter_in_sector(&self, sector_id: u32) -> Option<CombatEncounter> {
        self.find_active(|enc| enc.sector_id == sector_id).await
    }

    async fn find_active<F>(&self, matches: F) -> Option<CombatEncounter>
    where
        F: Fn(&CombatEncounter) -> bool + Send,
    {
        let handles = self.registry().active_handles();
        for handle in handles {
            let enc = handle.lock().await;
            if !enc.ended && matches(&enc) {
                return Some(enc.clone());
            }
        }
        None
    }

    /// Number of active encounters.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.registry().active_len()
    }

    /// Number of retained completed encounters.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.registry().completed_len()
    }

    /// Where `combat_id` currently lives.
    #[must_use]
    pub fn lookup(&self, combat_id: &str) -> Lookup {
        self.registry().lookup(combat_id)
    }

    /// Round the pending deadline timer of `combat_id` belongs to.
    #[must_use]
    pub fn timer_round(&self, combat_id: &str) -> Option<u32> {
        self.timers.round_of(combat_id)
    }

    /// Number of registered deadline timers.
    #[must_use]
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Re-issues the "round waiting" notification for an open encounter.
    ///
    /// # Errors
    ///
    /// Returns a usage error for unknown or ended encounters, or the
    /// callback's failure.
    pub async fn emit_round_waiting(&self, combat_id: &str) -> Result<(), CombatError> {
        let handle = self.active_handle(combat_id);
        let Some(handle) = handle else {
            return Err(self.missing(combat_id));
        };
        let snapshot = {
            let enc = handle.lock().await;
            self.ensure_open(combat_id, &handle, &enc)?;
            enc.clone()
        };
        self.notify_waiting(&snapshot).await?;
        Ok(())
    }

    async fn notify_waiting(&self, encounter: &CombatEncounter) -> Result<(), CallbackError> {
        let result = self.callbacks().on_round_waiting(encounter).await;
        settle(
            "on_round_waiting",
            &encounter.combat_id,
            OnCancel::Continue,
            result,
        )
    }

    // ========================================================================
    // Garrisons
    // ========================================================================

    /// Submits planned actions for every garrison without one this round.
    ///
    /// Returns the outcome if that completed the round.
    ///
    /// # Errors
    ///
    /// Same as [`submit_action`](Self::submit_action).
    pub async fn submit_garrison_actions(
        self: &Arc<Self>,
        combat_id: &str,
    ) -> Result<Option<CombatRoundOutcome>, CombatError> {
        match self.plan_garrisons(combat_id).await? {
            Some(resolution) => self.publish(resolution).await.map(Some),
            None => Ok(None),
        }
    }

    async fn plan_garrisons(&self, combat_id: &str) -> Result<Option<Resolution>, CombatError> {
        let handle = self.active_handle(combat_id);
        let Some(handle) = handle else {
            return Err(self.missing(combat_id));
        };
        let mut enc = handle.lock().await;
        self.ensure_open(combat_id, &handle, &enc)?;

        let planned: Vec<(String, RoundAction)> = enc
            .participants
            .values()
            .filter(|p| p.is_garrison() && !enc.pending_actions.contains_key(&p.id))
            .filter_map(|p| plan_garrison_action(&enc, &p.id).map(|a| (p.id.clone(), a)))
            .collect();
        if planned.is_empty() {
            return Ok(None);
        }
        for (id, action) in planned {
            debug!(combat_id, garrison_id = %id, action = %action.action, "garrison action planned");
            enc.pending_actions.insert(id, action);
        }

        if !enc.all_actions_submitted() {
            return Ok(None);
        }
        let resolution = self
            .resolve_locked(&handle, &mut enc, ResolveTrigger::Submission)
            .await;
        Ok(Some(resolution))
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Starts the deadline timer for `round`. Caller holds the encounter lock.
    fn arm(self: &Arc<Self>, combat_id: &str, round: u32) {
        let coordinator = Arc::clone(self);
        let id = combat_id.to_string();
        self.timers
            .schedule(combat_id, round, self.config.round_timeout, async move {
                coordinator.on_round_deadline(&id, round).await;
            });
    }

    async fn schedule_round_timer(self: &Arc<Self>, combat_id: &str, round: u32) {
        let handle = self.active_handle(combat_id);
        let Some(handle) = handle else {
            return;
        };
        let mut enc = handle.lock().await;
        let current = self.registry().is_current(combat_id, &handle);
        if !current || enc.ended || enc.round_number != round {
            debug!(combat_id, round, "round moved on; not arming timer");
            return;
        }
        enc.deadline = Some(deadline_after(self.config.round_timeout));
        self.arm(combat_id, round);
    }

    async fn on_round_deadline(self: &Arc<Self>, combat_id: &str, round: u32) {
        match self
            .resolve_round(combat_id, round, ResolveTrigger::Timeout)
            .await
        {
            Ok(Some(outcome)) => {
                debug!(combat_id, round, end_state = ?outcome.end_state, "round resolved on deadline");
            }
            Ok(None) => debug!(combat_id, round, "stale round timer"),
            Err(err) => warn!(combat_id, round, error = %err, "deadline resolution failed"),
        }
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Resolves `round` if the encounter is still open and on that round.
    async fn resolve_round(
        self: &Arc<Self>,
        combat_id: &str,
        round: u32,
        trigger: ResolveTrigger,
    ) -> Result<Option<CombatRoundOutcome>, CombatError> {
        let handle = self.active_handle(combat_id);
        let Some(handle) = handle else {
            return Ok(None);
        };
        let resolution = {
            let mut enc = handle.lock().await;
            let current = self.registry().is_current(combat_id, &handle);
            if !current || enc.ended || enc.round_number != round {
                return Ok(None);
            }
            self.resolve_locked(&handle, &mut enc, trigger).await
        };
        self.publish(resolution).await.map(Some)
    }

    /// Resolves the current round of `enc` and commits the result.
    async fn resolve_locked(
        &self,
        handle: &EncounterHandle,
        enc: &mut CombatEncounter,
        trigger: ResolveTrigger,
    ) -> Resolution {
        let started = Instant::now();
        let combat_id = enc.combat_id.clone();
        let round = enc.round_number;

        let mut effective = engine::effective_actions(enc, &enc.pending_actions);
        self.settle_payments(enc, &mut effective).await;

        let before = enc.participants.clone();
        let mut outcome = engine::resolve(enc, &effective);

        for (id, participant) in &mut enc.participants {
            if let Some(&fighters) = outcome.fighters_remaining.get(id) {
                participant.fighters = fighters;
            }
            if let Some(&shields) = outcome.shields_remaining.get(id) {
                participant.shields = shields;
            }
        }
        let fled: Vec<String> = outcome.fled_ids().cloned().collect();
        for id in &fled {
            if let Some(gone) = enc.participants.remove(id) {
                if gone.is_character() {
                    enc.context.recent_flee_character_ids.insert(id.clone());
                }
                info!(combat_id = %combat_id, round, combatant_id = %id, "combatant fled");
            }
        }
        enc.pending_actions.clear();

        let mut end_state = outcome.end_state.take();
        if end_state == Some(EndState::Stalemate) && toll::needs_follow_up(enc) {
            debug!(combat_id = %combat_id, round, "unpaid toll demand keeps combat open");
            end_state = None;
        }
        if toll::stand_down(enc, &outcome.effective_actions) {
            end_state = Some(EndState::TollSatisfied);
        }
        if end_state.is_none() {
            end_state = lone_survivor(enc);
        }
        outcome.end_state.clone_from(&end_state);
        outcome.participant_deltas = participant_deltas(&before, enc, &outcome);

        enc.logs.push(RoundLog {
            round_number: round,
            trigger,
            outcome: outcome.clone(),
            resolved_at: Utc::now(),
        });
        self.timers.cancel(&combat_id);

        let terminal = if let Some(state) = end_state {
            enc.ended = true;
            enc.end_state = Some(state.clone());
            enc.deadline = None;
            let evicted = {
                let mut registry = self.registry();
                if registry.is_current(&combat_id, handle) {
                    registry.complete(enc.clone())
                } else {
                    Vec::new()
                }
            };
            if !evicted.is_empty() {
                debug!(?evicted, "evicted completed encounters");
            }
            metrics::record_encounter_ended(&state);
            metrics::set_encounters_active(self.active_count());
            info!(combat_id = %combat_id, round, end_state = %state, "combat ended");
            true
        } else {
            enc.round_number += 1;
            enc.deadline = Some(deadline_after(self.config.round_timeout));
            false
        };

        metrics::record_round_resolved(trigger.as_str(), started.elapsed());
        debug!(
            combat_id = %combat_id,
            round,
            trigger = trigger.as_str(),
            terminal,
            "round resolved"
        );

        Resolution {
            encounter: enc.clone(),
            outcome,
            terminal,
        }
    }

    /// Runs the economy side of every PAY in `effective`.
    ///
    /// `on_pay_action` is awaited while the encounter lock is held.
    async fn settle_payments(
        &self,
        enc: &mut CombatEncounter,
        effective: &mut BTreeMap<String, RoundAction>,
    ) {
        let payers: Vec<String> = effective
            .iter()
            .filter(|(_, action)| action.action == ActionKind::Pay)
            .map(|(id, _)| id.clone())
            .collect();
        if payers.is_empty() {
            return;
        }

        let callbacks = self.callbacks();
        for payer in payers {
            let Some(action) = effective.get(&payer).cloned() else {
                continue;
            };
            match toll::evaluate_payment(enc, &payer, &action) {
                PayDecision::Downgrade(reason) => {
                    downgrade_pay(&enc.combat_id, effective, &payer, reason);
                }
                PayDecision::Accept {
                    garrison_id,
                    amount,
                } => {
                    if callbacks.on_pay_action(&payer, amount).await {
                        toll::apply_payment(enc, effective, &garrison_id, &payer, amount);
                        metrics::record_toll_payment(amount);
                        info!(
                            combat_id = %enc.combat_id,
                            round = enc.round_number,
                            payer_id = %payer,
                            garrison_id = %garrison_id,
                            amount,
                            "toll paid"
                        );
                    } else {
                        downgrade_pay(&enc.combat_id, effective, &payer, "payment_failed");
                    }
                }
            }
        }
    }

    // ========================================================================
    // Publishing
    // ========================================================================

    /// Publishes a committed round, then lets garrisons act in the rounds
    /// that follow when auto garrison actions are enabled.
    ///
    /// Only the first round's callback failures reach the caller.
    async fn publish(self: &Arc<Self>, first: Resolution) -> Result<CombatRoundOutcome, CombatError> {
        let outcome = first.outcome.clone();
        let combat_id = first.encounter.combat_id.clone();
        let terminal = first.terminal;

        self.publish_round(first).await?;
        if terminal || !self.config.auto_garrison_actions {
            return Ok(outcome);
        }

        loop {
            let next = match self.plan_garrisons(&combat_id).await {
                Ok(Some(next)) => next,
                Ok(None) => break,
                Err(err) => {
                    debug!(combat_id = %combat_id, error = %err, "garrisons not planned");
                    break;
                }
            };
            let terminal = next.terminal;
            if let Err(err) = self.publish_round(next).await {
                warn!(combat_id = %combat_id, error = %err, "garrison round notification failed");
                break;
            }
            if terminal {
                break;
            }
        }
        Ok(outcome)
    }

    /// Runs the callbacks for one committed round.
    ///
    /// A cancelled "resolved" or "waiting" callback is logged and ignored. A
    /// cancelled "ended" callback is returned to the caller, but the
    /// encounter stays completed. For non-terminal rounds the next deadline
    /// timer is armed even when a callback failed.
    async fn publish_round(self: &Arc<Self>, resolution: Resolution) -> Result<(), CombatError> {
        let Resolution {
            encounter,
            outcome,
            terminal,
        } = resolution;
        let combat_id = encounter.combat_id.as_str();
        let callbacks = self.callbacks();

        let resolved = settle(
            "on_round_resolved",
            combat_id,
            OnCancel::Continue,
            callbacks.on_round_resolved(&encounter, &outcome).await,
        );

        if terminal {
            resolved?;
            settle(
                "on_combat_ended",
                combat_id,
                OnCancel::Raise,
                callbacks.on_combat_ended(&encounter, &outcome).await,
            )?;
            return Ok(());
        }

        let notified = match resolved {
            Ok(()) => self.notify_waiting(&encounter).await,
            Err(err) => Err(err),
        };
        self.schedule_round_timer(combat_id, encounter.round_number)
            .await;
        notified.map_err(CombatError::from)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Error for an id with no active encounter.
    fn missing(&self, combat_id: &str) -> CombatError {
        let lookup = self.registry().lookup(combat_id);
        match lookup {
            Lookup::Completed => CombatError::EncounterEnded(combat_id.to_string()),
            Lookup::Active | Lookup::Missing => CombatError::UnknownEncounter(combat_id.to_string()),
        }
    }

    /// Checks that a locked encounter still accepts changes.
    fn ensure_open(
        &self,
        combat_id: &str,
        handle: &EncounterHandle,
        enc: &CombatEncounter,
    ) -> Result<(), CombatError> {
        if enc.ended {
            return Err(CombatError::EncounterEnded(combat_id.to_string()));
        }
        if !self.registry().is_current(combat_id, handle) {
            return Err(CombatError::UnknownEncounter(combat_id.to_string()));
        }
        Ok(())
    }
}

fn validate_action(
    enc: &CombatEncounter,
    participant: &CombatantState,
    action: &RoundAction,
) -> Result<(), CombatError> {
    match action.action {
        ActionKind::Attack => {
            let reason = match action.target_id.as_deref() {
                None => Some("no target given".to_string()),
                Some(target) if target == participant.id => Some("cannot target self".to_string()),
                Some(target) if !enc.has_participant(target) => {
                    Some(format!("'{target}' is not a participant"))
                }
                Some(_) => None,
            };
            if let Some(reason) = reason {
                return Err(CombatError::InvalidTarget {
                    combatant_id: participant.id.clone(),
                    reason,
                });
            }
            if action.commit == 0 {
                return Err(CombatError::InvalidCommit {
                    combatant_id: participant.id.clone(),
                });
            }
        }
        ActionKind::Flee => {
            if !participant.can_flee() {
                return Err(CombatError::FleeNotAllowed(participant.id.clone()));
            }
            if action.destination_sector.is_none() {
                return Err(CombatError::MissingDestination(participant.id.clone()));
            }
        }
        ActionKind::Brace | ActionKind::Pay => {}
    }
    Ok(())
}

fn downgrade_pay(
    combat_id: &str,
    effective: &mut BTreeMap<String, RoundAction>,
    payer: &str,
    reason: &'static str,
) {
    if let Some(action) = effective.get_mut(payer) {
        *action = action.downgraded();
    }
    metrics::record_protocol_downgrade(reason);
    debug!(combat_id, payer_id = payer, reason, "PAY treated as BRACE");
}

/// Ends encounters nobody can continue: a single participant left, or a
/// garrison alone with its own owner.
fn lone_survivor(enc: &CombatEncounter) -> Option<EndState> {
    let remaining: Vec<&CombatantState> = enc.participants.values().collect();
    match remaining.as_slice() {
        [] | [_] => Some(EndState::Stalemate),
        [a, b] if !a.is_hostile_to(b) => Some(EndState::Stalemate),
        _ => None,
    }
}

fn participant_deltas(
    before: &BTreeMap<String, CombatantState>,
    after: &CombatEncounter,
    outcome: &CombatRoundOutcome,
) -> BTreeMap<String, ParticipantDelta> {
    before
        .iter()
        .map(|(id, prev)| {
            let (fighters, shields, removed) = after.participants.get(id).map_or_else(
                || {
                    (
                        outcome.fighters_remaining.get(id).copied().unwrap_or(0),
                        outcome.shields_remaining.get(id).copied().unwrap_or(0),
                        true,
                    )
                },
                |now| (now.fighters, now.shields, false),
            );
            let delta = ParticipantDelta {
                fighters: i64::from(fighters) - i64::from(prev.fighters),
                shields: i64::from(shields) - i64::from(prev.shields),
                removed,
            };
            (id.clone(), delta)
        })
        .collect()
}

fn deadline_after(timeout: Duration) -> DateTime<Utc> {
    let delta = TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX);
    Utc::now()
        .checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn coordinator() -> Arc<CombatCoordinator> {
        CombatCoordinator::new(CoordinatorConfig::default().with_round_timeout(TIMEOUT))
    }

    fn duel(id: &str) -> CombatEncounter {
        CombatEncounter::new(id, 7)
            .with_participant(CombatantState::character("p1", "One", 300, 150, 3))
            .with_participant(CombatantState::character("p2", "Two", 300, 150, 3))
    }

    async fn settle_tasks() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_opens_round_one_with_timer() {
        let coord = coordinator();
        let mut enc = duel("c1");
        enc.round_number = 9;
        enc.pending_actions.insert("p1".into(), RoundAction::brace());

        let started = coord.start_encounter(enc, false).await.unwrap();
        assert_eq!(started.round_number, 1);
        assert!(started.pending_actions.is_empty());
        assert!(started.deadline.is_some());
        assert_eq!(coord.timer_round("c1"), Some(1));
        assert_eq!(coord.lookup("c1"), Lookup::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_start_is_rejected() {
        let coord = coordinator();
        coord.start_encounter(duel("c1"), false).await.unwrap();
        let err = coord.start_encounter(duel("c1"), false).await.unwrap_err();
        assert!(matches!(err, CombatError::DuplicateEncounter(id) if id == "c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn usage_errors_leave_state_untouched() {
        let coord = coordinator();
        coord.start_encounter(duel("c1"), false).await.unwrap();

        let err = coord
            .submit_action("nope", "p1", RoundAction::brace())
            .await
            .unwrap_err();
        assert!(matches!(err, CombatError::UnknownEncounter(_)));

        let err = coord
            .submit_action("c1", "ghost", RoundAction::brace())
            .await
            .unwrap_err();
        assert!(matches!(err, CombatError::UnknownCombatant { .. }));

        let err = coord
            .submit_action("c1", "p1", RoundAction::attack("p1", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, CombatError::InvalidTarget { .. }));

        let err = coord
            .submit_action("c1", "p1", RoundAction::attack("ghost", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, CombatError::InvalidTarget { .. }));

        let err = coord
            .submit_action("c1", "p1", RoundAction::attack("p2", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, CombatError::InvalidCommit { .. }));

        let mut flee = RoundAction::flee(3);
        flee.destination_sector = None;
        let err = coord.submit_action("c1", "p1", flee).await.unwrap_err();
        assert!(matches!(err, CombatError::MissingDestination(_)));

        let enc = coord.get_encounter("c1").await.unwrap();
        assert!(enc.pending_actions.is_empty());
        assert!(err.is_usage_error());
    }

    #[tokio::test(start_paused = true)]
    async fn garrison_cannot_flee() {
        let coord = coordinator();
        let enc = duel("c1").with_participant(CombatantState::garrison("g", "G", 10, "p1"));
        coord.start_encounter(enc, false).await.unwrap();
        let err = coord
            .submit_action("c1", "g", RoundAction::flee(2))
            .await
            .unwrap_err();
        assert!(matches!(err, CombatError::FleeNotAllowed(id) if id == "g"));
    }

    #[tokio::test(start_paused = true)]
    async fn full_submission_resolves_without_timer() {
        let coord = coordinator();
        coord.start_encounter(duel("c1"), false).await.unwrap();

        let first = coord
            .submit_action("c1", "p1", RoundAction::attack("p2", 10))
            .await
            .unwrap();
        assert!(first.is_none());
        let outcome = coord
            .submit_action("c1", "p2", RoundAction::attack("p1", 10))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.round_number, 1);
        assert!(outcome.end_state.is_none());
        let enc = coord.get_encounter("c1").await.unwrap();
        assert_eq!(enc.round_number, 2);
        assert_eq!(enc.logs.len(), 1);
        assert_eq!(enc.logs[0].trigger, ResolveTrigger::Submission);
        assert_eq!(coord.timer_round("c1"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_resolves_missing_actions_as_timed_out_brace() {
        let coord = coordinator();
        coord.start_encounter(duel("c1"), false).await.unwrap();
        coord
            .submit_action("c1", "p1", RoundAction::attack("p2", 10))
            .await
            .unwrap();

        tokio::time::advance(TIMEOUT + Duration::from_secs(1)).await;
        settle_tasks().await;

        let enc = coord.get_encounter("c1").await.unwrap();
        let log = &enc.logs[0];
        assert_eq!(log.trigger, ResolveTrigger::Timeout);
        let p2 = &log.outcome.effective_actions["p2"];
        assert_eq!(p2.action, ActionKind::Brace);
        assert!(p2.timed_out);
        assert!(!log.outcome.effective_actions["p1"].timed_out);
        assert_eq!(enc.round_number, 2);
        assert_eq!(coord.timer_round("c1"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn all_brace_is_terminal_stalemate() {
        let coord = coordinator();
        coord.start_encounter(duel("c1"), false).await.unwrap();
        coord
            .submit_action("c1", "p1", RoundAction::brace())
            .await
            .unwrap();
        let outcome = coord
            .submit_action("c1", "p2", RoundAction::brace())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.end_state, Some(EndState::Stalemate));
        assert_eq!(coord.lookup("c1"), Lookup::Completed);
        assert_eq!(coord.timer_count(), 0);
        assert_eq!(coord.active_count(), 0);

        let err = coord
            .submit_action("c1", "p1", RoundAction::brace())
            .await
            .unwrap_err();
        assert!(matches!(err, CombatError::EncounterEnded(_)));
        assert!(coord.find_encounter_for("p1").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_removes_encounter_and_timer() {
        let coord = coordinator();
        coord.start_encounter(duel("c1"), false).await.unwrap();
        assert!(coord.cancel_encounter("c1").await);
        assert_eq!(coord.lookup("c1"), Lookup::Missing);
        assert_eq!(coord.timer_count(), 0);
        assert!(!coord.cancel_encounter("c1").await);
        assert!(coord.get_encounter("c1").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_completed_record() {
        let coord = coordinator();
        coord.start_encounter(duel("c1"), false).await.unwrap();
        coord
            .submit_action("c1", "p1", RoundAction::brace())
            .await
            .unwrap();
        coord
            .submit_action("c1", "p2", RoundAction::brace())
            .await
            .unwrap();
        assert_eq!(coord.completed_count(), 1);
        assert!(coord.cancel_encounter("c1").await);
        assert_eq!(coord.completed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn add_participant_is_idempotent_and_refuses_fled() {
        let coord = coordinator();
        coord.start_encounter(duel("c1"), false).await.unwrap();
        let p3 = CombatantState::character("p3", "Three", 10, 10, 2);
        assert!(coord.add_participant("c1", p3.clone()).await.unwrap());
        assert!(!coord.add_participant("c1", p3).await.unwrap());

        {
            let handle = coord.active_handle("c1").unwrap();
            handle
                .lock()
                .await
                .context
                .recent_flee_character_ids
                .insert("p4");
        }
        let p4 = CombatantState::character("p4", "Four", 10, 10, 2);
        assert!(!coord.add_participant("c1", p4).await.unwrap());
        assert_eq!(coord.get_encounter("c1").await.unwrap().participants.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn finders_scan_open_encounters() {
        let coord = coordinator();
        coord.start_encounter(duel("c1"), false).await.unwrap();
        let other = CombatEncounter::new("c2", 11)
            .with_participant(CombatantState::character("p9", "Nine", 5, 5, 1))
            .with_participant(CombatantState::character("p8", "Eight", 5, 5, 1));
        coord.start_encounter(other, false).await.unwrap();

        assert_eq!(coord.find_encounter_for("p9").await.unwrap().combat_id, "c2");
        assert_eq!(coord.find_encounter_in_sector(7).await.unwrap().combat_id, "c1");
        assert!(coord.find_encounter_in_sector(99).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn completed_registry_evicts_oldest() {
        let coord =
            CombatCoordinator::new(CoordinatorConfig::default().with_completed_capacity(2));
        for id in ["a", "b", "c"] {
            coord.start_encounter(duel(id), false).await.unwrap();
            coord.submit_action(id, "p1", RoundAction::brace()).await.unwrap();
            coord.submit_action(id, "p2", RoundAction::brace()).await.unwrap();
        }
        assert_eq!(coord.completed_count(), 2);
        assert_eq!(coord.lookup("a"), Lookup::Missing);
        assert_eq!(coord.lookup("c"), Lookup::Completed);
    }

    #[test]
    fn lone_survivor_rules() {
        let owner = CombatantState::character("o", "O", 1, 0, 1);
        let garrison = CombatantState::garrison("g", "G", 5, "o");
        let stranger = CombatantState::character("s", "S", 1, 0, 1);

        let alone = CombatEncounter::new("x", 1).with_participant(owner.clone());
        assert_eq!(lone_survivor(&alone), Some(EndState::Stalemate));

        let with_own_garrison = alone.clone().with_participant(garrison.clone());
        assert_eq!(lone_survivor(&with_own_garrison), Some(EndState::Stalemate));

        let hostile = CombatEncounter::new("x", 1)
            .with_participant(garrison)
            .with_participant(stranger);
        assert_eq!(lone_survivor(&hostile), None);
    }
}
