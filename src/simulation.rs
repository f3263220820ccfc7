//! Headless simulation driver.
//!
//! Runs a scenario file through a real [`CombatCoordinator`]: characters
//! follow their scripts, garrisons use the planner, toll payments are drawn
//! from a per-run credit ledger, and every notification is written to the
//! JSONL event stream.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{CoordinatorConfig, CoordinatorSection, Scenario};
use crate::coordinator::{CombatCallbacks, CombatCoordinator};
use crate::error::{CallbackError, SkirmishError};
use crate::model::{CombatEncounter, CombatRoundOutcome, EndState};
use crate::observability::{Event, EventEmitter};
use crate::sector::encounter_from_scenario;

/// Rounds a simulation may run before it is cancelled.
pub const DEFAULT_MAX_ROUNDS: u32 = 100;

// ============================================================================
// Callbacks
// ============================================================================

/// Progress signal from the callbacks to the driver loop.
#[derive(Debug)]
enum Signal {
    Waiting(Box<CombatEncounter>),
    Ended,
}

/// Credits available to each character, debited by toll payments.
#[derive(Debug, Default)]
pub struct CreditLedger {
    balances: Mutex<BTreeMap<String, u64>>,
}

impl CreditLedger {
    /// Creates a ledger from starting balances.
    #[must_use]
    pub fn new(balances: BTreeMap<String, u64>) -> Self {
        Self {
            balances: Mutex::new(balances),
        }
    }

    /// Deducts `amount` from `id` if the balance covers it.
    pub fn debit(&self, id: &str, amount: u64) -> bool {
        let mut balances = self.balances.lock().unwrap_or_else(PoisonError::into_inner);
        match balances.get_mut(id) {
            Some(balance) if *balance >= amount => {
                *balance -= amount;
                true
            }
            _ => false,
        }
    }

    /// Current balance of `id`.
    #[must_use]
    pub fn balance(&self, id: &str) -> u64 {
        self.snapshot().get(id).copied().unwrap_or(0)
    }

    /// Copy of every balance.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.balances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Callbacks that write the event stream and settle tolls from a ledger.
pub struct EventCallbacks {
    emitter: Arc<EventEmitter>,
    ledger: Arc<CreditLedger>,
    signals: Option<mpsc::UnboundedSender<Signal>>,
}

impl std::fmt::Debug for EventCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCallbacks")
            .field("emitter", &self.emitter)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl EventCallbacks {
    /// Creates callbacks writing to `emitter` and paying from `ledger`.
    #[must_use]
    pub const fn new(emitter: Arc<EventEmitter>, ledger: Arc<CreditLedger>) -> Self {
        Self {
            emitter,
            ledger,
            signals: None,
        }
    }

    fn with_signals(mut self, signals: mpsc::UnboundedSender<Signal>) -> Self {
        self.signals = Some(signals);
        self
    }

    fn signal(&self, signal: Signal) {
        if let Some(tx) = &self.signals {
            let _ = tx.send(signal);
        }
    }
}

#[async_trait]
impl CombatCallbacks for EventCallbacks {
    async fn on_round_waiting(&self, encounter: &CombatEncounter) -> Result<(), CallbackError> {
        self.emitter.emit(Event::round_waiting(encounter));
        self.signal(Signal::Waiting(Box::new(encounter.clone())));
        Ok(())
    }

    async fn on_round_resolved(
        &self,
        encounter: &CombatEncounter,
        outcome: &CombatRoundOutcome,
    ) -> Result<(), CallbackError> {
        self.emitter.emit(Event::round_resolved(encounter, outcome));
        Ok(())
    }

    async fn on_combat_ended(
        &self,
        encounter: &CombatEncounter,
        outcome: &CombatRoundOutcome,
    ) -> Result<(), CallbackError> {
        self.emitter.emit(Event::combat_ended(encounter, outcome));
        self.signal(Signal::Ended);
        Ok(())
    }

    async fn on_pay_action(&self, payer_id: &str, amount: u64) -> bool {
        let paid = self.ledger.debit(payer_id, amount);
        if paid {
            self.emitter.emit(Event::TollPaid {
                timestamp: Utc::now(),
                payer_id: payer_id.to_string(),
                amount,
            });
        } else {
            debug!(payer_id, amount, "insufficient credits for toll");
        }
        paid
    }
}

// ============================================================================
// Report
// ============================================================================

/// Final state of one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Survivor {
    /// Fighters left.
    pub fighters: u32,
    /// Shields left.
    pub shields: u32,
}

/// Summary of a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    /// Encounter id.
    pub combat_id: String,
    /// Terminal tag; `None` when the run was cut short.
    pub end_state: Option<EndState>,
    /// Rounds resolved.
    pub rounds: u32,
    /// Participants left with fighters.
    pub survivors: BTreeMap<String, Survivor>,
    /// Characters that escaped.
    pub fled: Vec<String>,
    /// Toll collected per garrison, including earlier balances.
    pub toll_balances: BTreeMap<String, u64>,
    /// Credits left per character.
    pub credits: BTreeMap<String, u64>,
    /// Whether the round limit stopped the run.
    pub truncated: bool,
}

impl SimulationReport {
    fn from_encounter(enc: &CombatEncounter, credits: BTreeMap<String, u64>, truncated: bool) -> Self {
        Self {
            combat_id: enc.combat_id.clone(),
            end_state: enc.end_state.clone(),
            rounds: u32::try_from(enc.logs.len()).unwrap_or(u32::MAX),
            survivors: enc
                .participants
                .values()
                .filter(|p| p.fighters > 0)
                .map(|p| {
                    let survivor = Survivor {
                        fighters: p.fighters,
                        shields: p.shields,
                    };
                    (p.id.clone(), survivor)
                })
                .collect(),
            fled: enc.context.recent_flee_character_ids.iter().cloned().collect(),
            toll_balances: enc
                .context
                .toll_registry
                .iter()
                .map(|(id, entry)| (id.clone(), entry.toll_balance))
                .collect(),
            credits,
            truncated,
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Runs scenarios through the coordinator.
#[derive(Debug)]
pub struct Simulation {
    config: CoordinatorConfig,
    overrides: Option<CoordinatorSection>,
    emitter: Arc<EventEmitter>,
    max_rounds: u32,
}

impl Simulation {
    /// Creates a driver using `config` as the base coordinator settings.
    #[must_use]
    pub const fn new(config: CoordinatorConfig, emitter: Arc<EventEmitter>) -> Self {
        Self {
            config,
            overrides: None,
            emitter,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Settings applied after the scenario's own `coordinator` block.
    #[must_use]
    pub fn overrides(mut self, section: CoordinatorSection) -> Self {
        self.overrides = Some(section);
        self
    }

    /// Overrides the round limit.
    #[must_use]
    pub const fn max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Runs `scenario` to completion.
    ///
    /// The scenario's `coordinator` block overrides the base settings and
    /// is itself overridden by [`overrides`](Self::overrides).
    ///
    /// # Errors
    ///
    /// Returns a config error for an invalid `coordinator` block and a
    /// combat error if the encounter cannot be started.
    pub async fn run(&self, scenario: &Scenario) -> Result<SimulationReport, SkirmishError> {
        let mut config = self.config.clone();
        for section in scenario.coordinator.iter().chain(&self.overrides) {
            config.apply(section)?;
        }
        let auto_garrisons = config.auto_garrison_actions;

        let combat_id = scenario
            .combat_id
            .clone()
            .unwrap_or_else(|| format!("sim-{}", Uuid::new_v4()));
        let encounter = encounter_from_scenario(scenario, &combat_id);
        let ledger = Arc::new(CreditLedger::new(
            scenario
                .characters
                .iter()
                .map(|c| (c.id.clone(), c.credits))
                .collect(),
        ));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let callbacks = EventCallbacks::new(Arc::clone(&self.emitter), Arc::clone(&ledger))
            .with_signals(tx);
        let coordinator = CombatCoordinator::with_callbacks(config, Arc::new(callbacks));

        let started = coordinator.start_encounter(encounter, false).await?;
        self.emitter.emit(Event::encounter_started(&started));
        info!(combat_id = %combat_id, "simulation started");
        coordinator.emit_round_waiting(&combat_id).await?;

        let mut truncated = false;
        let mut last_seen = started;
        while let Some(signal) = rx.recv().await {
            let snapshot = match signal {
                Signal::Ended => break,
                Signal::Waiting(snapshot) => *snapshot,
            };
            if snapshot.round_number > self.max_rounds {
                warn!(combat_id = %combat_id, max_rounds = self.max_rounds, "round limit reached; cancelling");
                last_seen = coordinator
                    .get_encounter(&combat_id)
                    .await
                    .unwrap_or(snapshot);
                coordinator.cancel_encounter(&combat_id).await;
                truncated = true;
                break;
            }
            submit_scripts(&coordinator, scenario, &snapshot).await;
            if !auto_garrisons {
                if let Err(err) = coordinator.submit_garrison_actions(&combat_id).await {
                    debug!(combat_id = %combat_id, error = %err, "garrison actions not submitted");
                }
            }
            last_seen = snapshot;
        }

        let last = if truncated {
            last_seen
        } else {
            coordinator
                .get_encounter(&combat_id)
                .await
                .unwrap_or(last_seen)
        };
        coordinator.shutdown();

        let report = SimulationReport::from_encounter(&last, ledger.snapshot(), truncated);
        self.emitter.emit(Event::SimulationFinished {
            timestamp: Utc::now(),
            combat_id: report.combat_id.clone(),
            rounds: report.rounds,
            end_state: report.end_state.as_ref().map(ToString::to_string),
        });
        info!(
            combat_id = %report.combat_id,
            rounds = report.rounds,
            end_state = ?report.end_state,
            "simulation finished"
        );
        Ok(report)
    }
}

/// Submits this round's scripted character actions concurrently.
///
/// Characters without an entry (or with `wait`) are left to the deadline.
async fn submit_scripts(
    coordinator: &Arc<CombatCoordinator>,
    scenario: &Scenario,
    snapshot: &CombatEncounter,
) {
    let index = usize::try_from(snapshot.round_number.saturating_sub(1)).unwrap_or(usize::MAX);
    let submissions = scenario.characters.iter().filter_map(|character| {
        let participant = snapshot.participants.get(&character.id)?;
        let action = character
            .script
            .get(index)?
            .to_round_action(participant.fighters)?;
        Some(async move {
            let result = coordinator
                .submit_action(&snapshot.combat_id, &character.id, action)
                .await;
            (character.id.as_str(), result)
        })
    });

    for (combatant_id, result) in join_all(submissions).await {
        if let Err(err) = result {
            warn!(
                combat_id = %snapshot.combat_id,
                combatant_id,
                round = snapshot.round_number,
                error = %err,
                "scripted action rejected"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_refuses_overdraft() {
        let ledger = CreditLedger::new(BTreeMap::from([("p1".to_string(), 150)]));
        assert!(ledger.debit("p1", 100));
        assert!(!ledger.debit("p1", 100));
        assert!(!ledger.debit("ghost", 1));
        assert_eq!(ledger.balance("p1"), 50);
    }

    #[tokio::test]
    async fn callbacks_pay_from_ledger() {
        let ledger = Arc::new(CreditLedger::new(BTreeMap::from([("p1".to_string(), 100)])));
        let emitter = Arc::new(EventEmitter::noop());
        let callbacks = EventCallbacks::new(Arc::clone(&emitter), Arc::clone(&ledger));

        assert!(callbacks.on_pay_action("p1", 100).await);
        assert!(!callbacks.on_pay_action("p1", 1).await);
        assert_eq!(emitter.event_count(), 1);
        assert_eq!(ledger.balance("p1"), 0);
    }

    #[tokio::test]
    async fn scripted_duel_runs_to_an_end() {
        let scenario: Scenario = serde_yaml::from_str(
            r"
combat_id: sim-duel
sector_id: 3
seed: 9
characters:
  - id: p1
    fighters: 20
    script:
      - action: brace
  - id: p2
    fighters: 20
    script:
      - action: brace
",
        )
        .unwrap();
        let sim = Simulation::new(CoordinatorConfig::default(), Arc::new(EventEmitter::noop()));
        let report = sim.run(&scenario).await.unwrap();

        assert_eq!(report.combat_id, "sim-duel");
        assert_eq!(report.end_state, Some(EndState::Stalemate));
        assert_eq!(report.rounds, 1);
        assert_eq!(report.survivors.len(), 2);
        assert!(!report.truncated);
    }
}
