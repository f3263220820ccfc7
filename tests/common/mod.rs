//! Shared integration-test harness: recording callbacks, encounter fixtures
//! and a helper for running the `skirmish` binary.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::Output;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use skirmish::config::CoordinatorConfig;
use skirmish::coordinator::{CombatCallbacks, CombatCoordinator};
use skirmish::error::CallbackError;
use skirmish::model::{CombatEncounter, CombatRoundOutcome, CombatantState, EndState};

/// Round timeout used by most coordinator tests.
pub const ROUND_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Recording callbacks
// ============================================================================

/// One callback invocation as seen by [`RecordingCallbacks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Waiting { round: u32 },
    Resolved { round: u32, end_state: Option<EndState> },
    Ended { end_state: Option<EndState> },
    Pay { payer_id: String, amount: u64 },
}

/// Which hook a scripted failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Waiting,
    Resolved,
    Ended,
}

/// Callbacks that record every call and can be told to fail.
#[derive(Debug)]
pub struct RecordingCallbacks {
    calls: Mutex<Vec<Recorded>>,
    accept_payments: AtomicBool,
    failure: Mutex<Option<(Hook, CallbackError)>>,
}

impl Default for RecordingCallbacks {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            accept_payments: AtomicBool::new(true),
            failure: Mutex::new(None),
        }
    }
}

impl RecordingCallbacks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn accept_payments(&self, accept: bool) {
        self.accept_payments.store(accept, Ordering::SeqCst);
    }

    /// Makes every later call of `hook` return `error`.
    pub fn fail(&self, hook: Hook, error: CallbackError) {
        *self.failure.lock().unwrap() = Some((hook, error));
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub fn waiting_rounds(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Recorded::Waiting { round } => Some(round),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, hook: Hook) -> usize {
        self.calls()
            .iter()
            .filter(|c| {
                matches!(
                    (c, hook),
                    (Recorded::Waiting { .. }, Hook::Waiting)
                        | (Recorded::Resolved { .. }, Hook::Resolved)
                        | (Recorded::Ended { .. }, Hook::Ended)
                )
            })
            .count()
    }

    fn record(&self, hook: Hook, call: Recorded) -> Result<(), CallbackError> {
        self.calls.lock().unwrap().push(call);
        match &*self.failure.lock().unwrap() {
            Some((failing, error)) if *failing == hook => Err(error.clone()),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl CombatCallbacks for RecordingCallbacks {
    async fn on_round_waiting(&self, encounter: &CombatEncounter) -> Result<(), CallbackError> {
        self.record(
            Hook::Waiting,
            Recorded::Waiting {
                round: encounter.round_number,
            },
        )
    }

    async fn on_round_resolved(
        &self,
        _encounter: &CombatEncounter,
        outcome: &CombatRoundOutcome,
    ) -> Result<(), CallbackError> {
        self.record(
            Hook::Resolved,
            Recorded::Resolved {
                round: outcome.round_number,
                end_state: outcome.end_state.clone(),
            },
        )
    }

    async fn on_combat_ended(
        &self,
        encounter: &CombatEncounter,
        _outcome: &CombatRoundOutcome,
    ) -> Result<(), CallbackError> {
        self.record(
            Hook::Ended,
            Recorded::Ended {
                end_state: encounter.end_state.clone(),
            },
        )
    }

    async fn on_pay_action(&self, payer_id: &str, amount: u64) -> bool {
        self.calls.lock().unwrap().push(Recorded::Pay {
            payer_id: payer_id.to_string(),
            amount,
        });
        self.accept_payments.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Coordinator with the test round timeout wired to `callbacks`.
pub fn coordinator(callbacks: &Arc<RecordingCallbacks>) -> Arc<CombatCoordinator> {
    CombatCoordinator::with_callbacks(
        CoordinatorConfig::default().with_round_timeout(ROUND_TIMEOUT),
        Arc::clone(callbacks) as Arc<dyn CombatCallbacks>,
    )
}

/// Two evenly matched characters in sector 7.
pub fn duel(combat_id: &str) -> CombatEncounter {
    CombatEncounter::new(combat_id, 7)
        .with_participant(CombatantState::character("p1", "One", 300, 150, 3))
        .with_participant(CombatantState::character("p2", "Two", 300, 150, 3))
}

/// Lets spawned timer tasks run after the paused clock was advanced.
pub async fn settle_tasks() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Binary runner
// ============================================================================

/// Runs the compiled `skirmish` binary.
pub struct SkirmishProcess;

impl SkirmishProcess {
    /// Runs `skirmish <args>` to completion and returns its output.
    pub fn spawn_command(args: &[&str]) -> Output {
        std::process::Command::new(env!("CARGO_BIN_EXE_skirmish"))
            .args(args)
            .env_remove("SKIRMISH_ROUND_TIMEOUT")
            .env_remove("SKIRMISH_AUTO_GARRISON")
            .env_remove("SKIRMISH_EVENTS_FILE")
            .env_remove("SKIRMISH_METRICS_PORT")
            .output()
            .expect("failed to run skirmish")
    }

    /// Absolute path of a file under `tests/fixtures`.
    pub fn fixture_path(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }
}
