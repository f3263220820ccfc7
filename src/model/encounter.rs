//! The encounter container the coordinator mutates round by round.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::RoundAction;
use super::combatant::CombatantState;
use super::context::EncounterContext;
use super::outcome::{CombatRoundOutcome, EndState};

/// What caused a round to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveTrigger {
    /// Every participant submitted before the deadline.
    Submission,
    /// The round deadline passed.
    Timeout,
}

impl ResolveTrigger {
    /// Metrics/log label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submission => "submission",
            Self::Timeout => "timeout",
        }
    }
}

/// One entry of the append-only round history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundLog {
    /// Resolved round.
    pub round_number: u32,
    /// Why it resolved.
    pub trigger: ResolveTrigger,
    /// Final outcome, including coordinator overrides.
    pub outcome: CombatRoundOutcome,
    /// Wall-clock resolution time.
    pub resolved_at: DateTime<Utc>,
}

/// One ongoing (or finished) battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatEncounter {
    /// Unique encounter id.
    pub combat_id: String,
    /// Sector the battle takes place in.
    pub sector_id: u32,
    /// Current participants keyed by id.
    pub participants: BTreeMap<String, CombatantState>,
    /// Actions received for the current round.
    #[serde(default)]
    pub pending_actions: BTreeMap<String, RoundAction>,
    /// Current round, starting at 1.
    pub round_number: u32,
    /// Deadline of the current round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Whether the encounter is over.
    #[serde(default)]
    pub ended: bool,
    /// Terminal tag once ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_state: Option<EndState>,
    /// Round history.
    #[serde(default)]
    pub logs: Vec<RoundLog>,
    /// Toll, garrison and flee bookkeeping.
    #[serde(default)]
    pub context: EncounterContext,
    /// Seed for the round RNG.
    pub base_seed: u64,
}

impl CombatEncounter {
    /// Creates an encounter whose seed is derived from `combat_id`.
    #[must_use]
    pub fn new(combat_id: impl Into<String>, sector_id: u32) -> Self {
        let combat_id = combat_id.into();
        let base_seed = seed_from_combat_id(&combat_id);
        Self {
            combat_id,
            sector_id,
            participants: BTreeMap::new(),
            pending_actions: BTreeMap::new(),
            round_number: 1,
            deadline: None,
            ended: false,
            end_state: None,
            logs: Vec::new(),
            context: EncounterContext::default(),
            base_seed,
        }
    }

    /// Overrides the RNG seed.
    #[must_use]
    pub const fn with_seed(mut self, base_seed: u64) -> Self {
        self.base_seed = base_seed;
        self
    }

    /// Adds a participant, keeping an existing entry with the same id.
    ///
    /// Returns `true` if the participant was new.
    pub fn add_participant(&mut self, state: CombatantState) -> bool {
        if self.participants.contains_key(&state.id) {
            return false;
        }
        self.participants.insert(state.id.clone(), state);
        true
    }

    /// Builder-style [`add_participant`](Self::add_participant).
    #[must_use]
    pub fn with_participant(mut self, state: CombatantState) -> Self {
        self.add_participant(state);
        self
    }

    /// Whether `id` is a current participant.
    #[must_use]
    pub fn has_participant(&self, id: &str) -> bool {
        self.participants.contains_key(id)
    }

    /// Whether every current participant has a pending action.
    #[must_use]
    pub fn all_actions_submitted(&self) -> bool {
        !self.participants.is_empty()
            && self
                .participants
                .keys()
                .all(|id| self.pending_actions.contains_key(id))
    }

    /// Most recent round log.
    #[must_use]
    pub fn last_log(&self) -> Option<&RoundLog> {
        self.logs.last()
    }
}

/// Stable 64-bit FNV-1a hash of the combat id.
#[must_use]
pub fn seed_from_combat_id(combat_id: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    combat_id.bytes().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    })
}
