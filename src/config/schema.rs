//! Scenario file schema.
//!
//! A scenario describes one encounter: the sector, the characters (with
//! credits for the toll economy and a per-round action script) and the
//! garrisons deployed there.

use serde::{Deserialize, Serialize};

use crate::model::{GarrisonMode, RoundAction};

// ============================================================================
// Top-Level Scenario
// ============================================================================

/// Root of a scenario file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct Scenario {
    /// Encounter id; a random one is generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combat_id: Option<String>,

    /// Sector the battle takes place in.
    pub sector_id: u32,

    /// RNG seed; derived from the combat id when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Coordinator overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<CoordinatorSection>,

    /// Player ships.
    #[serde(default)]
    pub characters: Vec<CharacterSpec>,

    /// Garrisons deployed in the sector.
    #[serde(default)]
    pub garrisons: Vec<GarrisonSpec>,
}

/// `coordinator` block of a scenario.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct CoordinatorSection {
    /// Round timeout such as `"2s"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_timeout: Option<String>,

    /// Completed registry bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_capacity: Option<usize>,

    /// Let garrisons act on their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_garrison_actions: Option<bool>,
}

// ============================================================================
// Participants
// ============================================================================

/// A player ship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct CharacterSpec {
    /// Character id.
    pub id: String,

    /// Display name; defaults to the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Fighters aboard.
    pub fighters: u32,

    /// Shield points.
    #[serde(default)]
    pub shields: u32,

    /// Hull fighter capacity; defaults to `fighters`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fighters: Option<u32>,

    /// Hull shield capacity; defaults to `shields`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_shields: Option<u32>,

    /// Mobility.
    #[serde(default = "default_turns_per_warp")]
    pub turns_per_warp: u32,

    /// Credits available for toll payments.
    #[serde(default)]
    pub credits: u64,

    /// Actions per round; round `n` uses entry `n - 1`.
    #[serde(default)]
    pub script: Vec<ScriptedAction>,
}

const fn default_turns_per_warp() -> u32 {
    3
}

/// A garrison deployed in the scenario's sector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct GarrisonSpec {
    /// Controlling character.
    pub owner_id: String,

    /// Fighters stationed.
    pub fighters: u32,

    /// Behavior.
    pub mode: GarrisonMode,

    /// Credits demanded in toll mode.
    #[serde(default)]
    pub toll_amount: u64,

    /// Credits already collected before this encounter.
    #[serde(default)]
    pub toll_balance: u64,
}

// ============================================================================
// Scripts
// ============================================================================

/// Kind of a scripted round action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptedKind {
    /// ATTACK `target` with `commit` fighters.
    Attack,
    /// BRACE.
    Brace,
    /// FLEE to `destination`.
    Flee,
    /// PAY the toll of `target` (or the first open demand).
    Pay,
    /// Submit nothing and let the round time out.
    Wait,
}

/// One entry of a character script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ScriptedAction {
    /// Action kind.
    pub action: ScriptedKind,

    /// ATTACK/PAY target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Fighters committed; defaults to all current fighters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<u32>,

    /// FLEE destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<u32>,
}

impl ScriptedAction {
    /// Converts the entry into a round action.
    ///
    /// `current_fighters` fills in a missing ATTACK commitment. Returns
    /// `None` for `wait`. Structural problems (missing target or
    /// destination) are left for the coordinator to reject.
    #[must_use]
    pub fn to_round_action(&self, current_fighters: u32) -> Option<RoundAction> {
        let action = match self.action {
            ScriptedKind::Attack => RoundAction::attack(
                self.target.clone().unwrap_or_default(),
                self.commit.unwrap_or(current_fighters),
            ),
            ScriptedKind::Brace => RoundAction::brace(),
            ScriptedKind::Flee => RoundAction {
                destination_sector: self.destination,
                ..RoundAction::flee(0)
            },
            ScriptedKind::Pay => RoundAction::pay(self.target.clone()),
            ScriptedKind::Wait => return None,
        };
        Some(action)
    }
}

// ============================================================================
// Tests
// ============================================================================
