//! Combatant and garrison value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of participant in an encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatantType {
    /// Player- or agent-controlled ship.
    Character,
    /// Autonomous sector defense.
    Garrison,
}

/// Combat-relevant snapshot of a participant.
///
/// Only the coordinator mutates these, after each engine run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatantState {
    /// Unique participant id within the encounter.
    pub id: String,
    /// Character or garrison.
    #[serde(rename = "type")]
    pub combatant_type: CombatantType,
    /// Display name.
    pub name: String,
    /// Current fighters.
    pub fighters: u32,
    /// Current shield points.
    pub shields: u32,
    /// Fighter capacity.
    pub max_fighters: u32,
    /// Shield capacity.
    pub max_shields: u32,
    /// Mobility stat; higher values act earlier and flee more easily.
    pub turns_per_warp: u32,
    /// Controlling character for garrisons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl CombatantState {
    /// Creates a character at full strength.
    #[must_use]
    pub fn character(
        id: impl Into<String>,
        name: impl Into<String>,
        fighters: u32,
        shields: u32,
        turns_per_warp: u32,
    ) -> Self {
        Self {
            id: id.into(),
            combatant_type: CombatantType::Character,
            name: name.into(),
            fighters,
            shields,
            max_fighters: fighters,
            max_shields: shields,
            turns_per_warp,
            owner_id: None,
        }
    }

    /// Creates a garrison participant owned by `owner_id`.
    ///
    /// Garrisons carry no shields and have no mobility.
    #[must_use]
    pub fn garrison(
        id: impl Into<String>,
        name: impl Into<String>,
        fighters: u32,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            combatant_type: CombatantType::Garrison,
            name: name.into(),
            fighters,
            shields: 0,
            max_fighters: fighters,
            max_shields: 0,
            turns_per_warp: 0,
            owner_id: Some(owner_id.into()),
        }
    }

    /// Overrides capacities (e.g. for a damaged ship).
    #[must_use]
    pub const fn with_capacity(mut self, max_fighters: u32, max_shields: u32) -> Self {
        self.max_fighters = max_fighters;
        self.max_shields = max_shields;
        self
    }

    /// Returns `true` for garrisons.
    #[must_use]
    pub fn is_garrison(&self) -> bool {
        self.combatant_type == CombatantType::Garrison
    }

    /// Returns `true` for characters.
    #[must_use]
    pub fn is_character(&self) -> bool {
        self.combatant_type == CombatantType::Character
    }

    /// Whether this combatant is allowed to attempt a flee.
    #[must_use]
    pub fn can_flee(&self) -> bool {
        !self.is_garrison() && self.turns_per_warp > 0
    }

    /// Alliance key: a garrison fights on its owner's side.
    #[must_use]
    pub fn side(&self) -> &str {
        match (&self.combatant_type, &self.owner_id) {
            (CombatantType::Garrison, Some(owner)) => owner,
            _ => &self.id,
        }
    }

    /// Whether `other` is on a different side.
    #[must_use]
    pub fn is_hostile_to(&self, other: &Self) -> bool {
        self.side() != other.side()
    }

    /// Shield fill ratio in `[0, 1]`.
    #[must_use]
    pub fn shield_ratio(&self) -> f64 {
        if self.max_shields == 0 {
            0.0
        } else {
            (f64::from(self.shields) / f64::from(self.max_shields)).clamp(0.0, 1.0)
        }
    }
}

/// Garrison posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GarrisonMode {
    /// Attacks every hostile in the sector.
    Offensive,
    /// Returns fire only when attacked.
    Defensive,
    /// Demands a credit payment before standing down.
    Toll,
}

impl std::fmt::Display for GarrisonMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Offensive => "offensive",
            Self::Defensive => "defensive",
            Self::Toll => "toll",
        })
    }
}

/// A garrison as held by the external garrison store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarrisonState {
    /// Character that deployed the garrison.
    pub owner_id: String,
    /// Deployed fighters.
    pub fighters: u32,
    /// Current posture.
    pub mode: GarrisonMode,
    /// Credits demanded in toll mode.
    #[serde(default)]
    pub toll_amount: u64,
    /// Credits collected so far.
    #[serde(default)]
    pub toll_balance: u64,
    /// When the garrison was placed.
    pub deployed_at: DateTime<Utc>,
}
