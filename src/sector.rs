//! Sector encounter builder
//!
//! Turns the ships and garrisons present in a sector into a ready-to-start
//! [`CombatEncounter`]: garrisons become participants on their owner's side,
//! their origin is recorded in `garrison_sources`, and toll garrisons get a
//! demand in the toll registry.

use chrono::Utc;

use crate::config::schema::{CharacterSpec, GarrisonSpec, Scenario};
use crate::model::{
    CombatEncounter, CombatantState, GarrisonMode, GarrisonSource, GarrisonState, TollEntry,
};

/// Participant id of the garrison `owner_id` keeps in `sector_id`.
#[must_use]
pub fn garrison_participant_id(sector_id: u32, owner_id: &str) -> String {
    format!("garrison:{sector_id}:{owner_id}")
}

/// Builds an encounter for one sector.
#[derive(Debug, Clone)]
pub struct EncounterBuilder {
    combat_id: String,
    sector_id: u32,
    seed: Option<u64>,
    characters: Vec<CombatantState>,
    garrisons: Vec<GarrisonState>,
}

impl EncounterBuilder {
    /// Starts a builder for `combat_id` in `sector_id`.
    #[must_use]
    pub fn new(combat_id: impl Into<String>, sector_id: u32) -> Self {
        Self {
            combat_id: combat_id.into(),
            sector_id,
            seed: None,
            characters: Vec::new(),
            garrisons: Vec::new(),
        }
    }

    /// Overrides the RNG seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Adds a character ship.
    #[must_use]
    pub fn character(mut self, state: CombatantState) -> Self {
        self.characters.push(state);
        self
    }

    /// Adds a garrison from the garrison store.
    #[must_use]
    pub fn garrison(mut self, garrison: GarrisonState) -> Self {
        self.garrisons.push(garrison);
        self
    }

    /// Builds the encounter.
    #[must_use]
    pub fn build(self) -> CombatEncounter {
        let mut encounter = CombatEncounter::new(self.combat_id, self.sector_id);
        if let Some(seed) = self.seed {
            encounter.base_seed = seed;
        }

        for character in self.characters {
            encounter.add_participant(character);
        }

        for garrison in &self.garrisons {
            let id = garrison_participant_id(self.sector_id, &garrison.owner_id);
            let name = format!("{}'s garrison", garrison.owner_id);
            let state =
                CombatantState::garrison(&id, name, garrison.fighters, garrison.owner_id.clone());
            if !encounter.add_participant(state) {
                continue;
            }

            encounter.context.garrison_sources.push(GarrisonSource {
                participant_id: id.clone(),
                owner_id: garrison.owner_id.clone(),
                sector_id: self.sector_id,
                mode: garrison.mode,
                toll_amount: garrison.toll_amount,
                deployed_at: garrison.deployed_at,
            });

            if garrison.mode == GarrisonMode::Toll {
                let target = strongest_intruder(&encounter, &garrison.owner_id);
                let mut entry =
                    TollEntry::new(garrison.toll_amount, Some(garrison.owner_id.clone()), target);
                entry.toll_balance = garrison.toll_balance;
                encounter.context.toll_registry.insert(id, entry);
            }
        }

        encounter
    }
}

/// The non-owner character with the most fighters; ties go to the lower id.
fn strongest_intruder(encounter: &CombatEncounter, owner_id: &str) -> Option<String> {
    encounter
        .participants
        .values()
        .filter(|p| p.is_character() && p.id != owner_id)
        .max_by(|a, b| a.fighters.cmp(&b.fighters).then_with(|| b.id.cmp(&a.id)))
        .map(|p| p.id.clone())
}

impl From<&CharacterSpec> for CombatantState {
    fn from(spec: &CharacterSpec) -> Self {
        let name = spec.name.clone().unwrap_or_else(|| spec.id.clone());
        Self::character(
            spec.id.clone(),
            name,
            spec.fighters,
            spec.shields,
            spec.turns_per_warp,
        )
        .with_capacity(
            spec.max_fighters.unwrap_or(spec.fighters),
            spec.max_shields.unwrap_or(spec.shields),
        )
    }
}

impl From<&GarrisonSpec> for GarrisonState {
    fn from(spec: &GarrisonSpec) -> Self {
        Self {
            owner_id: spec.owner_id.clone(),
            fighters: spec.fighters,
            mode: spec.mode,
            toll_amount: spec.toll_amount,
            toll_balance: spec.toll_balance,
            deployed_at: Utc::now(),
        }
    }
}

/// Builds the encounter described by a scenario.
#[must_use]
pub fn encounter_from_scenario(scenario: &Scenario, combat_id: &str) -> CombatEncounter {
    let mut builder = EncounterBuilder::new(combat_id, scenario.sector_id);
    if let Some(seed) = scenario.seed {
        builder = builder.seed(seed);
    }
    for character in &scenario.characters {
        builder = builder.character(character.into());
    }
    for garrison in &scenario.garrisons {
        builder = builder.garrison(garrison.into());
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CombatantType, seed_from_combat_id};

    fn garrison(owner: &str, mode: GarrisonMode, toll: u64) -> GarrisonState {
        GarrisonState {
            owner_id: owner.into(),
            fighters: 40,
            mode,
            toll_amount: toll,
            toll_balance: 5,
            deployed_at: Utc::now(),
        }
    }

    #[test]
    fn garrison_becomes_participant_on_owner_side() {
        let enc = EncounterBuilder::new("c1", 9)
            .character(CombatantState::character("owner", "O", 10, 10, 2))
            .garrison(garrison("owner", GarrisonMode::Defensive, 0))
            .build();
        let g = &enc.participants["garrison:9:owner"];
        assert_eq!(g.combatant_type, CombatantType::Garrison);
        assert_eq!(g.side(), "owner");
        assert_eq!(g.turns_per_warp, 0);
        assert_eq!(enc.context.garrison_sources.len(), 1);
        assert!(enc.context.toll_registry.is_empty());
        assert_eq!(enc.base_seed, seed_from_combat_id("c1"));
    }

    #[test]
    fn toll_garrison_targets_strongest_intruder() {
        let enc = EncounterBuilder::new("c1", 3)
            .character(CombatantState::character("owner", "O", 500, 10, 2))
            .character(CombatantState::character("b", "B", 80, 10, 2))
            .character(CombatantState::character("a", "A", 80, 10, 2))
            .character(CombatantState::character("c", "C", 20, 10, 2))
            .garrison(garrison("owner", GarrisonMode::Toll, 100))
            .seed(77)
            .build();
        let entry = enc.context.toll_registry.get("garrison:3:owner").unwrap();
        assert_eq!(entry.target_id.as_deref(), Some("a"));
        assert_eq!(entry.toll_amount, 100);
        assert_eq!(entry.toll_balance, 5);
        assert_eq!(entry.owner_id.as_deref(), Some("owner"));
        assert!(!entry.paid);
        assert_eq!(enc.base_seed, 77);
    }

    #[test]
    fn duplicate_garrison_is_ignored() {
        let enc = EncounterBuilder::new("c1", 3)
            .garrison(garrison("x", GarrisonMode::Offensive, 0))
            .garrison(garrison("x", GarrisonMode::Toll, 50))
            .build();
        assert_eq!(enc.participants.len(), 1);
        assert!(enc.context.toll_registry.is_empty());
    }

    #[test]
    fn scenario_conversion_applies_capacities() {
        let scenario: Scenario = serde_yaml::from_str(
            "sector_id: 2\ncharacters:\n  - id: p1\n    name: Pilot\n    fighters: 10\n    max_fighters: 50\n",
        )
        .unwrap();
        let enc = encounter_from_scenario(&scenario, "from-file");
        let p1 = &enc.participants["p1"];
        assert_eq!(p1.name, "Pilot");
        assert_eq!(p1.max_fighters, 50);
        assert_eq!(p1.max_shields, 0);
        assert_eq!(enc.combat_id, "from-file");
    }
}
