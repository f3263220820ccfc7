//! Scripted garrison behavior.
//!
//! Garrisons have no player behind them; [`plan_garrison_action`] derives
//! their action for the current round from their posture, the toll registry
//! and the previous round's log.

use crate::model::{ActionKind, CombatEncounter, CombatantState, GarrisonMode, RoundAction};

/// Plans the current round's action for `garrison_id`.
///
/// Returns `None` when `garrison_id` is not a garrison participant.
#[must_use]
pub fn plan_garrison_action(encounter: &CombatEncounter, garrison_id: &str) -> Option<RoundAction> {
    let garrison = encounter.participants.get(garrison_id)?;
    if !garrison.is_garrison() {
        return None;
    }
    if garrison.fighters == 0 {
        return Some(RoundAction::brace());
    }

    let action = match garrison_mode(encounter, garrison_id) {
        GarrisonMode::Offensive => strongest_hostile(encounter, garrison).map_or_else(
            RoundAction::brace,
            |target| RoundAction::attack(target, garrison.fighters),
        ),
        GarrisonMode::Defensive => plan_defensive(encounter, garrison),
        GarrisonMode::Toll => plan_toll(encounter, garrison),
    };
    Some(action)
}

/// Posture recorded for the garrison when the encounter was built.
fn garrison_mode(encounter: &CombatEncounter, garrison_id: &str) -> GarrisonMode {
    if let Some(source) = encounter.context.garrison_sources.find(garrison_id) {
        return source.mode;
    }
    if encounter.context.toll_registry.get(garrison_id).is_some() {
        GarrisonMode::Toll
    } else {
        GarrisonMode::Defensive
    }
}

fn plan_defensive(encounter: &CombatEncounter, garrison: &CombatantState) -> RoundAction {
    let Some(attacker) = last_attacker(encounter, garrison) else {
        return RoundAction::brace();
    };
    RoundAction::attack(attacker, (garrison.fighters / 2).max(1))
}

fn plan_toll(encounter: &CombatEncounter, garrison: &CombatantState) -> RoundAction {
    let Some(entry) = encounter.context.toll_registry.get(&garrison.id) else {
        return plan_defensive(encounter, garrison);
    };
    if entry.paid || encounter.round_number <= entry.demand_round {
        return RoundAction::brace();
    }

    let demanded = entry.target_id.as_deref().filter(|id| {
        encounter
            .participants
            .get(*id)
            .is_some_and(|p| p.fighters > 0 && garrison.is_hostile_to(p))
    });
    demanded
        .map(str::to_string)
        .or_else(|| strongest_hostile(encounter, garrison))
        .map_or_else(RoundAction::brace, |target| {
            RoundAction::attack(target, garrison.fighters)
        })
}

/// Hostile character with the most fighters; ties go to the lower id.
fn strongest_hostile(encounter: &CombatEncounter, garrison: &CombatantState) -> Option<String> {
    encounter
        .participants
        .values()
        .filter(|p| p.is_character() && p.fighters > 0 && garrison.is_hostile_to(p))
        .max_by(|a, b| a.fighters.cmp(&b.fighters).then_with(|| b.id.cmp(&a.id)))
        .map(|p| p.id.clone())
}

/// Largest hostile attack aimed at the garrison in the previous round.
fn last_attacker(encounter: &CombatEncounter, garrison: &CombatantState) -> Option<String> {
    let log = encounter.last_log()?;
    log.outcome
        .effective_actions
        .iter()
        .filter(|(_, action)| {
            action.action == ActionKind::Attack
                && action.target_id.as_deref() == Some(garrison.id.as_str())
        })
        .filter(|(id, _)| {
            encounter
                .participants
                .get(id.as_str())
                .is_some_and(|p| p.fighters > 0 && garrison.is_hostile_to(p))
        })
        .max_by(|(a_id, a), (b_id, b)| a.commit.cmp(&b.commit).then_with(|| b_id.cmp(a_id)))
        .map(|(id, _)| id.clone())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::{CombatRoundOutcome, GarrisonState, ResolveTrigger, RoundLog};
    use crate::sector::EncounterBuilder;

    const GID: &str = "garrison:5:owner";

    fn encounter(mode: GarrisonMode) -> CombatEncounter {
        EncounterBuilder::new("g", 5)
            .character(CombatantState::character("owner", "O", 10, 0, 2))
            .character(CombatantState::character("big", "Big", 90, 0, 2))
            .character(CombatantState::character("small", "Small", 10, 0, 2))
            .garrison(GarrisonState {
                owner_id: "owner".into(),
                fighters: 41,
                mode,
                toll_amount: 100,
                toll_balance: 0,
                deployed_at: Utc::now(),
            })
            .build()
    }

    fn attacked_by(enc: &mut CombatEncounter, attacker: &str, commit: u32) {
        let mut outcome = CombatRoundOutcome::default();
        outcome
            .effective_actions
            .insert(attacker.into(), RoundAction::attack(GID, commit));
        enc.logs.push(RoundLog {
            round_number: enc.round_number,
            trigger: ResolveTrigger::Submission,
            outcome,
            resolved_at: Utc::now(),
        });
        enc.round_number += 1;
    }

    #[test]
    fn characters_are_not_planned() {
        let enc = encounter(GarrisonMode::Offensive);
        assert!(plan_garrison_action(&enc, "big").is_none());
        assert!(plan_garrison_action(&enc, "nobody").is_none());
    }

    #[test]
    fn offensive_attacks_strongest_hostile_with_everything() {
        let enc = encounter(GarrisonMode::Offensive);
        let action = plan_garrison_action(&enc, GID).unwrap();
        assert_eq!(action, RoundAction::attack("big", 41));
    }

    #[test]
    fn defensive_braces_until_attacked() {
        let mut enc = encounter(GarrisonMode::Defensive);
        assert_eq!(plan_garrison_action(&enc, GID).unwrap(), RoundAction::brace());

        attacked_by(&mut enc, "small", 5);
        assert_eq!(
            plan_garrison_action(&enc, GID).unwrap(),
            RoundAction::attack("small", 20)
        );
    }

    #[test]
    fn defensive_ignores_friendly_fire_reports() {
        let mut enc = encounter(GarrisonMode::Defensive);
        attacked_by(&mut enc, "owner", 5);
        assert_eq!(plan_garrison_action(&enc, GID).unwrap(), RoundAction::brace());
    }

    #[test]
    fn toll_braces_in_demand_round_then_enforces() {
        let mut enc = encounter(GarrisonMode::Toll);
        assert_eq!(plan_garrison_action(&enc, GID).unwrap(), RoundAction::brace());

        enc.round_number = 2;
        assert_eq!(
            plan_garrison_action(&enc, GID).unwrap(),
            RoundAction::attack("big", 41)
        );
    }

    #[test]
    fn toll_braces_once_paid() {
        let mut enc = encounter(GarrisonMode::Toll);
        enc.round_number = 3;
        enc.context
            .toll_registry
            .get_mut(GID)
            .unwrap()
            .record_payment("big", 100, 2);
        assert_eq!(plan_garrison_action(&enc, GID).unwrap(), RoundAction::brace());
    }

    #[test]
    fn empty_garrison_braces() {
        let mut enc = encounter(GarrisonMode::Offensive);
        enc.participants.get_mut(GID).unwrap().fighters = 0;
        assert_eq!(plan_garrison_action(&enc, GID).unwrap(), RoundAction::brace());
    }
}
