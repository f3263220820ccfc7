//! Round resolution engine
//!
//! [`resolve`] turns an encounter snapshot plus the round's action map into a
//! [`CombatRoundOutcome`]. It performs no I/O, takes no locks and never
//! mutates its inputs; all randomness comes from an RNG seeded with the
//! encounter's `base_seed` and the round number, so identical inputs give
//! identical outcomes.
//!
//! # Order of resolution
//!
//! 1. Normalize actions (missing → timed-out BRACE, invalid ATTACK/FLEE →
//!    BRACE, commit capped at current fighters).
//! 2. Flee attempts, in participant order. Successful fleers take no part in
//!    the attack phase.
//! 3. Attacks, largest commitment first, ties broken by mobility then id.
//!    Every committed fighter rolls once: a hit costs the defender a fighter
//!    (or shield points when shields soak it), a miss costs the attacker the
//!    committed fighter.
//! 4. Shield ablation, reduced for bracers.
//! 5. Tentative end-state classification ([`classify`]).

pub mod classify;
pub mod odds;

use std::collections::BTreeMap;

use rand::Rng;

use crate::model::{ActionKind, CombatEncounter, CombatRoundOutcome, CombatantState, RoundAction};

pub use classify::classify;

/// Mutable per-round view of one participant.
#[derive(Debug, Clone)]
struct Combatant {
    fighters: u32,
    shields: u32,
    max_shields: u32,
    shield_pool: u32,
    absorbed: u32,
    bracing: bool,
    fled: bool,
}

impl Combatant {
    fn from_state(state: &CombatantState, action: &RoundAction) -> Self {
        Self {
            fighters: state.fighters,
            shields: state.shields,
            max_shields: state.max_shields,
            shield_pool: state.shields,
            absorbed: 0,
            bracing: action.action == ActionKind::Brace,
            fled: false,
        }
    }

    fn shield_ratio(&self) -> f64 {
        if self.max_shields == 0 {
            0.0
        } else {
            f64::from(self.shield_pool) / f64::from(self.max_shields)
        }
    }
}

/// Resolves one round.
#[must_use]
pub fn resolve(
    encounter: &CombatEncounter,
    actions: &BTreeMap<String, RoundAction>,
) -> CombatRoundOutcome {
    let effective = effective_actions(encounter, actions);
    let mut rng = odds::round_rng(encounter.base_seed, encounter.round_number);

    let mut state: BTreeMap<&str, Combatant> = encounter
        .participants
        .iter()
        .map(|(id, p)| (id.as_str(), Combatant::from_state(p, &effective[id])))
        .collect();

    let mut outcome = CombatRoundOutcome {
        round_number: encounter.round_number,
        ..CombatRoundOutcome::default()
    };
    for id in encounter.participants.keys() {
        outcome.hits.insert(id.clone(), 0);
        outcome.offensive_losses.insert(id.clone(), 0);
        outcome.defensive_losses.insert(id.clone(), 0);
    }

    resolve_flees(encounter, &effective, &mut state, &mut outcome, &mut rng);
    resolve_attacks(encounter, &effective, &mut state, &mut outcome, &mut rng);

    for (id, c) in &state {
        let loss = odds::shield_ablation(c.absorbed, c.bracing).min(c.shields);
        outcome.shield_loss.insert((*id).to_string(), loss);
        outcome
            .shields_remaining
            .insert((*id).to_string(), c.shields - loss);
        outcome
            .fighters_remaining
            .insert((*id).to_string(), c.fighters);
    }

    outcome.end_state = classify(encounter, &outcome, &effective);
    outcome.effective_actions = effective;
    outcome
}

/// Builds the action map the engine will actually apply.
#[must_use]
pub fn effective_actions(
    encounter: &CombatEncounter,
    actions: &BTreeMap<String, RoundAction>,
) -> BTreeMap<String, RoundAction> {
    encounter
        .participants
        .iter()
        .map(|(id, participant)| {
            let action = actions
                .get(id)
                .map_or_else(RoundAction::timeout, |a| normalize(encounter, participant, a));
            (id.clone(), action)
        })
        .collect()
}

fn normalize(
    encounter: &CombatEncounter,
    participant: &CombatantState,
    action: &RoundAction,
) -> RoundAction {
    match action.action {
        ActionKind::Attack => {
            let target_ok = action
                .target_id
                .as_deref()
                .is_some_and(|t| t != participant.id && encounter.has_participant(t));
            let commit = action.commit.min(participant.fighters);
            if !target_ok || commit == 0 {
                return action.downgraded();
            }
            RoundAction {
                commit,
                destination_sector: None,
                ..action.clone()
            }
        }
        ActionKind::Flee => {
            if !participant.can_flee() || action.destination_sector.is_none() {
                return action.downgraded();
            }
            RoundAction {
                commit: 0,
                target_id: None,
                ..action.clone()
            }
        }
        ActionKind::Brace => RoundAction {
            commit: 0,
            target_id: None,
            destination_sector: None,
            ..action.clone()
        },
        ActionKind::Pay => RoundAction {
            commit: 0,
            destination_sector: None,
            ..action.clone()
        },
    }
}

fn resolve_flees<R: Rng>(
    encounter: &CombatEncounter,
    effective: &BTreeMap<String, RoundAction>,
    state: &mut BTreeMap<&str, Combatant>,
    outcome: &mut CombatRoundOutcome,
    rng: &mut R,
) {
    for (id, action) in effective {
        if action.action != ActionKind::Flee {
            continue;
        }
        let fleer = &encounter.participants[id];
        let fastest_opponent = encounter
            .participants
            .values()
            .filter(|other| other.id != fleer.id && fleer.is_hostile_to(other))
            .filter(|other| {
                state
                    .get(other.id.as_str())
                    .is_some_and(|c| !c.fled && c.fighters > 0)
            })
            .map(|other| other.turns_per_warp)
            .max();

        let chance = odds::flee_chance(fleer.turns_per_warp, fastest_opponent);
        let escaped = rng.random::<f64>() < chance;
        if escaped {
            if let Some(c) = state.get_mut(id.as_str()) {
                c.fled = true;
            }
        }
        outcome.flee_results.insert(id.clone(), escaped);
    }
}

fn resolve_attacks<R: Rng>(
    encounter: &CombatEncounter,
    effective: &BTreeMap<String, RoundAction>,
    state: &mut BTreeMap<&str, Combatant>,
    outcome: &mut CombatRoundOutcome,
    rng: &mut R,
) {
    let mut order: Vec<(&String, &RoundAction)> = effective
        .iter()
        .filter(|(_, a)| a.action == ActionKind::Attack)
        .collect();
    order.sort_by(|(a_id, a), (b_id, b)| {
        let a_tpw = encounter.participants[*a_id].turns_per_warp;
        let b_tpw = encounter.participants[*b_id].turns_per_warp;
        b.commit
            .cmp(&a.commit)
            .then(b_tpw.cmp(&a_tpw))
            .then(a_id.cmp(b_id))
    });

    for (attacker_id, action) in order {
        let Some(target_id) = action.target_id.as_deref() else {
            continue;
        };
        let (attacker_ratio, commit) = match state.get(attacker_id.as_str()) {
            Some(a) if !a.fled => (a.shield_ratio(), action.commit.min(a.fighters)),
            _ => continue,
        };
        let Some(target) = state.get(target_id) else {
            continue;
        };
        if target.fled || target.fighters == 0 || commit == 0 {
            continue;
        }

        let mut hits = 0;
        let mut misses = 0;
        let mut fighters_lost = 0;
        for _ in 0..commit {
            let Some(target) = state.get_mut(target_id) else {
                break;
            };
            if target.fighters == 0 {
                break;
            }
            let chance = odds::hit_chance(target.bracing, target.shield_ratio(), attacker_ratio);
            if rng.random::<f64>() < chance {
                hits += 1;
                let absorb = odds::absorb_chance(target.shield_pool, target.max_shields);
                if absorb > 0.0 && rng.random::<f64>() < absorb {
                    target.shield_pool -= 1;
                    target.absorbed += 1;
                } else {
                    target.fighters -= 1;
                    fighters_lost += 1;
                }
            } else {
                misses += 1;
            }
        }

        if let Some(attacker) = state.get_mut(attacker_id.as_str()) {
            attacker.fighters = attacker.fighters.saturating_sub(misses);
        }
        *outcome.hits.entry(attacker_id.clone()).or_default() += hits;
        *outcome
            .offensive_losses
            .entry(attacker_id.clone())
            .or_default() += misses;
        *outcome
            .defensive_losses
            .entry(target_id.to_string())
            .or_default() += fighters_lost;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CombatantState, EndState};

    fn duel(seed: u64) -> CombatEncounter {
        CombatEncounter::new("duel", 7)
            .with_seed(seed)
            .with_participant(CombatantState::character("p1", "One", 300, 150, 3))
            .with_participant(CombatantState::character("p2", "Two", 300, 150, 3))
    }

    fn actions(list: Vec<(&str, RoundAction)>) -> BTreeMap<String, RoundAction> {
        list.into_iter().map(|(id, a)| (id.to_string(), a)).collect()
    }

    #[test]
    fn missing_actions_default_to_timed_out_brace() {
        let enc = duel(1);
        let outcome = resolve(&enc, &BTreeMap::new());
        for action in outcome.effective_actions.values() {
            assert_eq!(action.action, ActionKind::Brace);
            assert!(action.timed_out);
        }
        assert_eq!(outcome.end_state, Some(EndState::Stalemate));
        assert_eq!(outcome.fighters_remaining["p1"], 300);
        assert_eq!(outcome.shields_remaining["p2"], 150);
    }

    #[test]
    fn resolve_does_not_mutate_inputs() {
        let enc = duel(3);
        let acts = actions(vec![("p1", RoundAction::attack("p2", 100))]);
        let (enc_before, acts_before) = (enc.clone(), acts.clone());
        let _ = resolve(&enc, &acts);
        assert_eq!(enc, enc_before);
        assert_eq!(acts, acts_before);
    }

    #[test]
    fn same_seed_same_outcome() {
        let acts = actions(vec![
            ("p1", RoundAction::attack("p2", 200)),
            ("p2", RoundAction::attack("p1", 150)),
        ]);
        let a = serde_json::to_string(&resolve(&duel(42), &acts)).unwrap();
        let b = serde_json::to_string(&resolve(&duel(42), &acts)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn losses_are_attributed_to_hits_and_misses() {
        let enc = duel(9);
        let acts = actions(vec![
            ("p1", RoundAction::attack("p2", 200)),
            ("p2", RoundAction::brace()),
        ]);
        let outcome = resolve(&enc, &acts);
        let hits = outcome.hits["p1"];
        let misses = outcome.offensive_losses["p1"];
        assert_eq!(hits + misses, 200);
        assert_eq!(outcome.fighters_remaining["p1"], 300 - misses);
        let absorbed_or_lost = outcome.defensive_losses["p2"];
        assert!(absorbed_or_lost <= hits);
        assert_eq!(outcome.fighters_remaining["p2"], 300 - absorbed_or_lost);
        assert!(outcome.shield_loss["p2"] <= hits - absorbed_or_lost);
    }

    #[test]
    fn bracing_reduces_shield_loss_across_seeds() {
        let mut braced_loss = 0;
        let mut open_loss = 0;
        let mut misses = 0;
        for seed in 0..16 {
            let braced = resolve(
                &duel(seed),
                &actions(vec![
                    ("p1", RoundAction::attack("p2", 200)),
                    ("p2", RoundAction::brace()),
                ]),
            );
            let open = resolve(
                &duel(seed),
                &actions(vec![
                    ("p1", RoundAction::attack("p2", 200)),
                    ("p2", RoundAction::pay(None)),
                ]),
            );
            braced_loss += 150 - braced.shields_remaining["p2"];
            open_loss += 150 - open.shields_remaining["p2"];
            misses += braced.offensive_losses["p1"];
        }
        assert!(braced_loss < open_loss, "{braced_loss} >= {open_loss}");
        assert!(misses > 0);
    }

    #[test]
    fn commit_is_capped_at_current_fighters() {
        let enc = duel(5);
        let outcome = resolve(&enc, &actions(vec![("p1", RoundAction::attack("p2", 10_000))]));
        assert_eq!(outcome.effective_actions["p1"].commit, 300);
    }

    #[test]
    fn invalid_attack_downgrades_to_brace() {
        let enc = duel(5);
        let outcome = resolve(
            &enc,
            &actions(vec![
                ("p1", RoundAction::attack("nobody", 10)),
                ("p2", RoundAction::attack("p2", 10)),
            ]),
        );
        assert_eq!(outcome.effective_actions["p1"].action, ActionKind::Brace);
        assert_eq!(outcome.effective_actions["p2"].action, ActionKind::Brace);
        assert_eq!(outcome.end_state, Some(EndState::Stalemate));
    }

    #[test]
    fn garrison_flee_is_downgraded() {
        let enc = CombatEncounter::new("g", 1)
            .with_participant(CombatantState::garrison("g1", "G", 10, "owner"))
            .with_participant(CombatantState::character("p1", "One", 10, 10, 3));
        let outcome = resolve(&enc, &actions(vec![("g1", RoundAction::flee(2))]));
        assert_eq!(outcome.effective_actions["g1"].action, ActionKind::Brace);
        assert!(outcome.flee_results.is_empty());
    }

    #[test]
    fn successful_flee_skips_attack_phase() {
        // Find a seed where the flee succeeds; chance is 0.9 so this is quick.
        let acts = actions(vec![
            ("p1", RoundAction::attack("p2", 100)),
            ("p2", RoundAction::flee(8)),
        ]);
        let mut enc = duel(0);
        enc.participants.get_mut("p2").unwrap().turns_per_warp = 20;
        let outcome = (0..64)
            .map(|seed| resolve(&enc.clone().with_seed(seed), &acts))
            .find(|o| o.flee_results["p2"])
            .expect("no successful flee in 64 seeds");
        assert_eq!(outcome.hits["p1"], 0);
        assert_eq!(outcome.offensive_losses["p1"], 0);
        assert_eq!(outcome.fighters_remaining["p2"], 300);
        assert_eq!(outcome.end_state, Some(EndState::Fled("p2".into())));
    }

    #[test]
    fn pay_has_no_combat_effect() {
        let enc = duel(11);
        let outcome = resolve(
            &enc,
            &actions(vec![
                ("p1", RoundAction::pay(Some("p2".into()))),
                ("p2", RoundAction::brace()),
            ]),
        );
        assert_eq!(outcome.effective_actions["p1"].action, ActionKind::Pay);
        assert_eq!(outcome.fighters_remaining["p1"], 300);
        assert_eq!(outcome.fighters_remaining["p2"], 300);
    }

    #[test]
    fn overwhelming_attack_defeats_small_target() {
        let enc = CombatEncounter::new("stomp", 1)
            .with_participant(CombatantState::character("big", "Big", 500, 0, 3))
            .with_participant(CombatantState::character("small", "Small", 3, 0, 3));
        let outcome = resolve(&enc, &actions(vec![("big", RoundAction::attack("small", 500))]));
        assert_eq!(outcome.fighters_remaining["small"], 0);
        assert_eq!(outcome.end_state, Some(EndState::Defeated("small".into())));
    }
}
