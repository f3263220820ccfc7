//! Tentative end-state classification of a resolved round.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ActionKind, CombatEncounter, CombatRoundOutcome, EndState, RoundAction};

/// Classifies the round from the engine's point of view.
///
/// The coordinator may still override the result (toll follow-up and
/// stand-down, lone-survivor fallback).
#[must_use]
pub fn classify(
    encounter: &CombatEncounter,
    outcome: &CombatRoundOutcome,
    effective: &BTreeMap<String, RoundAction>,
) -> Option<EndState> {
    let fled: Vec<&String> = outcome.fled_ids().collect();
    let remaining: Vec<&String> = encounter
        .participants
        .keys()
        .filter(|id| !fled.contains(id))
        .collect();

    let fighters_after = |id: &str| outcome.fighters_remaining.get(id).copied().unwrap_or(0);
    let fighters_before = |id: &str| encounter.participants.get(id).map_or(0, |p| p.fighters);

    let alive: Vec<&String> = remaining
        .iter()
        .copied()
        .filter(|id| fighters_after(id.as_str()) > 0)
        .collect();
    let destroyed: Vec<&String> = remaining
        .iter()
        .copied()
        .filter(|id| fighters_before(id.as_str()) > 0 && fighters_after(id.as_str()) == 0)
        .collect();

    if !remaining.is_empty() && alive.is_empty() && !destroyed.is_empty() {
        return Some(EndState::MutualDefeat);
    }

    let side_of = |id: &str| {
        encounter
            .participants
            .get(id)
            .map_or_else(|| id.to_string(), |p| p.side().to_string())
    };
    let alive_sides: BTreeSet<String> = alive.iter().map(|id| side_of(id.as_str())).collect();

    if alive_sides.len() == 1 {
        let winning_side = alive_sides.iter().next().cloned().unwrap_or_default();
        let losers: Vec<&String> = remaining
            .iter()
            .copied()
            .filter(|id| side_of(id.as_str()) != winning_side)
            .collect();

        if !losers.is_empty() {
            // Opponents wrecked in earlier rounds no longer count
            let active_losers: Vec<&String> = losers
                .iter()
                .copied()
                .filter(|id| fighters_before(id.as_str()) > 0)
                .collect();
            if let ([loser], [wrecked]) = (active_losers.as_slice(), destroyed.as_slice()) {
                if loser == wrecked {
                    return Some(EndState::Defeated((*loser).clone()));
                }
            }
            return Some(EndState::Victory);
        }
    }

    if let [only] = fled.as_slice() {
        if alive_sides.len() <= 1 {
            return Some(EndState::Fled((*only).clone()));
        }
    }

    let attacked = remaining.iter().any(|id| {
        effective
            .get(id.as_str())
            .is_some_and(|a| a.action == ActionKind::Attack)
    });
    if !attacked && fled.is_empty() {
        return Some(EndState::Stalemate);
    }

    None
}
