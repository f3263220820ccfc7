//! Toll mini-protocol.
//!
//! Pure helpers over an encounter's toll registry. The coordinator calls
//! [`evaluate_payment`] before the engine runs, asks the economy to deduct
//! the credits, and then records the payment with [`apply_payment`]. After
//! the engine has run, [`needs_follow_up`] and [`stand_down`] override the
//! tentative end state.

use std::collections::BTreeMap;

use crate::model::{ActionKind, CombatEncounter, CombatantState, RoundAction};
use crate::observability::metrics;

/// What to do with a submitted PAY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PayDecision {
    /// Ask the economy to deduct `amount` for the demand of `garrison_id`.
    Accept { garrison_id: String, amount: u64 },
    /// Treat the PAY as BRACE; the label is recorded as a metric.
    Downgrade(&'static str),
}

/// Decides whether `payer_id`'s PAY can be honoured.
///
/// An explicit target must name a registered demand. Without one, the
/// first unpaid demand addressed to the payer is used, then the first
/// unpaid demand of any kind.
pub(crate) fn evaluate_payment(
    encounter: &CombatEncounter,
    payer_id: &str,
    action: &RoundAction,
) -> PayDecision {
    let is_character = encounter
        .participants
        .get(payer_id)
        .is_some_and(CombatantState::is_character);
    if !is_character {
        return PayDecision::Downgrade("not_a_character");
    }

    let registry = &encounter.context.toll_registry;
    let garrison_id = match action.target_id.as_deref() {
        Some(target) => registry.get(target).map(|_| target),
        None => registry
            .iter()
            .find(|(_, entry)| !entry.paid && entry.target_id.as_deref() == Some(payer_id))
            .map(|(id, _)| id.as_str())
            .or_else(|| registry.first_unpaid()),
    };
    let Some((garrison_id, entry)) = garrison_id.and_then(|id| Some((id, registry.get(id)?))) else {
        return PayDecision::Downgrade("no_demand");
    };

    if entry.paid {
        return PayDecision::Downgrade("already_paid");
    }
    if entry.owner_id.as_deref() == Some(payer_id) {
        return PayDecision::Downgrade("own_garrison");
    }
    PayDecision::Accept {
        garrison_id: garrison_id.to_string(),
        amount: entry.toll_amount,
    }
}

/// Records an accepted payment and stands the garrison down for this round.
pub(crate) fn apply_payment(
    encounter: &mut CombatEncounter,
    effective: &mut BTreeMap<String, RoundAction>,
    garrison_id: &str,
    payer_id: &str,
    amount: u64,
) {
    let round = encounter.round_number;
    if let Some(entry) = encounter.context.toll_registry.get_mut(garrison_id) {
        entry.record_payment(payer_id, amount, round);
    }
    if let Some(action) = effective.get_mut(garrison_id) {
        if action.action == ActionKind::Attack {
            *action = action.downgraded();
            metrics::record_protocol_downgrade("toll_paid");
        }
    }
}

/// Whether an unpaid demand keeps an otherwise stalled encounter going.
///
/// The demand needs a live target (a character still carrying fighters and
/// able to carry them) and another character present with fighters. The
/// garrison itself does not count.
pub(crate) fn needs_follow_up(encounter: &CombatEncounter) -> bool {
    encounter
        .context
        .toll_registry
        .iter()
        .filter(|(_, entry)| !entry.paid)
        .filter_map(|(_, entry)| entry.target_id.as_deref())
        .filter_map(|target| encounter.participants.get(target))
        .filter(|target| target.is_character() && target.fighters > 0 && target.max_fighters > 0)
        .any(|target| {
            encounter
                .participants
                .values()
                .any(|other| other.id != target.id && other.is_character() && other.fighters > 0)
        })
}

/// Whether a toll paid this round ends the encounter peacefully.
///
/// Every participant other than the paid garrison must have been passive.
pub(crate) fn stand_down(
    encounter: &CombatEncounter,
    effective: &BTreeMap<String, RoundAction>,
) -> bool {
    let round = encounter.round_number;
    encounter
        .context
        .toll_registry
        .iter()
        .filter(|(_, entry)| entry.paid_in(round))
        .any(|(garrison_id, _)| {
            effective
                .iter()
                .filter(|(id, _)| *id != garrison_id)
                .all(|(_, action)| action.is_passive())
        })
}
