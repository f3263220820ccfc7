//! Round outcomes and terminal states.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::action::RoundAction;

/// Terminal tag of an encounter.
///
/// Serialized as the flat strings `victory`, `<id>_defeated`,
/// `mutual_defeat`, `<id>_fled`, `stalemate` and `toll_satisfied`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EndState {
    /// One side remains with fighters.
    Victory,
    /// The named combatant was destroyed and nobody else is left to fight.
    Defeated(String),
    /// Everyone reached zero fighters in the same round.
    MutualDefeat,
    /// The named combatant escaped and the fight cannot continue.
    Fled(String),
    /// No side can or will make progress.
    Stalemate,
    /// A toll was paid and everyone stood down.
    TollSatisfied,
}

impl EndState {
    /// Low-cardinality label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Victory => "victory",
            Self::Defeated(_) => "defeated",
            Self::MutualDefeat => "mutual_defeat",
            Self::Fled(_) => "fled",
            Self::Stalemate => "stalemate",
            Self::TollSatisfied => "toll_satisfied",
        }
    }
}

impl std::fmt::Display for EndState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defeated(id) => write!(f, "{id}_defeated"),
            Self::Fled(id) => write!(f, "{id}_fled"),
            other => f.write_str(other.kind()),
        }
    }
}

/// Error parsing an [`EndState`] string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised end state: {0}")]
pub struct ParseEndStateError(String);

impl FromStr for EndState {
    type Err = ParseEndStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "victory" => Ok(Self::Victory),
            "mutual_defeat" => Ok(Self::MutualDefeat),
            "stalemate" => Ok(Self::Stalemate),
            "toll_satisfied" => Ok(Self::TollSatisfied),
            _ => {
                if let Some(id) = s.strip_suffix("_defeated").filter(|id| !id.is_empty()) {
                    Ok(Self::Defeated(id.to_string()))
                } else if let Some(id) = s.strip_suffix("_fled").filter(|id| !id.is_empty()) {
                    Ok(Self::Fled(id.to_string()))
                } else {
                    Err(ParseEndStateError(s.to_string()))
                }
            }
        }
    }
}

impl Serialize for EndState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EndState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Change to one participant across a round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDelta {
    /// Fighter change (negative for losses).
    pub fighters: i64,
    /// Shield change (negative for losses).
    pub shields: i64,
    /// Whether the participant left the encounter this round.
    #[serde(default)]
    pub removed: bool,
}

/// Result of resolving one round.
///
/// All maps are keyed by participant id and ordered, so serialized outcomes
/// are byte-stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatRoundOutcome {
    /// Round that was resolved.
    pub round_number: u32,
    /// Hits landed by each attacker.
    pub hits: BTreeMap<String, u32>,
    /// Committed fighters lost to misses.
    pub offensive_losses: BTreeMap<String, u32>,
    /// Fighters lost to incoming hits.
    pub defensive_losses: BTreeMap<String, u32>,
    /// Shield points lost.
    pub shield_loss: BTreeMap<String, u32>,
    /// Fighters left after the round.
    pub fighters_remaining: BTreeMap<String, u32>,
    /// Shields left after the round.
    pub shields_remaining: BTreeMap<String, u32>,
    /// Flee attempts and whether they succeeded.
    pub flee_results: BTreeMap<String, bool>,
    /// Terminal tag, if the encounter ended.
    pub end_state: Option<EndState>,
    /// Actions actually applied, after defaults and downgrades.
    pub effective_actions: BTreeMap<String, RoundAction>,
    /// Per-participant change against the pre-round snapshot.
    #[serde(default)]
    pub participant_deltas: BTreeMap<String, ParticipantDelta>,
}

impl CombatRoundOutcome {
    /// Ids whose flee succeeded, in order.
    pub fn fled_ids(&self) -> impl Iterator<Item = &String> {
        self.flee_results
            .iter()
            .filter(|(_, ok)| **ok)
            .map(|(id, _)| id)
    }

    /// Total fighters `id` lost this round.
    #[must_use]
    pub fn total_losses(&self, id: &str) -> u32 {
        self.offensive_losses.get(id).copied().unwrap_or(0)
            + self.defensive_losses.get(id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_state_display_and_parse() {
        let cases = [
            (EndState::Victory, "victory"),
            (EndState::Defeated("p2".into()), "p2_defeated"),
            (EndState::MutualDefeat, "mutual_defeat"),
            (EndState::Fled("p1".into()), "p1_fled"),
            (EndState::Stalemate, "stalemate"),
            (EndState::TollSatisfied, "toll_satisfied"),
        ];
        for (state, text) in cases {
            assert_eq!(state.to_string(), text);
            assert_eq!(text.parse::<EndState>().unwrap(), state);
        }
    }

    #[test]
    fn end_state_rejects_garbage() {
        assert!("_defeated".parse::<EndState>().is_err());
        assert!("draw".parse::<EndState>().is_err());
    }

    #[test]
    fn ids_with_underscores_round_trip() {
        let state: EndState = "garrison_7_defeated".parse().unwrap();
        assert_eq!(state, EndState::Defeated("garrison_7".into()));
    }

    #[test]
    fn end_state_serializes_flat() {
        let json = serde_json::to_string(&EndState::Fled("p9".into())).unwrap();
        assert_eq!(json, "\"p9_fled\"");
        let back: EndState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EndState::Fled("p9".into()));
    }

    #[test]
    fn kind_buckets_ids() {
        assert_eq!(EndState::Defeated("anyone".into()).kind(), "defeated");
        assert_eq!(EndState::Fled("anyone".into()).kind(), "fled");
    }

    #[test]
    fn fled_ids_only_successes() {
        let mut outcome = CombatRoundOutcome::default();
        outcome.flee_results.insert("a".into(), true);
        outcome.flee_results.insert("b".into(), false);
        assert_eq!(outcome.fled_ids().collect::<Vec<_>>(), vec!["a"]);
    }
}
