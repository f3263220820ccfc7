//! Round actions submitted by combatants.

use serde::{Deserialize, Serialize};

/// What a combatant does in a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Commit fighters against a target.
    Attack,
    /// Hold fighters back and reinforce shields.
    Brace,
    /// Try to leave for an adjacent sector.
    Flee,
    /// Pay a garrison's toll demand.
    Pay,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Attack => "ATTACK",
            Self::Brace => "BRACE",
            Self::Flee => "FLEE",
            Self::Pay => "PAY",
        })
    }
}

/// A single combatant's action for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundAction {
    /// Action kind.
    pub action: ActionKind,
    /// Fighters committed (ATTACK only).
    #[serde(default)]
    pub commit: u32,
    /// Attack target, or the garrison being paid for PAY.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Flee destination (FLEE only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_sector: Option<u32>,
    /// Set when the action was defaulted because the deadline passed.
    #[serde(default)]
    pub timed_out: bool,
}

impl RoundAction {
    /// ATTACK `target_id` with `commit` fighters.
    #[must_use]
    pub fn attack(target_id: impl Into<String>, commit: u32) -> Self {
        Self {
            action: ActionKind::Attack,
            commit,
            target_id: Some(target_id.into()),
            destination_sector: None,
            timed_out: false,
        }
    }

    /// BRACE for this round.
    #[must_use]
    pub const fn brace() -> Self {
        Self {
            action: ActionKind::Brace,
            commit: 0,
            target_id: None,
            destination_sector: None,
            timed_out: false,
        }
    }

    /// FLEE toward `destination_sector`.
    #[must_use]
    pub const fn flee(destination_sector: u32) -> Self {
        Self {
            action: ActionKind::Flee,
            commit: 0,
            target_id: None,
            destination_sector: Some(destination_sector),
            timed_out: false,
        }
    }

    /// PAY the toll of `garrison_id` (or the first open demand when `None`).
    #[must_use]
    pub fn pay(garrison_id: Option<String>) -> Self {
        Self {
            action: ActionKind::Pay,
            commit: 0,
            target_id: garrison_id,
            destination_sector: None,
            timed_out: false,
        }
    }

    /// Default applied to combatants that missed the deadline.
    #[must_use]
    pub fn timeout() -> Self {
        Self {
            timed_out: true,
            ..Self::brace()
        }
    }

    /// The same action demoted to BRACE, keeping the timeout flag.
    #[must_use]
    pub fn downgraded(&self) -> Self {
        Self {
            timed_out: self.timed_out,
            ..Self::brace()
        }
    }

    /// Whether this action is passive for stand-down purposes.
    #[must_use]
    pub const fn is_passive(&self) -> bool {
        matches!(self.action, ActionKind::Brace | ActionKind::Pay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_brace() {
        let a = RoundAction::timeout();
        assert_eq!(a.action, ActionKind::Brace);
        assert!(a.timed_out);
        assert_eq!(a.commit, 0);
    }

    #[test]
    fn downgrade_keeps_timeout_flag() {
        let mut pay = RoundAction::pay(Some("g".into()));
        pay.timed_out = true;
        let d = pay.downgraded();
        assert_eq!(d.action, ActionKind::Brace);
        assert!(d.timed_out);
        assert!(d.target_id.is_none());
    }

    #[test]
    fn passive_actions() {
        assert!(RoundAction::brace().is_passive());
        assert!(RoundAction::pay(None).is_passive());
        assert!(!RoundAction::attack("x", 1).is_passive());
        assert!(!RoundAction::flee(4).is_passive());
    }

    #[test]
    fn parses_lowercase_yaml() {
        let a: RoundAction =
            serde_yaml::from_str("action: attack\ncommit: 20\ntarget_id: p2\n").unwrap();
        assert_eq!(a, RoundAction::attack("p2", 20));
        assert_eq!(a.action.to_string(), "ATTACK");
    }
}
