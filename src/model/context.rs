//! Typed protocol bookkeeping attached to an encounter.
//!
//! - [`TollRegistry`]: toll demands keyed by garrison participant id
//! - [`GarrisonSourceList`]: where each garrison participant came from
//! - [`RecentFleeSet`]: characters that escaped this encounter

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::combatant::GarrisonMode;

/// A single accepted toll payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TollPayment {
    /// Who paid.
    pub payer_id: String,
    /// Credits paid.
    pub amount: u64,
    /// Round in which the payment was accepted.
    pub round: u32,
}

/// Toll demand raised by one garrison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TollEntry {
    /// Credits demanded.
    pub toll_amount: u64,
    /// Credits collected during this encounter (starting from the store's balance).
    pub toll_balance: u64,
    /// Garrison owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Whether the demand has been met.
    #[serde(default)]
    pub paid: bool,
    /// Round of the accepted payment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_round: Option<u32>,
    /// Character the demand is addressed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Round in which the demand was first presented.
    #[serde(default = "first_round")]
    pub demand_round: u32,
    /// Accepted payments.
    #[serde(default)]
    pub payments: Vec<TollPayment>,
}

const fn first_round() -> u32 {
    1
}

impl TollEntry {
    /// Creates an unpaid demand.
    #[must_use]
    pub fn new(toll_amount: u64, owner_id: Option<String>, target_id: Option<String>) -> Self {
        Self {
            toll_amount,
            toll_balance: 0,
            owner_id,
            paid: false,
            paid_round: None,
            target_id,
            demand_round: 1,
            payments: Vec::new(),
        }
    }

    /// Records an accepted payment.
    pub fn record_payment(&mut self, payer_id: &str, amount: u64, round: u32) {
        self.paid = true;
        self.paid_round = Some(round);
        self.toll_balance = self.toll_balance.saturating_add(amount);
        self.payments.push(TollPayment {
            payer_id: payer_id.to_string(),
            amount,
            round,
        });
    }

    /// Whether the payment landed in `round`.
    #[must_use]
    pub fn paid_in(&self, round: u32) -> bool {
        self.paid && self.paid_round == Some(round)
    }
}

/// Toll demands keyed by garrison participant id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TollRegistry(BTreeMap<String, TollEntry>);

impl TollRegistry {
    /// Registers (or replaces) the demand of `garrison_id`.
    pub fn insert(&mut self, garrison_id: impl Into<String>, entry: TollEntry) {
        self.0.insert(garrison_id.into(), entry);
    }

    /// Looks up a demand.
    #[must_use]
    pub fn get(&self, garrison_id: &str) -> Option<&TollEntry> {
        self.0.get(garrison_id)
    }

    /// Looks up a demand for mutation.
    pub fn get_mut(&mut self, garrison_id: &str) -> Option<&mut TollEntry> {
        self.0.get_mut(garrison_id)
    }

    /// Id of the first unpaid demand, in key order.
    #[must_use]
    pub fn first_unpaid(&self) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, entry)| !entry.paid)
            .map(|(id, _)| id.as_str())
    }

    /// Iterates demands in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TollEntry)> {
        self.0.iter()
    }

    /// Number of demands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no demands exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Origin of one garrison participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarrisonSource {
    /// Participant id inside the encounter.
    pub participant_id: String,
    /// Garrison owner.
    pub owner_id: String,
    /// Sector the garrison is deployed in.
    pub sector_id: u32,
    /// Posture when the encounter started.
    pub mode: GarrisonMode,
    /// Toll demanded, if any.
    #[serde(default)]
    pub toll_amount: u64,
    /// When the garrison was placed.
    pub deployed_at: DateTime<Utc>,
}

/// Garrison participants and where they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GarrisonSourceList(Vec<GarrisonSource>);

impl GarrisonSourceList {
    /// Appends a source, ignoring duplicates of the same participant.
    pub fn push(&mut self, source: GarrisonSource) {
        if self.find(&source.participant_id).is_none() {
            self.0.push(source);
        }
    }

    /// Finds the source of a garrison participant.
    #[must_use]
    pub fn find(&self, participant_id: &str) -> Option<&GarrisonSource> {
        self.0.iter().find(|s| s.participant_id == participant_id)
    }

    /// Iterates sources in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &GarrisonSource> {
        self.0.iter()
    }

    /// Number of sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Characters that successfully fled this encounter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecentFleeSet(BTreeSet<String>);

impl RecentFleeSet {
    /// Records a successful flee.
    pub fn insert(&mut self, character_id: impl Into<String>) {
        self.0.insert(character_id.into());
    }

    /// Whether `character_id` fled.
    #[must_use]
    pub fn contains(&self, character_id: &str) -> bool {
        self.0.contains(character_id)
    }

    /// Iterates fled ids in order.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// Number of fled characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nobody fled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Protocol-extension state carried by an encounter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterContext {
    /// Toll demands keyed by garrison participant id.
    #[serde(default)]
    pub toll_registry: TollRegistry,
    /// Garrison participant origins.
    #[serde(default)]
    pub garrison_sources: GarrisonSourceList,
    /// Characters that fled.
    #[serde(default)]
    pub recent_flee_character_ids: RecentFleeSet,
}
