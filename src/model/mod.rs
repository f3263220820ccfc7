//! Combat data model
//!
//! Plain value types shared by the resolution engine and the coordinator.
//! Nothing here locks or performs I/O.

pub mod action;
pub mod combatant;
pub mod context;
pub mod encounter;
pub mod outcome;

pub use action::{ActionKind, RoundAction};
pub use combatant::{CombatantState, CombatantType, GarrisonMode, GarrisonState};
pub use context::{
    EncounterContext, GarrisonSource, GarrisonSourceList, RecentFleeSet, TollEntry, TollPayment,
    TollRegistry,
};
pub use encounter::{CombatEncounter, ResolveTrigger, RoundLog, seed_from_combat_id};
pub use outcome::{CombatRoundOutcome, EndState, ParticipantDelta};
