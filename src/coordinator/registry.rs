//! Active and completed encounter registries.
//!
//! Only insertion and removal happen here; per-round state lives behind
//! each encounter's own lock.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::CombatError;
use crate::model::CombatEncounter;

/// Shared handle to an active encounter; the mutex is the per-combat lock.
pub type EncounterHandle = Arc<Mutex<CombatEncounter>>;

/// Where an encounter id currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Accepting actions.
    Active,
    /// Finished and retained for lookups.
    Completed,
    /// Unknown or evicted.
    Missing,
}

/// Active map plus a bounded FIFO of completed encounters.
#[derive(Debug)]
pub struct Registry {
    active: BTreeMap<String, EncounterHandle>,
    completed: HashMap<String, CombatEncounter>,
    completed_order: VecDeque<String>,
    capacity: usize,
}

impl Registry {
    /// Creates an empty registry keeping at most `capacity` completed encounters.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            active: BTreeMap::new(),
            completed: HashMap::new(),
            completed_order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Registers an active encounter.
    ///
    /// A completed encounter with the same id is dropped so an id never
    /// lives in both maps.
    ///
    /// # Errors
    ///
    /// Returns `CombatError::DuplicateEncounter` if the id is already active.
    pub fn insert_active(
        &mut self,
        combat_id: &str,
        handle: EncounterHandle,
    ) -> Result<(), CombatError> {
        if self.active.contains_key(combat_id) {
            return Err(CombatError::DuplicateEncounter(combat_id.to_string()));
        }
        if self.completed.remove(combat_id).is_some() {
            self.completed_order.retain(|id| id != combat_id);
        }
        self.active.insert(combat_id.to_string(), handle);
        Ok(())
    }

    /// Handle of an active encounter.
    #[must_use]
    pub fn active(&self, combat_id: &str) -> Option<EncounterHandle> {
        self.active.get(combat_id).cloned()
    }

    /// Whether `handle` is still the registered active instance of `combat_id`.
    #[must_use]
    pub fn is_current(&self, combat_id: &str, handle: &EncounterHandle) -> bool {
        self.active
            .get(combat_id)
            .is_some_and(|registered| Arc::ptr_eq(registered, handle))
    }

    /// Snapshot of all active handles, ordered by id.
    #[must_use]
    pub fn active_handles(&self) -> Vec<EncounterHandle> {
        self.active.values().cloned().collect()
    }

    /// Finished encounter kept for lookups.
    #[must_use]
    pub fn completed(&self, combat_id: &str) -> Option<&CombatEncounter> {
        self.completed.get(combat_id)
    }

    /// Where `combat_id` currently lives.
    #[must_use]
    pub fn lookup(&self, combat_id: &str) -> Lookup {
        if self.active.contains_key(combat_id) {
            Lookup::Active
        } else if self.completed.contains_key(combat_id) {
            Lookup::Completed
        } else {
            Lookup::Missing
        }
    }

    /// Moves a terminal encounter from the active map into the completed FIFO.
    ///
    /// Returns the ids evicted to stay within capacity.
    pub fn complete(&mut self, encounter: CombatEncounter) -> Vec<String> {
        let combat_id = encounter.combat_id.clone();
        self.active.remove(&combat_id);
        if self.completed.insert(combat_id.clone(), encounter).is_some() {
            self.completed_order.retain(|id| *id != combat_id);
        }
        self.completed_order.push_back(combat_id);

        let mut evicted = Vec::new();
        while self.completed_order.len() > self.capacity {
            if let Some(oldest) = self.completed_order.pop_front() {
                self.completed.remove(&oldest);
                evicted.push(oldest);
            }
        }
        evicted
    }

    /// Removes `combat_id` from both maps.
    ///
    /// Returns the active handle, if there was one, and whether a completed
    /// entry was dropped.
    pub fn remove(&mut self, combat_id: &str) -> (Option<EncounterHandle>, bool) {
        let handle = self.active.remove(combat_id);
        let was_completed = self.completed.remove(combat_id).is_some();
        if was_completed {
            self.completed_order.retain(|id| id != combat_id);
        }
        (handle, was_completed)
    }

    /// Number of active encounters.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Number of retained completed encounters.
    #[must_use]
    pub fn completed_len(&self) -> usize {
        self.completed.len()
    }
}
