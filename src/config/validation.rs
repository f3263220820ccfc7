//! Scenario validation
//!
//! Semantic checks run after deserialization. Validation collects every
//! issue instead of stopping at the first one.

use std::collections::HashSet;

use crate::config::loader::ScenarioLimits;
use crate::config::runtime::parse_timeout;
use crate::config::schema::{CharacterSpec, Scenario, ScriptedAction, ScriptedKind};
use crate::error::{Severity, ValidationIssue};
use crate::model::GarrisonMode;
use crate::sector::garrison_participant_id;

// ============================================================================
// Public API
// ============================================================================

/// Result of scenario validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Scenario validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a scenario and returns every issue found.
    pub fn validate(&mut self, scenario: &Scenario, limits: &ScenarioLimits) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_coordinator(scenario);
        self.validate_sizes(scenario, limits);

        let participant_ids = self.validate_ids(scenario);
        self.validate_garrisons(scenario);

        let toll_ids: HashSet<String> = scenario
            .garrisons
            .iter()
            .filter(|g| g.mode == GarrisonMode::Toll)
            .map(|g| garrison_participant_id(scenario.sector_id, &g.owner_id))
            .collect();

        for (index, character) in scenario.characters.iter().enumerate() {
            self.validate_script(character, index, &participant_ids, &toll_ids);
        }

        if participant_ids.len() < 2 {
            self.add_warning(
                "characters",
                "scenario has fewer than two participants; it ends after the first round",
            );
        }

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    // ========================================================================
    // Sections
    // ========================================================================

    fn validate_coordinator(&mut self, scenario: &Scenario) {
        let Some(section) = &scenario.coordinator else {
            return;
        };
        if let Some(raw) = &section.round_timeout {
            if let Err(e) = parse_timeout(raw) {
                self.add_error("coordinator.round_timeout", &e.to_string());
            }
        }
        if section.completed_capacity == Some(0) {
            self.add_error(
                "coordinator.completed_capacity",
                "completed capacity must be positive",
            );
        }
    }

    fn validate_sizes(&mut self, scenario: &Scenario, limits: &ScenarioLimits) {
        let total = scenario.characters.len() + scenario.garrisons.len();
        if total > limits.max_participants {
            self.add_error(
                "characters",
                &format!(
                    "{total} participants exceed the limit of {}",
                    limits.max_participants
                ),
            );
        }
        for (index, character) in scenario.characters.iter().enumerate() {
            if character.script.len() > limits.max_script_len {
                self.add_error(
                    &format!("characters[{index}].script"),
                    &format!(
                        "script has {} entries, limit is {}",
                        character.script.len(),
                        limits.max_script_len
                    ),
                );
            }
        }
    }

    /// Checks id uniqueness and returns every participant id.
    fn validate_ids(&mut self, scenario: &Scenario) -> HashSet<String> {
        let mut seen = HashSet::new();

        for (index, character) in scenario.characters.iter().enumerate() {
            let path = format!("characters[{index}].id");
            if character.id.trim().is_empty() {
                self.add_error(&path, "character id must not be empty");
                continue;
            }
            if !seen.insert(character.id.clone()) {
                self.add_error(&path, &format!("duplicate participant id '{}'", character.id));
            }
            if character.fighters == 0 {
                self.add_warning(
                    &format!("characters[{index}].fighters"),
                    "character starts without fighters",
                );
            }
            if character.max_fighters.is_some_and(|max| max < character.fighters) {
                self.add_error(
                    &format!("characters[{index}].max_fighters"),
                    "max_fighters is below fighters",
                );
            }
            if character.max_shields.is_some_and(|max| max < character.shields) {
                self.add_error(
                    &format!("characters[{index}].max_shields"),
                    "max_shields is below shields",
                );
            }
        }

        for (index, garrison) in scenario.garrisons.iter().enumerate() {
            if garrison.owner_id.trim().is_empty() {
                self.add_error(
                    &format!("garrisons[{index}].owner_id"),
                    "garrison owner must not be empty",
                );
                continue;
            }
            let id = garrison_participant_id(scenario.sector_id, &garrison.owner_id);
            if !seen.insert(id.clone()) {
                self.add_error(
                    &format!("garrisons[{index}].owner_id"),
                    &format!("duplicate participant id '{id}'"),
                );
            }
        }

        seen
    }

    fn validate_garrisons(&mut self, scenario: &Scenario) {
        let character_ids: HashSet<&str> =
            scenario.characters.iter().map(|c| c.id.as_str()).collect();

        for (index, garrison) in scenario.garrisons.iter().enumerate() {
            let path = format!("garrisons[{index}]");
            match garrison.mode {
                GarrisonMode::Toll if garrison.toll_amount == 0 => {
                    self.add_error(
                        &format!("{path}.toll_amount"),
                        "toll garrisons must demand a positive amount",
                    );
                }
                GarrisonMode::Offensive | GarrisonMode::Defensive if garrison.toll_amount > 0 => {
                    self.add_warning(
                        &format!("{path}.toll_amount"),
                        "toll_amount is ignored outside toll mode",
                    );
                }
                _ => {}
            }
            if garrison.fighters == 0 {
                self.add_warning(&format!("{path}.fighters"), "garrison has no fighters");
            }
            if !character_ids.contains(garrison.owner_id.as_str()) {
                self.add_warning(
                    &format!("{path}.owner_id"),
                    &format!("owner '{}' is not present in the sector", garrison.owner_id),
                );
            }
        }
    }

    fn validate_script(
        &mut self,
        character: &CharacterSpec,
        index: usize,
        participant_ids: &HashSet<String>,
        toll_ids: &HashSet<String>,
    ) {
        for (round, entry) in character.script.iter().enumerate() {
            let path = format!("characters[{index}].script[{round}]");
            self.validate_entry(character, entry, &path, participant_ids, toll_ids);
        }
    }

    fn validate_entry(
        &mut self,
        character: &CharacterSpec,
        entry: &ScriptedAction,
        path: &str,
        participant_ids: &HashSet<String>,
        toll_ids: &HashSet<String>,
    ) {
        match entry.action {
            ScriptedKind::Attack => match entry.target.as_deref() {
                None => self.add_error(path, "attack requires a target"),
                Some(target) if target == character.id => {
                    self.add_error(path, "a character cannot attack itself");
                }
                Some(target) if !participant_ids.contains(target) => {
                    self.add_error(path, &format!("unknown attack target '{target}'"));
                }
                Some(_) if entry.commit == Some(0) => {
                    self.add_error(path, "attack must commit at least one fighter");
                }
                Some(_) => {}
            },
            ScriptedKind::Flee => {
                if entry.destination.is_none() {
                    self.add_error(path, "flee requires a destination sector");
                }
                if character.turns_per_warp == 0 {
                    self.add_error(path, "a hull with zero mobility cannot flee");
                }
            }
            ScriptedKind::Pay => {
                if let Some(target) = entry.target.as_deref() {
                    if !toll_ids.contains(target) {
                        self.add_warning(
                            path,
                            &format!("'{target}' is not a toll garrison; payment becomes BRACE"),
                        );
                    }
                } else if toll_ids.is_empty() {
                    self.add_warning(path, "no toll garrison present; payment becomes BRACE");
                }
                if character.credits == 0 {
                    self.add_warning(path, "character has no credits to pay with");
                }
            }
            ScriptedKind::Brace | ScriptedKind::Wait => {}
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Adds an error to the collection.
    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    /// Adds a warning to the collection.
    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
