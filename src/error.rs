//! Error types for `skirmish`
//!
//! Usage errors raised synchronously by the coordinator, callback failures
//! surfaced after a round has been committed, and configuration errors from
//! the scenario loader all aggregate into [`SkirmishError`].

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `skirmish` CLI operations.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Combat coordinator error (usage error or callback failure)
    pub const COMBAT_ERROR: i32 = 6;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `skirmish` operations.
#[derive(Debug, Error)]
pub enum SkirmishError {
    /// Scenario or coordinator configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Combat coordinator error
    #[error(transparent)]
    Combat(#[from] CombatError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SkirmishError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Combat(_) => ExitCode::COMBAT_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Combat Errors
// ============================================================================

/// Errors returned by the combat coordinator.
///
/// Everything except [`CombatError::Callback`] is a usage error: it is
/// raised before any encounter state is touched. A callback error is
/// raised after the round it belongs to has already been committed.
#[derive(Debug, Error)]
pub enum CombatError {
    /// No active encounter with this id
    #[error("unknown combat encounter: {0}")]
    UnknownEncounter(String),

    /// An encounter with this id is already active
    #[error("combat encounter already active: {0}")]
    DuplicateEncounter(String),

    /// The encounter has reached a terminal state
    #[error("combat encounter has ended: {0}")]
    EncounterEnded(String),

    /// The combatant is not a participant of the encounter
    #[error("combatant '{combatant_id}' is not part of combat '{combat_id}'")]
    UnknownCombatant {
        /// Encounter id
        combat_id: String,
        /// Offending combatant id
        combatant_id: String,
    },

    /// ATTACK without a valid target among current participants
    #[error("invalid attack target for '{combatant_id}': {reason}")]
    InvalidTarget {
        /// Attacking combatant
        combatant_id: String,
        /// Why the target was rejected
        reason: String,
    },

    /// ATTACK committing no fighters
    #[error("combatant '{combatant_id}' must commit at least one fighter to attack")]
    InvalidCommit {
        /// Attacking combatant
        combatant_id: String,
    },

    /// FLEE without a destination sector
    #[error("combatant '{0}' must name a destination sector to flee")]
    MissingDestination(String),

    /// FLEE from a combatant that cannot move (garrison or zero mobility)
    #[error("combatant '{0}' cannot flee")]
    FleeNotAllowed(String),

    /// A notification callback failed after the round was committed
    #[error(transparent)]
    Callback(#[from] CallbackError),
}

impl CombatError {
    /// Whether this error was raised before any state was mutated.
    #[must_use]
    pub const fn is_usage_error(&self) -> bool {
        !matches!(self, Self::Callback(_))
    }
}

/// Failure reported by an injected coordinator callback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallbackError {
    /// The callback was cancelled (e.g. its caller is shutting down)
    #[error("callback cancelled: {0}")]
    Cancelled(String),

    /// The callback failed
    #[error("callback failed: {0}")]
    Failed(String),
}

impl CallbackError {
    /// Returns `true` for the cancellation variant.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Scenario and coordinator configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}")]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// File exceeds the configured size limit
    #[error("file too large: {size} bytes (limit: {limit})")]
    TooLarge {
        /// Actual file size in bytes
        size: usize,
        /// Configured limit in bytes
        limit: usize,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during scenario validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "characters[1].script[0].target")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Prevents the scenario from being used
    Error,
    /// Suspicious but loadable
    Warning,
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `skirmish` operations.
pub type Result<T> = std::result::Result<T, SkirmishError>;

// ============================================================================
// Tests
// ============================================================================
