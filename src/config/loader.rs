//! Scenario loader
//!
//! Pipeline:
//! 1. Size check
//! 2. YAML parsing
//! 3. Deserialization to [`Scenario`]
//! 4. Validation (errors abort, warnings are returned)

use std::path::Path;

use crate::config::schema::Scenario;
use crate::config::validation::Validator;
use crate::error::ConfigError;

// ============================================================================
// Public API
// ============================================================================

/// Options for the scenario loader.
#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    /// Size limits.
    pub limits: ScenarioLimits,
}

/// Limits that keep hostile scenario files from exhausting resources.
#[derive(Debug, Clone)]
pub struct ScenarioLimits {
    /// Maximum file size in bytes.
    pub max_file_size: usize,
    /// Maximum number of characters plus garrisons.
    pub max_participants: usize,
    /// Maximum script length per character.
    pub max_script_len: usize,
}

impl Default for ScenarioLimits {
    fn default() -> Self {
        Self {
            max_file_size: env_or("SKIRMISH_MAX_SCENARIO_SIZE", 1024 * 1024),
            max_participants: env_or("SKIRMISH_MAX_PARTICIPANTS", 256),
            max_script_len: env_or("SKIRMISH_MAX_SCRIPT_LEN", 1000),
        }
    }
}

/// A loaded scenario plus the warnings found while validating it.
#[derive(Debug)]
pub struct LoadResult {
    /// The validated scenario.
    pub scenario: Scenario,
    /// Non-fatal findings.
    pub warnings: Vec<LoadWarning>,
}

/// Warning during scenario loading.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,
    /// Location where the warning occurred.
    pub location: Option<String>,
}

/// Scenario loader.
#[derive(Debug, Default)]
pub struct ScenarioLoader {
    options: LoaderOptions,
}

impl ScenarioLoader {
    /// Creates a loader with the given options.
    #[must_use]
    pub const fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    /// Creates a loader with default options.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(LoaderOptions::default())
    }

    /// Loads and validates a scenario file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, exceeds the size limit,
    /// does not parse, or fails validation.
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        let limit = self.options.limits.max_file_size;
        let size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if size > limit {
            return Err(ConfigError::TooLarge { size, limit });
        }

        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        self.load_str(&raw, path)
    }

    /// Parses and validates scenario text; `origin` is used in error messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not parse or fails validation.
    pub fn load_str(&self, raw: &str, origin: &Path) -> Result<LoadResult, ConfigError> {
        let limit = self.options.limits.max_file_size;
        if raw.len() > limit {
            return Err(ConfigError::TooLarge {
                size: raw.len(),
                limit,
            });
        }

        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
        if raw.trim().is_empty() {
            return Err(ConfigError::ParseError {
                path: origin.to_path_buf(),
                line: None,
                message: "Scenario file is empty".to_string(),
            });
        }

        let scenario: Scenario = serde_yaml::from_str(raw).map_err(|e| ConfigError::ParseError {
            path: origin.to_path_buf(),
            line: e.location().map(|l| l.line()),
            message: e.to_string(),
        })?;

        let result = Validator::new().validate(&scenario, &self.options.limits);
        if result.has_errors() {
            return Err(ConfigError::ValidationError {
                path: origin.display().to_string(),
                errors: result.errors,
            });
        }

        let warnings = result
            .warnings
            .into_iter()
            .map(|issue| LoadWarning {
                message: issue.message,
                location: Some(issue.path),
            })
            .collect();

        Ok(LoadResult { scenario, warnings })
    }
}

/// Parses an environment variable with a default value.
fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
