//! Coordinator runtime settings.

use std::time::Duration;

use crate::config::schema::CoordinatorSection;
use crate::error::ConfigError;

/// Default time a round waits for actions.
pub const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of finished encounters kept for lookups.
pub const DEFAULT_COMPLETED_CAPACITY: usize = 1000;

/// Runtime settings of a [`CombatCoordinator`](crate::coordinator::CombatCoordinator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Time each round waits for actions before missing ones default to BRACE.
    pub round_timeout: Duration,
    /// Bound of the completed-encounter registry (FIFO eviction).
    pub completed_capacity: usize,
    /// Submit scripted garrison actions after each "round waiting" notification.
    pub auto_garrison_actions: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            round_timeout: DEFAULT_ROUND_TIMEOUT,
            completed_capacity: DEFAULT_COMPLETED_CAPACITY,
            auto_garrison_actions: false,
        }
    }
}

impl CoordinatorConfig {
    /// Defaults overridden by `SKIRMISH_ROUND_TIMEOUT`,
    /// `SKIRMISH_COMPLETED_CAPACITY` and `SKIRMISH_AUTO_GARRISON`.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            round_timeout: std::env::var("SKIRMISH_ROUND_TIMEOUT")
                .ok()
                .and_then(|v| humantime::parse_duration(&v).ok())
                .unwrap_or(defaults.round_timeout),
            completed_capacity: env_or("SKIRMISH_COMPLETED_CAPACITY", defaults.completed_capacity)
                .max(1),
            auto_garrison_actions: env_or("SKIRMISH_AUTO_GARRISON", defaults.auto_garrison_actions),
        }
    }

    /// Applies the `coordinator` block of a scenario file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unparseable timeout or a
    /// zero capacity.
    pub fn apply(&mut self, section: &CoordinatorSection) -> Result<(), ConfigError> {
        if let Some(raw) = &section.round_timeout {
            self.round_timeout = parse_timeout(raw)?;
        }
        if let Some(capacity) = section.completed_capacity {
            if capacity == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "coordinator.completed_capacity".to_string(),
                    value: "0".to_string(),
                    expected: "a positive number".to_string(),
                });
            }
            self.completed_capacity = capacity;
        }
        if let Some(auto) = section.auto_garrison_actions {
            self.auto_garrison_actions = auto;
        }
        Ok(())
    }

    /// Builder-style round timeout override.
    #[must_use]
    pub const fn with_round_timeout(mut self, round_timeout: Duration) -> Self {
        self.round_timeout = round_timeout;
        self
    }

    /// Builder-style completed capacity override.
    #[must_use]
    pub const fn with_completed_capacity(mut self, capacity: usize) -> Self {
        self.completed_capacity = capacity;
        self
    }

    /// Builder-style toggle for scripted garrisons.
    #[must_use]
    pub const fn with_auto_garrison_actions(mut self, enabled: bool) -> Self {
        self.auto_garrison_actions = enabled;
        self
    }
}

/// Parses a human duration such as `"30s"` or `"1m 30s"`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if the string is not a non-zero duration.
pub fn parse_timeout(raw: &str) -> Result<Duration, ConfigError> {
    match humantime::parse_duration(raw.trim()) {
        Ok(d) if !d.is_zero() => Ok(d),
        _ => Err(ConfigError::InvalidValue {
            field: "round_timeout".to_string(),
            value: raw.to_string(),
            expected: "a non-zero duration such as \"30s\" or \"500ms\"".to_string(),
        }),
    }
}

/// Parses an environment variable with a default value.
fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
