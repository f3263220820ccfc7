//! Logging initialization.
//!
//! Structured logging via `tracing` with human-readable and JSON output,
//! `-v` based verbosity, and an environment override via
//! `SKIRMISH_LOG_LEVEL`.

use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

use crate::cli::args::ColorChoice;

/// Environment variable that overrides the verbosity flags.
pub const LOG_LEVEL_ENV: &str = "SKIRMISH_LOG_LEVEL";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with optional ANSI colors.
    #[default]
    Human,
    /// Newline-delimited JSON for machine consumption.
    Json,
}

/// Maps a verbosity level to a tracing directive string.
///
/// - 0 → `"warn"`
/// - 1 → `"info"`
/// - 2 → `"debug"`
/// - 3+ → `"trace"` (saturates)
#[must_use]
pub const fn verbosity_to_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Picks the filter directive: a non-blank `SKIRMISH_LOG_LEVEL` value wins,
/// otherwise the `-v` count decides.
#[must_use]
pub fn effective_directive(env_value: Option<&str>, verbosity: u8) -> String {
    env_value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(|| verbosity_to_directive(verbosity).to_string(), str::to_string)
}

/// Builds the filter, falling back to the `-v` level when the override
/// does not parse.
fn build_filter(env_value: Option<&str>, verbosity: u8) -> EnvFilter {
    let directive = effective_directive(env_value, verbosity);
    EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("ignoring invalid {LOG_LEVEL_ENV}={directive:?}: {err}");
        EnvFilter::new(verbosity_to_directive(verbosity))
    })
}

/// Initializes the global tracing subscriber.
///
/// If `SKIRMISH_LOG_LEVEL` is set it takes precedence over `verbosity`.
/// Logs always go to stderr so stdout stays free for reports.
///
/// Uses `try_init()`, so calling this more than once (e.g. in tests) is safe.
pub fn init_logging(format: LogFormat, verbosity: u8, color: ColorChoice) {
    let env_value = std::env::var(LOG_LEVEL_ENV).ok();
    let filter = build_filter(env_value.as_deref(), verbosity);

    let show_target = verbosity >= 2;

    let use_ansi = match color {
        ColorChoice::Auto => {
            std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
        }
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    match format {
        LogFormat::Human => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(use_ansi)
                .with_target(show_target)
                .with_writer(std::io::stderr)
                .try_init();
        }
        LogFormat::Json => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_target(show_target)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
