//! CLI argument definitions
//!
//! All Clap derive structs for `skirmish` command-line parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::observability::LogFormat;

// ============================================================================
// Root CLI
// ============================================================================

/// Round-based combat encounter coordinator.
#[derive(Parser, Debug)]
#[command(name = "skirmish", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "SKIRMISH_COLOR")]
    pub color: ColorChoice,
}

// ============================================================================
// Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scenario file through the coordinator.
    Simulate(SimulateArgs),

    /// Validate scenario files without running them.
    Validate(ValidateArgs),

    /// Display version information.
    Version(VersionArgs),
}

/// Arguments for `simulate`.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Path to the scenario file.
    #[arg(short, long, env = "SKIRMISH_SCENARIO")]
    pub scenario: PathBuf,

    /// Round timeout such as `30s` or `500ms` (overrides the environment,
    /// not the scenario file).
    #[arg(long)]
    pub round_timeout: Option<String>,

    /// Let garrisons act on their own after each round opens.
    #[arg(long)]
    pub auto_garrisons: bool,

    /// Stop and cancel the encounter after this many rounds.
    #[arg(long, default_value_t = crate::simulation::DEFAULT_MAX_ROUNDS)]
    pub max_rounds: u32,

    /// Write JSONL events to this file (use `-` for stderr).
    #[arg(long, env = "SKIRMISH_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,

    /// Serve Prometheus metrics on this port.
    #[arg(long, env = "SKIRMISH_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Log output format.
    #[arg(long, default_value = "human", env = "SKIRMISH_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Report format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Scenario files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Treat warnings as errors.
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for version display.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Output format for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulate_requires_scenario() {
        let cli = Cli::try_parse_from(["skirmish", "simulate"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_simulate_defaults() {
        let cli = Cli::try_parse_from(["skirmish", "simulate", "--scenario", "duel.yaml"]).unwrap();
        let Commands::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.max_rounds, crate::simulation::DEFAULT_MAX_ROUNDS);
        assert_eq!(args.log_format, LogFormat::Human);
        assert_eq!(args.format, OutputFormat::Human);
        assert!(!args.auto_garrisons);
        assert!(args.round_timeout.is_none());
    }

    #[test]
    fn test_validate_requires_files() {
        assert!(Cli::try_parse_from(["skirmish", "validate"]).is_err());
        let cli = Cli::try_parse_from(["skirmish", "validate", "a.yaml", "b.yaml", "--strict"])
            .unwrap();
        let Commands::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(args.files.len(), 2);
        assert!(args.strict);
    }

    #[test]
    fn test_global_verbosity() {
        let cli = Cli::try_parse_from(["skirmish", "-vv", "version"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.color, ColorChoice::Auto);
    }

    #[test]
    fn test_help_output() {
        let err = Cli::try_parse_from(["skirmish", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_version_output() {
        let err = Cli::try_parse_from(["skirmish", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
