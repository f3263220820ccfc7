//! `skirmish simulate`
//!
//! Loads a scenario, runs it through the coordinator and prints the report.

use std::path::Path;
use std::sync::Arc;

use crate::cli::args::{OutputFormat, SimulateArgs};
use crate::config::runtime::parse_timeout;
use crate::config::{CoordinatorConfig, CoordinatorSection, ScenarioLoader};
use crate::error::SkirmishError;
use crate::observability::{EventEmitter, init_metrics};
use crate::simulation::{Simulation, SimulationReport};

/// Run a scenario and print its report.
///
/// # Errors
///
/// Returns an error if the scenario cannot be loaded, the events file
/// cannot be created, the metrics listener cannot start, or the encounter
/// cannot be started.
pub async fn run(args: &SimulateArgs, quiet: bool) -> Result<(), SkirmishError> {
    tracing::info!(file = %args.scenario.display(), "loading scenario");
    let loaded = ScenarioLoader::with_defaults().load(&args.scenario)?;
    for warning in &loaded.warnings {
        tracing::warn!(
            location = warning.location.as_deref().unwrap_or("<unknown>"),
            "{}",
            warning.message
        );
    }

    if let Some(port) = args.metrics_port {
        init_metrics(Some(port))?;
    }

    if let Some(raw) = &args.round_timeout {
        parse_timeout(raw)?;
    }
    // Flags win over the scenario's own coordinator block
    let overrides = CoordinatorSection {
        round_timeout: args.round_timeout.clone(),
        completed_capacity: None,
        auto_garrison_actions: args.auto_garrisons.then_some(true),
    };

    let emitter = Arc::new(open_events(args.events_file.as_deref())?);
    let report = Simulation::new(CoordinatorConfig::from_env(), emitter)
        .overrides(overrides)
        .max_rounds(args.max_rounds)
        .run(&loaded.scenario)
        .await?;

    if !quiet {
        print_report(&report, args.format)?;
    }
    Ok(())
}

fn open_events(path: Option<&Path>) -> Result<EventEmitter, SkirmishError> {
    match path {
        None => Ok(EventEmitter::noop()),
        Some(p) if p.as_os_str() == "-" => Ok(EventEmitter::stderr()),
        Some(p) => Ok(EventEmitter::from_file(p)?),
    }
}

fn print_report(report: &SimulationReport, format: OutputFormat) -> Result<(), SkirmishError> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Human => {
            let end_state = report
                .end_state
                .as_ref()
                .map_or_else(|| "unresolved".to_string(), ToString::to_string);
            println!(
                "combat {}: {end_state} after {} round(s){}",
                report.combat_id,
                report.rounds,
                if report.truncated { " (round limit)" } else { "" }
            );
            for (id, survivor) in &report.survivors {
                println!(
                    "  {id}: {} fighters, {} shields",
                    survivor.fighters, survivor.shields
                );
            }
            for id in &report.fled {
                println!("  {id}: fled");
            }
            for (garrison, balance) in &report.toll_balances {
                println!("  {garrison}: {balance} credits collected");
            }
        }
    }
    Ok(())
}
