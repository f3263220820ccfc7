//! `skirmish` - round-based combat encounter coordinator

use clap::Parser;

use skirmish::cli::args::{Cli, Commands};
use skirmish::cli::commands;
use skirmish::error::ExitCode;
use skirmish::observability::{LogFormat, init_logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !cli.quiet {
        let format = match &cli.command {
            Commands::Simulate(args) => args.log_format,
            _ => LogFormat::Human,
        };
        init_logging(format, cli.verbose, cli.color);
    }

    // Exit with the conventional signal codes on SIGINT/SIGTERM
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");

        let code = tokio::select! {
            _ = tokio::signal::ctrl_c() => ExitCode::INTERRUPTED,
            _ = sigterm.recv() => ExitCode::TERMINATED,
        };
        eprintln!("\nInterrupted, shutting down");
        std::process::exit(code);
    });

    let result = commands::dispatch(cli).await;

    match result {
        Ok(()) => std::process::exit(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
