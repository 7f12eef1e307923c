//! AEON CLI entry point.
//!
//! Binary name: `aeon`
//!
//! Parses CLI arguments, sets up tracing, builds the engine, then dispatches
//! to the command handler.

mod cli;
mod state;

use aeon_observe::tracing_setup::{init_tracing, shutdown_tracing, TracingOptions};
use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,aeon_core=debug",
        _ => "trace",
    };
    init_tracing(&TracingOptions {
        default_filter: filter.to_string(),
        json: cli.log_json,
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        // Neither command needs the engine
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "aeon", &mut std::io::stdout());
            Ok(())
        }
        Commands::Validate { file } => cli::workflow::validate(&file, cli.json),

        Commands::Run {
            file,
            payload,
            trigger,
            watch,
        } => {
            let state = AppState::init().await?;
            let options = cli::workflow::RunOptions {
                payload,
                trigger,
                watch: watch && !cli.json && !cli.quiet,
                json: cli.json,
                quiet: cli.quiet,
            };
            let result = cli::workflow::run(&state, &file, options).await;
            state.shutdown().await;
            result
        }
    }
}
