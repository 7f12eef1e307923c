//! CLI command definitions for the `aeon` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod workflow;

use std::path::PathBuf;

use aeon_types::workflow::TriggerType;
use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Run and validate AEON workflow definitions.
#[derive(Parser)]
#[command(name = "aeon", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "AEON_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and validate a workflow definition (YAML or JSON).
    Validate {
        /// Path to the workflow file.
        file: PathBuf,
    },

    /// Register a workflow, trigger one execution, and wait for it.
    Run {
        /// Path to the workflow file.
        file: PathBuf,

        /// JSON trigger payload.
        #[arg(long)]
        payload: Option<String>,

        /// Trigger type recorded on the execution.
        #[arg(long, default_value = "manual")]
        trigger: TriggerType,

        /// Print step events while the execution runs.
        #[arg(long)]
        watch: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
