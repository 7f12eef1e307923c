//! CLI workflow subcommands: `validate` and `run`.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;

use aeon_core::event::ExecutionEvents;
use aeon_core::workflow::dag::{entry_steps, topological_order};
use aeon_core::workflow::definition::{load_workflow_file, WorkflowError};
use aeon_types::event::WorkflowEvent;
use aeon_types::workflow::{
    ExecutionStatus, MetricsSummary, TriggerType, WorkflowDefinition, WorkflowExecution,
};

use crate::state::AppState;

/// Flags for `aeon run`.
pub struct RunOptions {
    pub payload: Option<String>,
    pub trigger: TriggerType,
    pub watch: bool,
    pub json: bool,
    pub quiet: bool,
}

fn load_definition(file: &Path) -> Result<WorkflowDefinition> {
    load_workflow_file(file).map_err(|e| match e {
        WorkflowError::ParseError(msg) => anyhow!("Failed to parse workflow file: {msg}"),
        WorkflowError::IoError(err) => anyhow!("Failed to read {}: {err}", file.display()),
        other => anyhow!("Workflow validation failed: {other}"),
    })
}

/// Parse the `--payload` flag. Absent means an empty object.
fn parse_payload(raw: Option<&str>) -> Result<Value> {
    match raw {
        None => Ok(json!({})),
        Some(raw) => serde_json::from_str(raw).context("Invalid JSON payload"),
    }
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

pub fn validate(file: &Path, json: bool) -> Result<()> {
    let def = load_definition(file)?;
    let order = topological_order(&def.steps)?;
    let entries: Vec<&str> = entry_steps(&def.steps)
        .iter()
        .map(|s| s.id.as_str())
        .collect();

    if json {
        let out = json!({
            "id": def.id,
            "name": def.name,
            "valid": true,
            "steps": def.steps.len(),
            "entry_steps": entries,
            "order": order,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Workflow '{}' is valid",
        style("*").green().bold(),
        style(&def.name).cyan()
    );
    println!("  ID: {}", def.id);
    println!("  Steps: {}", def.steps.len());
    println!("  Entry steps: {}", entries.join(", "));
    println!("  Order: {}", order.join(" -> "));
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub async fn run(state: &AppState, file: &Path, options: RunOptions) -> Result<()> {
    let def = load_definition(file)?;
    let trigger_data = parse_payload(options.payload.as_deref())?;

    let workflow_id = state.engine.register_workflow(def)?;
    let events = options.watch.then(|| state.engine.subscribe());
    let execution_id = state
        .engine
        .trigger_workflow(&workflow_id, trigger_data, options.trigger)?;
    let watcher =
        events.map(|rx| tokio::spawn(print_events(ExecutionEvents::new(rx, execution_id))));

    let execution = state.engine.wait_for_completion(execution_id).await?;
    if let Some(watcher) = watcher {
        let _ = watcher.await;
    }
    let metrics = state.engine.get_workflow_metrics(&workflow_id);

    if options.json {
        let out = json!({ "execution": execution, "metrics": metrics });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if !options.quiet {
        display_execution(&execution, &metrics);
    }

    match execution.status {
        ExecutionStatus::Completed => Ok(()),
        status => bail!(
            "execution {execution_id} {status}: {}",
            execution.error_message.as_deref().unwrap_or("no error recorded")
        ),
    }
}

/// Print step events for one execution until it finishes.
async fn print_events(mut events: ExecutionEvents) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                println!("  {}", style(format!("({skipped} events skipped)")).dim());
                continue;
            }
            Err(RecvError::Closed) => return,
        };

        match event {
            WorkflowEvent::ExecutionStarted { workflow_id, .. } => {
                println!("  {} started '{}'", style(">").cyan(), workflow_id);
            }
            WorkflowEvent::StepStarted {
                step_id,
                action_type,
                ..
            } => {
                println!("  {} {step_id} ({action_type})", style("-").dim());
            }
            WorkflowEvent::StepCompleted {
                step_id,
                success,
                duration_ms,
                ..
            } => {
                let mark = if success {
                    style("ok").green()
                } else {
                    style("unsuccessful").yellow()
                };
                println!("  {} {step_id} {mark} in {duration_ms}ms", style("-").dim());
            }
            WorkflowEvent::StepSkipped { step_id, .. } => {
                println!("  {} {step_id} skipped", style("-").dim());
            }
            WorkflowEvent::StepRetrying {
                step_id,
                attempt,
                error,
                ..
            } => {
                println!(
                    "  {} {step_id} attempt {attempt} failed: {error}",
                    style("!").yellow()
                );
            }
            WorkflowEvent::ExecutionPaused { .. } => {
                println!("  {} paused", style("||").yellow());
            }
            WorkflowEvent::ExecutionFinished { status, .. } => {
                println!("  {} finished: {status}", style(">").cyan());
            }
        }
    }
}

fn status_cell(status: ExecutionStatus) -> Cell {
    let color = match status {
        ExecutionStatus::Completed => Color::Green,
        ExecutionStatus::Failed => Color::Red,
        ExecutionStatus::Cancelled | ExecutionStatus::Paused => Color::Yellow,
        ExecutionStatus::Pending | ExecutionStatus::Running => Color::Cyan,
    };
    Cell::new(status).fg(color)
}

fn display_execution(execution: &WorkflowExecution, metrics: &MetricsSummary) {
    println!();
    println!(
        "  Execution {} of '{}'",
        style(execution.id).bold(),
        style(&execution.workflow_id).cyan()
    );
    println!();

    let mut summary = Table::new();
    summary
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Status").fg(Color::Cyan),
            Cell::new("Trigger"),
            Cell::new("Steps"),
            Cell::new("Duration"),
        ]);
    summary.add_row(vec![
        status_cell(execution.status),
        Cell::new(execution.trigger_type),
        Cell::new(execution.completed_steps.len()),
        Cell::new(
            execution
                .duration_seconds()
                .map(|s| format!("{s:.3}s"))
                .unwrap_or_else(|| "-".to_string()),
        ),
    ]);
    println!("{summary}");

    if !execution.completed_steps.is_empty() {
        let mut steps = Table::new();
        steps
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("#"),
                Cell::new("Step").fg(Color::Cyan),
                Cell::new("Success"),
                Cell::new("Context"),
            ]);
        for (index, step_id) in execution.completed_steps.iter().enumerate() {
            let result = execution.step_results.get(step_id);
            let success = result.map(|r| r.success).unwrap_or(false);
            let mut keys: Vec<&str> = result
                .map(|r| r.context.keys().map(String::as_str).collect())
                .unwrap_or_default();
            keys.sort_unstable();
            steps.add_row(vec![
                Cell::new(index + 1),
                Cell::new(step_id),
                Cell::new(if success { "yes" } else { "no" })
                    .fg(if success { Color::Green } else { Color::Yellow }),
                Cell::new(keys.join(", ")),
            ]);
        }
        println!("{steps}");
    }

    if let Some(error) = &execution.error_message {
        println!();
        println!("  {} {}", style("Error:").red().bold(), error);
    }

    println!();
    println!(
        "  Runs: {}  Succeeded: {}  Failed: {}  Success rate: {:.0}%  Avg duration: {:.3}s",
        metrics.total_executions,
        metrics.successful_executions,
        metrics.failed_executions,
        metrics.success_rate * 100.0,
        metrics.average_duration_seconds
    );
    println!();
}
