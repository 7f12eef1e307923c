//! Graph interpreter: walks one execution's step graph to completion.
//!
//! The `Interpreter` runs inside the task that owns a `WorkflowExecution`.
//! It is the only writer of that execution's context and results, and it
//! publishes snapshots to the engine's live map after every state change.
//!
//! # Execution flow
//!
//! 1. Seed the context from workflow variables and the trigger payload.
//! 2. Push entry steps onto a depth-first worklist (definition order).
//! 3. For each popped step: honour cancel/pause, evaluate conditions,
//!    substitute configuration, dispatch with retry and per-attempt timeout.
//! 4. Merge `result.context`, record the result, push connections.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use aeon_types::config::RevisitPolicy;
use aeon_types::event::WorkflowEvent;
use aeon_types::workflow::{
    ActionResult, ActionType, ExecutionStatus, WorkflowDefinition, WorkflowExecution, WorkflowStep,
};
use dashmap::DashMap;
use serde_json::Value;
use tokio::task::JoinError;
use tokio_util::task::AbortOnDropHandle;
use uuid::Uuid;

use crate::event::EventBus;

use super::action::{ActionError, ActionRegistry};
use super::context::ExecutionContext;
use super::control::ExecutionControl;
use super::dag::entry_steps;
use super::expression;
use super::retry::RetryHandler;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Why an execution stopped before completing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    /// A step's executor kept failing after every allowed attempt.
    #[error("step '{step_id}' failed after {attempts} attempt(s): {error}")]
    StepFailed {
        step_id: String,
        attempts: u32,
        error: String,
    },

    /// No executor is registered for the step's action type. Not retried.
    #[error("step '{step_id}': no executor registered for action type '{action_type}'")]
    NoExecutor {
        step_id: String,
        action_type: ActionType,
    },

    /// The executor rejected the step's configuration. Not retried.
    #[error("step '{step_id}' has invalid configuration: {error}")]
    InvalidConfig { step_id: String, error: String },

    /// The last attempt of a step exceeded its timeout.
    #[error("step '{step_id}' timed out after {timeout_secs}s")]
    StepTimeout { step_id: String, timeout_secs: u64 },

    /// The whole execution exceeded `settings.timeout_minutes`.
    #[error("workflow execution timed out after {minutes} minute(s)")]
    WorkflowTimeout { minutes: u64 },

    #[error("execution cancelled")]
    Cancelled,
}

impl ExecutorError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StepFailed { .. } | Self::StepTimeout { .. })
    }
}

/// Describe a failed executor task, using the panic payload when it is text.
fn panic_message(error: JoinError) -> String {
    match error.try_into_panic() {
        Ok(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-text payload".to_string());
            format!("action panicked: {detail}")
        }
        Err(error) => error.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

/// Walks the step graph of one execution.
pub struct Interpreter<'a> {
    pub definition: &'a WorkflowDefinition,
    pub actions: &'a ActionRegistry,
    pub control: &'a ExecutionControl,
    pub events: &'a EventBus,
    /// Live snapshots keyed by execution id, read by status queries.
    pub live: &'a DashMap<Uuid, WorkflowExecution>,
    pub revisit_policy: RevisitPolicy,
    /// Used for steps that declare `timeout_seconds = 0`.
    pub default_step_timeout: Duration,
}

impl Interpreter<'_> {
    /// Run every reachable step. On error the execution keeps whatever
    /// results were recorded before the failure.
    pub async fn run(&self, execution: &mut WorkflowExecution) -> Result<(), ExecutorError> {
        let mut context =
            ExecutionContext::seeded(&self.definition.variables, &execution.trigger_data);
        self.sync(execution, &context);

        let mut stack: Vec<&WorkflowStep> = entry_steps(&self.definition.steps);
        stack.reverse();
        let mut visited: HashSet<&str> = HashSet::new();

        while let Some(step) = stack.pop() {
            self.step_boundary(execution).await?;

            if self.revisit_policy == RevisitPolicy::OncePerExecution
                && visited.contains(step.id.as_str())
            {
                tracing::debug!(
                    execution_id = %execution.id,
                    step_id = step.id.as_str(),
                    "step already ran on another path"
                );
                continue;
            }

            execution.current_step = Some(step.id.clone());
            self.publish(execution);

            if !self.conditions_hold(step, &context) {
                tracing::info!(
                    execution_id = %execution.id,
                    step_id = step.id.as_str(),
                    "step conditions not met, skipping"
                );
                self.events.publish(WorkflowEvent::StepSkipped {
                    execution_id: execution.id,
                    step_id: step.id.clone(),
                });
                continue;
            }
            visited.insert(step.id.as_str());

            let result = self
                .run_step(execution.id, step, &context, &execution.trigger_data)
                .await?;

            context.merge(&result.context);
            execution.step_results.insert(step.id.clone(), result);
            execution.completed_steps.push(step.id.clone());
            self.sync(execution, &context);

            for target in step.connections.iter().rev() {
                if let Some(next) = self.definition.step(target) {
                    stack.push(next);
                }
            }
        }

        Ok(())
    }

    /// Check for cancellation and park while paused.
    async fn step_boundary(&self, execution: &mut WorkflowExecution) -> Result<(), ExecutorError> {
        if self.control.is_cancelled() {
            return Err(ExecutorError::Cancelled);
        }
        if !self.control.is_paused() {
            return Ok(());
        }

        execution.status = ExecutionStatus::Paused;
        self.publish(execution);
        self.events.publish(WorkflowEvent::ExecutionPaused {
            execution_id: execution.id,
        });
        tracing::info!(execution_id = %execution.id, "execution paused");

        if !self.control.wait_while_paused().await {
            return Err(ExecutorError::Cancelled);
        }

        execution.status = ExecutionStatus::Running;
        self.publish(execution);
        tracing::info!(execution_id = %execution.id, "execution resumed");
        Ok(())
    }

    fn conditions_hold(&self, step: &WorkflowStep, context: &ExecutionContext) -> bool {
        step.conditions
            .iter()
            .all(|condition| expression::evaluate(condition, context.as_map()))
    }

    /// Dispatch a step, retrying failed attempts per its retry policy.
    async fn run_step(
        &self,
        execution_id: Uuid,
        step: &WorkflowStep,
        context: &ExecutionContext,
        trigger_data: &Value,
    ) -> Result<ActionResult, ExecutorError> {
        let configuration = context.substitute(&step.configuration);
        let timeout = match step.timeout_seconds {
            0 => self.default_step_timeout,
            secs => Duration::from_secs(secs),
        };

        self.events.publish(WorkflowEvent::StepStarted {
            execution_id,
            step_id: step.id.clone(),
            action_type: step.action_type,
        });
        tracing::info!(
            execution_id = %execution_id,
            step_id = step.id.as_str(),
            action_type = %step.action_type,
            "executing step"
        );

        let started = Instant::now();
        let mut attempt = 1;
        loop {
            let error = match self
                .attempt(step, attempt, &configuration, context, trigger_data, timeout)
                .await
            {
                Ok(result) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    tracing::info!(
                        execution_id = %execution_id,
                        step_id = step.id.as_str(),
                        success = result.success,
                        duration_ms,
                        "step completed"
                    );
                    self.events.publish(WorkflowEvent::StepCompleted {
                        execution_id,
                        step_id: step.id.clone(),
                        success: result.success,
                        duration_ms,
                    });
                    return Ok(result);
                }
                Err(ExecutorError::Cancelled) => return Err(ExecutorError::Cancelled),
                Err(e) => e,
            };

            let retry = error.is_retryable()
                && RetryHandler::should_retry(&step.retry_policy, attempt);
            if !retry {
                tracing::error!(
                    execution_id = %execution_id,
                    step_id = step.id.as_str(),
                    attempts = attempt,
                    error = %error,
                    "step failed, retries exhausted"
                );
                return Err(error);
            }

            tracing::warn!(
                execution_id = %execution_id,
                step_id = step.id.as_str(),
                attempt,
                max_attempts = RetryHandler::max_attempts(&step.retry_policy),
                error = %error,
                "step attempt failed, retrying"
            );
            self.events.publish(WorkflowEvent::StepRetrying {
                execution_id,
                step_id: step.id.clone(),
                attempt,
                error: error.to_string(),
            });

            tokio::select! {
                biased;
                _ = self.control.cancelled() => return Err(ExecutorError::Cancelled),
                _ = tokio::time::sleep(RetryHandler::delay(&step.retry_policy)) => {}
            }
            attempt += 1;
        }
    }

    /// One bounded, cancellable call into the step's executor.
    ///
    /// The call runs on its own task so a panicking executor fails the
    /// attempt instead of unwinding the execution. Dropping the handle aborts
    /// the call.
    async fn attempt(
        &self,
        step: &WorkflowStep,
        attempt: u32,
        configuration: &Value,
        context: &ExecutionContext,
        trigger_data: &Value,
        timeout: Duration,
    ) -> Result<ActionResult, ExecutorError> {
        let Some(executor) = self.actions.get(step.action_type) else {
            return Err(ExecutorError::NoExecutor {
                step_id: step.id.clone(),
                action_type: step.action_type,
            });
        };

        let configuration = configuration.clone();
        let context = context.as_map().clone();
        let trigger_data = trigger_data.clone();
        let mut call = AbortOnDropHandle::new(tokio::spawn(async move {
            executor
                .execute(&configuration, &context, &trigger_data)
                .await
        }));

        tokio::select! {
            biased;
            _ = self.control.cancelled() => Err(ExecutorError::Cancelled),
            outcome = tokio::time::timeout(timeout, &mut call) => match outcome {
                Ok(Ok(Ok(result))) => Ok(result),
                Ok(Ok(Err(ActionError::InvalidConfig(msg)))) => {
                    Err(ExecutorError::InvalidConfig {
                        step_id: step.id.clone(),
                        error: msg,
                    })
                }
                Ok(Ok(Err(e))) => Err(ExecutorError::StepFailed {
                    step_id: step.id.clone(),
                    attempts: attempt,
                    error: e.to_string(),
                }),
                Ok(Err(join_error)) => Err(ExecutorError::StepFailed {
                    step_id: step.id.clone(),
                    attempts: attempt,
                    error: panic_message(join_error),
                }),
                Err(_elapsed) => Err(ExecutorError::StepTimeout {
                    step_id: step.id.clone(),
                    timeout_secs: timeout.as_secs(),
                }),
            },
        }
    }

    /// Copy the context into the execution record and publish a snapshot.
    fn sync(&self, execution: &mut WorkflowExecution, context: &ExecutionContext) {
        execution.execution_context = context.as_map().clone();
        self.publish(execution);
    }

    fn publish(&self, execution: &WorkflowExecution) {
        self.live.insert(execution.id, execution.clone());
    }
}
