//! `WorkflowEngine`: the management API over registry, executions, and history.
//!
//! The engine is an explicit value owned by the application root. Each
//! triggered execution runs as its own tokio task (tracked so `shutdown` can
//! wait for them), gated by a per-workflow semaphore sized by
//! `settings.max_concurrent_executions` and bounded by
//! `settings.timeout_minutes`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aeon_types::config::EngineConfig;
use aeon_types::event::WorkflowEvent;
use aeon_types::workflow::{
    ActionType, ExecutionStatus, MetricsSummary, TriggerType, WorkflowDefinition,
    WorkflowExecution,
};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::event::EventBus;

use super::action::{ActionExecutor, ActionRegistry};
use super::control::ExecutionControl;
use super::definition::WorkflowError;
use super::executor::{ExecutorError, Interpreter};
use super::history::ExecutionHistory;
use super::registry::WorkflowRegistry;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors returned by the engine's management API.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    /// The operation does not apply to the execution's (or engine's) state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Semaphore gating concurrent executions of one workflow.
///
/// Resized in place when the limit changes. Permits held by running
/// executions that exceed a lowered limit are retired as they are released.
#[derive(Debug, Clone)]
struct WorkflowPermits {
    limit: u32,
    semaphore: Arc<Semaphore>,
    /// Held permits to forget on release instead of returning.
    excess: Arc<AtomicU32>,
}

impl WorkflowPermits {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit as usize)),
            excess: Arc::new(AtomicU32::new(0)),
        }
    }

    fn resize(&mut self, limit: u32) {
        if limit > self.limit {
            let mut grow = limit - self.limit;
            let cancelled = self
                .excess
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    Some(n.saturating_sub(grow))
                })
                .map_or(0, |prev| prev.min(grow));
            grow -= cancelled;
            self.semaphore.add_permits(grow as usize);
        } else {
            let shrink = self.limit - limit;
            let shed = self.semaphore.forget_permits(shrink as usize) as u32;
            self.excess.fetch_add(shrink - shed, Ordering::SeqCst);
        }
        self.limit = limit;
    }

    /// Return a permit, or retire it if the limit was lowered while it was held.
    fn release(&self, permit: OwnedSemaphorePermit) {
        let retire = self
            .excess
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if retire {
            permit.forget();
        }
    }
}

/// Single-process workflow execution engine.
pub struct WorkflowEngine {
    config: EngineConfig,
    registry: WorkflowRegistry,
    actions: ActionRegistry,
    history: ExecutionHistory,
    /// Snapshots of non-terminal executions.
    live: DashMap<Uuid, WorkflowExecution>,
    /// Control handles of non-terminal executions.
    controls: DashMap<Uuid, Arc<ExecutionControl>>,
    /// Per-workflow concurrency semaphores keyed by workflow id.
    concurrency_semaphores: DashMap<String, WorkflowPermits>,
    event_bus: EventBus,
    tracker: TaskTracker,
}

impl WorkflowEngine {
    /// Create an engine with the given configuration and action executors.
    pub fn new(config: EngineConfig, actions: ActionRegistry) -> Arc<Self> {
        Arc::new(Self {
            registry: WorkflowRegistry::new(),
            actions,
            history: ExecutionHistory::new(config.history_limit),
            live: DashMap::new(),
            controls: DashMap::new(),
            concurrency_semaphores: DashMap::new(),
            event_bus: EventBus::new(config.event_capacity),
            tracker: TaskTracker::new(),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register (or replace) an action executor.
    pub fn register_action<T: ActionExecutor + 'static>(&self, action_type: ActionType, executor: T) {
        self.actions.register(action_type, executor);
    }

    /// Subscribe to execution lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.event_bus.subscribe()
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    /// Validate and store a workflow definition. Returns its id.
    pub fn register_workflow(&self, definition: WorkflowDefinition) -> Result<String, WorkflowError> {
        let definition = self.registry.register(definition)?;
        self.sync_permits(&definition);
        Ok(definition.id.clone())
    }

    /// Replace a workflow definition, refreshing `updated_at`.
    pub fn update_workflow(&self, definition: WorkflowDefinition) -> Result<String, WorkflowError> {
        let definition = self.registry.update(definition)?;
        self.sync_permits(&definition);
        Ok(definition.id.clone())
    }

    pub fn get_workflow(&self, workflow_id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.registry.get(workflow_id)
    }

    pub fn list_workflows(&self) -> Vec<Arc<WorkflowDefinition>> {
        self.registry.list()
    }

    /// Remove a workflow. Executions already running keep their snapshot.
    pub fn remove_workflow(&self, workflow_id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.concurrency_semaphores.remove(workflow_id);
        self.registry.remove(workflow_id)
    }

    /// Resize the workflow's semaphore when its concurrency limit changed.
    fn sync_permits(&self, definition: &WorkflowDefinition) {
        let limit = definition.settings.max_concurrent_executions;
        let mut entry = self
            .concurrency_semaphores
            .entry(definition.id.clone())
            .or_insert_with(|| WorkflowPermits::new(limit));
        if entry.limit != limit {
            entry.resize(limit);
        }
    }

    /// The workflow's current permits, created on first use.
    fn permits_for(&self, definition: &WorkflowDefinition) -> WorkflowPermits {
        self.concurrency_semaphores
            .entry(definition.id.clone())
            .or_insert_with(|| WorkflowPermits::new(definition.settings.max_concurrent_executions))
            .clone()
    }

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Start an execution of a registered workflow and return its id
    /// immediately. Must be called from within a tokio runtime.
    pub fn trigger_workflow(
        self: &Arc<Self>,
        workflow_id: &str,
        trigger_data: Value,
        trigger_type: TriggerType,
    ) -> Result<Uuid, EngineError> {
        if self.tracker.is_closed() {
            return Err(EngineError::InvalidState(
                "engine is shutting down".to_string(),
            ));
        }
        let definition = self
            .registry
            .get(workflow_id)
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;

        let execution = WorkflowExecution::new(workflow_id, trigger_type, trigger_data);
        let execution_id = execution.id;
        let control = Arc::new(ExecutionControl::new());

        self.controls.insert(execution_id, Arc::clone(&control));
        self.live.insert(execution_id, execution.clone());

        tracing::info!(
            execution_id = %execution_id,
            workflow_id,
            trigger_type = %trigger_type,
            "workflow execution queued"
        );

        let engine = Arc::clone(self);
        self.tracker
            .spawn(async move { engine.drive(definition, execution, control).await });

        Ok(execution_id)
    }

    /// Body of the per-execution task.
    async fn drive(
        self: Arc<Self>,
        definition: Arc<WorkflowDefinition>,
        mut execution: WorkflowExecution,
        control: Arc<ExecutionControl>,
    ) {
        let permits = self.permits_for(&definition);
        let permit = tokio::select! {
            biased;
            _ = control.cancelled() => None,
            permit = Arc::clone(&permits.semaphore).acquire_owned() => permit.ok(),
        };

        let outcome = match permit {
            None => Err(ExecutorError::Cancelled),
            Some(permit) => {
                execution.status = ExecutionStatus::Running;
                execution.started_at = Utc::now();
                self.live.insert(execution.id, execution.clone());
                self.event_bus.publish(WorkflowEvent::ExecutionStarted {
                    execution_id: execution.id,
                    workflow_id: execution.workflow_id.clone(),
                    trigger_type: execution.trigger_type,
                });
                tracing::info!(
                    execution_id = %execution.id,
                    workflow_id = execution.workflow_id.as_str(),
                    "starting workflow execution"
                );

                let interpreter = Interpreter {
                    definition: &definition,
                    actions: &self.actions,
                    control: &control,
                    events: &self.event_bus,
                    live: &self.live,
                    revisit_policy: self.config.revisit_policy,
                    default_step_timeout: Duration::from_secs(self.config.default_step_timeout_secs),
                };
                let minutes = definition.settings.timeout_minutes;
                let budget = Duration::from_secs(minutes.saturating_mul(60));
                let outcome =
                    match tokio::time::timeout(budget, interpreter.run(&mut execution)).await {
                        Ok(result) => result,
                        Err(_elapsed) => Err(ExecutorError::WorkflowTimeout { minutes }),
                    };
                permits.release(permit);
                outcome
            }
        };

        self.finish(execution, outcome, &control);
    }

    /// Move a finished execution from the live map into history.
    fn finish(
        &self,
        mut execution: WorkflowExecution,
        outcome: Result<(), ExecutorError>,
        control: &ExecutionControl,
    ) {
        match outcome {
            Ok(()) => {
                execution.status = ExecutionStatus::Completed;
                tracing::info!(
                    execution_id = %execution.id,
                    workflow_id = execution.workflow_id.as_str(),
                    steps = execution.completed_steps.len(),
                    "workflow execution completed"
                );
            }
            Err(ExecutorError::Cancelled) => {
                execution.status = ExecutionStatus::Cancelled;
                execution.error_message = Some(ExecutorError::Cancelled.to_string());
                tracing::info!(execution_id = %execution.id, "workflow execution cancelled");
            }
            Err(e) => {
                execution.status = ExecutionStatus::Failed;
                execution.error_message = Some(e.to_string());
                tracing::error!(
                    execution_id = %execution.id,
                    workflow_id = execution.workflow_id.as_str(),
                    error = %e,
                    "workflow execution failed"
                );
            }
        }
        execution.completed_at = Some(Utc::now());

        let event = WorkflowEvent::ExecutionFinished {
            execution_id: execution.id,
            workflow_id: execution.workflow_id.clone(),
            status: execution.status,
            error: execution.error_message.clone(),
        };
        let execution_id = execution.id;

        self.history.record(execution);
        self.live.remove(&execution_id);
        self.event_bus.publish(event);
        control.mark_finished();
        self.controls.remove(&execution_id);
    }

    /// Live snapshot if the execution is still running, else its history
    /// record.
    pub fn get_execution_status(&self, execution_id: Uuid) -> Result<WorkflowExecution, EngineError> {
        if let Some(live) = self.live.get(&execution_id) {
            return Ok(live.value().clone());
        }
        self.history
            .get(&execution_id)
            .ok_or(EngineError::ExecutionNotFound(execution_id))
    }

    /// Wait until the execution is terminal and return its final record.
    pub async fn wait_for_completion(&self, execution_id: Uuid) -> Result<WorkflowExecution, EngineError> {
        let control = self
            .controls
            .get(&execution_id)
            .map(|entry| Arc::clone(entry.value()));
        if let Some(control) = control {
            control.finished().await;
        }
        self.history
            .get(&execution_id)
            .ok_or(EngineError::ExecutionNotFound(execution_id))
    }

    /// Outcome statistics over recorded executions of a workflow.
    pub fn get_workflow_metrics(&self, workflow_id: &str) -> MetricsSummary {
        self.history.metrics(workflow_id)
    }

    /// Terminal executions of a workflow, oldest first.
    pub fn list_history(&self, workflow_id: &str) -> Vec<WorkflowExecution> {
        self.history.list(workflow_id)
    }

    /// Snapshots of all non-terminal executions, oldest first.
    pub fn list_active(&self) -> Vec<WorkflowExecution> {
        let mut active: Vec<_> = self.live.iter().map(|e| e.value().clone()).collect();
        active.sort_by_key(|e| e.id);
        active
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    fn control(&self, execution_id: Uuid) -> Result<Arc<ExecutionControl>, EngineError> {
        if let Some(control) = self.controls.get(&execution_id) {
            return Ok(Arc::clone(control.value()));
        }
        match self.history.get(&execution_id) {
            Some(done) => Err(EngineError::InvalidState(format!(
                "execution {execution_id} already {}",
                done.status
            ))),
            None => Err(EngineError::ExecutionNotFound(execution_id)),
        }
    }

    /// Request cancellation. Takes effect at the next step boundary, or
    /// immediately if the execution is sleeping or waiting on an action.
    pub fn cancel_execution(&self, execution_id: Uuid) -> Result<(), EngineError> {
        self.control(execution_id)?.cancel();
        tracing::info!(execution_id = %execution_id, "cancellation requested");
        Ok(())
    }

    /// Park the execution at its next step boundary.
    pub fn pause_execution(&self, execution_id: Uuid) -> Result<(), EngineError> {
        self.control(execution_id)?.pause();
        tracing::info!(execution_id = %execution_id, "pause requested");
        Ok(())
    }

    pub fn resume_execution(&self, execution_id: Uuid) -> Result<(), EngineError> {
        self.control(execution_id)?.resume();
        tracing::info!(execution_id = %execution_id, "resume requested");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Cancel every live execution and wait for their tasks to finish.
    /// Further triggers are rejected.
    pub async fn shutdown(&self) {
        self.tracker.close();
        for entry in self.controls.iter() {
            entry.value().cancel();
        }
        tracing::info!(tasks = self.tracker.len(), "shutting down workflow engine");
        self.tracker.wait().await;
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("workflows", &self.registry.len())
            .field("live_executions", &self.live.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeon_types::workflow::WorkflowStep;
    use serde_json::json;

    fn engine() -> Arc<WorkflowEngine> {
        WorkflowEngine::new(EngineConfig::default(), ActionRegistry::with_builtins())
    }

    fn quick_delay(id: &str) -> WorkflowStep {
        WorkflowStep::new(id, ActionType::Delay)
            .with_configuration(json!({ "delay_seconds": 0 }))
    }

    #[tokio::test]
    async fn test_trigger_unknown_workflow_creates_nothing() {
        let engine = engine();
        let err = engine
            .trigger_workflow("ghost", json!({}), TriggerType::Manual)
            .unwrap_err();
        assert!(matches!(err, EngineError::WorkflowNotFound(ref id) if id == "ghost"));
        assert!(engine.list_active().is_empty());
        assert_eq!(engine.get_workflow_metrics("ghost").total_executions, 0);
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_definition() {
        let engine = engine();
        let def = WorkflowDefinition::new("wf", "wf", vec![quick_delay("a").connect("nope")]);
        assert!(matches!(
            engine.register_workflow(def).unwrap_err(),
            WorkflowError::UnknownConnection(_)
        ));
        assert!(engine.get_workflow("wf").is_none());
    }

    #[tokio::test]
    async fn test_status_before_and_after_completion() {
        let engine = engine();
        engine
            .register_workflow(WorkflowDefinition::new("wf", "wf", vec![quick_delay("a")]))
            .unwrap();

        let id = engine
            .trigger_workflow("wf", json!({}), TriggerType::Manual)
            .unwrap();
        // visible immediately, before the task has run
        assert!(engine.get_execution_status(id).is_ok());

        let done = engine.wait_for_completion(id).await.unwrap();
        assert_eq!(done.status, ExecutionStatus::Completed);
        assert!(done.completed_at.is_some());
        assert_eq!(engine.get_execution_status(id).unwrap().status, ExecutionStatus::Completed);
        assert!(engine.list_active().is_empty());
        assert_eq!(engine.list_history("wf").len(), 1);
    }

    #[tokio::test]
    async fn test_control_of_unknown_and_finished_execution() {
        let engine = engine();
        let unknown = Uuid::now_v7();
        assert!(matches!(
            engine.cancel_execution(unknown).unwrap_err(),
            EngineError::ExecutionNotFound(_)
        ));
        assert!(matches!(
            engine.get_execution_status(unknown).unwrap_err(),
            EngineError::ExecutionNotFound(_)
        ));

        engine
            .register_workflow(WorkflowDefinition::new("wf", "wf", vec![quick_delay("a")]))
            .unwrap();
        let id = engine
            .trigger_workflow("wf", json!({}), TriggerType::Manual)
            .unwrap();
        engine.wait_for_completion(id).await.unwrap();

        assert!(matches!(
            engine.pause_execution(id).unwrap_err(),
            EngineError::InvalidState(_)
        ));
    }

    #[tokio::test]
    async fn test_semaphore_resized_when_limit_changes() {
        let engine = engine();
        let mut def = WorkflowDefinition::new("wf", "wf", vec![quick_delay("a")]);
        def.settings.max_concurrent_executions = 2;
        engine.register_workflow(def.clone()).unwrap();
        assert_eq!(
            engine.concurrency_semaphores.get("wf").unwrap().semaphore.available_permits(),
            2
        );

        def.settings.max_concurrent_executions = 4;
        engine.update_workflow(def).unwrap();
        assert_eq!(
            engine.concurrency_semaphores.get("wf").unwrap().semaphore.available_permits(),
            4
        );

        engine.remove_workflow("wf");
        assert!(engine.concurrency_semaphores.get("wf").is_none());
        assert!(engine.list_workflows().is_empty());
    }

    #[tokio::test]
    async fn test_lowered_limit_retires_held_permits() {
        let mut permits = WorkflowPermits::new(3);
        let a = Arc::clone(&permits.semaphore).acquire_owned().await.unwrap();
        let b = Arc::clone(&permits.semaphore).acquire_owned().await.unwrap();

        // one free permit is dropped now, one held permit on release
        permits.resize(1);
        assert_eq!(permits.semaphore.available_permits(), 0);
        permits.release(a);
        assert_eq!(permits.semaphore.available_permits(), 0);
        permits.release(b);
        assert_eq!(permits.semaphore.available_permits(), 1);

        permits.resize(2);
        assert_eq!(permits.semaphore.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_raised_limit_cancels_pending_retirement() {
        let mut permits = WorkflowPermits::new(2);
        let a = Arc::clone(&permits.semaphore).acquire_owned().await.unwrap();
        let b = Arc::clone(&permits.semaphore).acquire_owned().await.unwrap();

        permits.resize(1);
        permits.resize(2);
        permits.release(a);
        permits.release(b);
        assert_eq!(permits.semaphore.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_trigger_after_shutdown_rejected() {
        let engine = engine();
        engine
            .register_workflow(WorkflowDefinition::new("wf", "wf", vec![quick_delay("a")]))
            .unwrap();
        engine.shutdown().await;

        assert!(matches!(
            engine
                .trigger_workflow("wf", json!({}), TriggerType::Manual)
                .unwrap_err(),
            EngineError::InvalidState(_)
        ));
    }
}
