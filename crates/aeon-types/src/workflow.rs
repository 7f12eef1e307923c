//! Workflow domain types for AEON.
//!
//! Defines the immutable workflow graph (`WorkflowDefinition`, `WorkflowStep`,
//! `WorkflowTrigger`), the mutable per-run record (`WorkflowExecution`), the
//! uniform result shape returned by action executors (`ActionResult`), and the
//! metrics summary computed from execution history.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A named, reusable step graph plus its triggers.
///
/// Owned by the registry once registered; executions hold a shared snapshot
/// and never mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Caller-chosen identifier. Registering the same id again replaces the
    /// previous definition.
    pub id: String,
    /// Human-readable workflow name.
    pub name: String,
    /// Optional longer description.
    #[serde(default)]
    pub description: String,
    /// Declared ways to start this workflow (manual, scheduled, webhook, ...).
    #[serde(default)]
    pub triggers: Vec<WorkflowTrigger>,
    /// Ordered list of steps. Order matters for entry-step resolution.
    pub steps: Vec<WorkflowStep>,
    /// Default variables seeded into every execution context.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, Value>,
    /// Execution budget and concurrency settings.
    #[serde(default)]
    pub settings: WorkflowSettings,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Build a definition with default triggers, variables, and settings.
    pub fn new(id: impl Into<String>, name: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            triggers: vec![WorkflowTrigger::manual()],
            steps,
            variables: HashMap::new(),
            settings: WorkflowSettings::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Look up a step by id.
    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }
}

/// Per-workflow execution settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// Wall-clock budget for a single execution.
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
    /// Maximum number of executions of this workflow running at once.
    #[serde(default = "default_max_concurrent_executions")]
    pub max_concurrent_executions: u32,
}

fn default_timeout_minutes() -> u64 {
    60
}

fn default_max_concurrent_executions() -> u32 {
    5
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            timeout_minutes: default_timeout_minutes(),
            max_concurrent_executions: default_max_concurrent_executions(),
        }
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// A single node in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Unique within the workflow; referenced by other steps' `connections`.
    pub id: String,
    pub name: String,
    /// Which action executor handles this step.
    pub action_type: ActionType,
    /// Opaque parameters handed to the executor after variable substitution.
    #[serde(default = "empty_object")]
    pub configuration: Value,
    /// Downstream step ids, visited depth-first in listed order.
    #[serde(default)]
    pub connections: Vec<String>,
    /// Boolean expressions; all must hold for the step to run.
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// Per-attempt timeout.
    #[serde(default = "default_step_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Visual builder metadata. Ignored by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<StepUiMetadata>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn default_step_timeout_seconds() -> u64 {
    300
}

impl WorkflowStep {
    /// Create a step with an empty configuration and default policies.
    pub fn new(id: impl Into<String>, action_type: ActionType) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            action_type,
            configuration: empty_object(),
            connections: Vec::new(),
            conditions: Vec::new(),
            retry_policy: RetryPolicy::default(),
            timeout_seconds: default_step_timeout_seconds(),
            ui: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_configuration(mut self, configuration: Value) -> Self {
        self.configuration = configuration;
        self
    }

    /// Append a downstream connection.
    pub fn connect(mut self, step_id: impl Into<String>) -> Self {
        self.connections.push(step_id.into());
        self
    }

    /// Append a gating condition.
    pub fn when(mut self, expression: impl Into<String>) -> Self {
        self.conditions.push(expression.into());
        self
    }

    pub fn with_retry(mut self, max_retries: u32, delay_seconds: u64) -> Self {
        self.retry_policy = RetryPolicy {
            max_retries,
            delay_seconds,
        };
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

/// Capability tag selecting the action executor for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    AiAgent,
    ApiCall,
    Email,
    Webhook,
    Delay,
    Condition,
    Loop,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::AiAgent => "ai_agent",
            ActionType::ApiCall => "api_call",
            ActionType::Email => "email",
            ActionType::Webhook => "webhook",
            ActionType::Delay => "delay",
            ActionType::Condition => "condition",
            ActionType::Loop => "loop",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a failed step is retried.
///
/// A step runs at most `1 + max_retries` times, sleeping `delay_seconds`
/// before each retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_seconds")]
    pub delay_seconds: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_seconds() -> u64 {
    5
}

impl RetryPolicy {
    /// Fail on the first error.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay_seconds: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_seconds: default_retry_delay_seconds(),
        }
    }
}

/// Metadata for the visual workflow builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepUiMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<UiPosition>,
}

/// Canvas position coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UiPosition {
    pub x: f64,
    pub y: f64,
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// A declared way to start the workflow.
///
/// Triggers are declarative: turning a schedule tick or webhook delivery into
/// a `trigger_workflow` call is the caller's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    pub id: String,
    pub trigger_type: TriggerType,
    #[serde(default = "empty_object")]
    pub configuration: Value,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl WorkflowTrigger {
    pub fn manual() -> Self {
        Self {
            id: "manual".to_string(),
            trigger_type: TriggerType::Manual,
            configuration: empty_object(),
            is_active: true,
        }
    }
}

/// Kind of event that started an execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    #[default]
    Manual,
    Scheduled,
    Webhook,
    Event,
    Condition,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Manual => "manual",
            TriggerType::Scheduled => "scheduled",
            TriggerType::Webhook => "webhook",
            TriggerType::Event => "event",
            TriggerType::Condition => "condition",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "manual" => Ok(TriggerType::Manual),
            "scheduled" => Ok(TriggerType::Scheduled),
            "webhook" => Ok(TriggerType::Webhook),
            "event" => Ok(TriggerType::Event),
            "condition" => Ok(TriggerType::Condition),
            other => Err(format!("unknown trigger type '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Action results
// ---------------------------------------------------------------------------

/// What an action executor hands back for one step.
///
/// `context` entries are merged into the execution context (last write wins).
/// Any other fields are action-specific and kept verbatim in `fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, Value>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ActionResult {
    /// A successful result with no context updates.
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// A clean, non-raising failure. Recorded as-is and never retried.
    pub fn unsuccessful() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

// ---------------------------------------------------------------------------
// Executions
// ---------------------------------------------------------------------------

/// Overall status of a workflow execution.
///
/// `Pending -> Running -> {Completed, Failed, Cancelled}`, with
/// `Running <-> Paused` driven cooperatively by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One concrete run of a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// UUIDv7 execution ID.
    pub id: Uuid,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub trigger_type: TriggerType,
    /// Payload that started the run.
    pub trigger_data: Value,
    /// Step currently in flight (observability only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    /// Results keyed by step id.
    #[serde(default)]
    pub step_results: HashMap<String, ActionResult>,
    /// Step ids in the order their results were recorded.
    #[serde(default)]
    pub completed_steps: Vec<String>,
    /// Key/value state shared by every step of this run.
    #[serde(default)]
    pub execution_context: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Creation time while pending, then the moment the run began.
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    /// Create a pending execution record.
    pub fn new(workflow_id: impl Into<String>, trigger_type: TriggerType, trigger_data: Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Pending,
            trigger_type,
            trigger_data,
            current_step: None,
            step_results: HashMap::new(),
            completed_steps: Vec::new(),
            execution_context: HashMap::new(),
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Seconds between `started_at` and `completed_at`, if completed.
    pub fn duration_seconds(&self) -> Option<f64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

/// Aggregated outcome statistics for one workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_executions: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
    /// `successful / total`, or 0 when there are no executions.
    pub success_rate: f64,
    /// Mean over executions that have a completion timestamp.
    pub average_duration_seconds: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
