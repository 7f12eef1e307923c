//! Action executor trait, type-erased wrapper, and registry.
//!
//! Every step dispatches to an `ActionExecutor` chosen by its `ActionType`.
//! Executors return `Ok(ActionResult)` for any outcome they want recorded
//! (including `success: false`) and `Err(ActionError)` for failures that
//! should drive the step's retry policy.
//!
//! The engine-native `delay` and `condition` executors live here. Executors
//! that touch the network are implemented in `aeon-infra`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use aeon_types::workflow::{ActionResult, ActionType};
use dashmap::DashMap;
use serde_json::{json, Value};

use super::expression;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Failure raised by an action executor.
///
/// `Failed` is retried per the step policy. `InvalidConfig` fails the step
/// on the first attempt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ActionError {
    #[error("action failed: {0}")]
    Failed(String),

    #[error("invalid action configuration: {0}")]
    InvalidConfig(String),
}

// ---------------------------------------------------------------------------
// ActionExecutor
// ---------------------------------------------------------------------------

/// Trait for step action backends.
///
/// `configuration` has already had `{key}` placeholders substituted.
/// `context` is a read-only view of the execution context; executors request
/// changes through `ActionResult.context`.
pub trait ActionExecutor: Send + Sync {
    fn execute(
        &self,
        configuration: &Value,
        context: &HashMap<String, Value>,
        trigger_data: &Value,
    ) -> impl Future<Output = Result<ActionResult, ActionError>> + Send;
}

/// Object-safe version of [`ActionExecutor`] with boxed futures.
pub trait ActionExecutorDyn: Send + Sync {
    fn execute_boxed<'a>(
        &'a self,
        configuration: &'a Value,
        context: &'a HashMap<String, Value>,
        trigger_data: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<ActionResult, ActionError>> + Send + 'a>>;
}

impl<T: ActionExecutor> ActionExecutorDyn for T {
    fn execute_boxed<'a>(
        &'a self,
        configuration: &'a Value,
        context: &'a HashMap<String, Value>,
        trigger_data: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<ActionResult, ActionError>> + Send + 'a>> {
        Box::pin(self.execute(configuration, context, trigger_data))
    }
}

/// Type-erased, cheaply clonable action executor.
#[derive(Clone)]
pub struct BoxActionExecutor {
    inner: Arc<dyn ActionExecutorDyn>,
}

impl BoxActionExecutor {
    pub fn new<T: ActionExecutor + 'static>(executor: T) -> Self {
        Self {
            inner: Arc::new(executor),
        }
    }

    pub async fn execute(
        &self,
        configuration: &Value,
        context: &HashMap<String, Value>,
        trigger_data: &Value,
    ) -> Result<ActionResult, ActionError> {
        self.inner
            .execute_boxed(configuration, context, trigger_data)
            .await
    }
}

impl std::fmt::Debug for BoxActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxActionExecutor").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ActionRegistry
// ---------------------------------------------------------------------------

/// Executors keyed by the action type they handle.
///
/// Registering a second executor for the same type replaces the first.
#[derive(Debug, Default)]
pub struct ActionRegistry {
    executors: DashMap<ActionType, BoxActionExecutor>,
}

impl ActionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the engine-native `delay` and `condition`
    /// executors.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(ActionType::Delay, DelayAction);
        registry.register(ActionType::Condition, ConditionAction);
        registry
    }

    pub fn register<T: ActionExecutor + 'static>(&self, action_type: ActionType, executor: T) {
        self.executors
            .insert(action_type, BoxActionExecutor::new(executor));
    }

    pub fn get(&self, action_type: ActionType) -> Option<BoxActionExecutor> {
        self.executors.get(&action_type).map(|e| e.value().clone())
    }

    pub fn contains(&self, action_type: ActionType) -> bool {
        self.executors.contains_key(&action_type)
    }
}

// ---------------------------------------------------------------------------
// Built-in executors
// ---------------------------------------------------------------------------

/// Sleeps for `configuration.delay_seconds` (default 1).
#[derive(Debug, Clone, Copy, Default)]
pub struct DelayAction;

impl ActionExecutor for DelayAction {
    async fn execute(
        &self,
        configuration: &Value,
        _context: &HashMap<String, Value>,
        _trigger_data: &Value,
    ) -> Result<ActionResult, ActionError> {
        let invalid = |v: &Value| {
            ActionError::InvalidConfig(format!(
                "delay_seconds must be a non-negative number of seconds, got {v}"
            ))
        };
        let (delay_seconds, delay) = match configuration.get("delay_seconds") {
            None => (1.0, Duration::from_secs(1)),
            Some(v) => {
                let secs = v.as_f64().ok_or_else(|| invalid(v))?;
                let delay = Duration::try_from_secs_f64(secs).map_err(|_| invalid(v))?;
                (secs, delay)
            }
        };

        tokio::time::sleep(delay).await;

        Ok(ActionResult::ok()
            .with_field("delay_seconds", json!(delay_seconds))
            .with_context("delayed", json!(true)))
    }
}

/// Evaluates `configuration.condition` against the execution context.
///
/// Always succeeds; the outcome is reported in `condition_result` and merged
/// into the context as `condition_met` for later steps to branch on.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionAction;

impl ActionExecutor for ConditionAction {
    async fn execute(
        &self,
        configuration: &Value,
        context: &HashMap<String, Value>,
        _trigger_data: &Value,
    ) -> Result<ActionResult, ActionError> {
        let condition = configuration
            .get("condition")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let met = expression::evaluate(condition, context);

        Ok(ActionResult::ok()
            .with_field("condition_result", json!(met))
            .with_context("condition_met", json!(met)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
