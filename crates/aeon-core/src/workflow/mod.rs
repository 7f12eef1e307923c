//! Workflow engine core: definitions, graph interpretation, and execution
//! bookkeeping.
//!
//! - `definition` -- YAML/JSON parsing, validation, file loading
//! - `dag` -- connection graph, cycle detection, entry-step resolution
//! - `context` -- execution context and `{key}` substitution
//! - `expression` -- fail-closed condition evaluator
//! - `retry` -- retry decisions from a step's `RetryPolicy`
//! - `action` -- `ActionExecutor` trait, registry, built-in delay/condition
//! - `control` -- cooperative cancel/pause/resume signals
//! - `executor` -- depth-first graph interpreter for one execution
//! - `registry` -- validated workflow definitions
//! - `history` -- terminal executions and metrics
//! - `engine` -- `WorkflowEngine`, the management API

pub mod action;
pub mod context;
pub mod control;
pub mod dag;
pub mod definition;
pub mod engine;
pub mod executor;
pub mod expression;
pub mod history;
pub mod registry;
pub mod retry;

pub use action::{ActionError, ActionExecutor, ActionRegistry};
pub use definition::WorkflowError;
pub use engine::{EngineError, WorkflowEngine};
pub use executor::ExecutorError;
