//! Workflow execution engine for AEON.
//!
//! This crate holds the engine logic: definition validation, the graph
//! interpreter, condition evaluation, variable substitution, retry, and
//! execution history. It depends only on `aeon-types` -- never on
//! `aeon-infra` or any network crate. Action executors that reach the
//! outside world plug in through `workflow::ActionExecutor`.

pub mod event;
pub mod workflow;
