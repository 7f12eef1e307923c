//! Shared domain types for AEON.
//!
//! This crate contains the domain types used across the AEON workflow
//! engine: workflow definitions, executions, action results, execution
//! events, and engine configuration.
//!
//! Zero runtime dependencies -- only serde, uuid, chrono.

pub mod config;
pub mod event;
pub mod workflow;
