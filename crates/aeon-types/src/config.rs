//! Engine configuration types for AEON.
//!
//! `EngineConfig` represents the top-level `config.toml` that controls how
//! the workflow engine walks graphs, how much history it keeps, and how the
//! built-in HTTP actions behave.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the AEON workflow engine.
///
/// Loaded from `~/.aeon/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How a step reachable along several paths is treated.
    #[serde(default)]
    pub revisit_policy: RevisitPolicy,

    /// Maximum number of terminal executions kept per workflow.
    /// `None` (or `0`) keeps everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<usize>,

    /// Buffer size of the execution event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Timeout applied to steps that declare `timeout_seconds = 0`.
    #[serde(default = "default_step_timeout_secs")]
    pub default_step_timeout_secs: u64,

    /// Settings for the outbound HTTP actions.
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_event_capacity() -> usize {
    256
}

fn default_step_timeout_secs() -> u64 {
    300
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            revisit_policy: RevisitPolicy::default(),
            history_limit: None,
            event_capacity: default_event_capacity(),
            default_step_timeout_secs: default_step_timeout_secs(),
            http: HttpConfig::default(),
        }
    }
}

/// Policy for a step that several paths lead to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisitPolicy {
    /// Run the step the first time it is reached with passing conditions.
    #[default]
    OncePerExecution,
    /// Run the step once per arriving edge.
    OncePerEdge,
}

/// HTTP client settings for `api_call` and `webhook` actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("aeon-workflow/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}
