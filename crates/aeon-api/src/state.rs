//! Application state wiring the engine to its infrastructure.
//!
//! `AppState` is the application root: it owns the one `WorkflowEngine`
//! instance and is responsible for shutting it down.

use std::sync::Arc;

use aeon_core::workflow::{ActionRegistry, WorkflowEngine};
use aeon_infra::actions::register_infra_actions;
use aeon_infra::config::{load_engine_config, resolve_data_dir};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
}

impl AppState {
    /// Load configuration and build the engine with every built-in action.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let config = load_engine_config(&data_dir).await;

        let actions = ActionRegistry::with_builtins();
        register_infra_actions(&actions, &config.http)
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;

        tracing::debug!(
            data_dir = %data_dir.display(),
            revisit_policy = ?config.revisit_policy,
            "engine configured"
        );

        Ok(Self {
            engine: WorkflowEngine::new(config, actions),
        })
    }

    /// Cancel outstanding executions and wait for their tasks.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}
