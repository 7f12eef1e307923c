//! In-memory workflow registry.
//!
//! Definitions are validated before they are stored and are shared behind
//! `Arc`, so an execution keeps the snapshot it started with even if the
//! workflow is re-registered while it runs.

use std::sync::Arc;

use aeon_types::workflow::WorkflowDefinition;
use chrono::Utc;
use dashmap::DashMap;

use super::definition::{validate_definition, WorkflowError};

/// Validated workflow definitions keyed by workflow id.
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    definitions: DashMap<String, Arc<WorkflowDefinition>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a definition, replacing any previous one with the
    /// same id. An invalid definition leaves the registry untouched.
    pub fn register(&self, definition: WorkflowDefinition) -> Result<Arc<WorkflowDefinition>, WorkflowError> {
        validate_definition(&definition)?;
        let definition = Arc::new(definition);
        self.definitions
            .insert(definition.id.clone(), Arc::clone(&definition));
        tracing::info!(
            workflow_id = definition.id.as_str(),
            steps = definition.steps.len(),
            "workflow registered"
        );
        Ok(definition)
    }

    /// Re-register a definition, keeping the original `created_at` and
    /// refreshing `updated_at`.
    pub fn update(&self, mut definition: WorkflowDefinition) -> Result<Arc<WorkflowDefinition>, WorkflowError> {
        if let Some(existing) = self.get(&definition.id) {
            definition.created_at = existing.created_at;
        }
        definition.updated_at = Utc::now();
        self.register(definition)
    }

    pub fn get(&self, workflow_id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.definitions
            .get(workflow_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// All registered definitions, sorted by id.
    pub fn list(&self) -> Vec<Arc<WorkflowDefinition>> {
        let mut all: Vec<_> = self
            .definitions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn remove(&self, workflow_id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.definitions.remove(workflow_id).map(|(_, def)| def)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
