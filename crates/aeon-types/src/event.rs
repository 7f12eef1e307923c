//! Event types for the AEON execution event bus.
//!
//! `WorkflowEvent` is broadcast by the engine as executions progress.
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::{ActionType, ExecutionStatus, TriggerType};

/// Lifecycle events emitted while an execution runs.
///
/// Subscribers (CLI progress output, logging, tests) receive these in the
/// order the owning task produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// An execution acquired its concurrency permit and began walking steps.
    ExecutionStarted {
        execution_id: Uuid,
        workflow_id: String,
        trigger_type: TriggerType,
    },

    /// A step passed its conditions and is about to be dispatched.
    StepStarted {
        execution_id: Uuid,
        step_id: String,
        action_type: ActionType,
    },

    /// A step's result was recorded.
    StepCompleted {
        execution_id: Uuid,
        step_id: String,
        success: bool,
        duration_ms: u64,
    },

    /// A step's conditions did not hold; it and its subtree were skipped.
    StepSkipped { execution_id: Uuid, step_id: String },

    /// A step attempt failed and another attempt will follow.
    StepRetrying {
        execution_id: Uuid,
        step_id: String,
        attempt: u32,
        error: String,
    },

    /// The execution parked at a step boundary.
    ExecutionPaused { execution_id: Uuid },

    /// The execution reached a terminal status.
    ExecutionFinished {
        execution_id: Uuid,
        workflow_id: String,
        status: ExecutionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl WorkflowEvent {
    /// The execution this event belongs to.
    pub fn execution_id(&self) -> Uuid {
        match self {
            WorkflowEvent::ExecutionStarted { execution_id, .. }
            | WorkflowEvent::StepStarted { execution_id, .. }
            | WorkflowEvent::StepCompleted { execution_id, .. }
            | WorkflowEvent::StepSkipped { execution_id, .. }
            | WorkflowEvent::StepRetrying { execution_id, .. }
            | WorkflowEvent::ExecutionPaused { execution_id }
            | WorkflowEvent::ExecutionFinished { execution_id, .. } => *execution_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let id = Uuid::now_v7();
        let event = WorkflowEvent::StepSkipped {
            execution_id: id,
            step_id: "notify".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "step_skipped");
        assert_eq!(value["step_id"], "notify");
        assert_eq!(event.execution_id(), id);
    }

    #[test]
    fn test_finished_event_omits_missing_error() {
        let event = WorkflowEvent::ExecutionFinished {
            execution_id: Uuid::now_v7(),
            workflow_id: "wf".to_string(),
            status: ExecutionStatus::Completed,
            error: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["status"], "completed");
        assert!(value.get("error").is_none());
    }
}
