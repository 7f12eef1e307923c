//! Terminal execution history and per-workflow metrics.
//!
//! Every execution that reaches a terminal status is recorded here, indexed
//! by execution id and by workflow id. An optional per-workflow retention cap
//! drops the oldest records first.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use aeon_types::workflow::{ExecutionStatus, MetricsSummary, WorkflowExecution};
use uuid::Uuid;

#[derive(Debug, Default)]
struct HistoryInner {
    by_id: HashMap<Uuid, WorkflowExecution>,
    /// Execution ids per workflow, oldest first.
    by_workflow: HashMap<String, VecDeque<Uuid>>,
}

/// Append-only store of terminal executions.
#[derive(Debug, Default)]
pub struct ExecutionHistory {
    inner: RwLock<HistoryInner>,
    limit: Option<usize>,
}

impl ExecutionHistory {
    /// Create a history that keeps at most `limit` records per workflow.
    /// A limit of zero is treated as unbounded.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            inner: RwLock::new(HistoryInner::default()),
            limit: limit.filter(|&n| n > 0),
        }
    }

    /// Record a terminal execution.
    pub fn record(&self, execution: WorkflowExecution) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let HistoryInner { by_id, by_workflow } = &mut *inner;

        let ids = by_workflow.entry(execution.workflow_id.clone()).or_default();
        ids.push_back(execution.id);
        by_id.insert(execution.id, execution);

        if let Some(limit) = self.limit {
            while ids.len() > limit {
                if let Some(evicted) = ids.pop_front() {
                    by_id.remove(&evicted);
                }
            }
        }
    }

    pub fn get(&self, execution_id: &Uuid) -> Option<WorkflowExecution> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.by_id.get(execution_id).cloned()
    }

    pub fn contains(&self, execution_id: &Uuid) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.by_id.contains_key(execution_id)
    }

    /// Recorded executions of one workflow, oldest first.
    pub fn list(&self, workflow_id: &str) -> Vec<WorkflowExecution> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .by_workflow
            .get(workflow_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.by_id.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Aggregate outcome statistics for one workflow.
    ///
    /// Cancelled executions count toward the total but are neither successful
    /// nor failed. The average duration only covers executions that have a
    /// completion timestamp.
    pub fn metrics(&self, workflow_id: &str) -> MetricsSummary {
        let executions = self.list(workflow_id);
        let total = executions.len();
        if total == 0 {
            return MetricsSummary::default();
        }

        let successful = executions
            .iter()
            .filter(|e| e.status == ExecutionStatus::Completed)
            .count();
        let failed = executions
            .iter()
            .filter(|e| e.status == ExecutionStatus::Failed)
            .count();

        let durations: Vec<f64> = executions
            .iter()
            .filter_map(WorkflowExecution::duration_seconds)
            .collect();
        let average_duration_seconds = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };

        MetricsSummary {
            total_executions: total,
            successful_executions: successful,
            failed_executions: failed,
            success_rate: successful as f64 / total as f64,
            average_duration_seconds,
        }
    }
}
