//! Step graph construction, cycle detection, and entry-step resolution.
//!
//! Uses `petgraph` to model step connections as a directed graph. Topological
//! sort detects cycles at registration time, so the interpreter never has to
//! guard against unbounded revisits at run time.

use std::collections::{HashMap, HashSet};

use aeon_types::workflow::WorkflowStep;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::definition::WorkflowError;

// ---------------------------------------------------------------------------
// Graph construction
// ---------------------------------------------------------------------------

/// Build a directed graph with an edge from each step to every step it
/// connects to.
fn build_graph(steps: &[WorkflowStep]) -> Result<DiGraph<&str, ()>, WorkflowError> {
    let mut graph = DiGraph::<&str, ()>::new();
    let id_to_node: HashMap<&str, NodeIndex> = steps
        .iter()
        .map(|s| (s.id.as_str(), graph.add_node(s.id.as_str())))
        .collect();

    for step in steps {
        let from = id_to_node[step.id.as_str()];
        for target in &step.connections {
            let to = id_to_node.get(target.as_str()).ok_or_else(|| {
                WorkflowError::UnknownConnection(format!(
                    "step '{}' connects to unknown step '{}'",
                    step.id, target
                ))
            })?;
            graph.add_edge(from, *to, ());
        }
    }

    Ok(graph)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate that connections resolve and form a DAG.
pub fn validate_graph(steps: &[WorkflowStep]) -> Result<(), WorkflowError> {
    topological_order(steps).map(|_| ())
}

/// Step ids in a topological order of the connection graph.
pub fn topological_order(steps: &[WorkflowStep]) -> Result<Vec<&str>, WorkflowError> {
    let graph = build_graph(steps)?;
    let sorted = toposort(&graph, None).map_err(|cycle| {
        let node_id = graph[cycle.node_id()];
        WorkflowError::CycleDetected(format!("cycle detected involving step '{}'", node_id))
    })?;
    Ok(sorted.into_iter().map(|idx| graph[idx]).collect())
}

// ---------------------------------------------------------------------------
// Entry steps
// ---------------------------------------------------------------------------

/// Steps that no other step lists as a connection target, in definition
/// order.
pub fn entry_steps(steps: &[WorkflowStep]) -> Vec<&WorkflowStep> {
    let targets: HashSet<&str> = steps
        .iter()
        .flat_map(|s| s.connections.iter().map(String::as_str))
        .collect();

    steps
        .iter()
        .filter(|s| !targets.contains(s.id.as_str()))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
