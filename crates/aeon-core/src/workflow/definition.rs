//! Workflow definition parsing, validation, and file loading.
//!
//! Converts YAML or JSON documents into the canonical `WorkflowDefinition`,
//! and validates the structural constraints every registered workflow must
//! satisfy (unique step IDs, resolvable connections, acyclic graph, sane
//! settings).

use std::collections::HashSet;
use std::path::Path;

use aeon_types::workflow::WorkflowDefinition;
use thiserror::Error;

use super::dag;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors describing a malformed workflow definition.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// A step connects to a step id that does not exist.
    #[error("unknown connection: {0}")]
    UnknownConnection(String),

    /// Step connections form a cycle.
    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `WorkflowDefinition`.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let def: WorkflowDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Parse a JSON string into a validated `WorkflowDefinition`.
pub fn parse_workflow_json(json: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let def: WorkflowDefinition =
        serde_json::from_str(json).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Serialize a `WorkflowDefinition` to a YAML string.
pub fn serialize_workflow_yaml(def: &WorkflowDefinition) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(def).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `WorkflowDefinition`.
///
/// Checks:
/// - id and name are non-empty
/// - At least one step exists
/// - All step IDs are unique
/// - Every connection targets an existing step
/// - Connections form no cycle
/// - `timeout_minutes > 0` and `max_concurrent_executions >= 1`
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    if def.id.trim().is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow id must not be empty".to_string(),
        ));
    }
    if def.name.trim().is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow name must not be empty".to_string(),
        ));
    }

    if def.steps.is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow must have at least one step".to_string(),
        ));
    }

    let mut seen_ids = HashSet::new();
    for step in &def.steps {
        if step.id.is_empty() {
            return Err(WorkflowError::ValidationError(
                "step id must not be empty".to_string(),
            ));
        }
        if !seen_ids.insert(step.id.as_str()) {
            return Err(WorkflowError::ValidationError(format!(
                "duplicate step ID: '{}'",
                step.id
            )));
        }
    }

    // Resolves connections and rejects cycles.
    dag::validate_graph(&def.steps)?;

    if def.settings.timeout_minutes == 0 {
        return Err(WorkflowError::ValidationError(
            "timeout_minutes must be > 0".to_string(),
        ));
    }
    if def.settings.max_concurrent_executions < 1 {
        return Err(WorkflowError::ValidationError(
            "max_concurrent_executions must be >= 1".to_string(),
        ));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a workflow definition from a file.
///
/// `.json` files are parsed as JSON; everything else as YAML.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        parse_workflow_json(&content)
    } else {
        parse_workflow_yaml(&content)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use aeon_types::workflow::{ActionType, WorkflowStep};

    fn step(id: &str, connections: &[&str]) -> WorkflowStep {
        connections
            .iter()
            .fold(WorkflowStep::new(id, ActionType::Delay), |s, c| s.connect(*c))
    }

    #[test]
    fn test_parse_yaml_roundtrip() {
        let yaml = r#"
id: onboarding
name: Customer onboarding
description: Welcome new customers
triggers:
  - id: signup
    trigger_type: webhook
steps:
  - id: welcome
    name: Send welcome email
    action_type: email
    configuration:
      to: "{email}"
      subject: Welcome
    connections: [crm]
  - id: crm
    name: Create CRM record
    action_type: api_call
    configuration:
      url: https://crm.example.com/contacts
      method: POST
    retry_policy:
      max_retries: 1
      delay_seconds: 2
settings:
  timeout_minutes: 10
"#;
        let def = parse_workflow_yaml(yaml).expect("should parse");
        assert_eq!(def.name, "Customer onboarding");
        assert_eq!(def.steps.len(), 2);
        assert_eq!(def.settings.timeout_minutes, 10);
        assert_eq!(def.settings.max_concurrent_executions, 5);
        assert_eq!(def.step("crm").unwrap().retry_policy.max_retries, 1);

        let yaml2 = serialize_workflow_yaml(&def).expect("should serialize");
        let def2 = parse_workflow_yaml(&yaml2).expect("should re-parse");
        assert_eq!(def2.id, def.id);
        assert_eq!(def2.steps.len(), def.steps.len());
        assert_eq!(def2.triggers.len(), def.triggers.len());
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "id": "ping",
            "name": "Ping",
            "steps": [{"id": "wait", "name": "Wait", "action_type": "delay"}]
        }"#;
        let def = parse_workflow_json(json).expect("should parse");
        assert_eq!(def.steps[0].action_type, ActionType::Delay);
    }

    #[test]
    fn test_parse_rejects_unknown_action_type() {
        let yaml = r#"
id: bad
name: Bad
steps:
  - id: a
    name: A
    action_type: teleport
"#;
        let err = parse_workflow_yaml(yaml).unwrap_err();
        assert!(matches!(err, WorkflowError::ParseError(_)), "got: {err}");
    }

    #[test]
    fn test_validation_rejects_duplicate_step_ids() {
        let def = WorkflowDefinition::new("wf", "wf", vec![step("a", &[]), step("a", &[])]);
        let msg = validate_definition(&def).unwrap_err().to_string();
        assert!(msg.contains("duplicate step ID"), "got: {msg}");
    }

    #[test]
    fn test_validation_rejects_unknown_connection() {
        let def = WorkflowDefinition::new("wf", "wf", vec![step("a", &["ghost"])]);
        let err = validate_definition(&def).unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownConnection(_)), "got: {err}");
    }

    #[test]
    fn test_validation_rejects_cycle() {
        let def = WorkflowDefinition::new(
            "wf",
            "wf",
            vec![step("a", &["b"]), step("b", &["c"]), step("c", &["a"])],
        );
        let err = validate_definition(&def).unwrap_err();
        assert!(matches!(err, WorkflowError::CycleDetected(_)), "got: {err}");
    }

    #[test]
    fn test_validation_rejects_empty_workflow() {
        let def = WorkflowDefinition::new("wf", "wf", vec![]);
        let msg = validate_definition(&def).unwrap_err().to_string();
        assert!(msg.contains("at least one step"), "got: {msg}");
    }

    #[test]
    fn test_validation_rejects_bad_settings() {
        let mut def = WorkflowDefinition::new("wf", "wf", vec![step("a", &[])]);
        def.settings.max_concurrent_executions = 0;
        assert!(validate_definition(&def).is_err());

        def.settings.max_concurrent_executions = 1;
        def.settings.timeout_minutes = 0;
        assert!(validate_definition(&def).is_err());
    }

    #[test]
    fn test_validation_accepts_diamond() {
        let def = WorkflowDefinition::new(
            "wf",
            "wf",
            vec![
                step("a", &["b", "c"]),
                step("b", &["d"]),
                step("c", &["d"]),
                step("d", &[]),
            ],
        );
        validate_definition(&def).expect("diamond is acyclic");
    }

    #[test]
    fn test_load_workflow_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("flow.yaml");
        std::fs::write(
            &yaml_path,
            "id: y\nname: Y\nsteps:\n  - id: a\n    name: A\n    action_type: delay\n",
        )
        .unwrap();
        assert_eq!(load_workflow_file(&yaml_path).unwrap().id, "y");

        let json_path = dir.path().join("flow.json");
        std::fs::write(
            &json_path,
            r#"{"id":"j","name":"J","steps":[{"id":"a","name":"A","action_type":"delay"}]}"#,
        )
        .unwrap();
        assert_eq!(load_workflow_file(&json_path).unwrap().id, "j");

        let missing = dir.path().join("missing.yaml");
        assert!(matches!(
            load_workflow_file(&missing).unwrap_err(),
            WorkflowError::IoError(_)
        ));
    }
}
