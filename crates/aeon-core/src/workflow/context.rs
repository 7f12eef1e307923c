//! Execution context and `{key}` variable substitution.
//!
//! `ExecutionContext` is the mutable key/value state that flows through a
//! single workflow execution. It is seeded from the definition's variables and
//! the trigger payload, and grows as each step's `ActionResult.context` is
//! merged in. Only the task that owns the execution writes to it.

use std::collections::HashMap;

use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Mutable key/value state for one execution. Later writes win.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    values: HashMap<String, Value>,
}

impl ExecutionContext {
    /// Seed a context from workflow variables, then the top-level keys of the
    /// trigger payload when it is a JSON object.
    pub fn seeded(variables: &HashMap<String, Value>, trigger_data: &Value) -> Self {
        let mut values = variables.clone();
        if let Value::Object(map) = trigger_data {
            for (key, value) in map {
                values.insert(key.clone(), value.clone());
            }
        }
        Self { values }
    }

    /// Merge updates into the context, overwriting existing keys.
    pub fn merge(&mut self, updates: &HashMap<String, Value>) {
        for (key, value) in updates {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn as_map(&self) -> &HashMap<String, Value> {
        &self.values
    }

    /// Substitute `{key}` placeholders in `value` using this context.
    pub fn substitute(&self, value: &Value) -> Value {
        substitute(value, &self.values)
    }

    /// Substitute `{key}` placeholders in a plain string.
    pub fn substitute_str(&self, template: &str) -> String {
        substitute_str(template, &self.values)
    }
}

impl From<HashMap<String, Value>> for ExecutionContext {
    fn from(values: HashMap<String, Value>) -> Self {
        Self { values }
    }
}

impl From<ExecutionContext> for HashMap<String, Value> {
    fn from(ctx: ExecutionContext) -> Self {
        ctx.values
    }
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

/// Replace `{key}` placeholders throughout a JSON value.
///
/// Strings are rewritten, objects and arrays are recursed into, and every
/// other value passes through unchanged. Keys missing from `context` are left
/// verbatim.
pub fn substitute(value: &Value, context: &HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => Value::String(substitute_str(s, context)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, context)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, context)).collect()),
        other => other.clone(),
    }
}

/// Replace `{key}` placeholders in a string.
///
/// Replacement happens in a single left-to-right pass, so substituted text
/// is never re-scanned for further placeholders.
pub fn substitute_str(template: &str, context: &HashMap<String, Value>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];

        let key = after_open
            .find('}')
            .map(|close| &after_open[..close])
            .filter(|key| !key.contains('{'));

        match key.and_then(|k| context.get(k).map(|v| (k, v))) {
            Some((key, replacement)) => {
                result.push_str(&value_to_string(replacement));
                rest = &after_open[key.len() + 1..];
            }
            None => {
                result.push('{');
                rest = after_open;
            }
        }
    }

    result.push_str(rest);
    result
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Convert a JSON value to a display string for substitution.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // For objects/arrays, return compact JSON
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
