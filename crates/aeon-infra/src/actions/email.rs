//! `email` action. No mail transport is configured; the message is logged.

use std::collections::HashMap;

use aeon_core::workflow::{ActionError, ActionExecutor};
use aeon_types::workflow::ActionResult;
use serde_json::{json, Value};

fn text<'a>(configuration: &'a Value, key: &str) -> &'a str {
    configuration.get(key).and_then(Value::as_str).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EmailAction;

impl ActionExecutor for EmailAction {
    async fn execute(
        &self,
        configuration: &Value,
        _context: &HashMap<String, Value>,
        _trigger_data: &Value,
    ) -> Result<ActionResult, ActionError> {
        tracing::info!(
            to = text(configuration, "to"),
            subject = text(configuration, "subject"),
            body_len = text(configuration, "body").len(),
            "email action (no transport configured)"
        );

        Ok(ActionResult::ok()
            .with_field("message", json!("Email sent successfully"))
            .with_context("email_sent", json!(true)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn email_reports_sent() {
        let result = EmailAction
            .execute(
                &json!({ "to": "ann@example.com", "subject": "hi", "body": "hello" }),
                &HashMap::new(),
                &Value::Null,
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.field("message"), Some(&json!("Email sent successfully")));
        assert_eq!(result.context["email_sent"], json!(true));
    }
}
