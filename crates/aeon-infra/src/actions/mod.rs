//! Action executors that reach outside the process.
//!
//! - `http` -- `api_call` and `webhook` over a shared `reqwest::Client`
//! - `email` -- logs outgoing mail; no transport is configured
//!
//! `ai_agent` has no built-in executor. Applications register their own.

pub mod email;
pub mod http;

use aeon_core::workflow::ActionRegistry;
use aeon_types::config::HttpConfig;
use aeon_types::workflow::ActionType;

pub use email::EmailAction;
pub use http::{build_http_client, ApiCallAction, WebhookAction};

/// Register the `api_call`, `webhook`, and `email` executors.
///
/// Fails only if the HTTP client cannot be built (e.g. TLS backend
/// initialisation failure).
pub fn register_infra_actions(registry: &ActionRegistry, http: &HttpConfig) -> reqwest::Result<()> {
    let client = build_http_client(http)?;
    registry.register(ActionType::ApiCall, ApiCallAction::new(client.clone()));
    registry.register(ActionType::Webhook, WebhookAction::new(client));
    registry.register(ActionType::Email, EmailAction);
    Ok(())
}
