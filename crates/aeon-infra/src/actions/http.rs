//! Outbound HTTP actions: `api_call` and `webhook`.
//!
//! Both share one `reqwest::Client` configured from [`HttpConfig`]. A response
//! with status >= 400 is a recorded `success: false` outcome, not an error;
//! only transport failures raise [`ActionError`] and so drive retries.

use std::collections::HashMap;
use std::time::Duration;

use aeon_core::workflow::context::value_to_string;
use aeon_core::workflow::{ActionError, ActionExecutor};
use aeon_types::config::HttpConfig;
use aeon_types::workflow::ActionResult;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

/// Build the HTTP client used by the network actions.
pub fn build_http_client(config: &HttpConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.as_str())
        .build()
}

fn required_str<'a>(configuration: &'a Value, key: &str) -> Result<&'a str, ActionError> {
    configuration
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ActionError::InvalidConfig(format!("'{key}' is required")))
}

/// Decode a response body as JSON when the server says it is JSON,
/// otherwise as text.
async fn read_body(response: reqwest::Response) -> Result<Value, ActionError> {
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    let text = response
        .text()
        .await
        .map_err(|e| ActionError::Failed(format!("failed to read HTTP response body: {e}")))?;

    if is_json {
        if let Ok(value) = serde_json::from_str(&text) {
            return Ok(value);
        }
    }
    Ok(Value::String(text))
}

fn outcome(status: reqwest::StatusCode) -> ActionResult {
    let result = if status.as_u16() < 400 {
        ActionResult::ok()
    } else {
        ActionResult::unsuccessful()
    };
    result.with_field("status_code", json!(status.as_u16()))
}

// ---------------------------------------------------------------------------
// api_call
// ---------------------------------------------------------------------------

/// Generic HTTP request.
///
/// Configuration: `url` (required), `method` (default `GET`), `headers`
/// (object), `data` (JSON body, sent when present).
#[derive(Debug, Clone)]
pub struct ApiCallAction {
    client: reqwest::Client,
}

impl ApiCallAction {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ActionExecutor for ApiCallAction {
    async fn execute(
        &self,
        configuration: &Value,
        _context: &HashMap<String, Value>,
        _trigger_data: &Value,
    ) -> Result<ActionResult, ActionError> {
        let url = required_str(configuration, "url")?;
        let method_name = configuration
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();
        let method = reqwest::Method::from_bytes(method_name.as_bytes())
            .map_err(|_| ActionError::InvalidConfig(format!("invalid HTTP method: {method_name}")))?;

        let mut request = self.client.request(method, url);
        if let Some(Value::Object(headers)) = configuration.get("headers") {
            for (name, value) in headers {
                request = request.header(name.as_str(), value_to_string(value));
            }
        }
        if let Some(data) = configuration.get("data").filter(|d| !d.is_null()) {
            request = request.json(data);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ActionError::Failed(format!("HTTP request to '{url}' failed: {e}")))?;
        let status = response.status();
        let data = read_body(response).await?;

        tracing::info!(
            url,
            method = method_name.as_str(),
            status = status.as_u16(),
            "api_call completed"
        );

        Ok(outcome(status)
            .with_field("data", data.clone())
            .with_context("api_response", data))
    }
}

// ---------------------------------------------------------------------------
// webhook
// ---------------------------------------------------------------------------

/// POSTs `configuration.payload` (default `{}`) as JSON to `configuration.url`.
#[derive(Debug, Clone)]
pub struct WebhookAction {
    client: reqwest::Client,
}

impl WebhookAction {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ActionExecutor for WebhookAction {
    async fn execute(
        &self,
        configuration: &Value,
        _context: &HashMap<String, Value>,
        _trigger_data: &Value,
    ) -> Result<ActionResult, ActionError> {
        let url = required_str(configuration, "url")?;
        let payload = configuration
            .get("payload")
            .cloned()
            .unwrap_or_else(|| json!({}));

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ActionError::Failed(format!("webhook POST to '{url}' failed: {e}")))?;
        let status = response.status();

        tracing::info!(url, status = status.as_u16(), "webhook delivered");

        Ok(outcome(status).with_context("webhook_sent", json!(true)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Accept one connection, answer it with a canned response, and return
    /// the raw request text.
    async fn serve_once(
        status_line: &'static str,
        content_type: &'static str,
        body: &'static str,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                    let length = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&buf).into_owned()
        });

        (base, handle)
    }

    fn client() -> reqwest::Client {
        build_http_client(&HttpConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn api_call_get_parses_json_response() {
        let (base, server) = serve_once("200 OK", "application/json", r#"{"items":[1,2]}"#).await;
        let action = ApiCallAction::new(client());

        let result = action
            .execute(&json!({ "url": format!("{base}/items") }), &HashMap::new(), &Value::Null)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.field("status_code"), Some(&json!(200)));
        assert_eq!(result.field("data"), Some(&json!({ "items": [1, 2] })));
        assert_eq!(result.context["api_response"], json!({ "items": [1, 2] }));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /items "), "got: {request}");
        assert!(request.to_lowercase().contains("user-agent: aeon-workflow/"));
    }

    #[tokio::test]
    async fn api_call_sends_method_headers_and_body() {
        let (base, server) = serve_once("201 Created", "text/plain", "created").await;
        let action = ApiCallAction::new(client());

        let configuration = json!({
            "url": format!("{base}/items"),
            "method": "post",
            "headers": { "x-token": "abc", "x-retry": 2 },
            "data": { "name": "widget" },
        });
        let result = action
            .execute(&configuration, &HashMap::new(), &Value::Null)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.field("data"), Some(&json!("created")));

        let request = server.await.unwrap();
        let lower = request.to_lowercase();
        assert!(request.starts_with("POST /items "), "got: {request}");
        assert!(lower.contains("x-token: abc"));
        assert!(lower.contains("x-retry: 2"));
        assert!(request.ends_with(r#"{"name":"widget"}"#), "got: {request}");
    }

    #[tokio::test]
    async fn api_call_error_status_is_unsuccessful_not_error() {
        let (base, _server) = serve_once("404 Not Found", "text/plain", "missing").await;
        let action = ApiCallAction::new(client());

        let result = action
            .execute(&json!({ "url": base }), &HashMap::new(), &Value::Null)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.field("status_code"), Some(&json!(404)));
    }

    #[tokio::test]
    async fn api_call_rejects_bad_configuration() {
        let action = ApiCallAction::new(client());

        let err = action
            .execute(&json!({}), &HashMap::new(), &Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidConfig(_)));

        let err = action
            .execute(
                &json!({ "url": "http://127.0.0.1:9", "method": "NOT A METHOD" }),
                &HashMap::new(),
                &Value::Null,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn api_call_transport_failure_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let action = ApiCallAction::new(client());
        let err = action
            .execute(&json!({ "url": format!("http://{addr}") }), &HashMap::new(), &Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Failed(_)));
    }

    #[tokio::test]
    async fn webhook_posts_payload() {
        let (base, server) = serve_once("202 Accepted", "text/plain", "").await;
        let action = WebhookAction::new(client());

        let configuration = json!({
            "url": format!("{base}/hook"),
            "payload": { "event": "signup", "user": "ann" },
        });
        let result = action
            .execute(&configuration, &HashMap::new(), &Value::Null)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.field("status_code"), Some(&json!(202)));
        assert_eq!(result.context["webhook_sent"], json!(true));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /hook "), "got: {request}");
        assert!(request.contains(r#""event":"signup""#));
    }

    #[tokio::test]
    async fn webhook_server_error_is_unsuccessful() {
        let (base, _server) = serve_once("500 Internal Server Error", "text/plain", "").await;
        let action = WebhookAction::new(client());

        let result = action
            .execute(&json!({ "url": base }), &HashMap::new(), &Value::Null)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.context["webhook_sent"], json!(true));
    }
}
