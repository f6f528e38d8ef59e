use crate::infrastructure::config::ApiConfig;
use crate::infrastructure::error::GatewayError;
use crate::infrastructure::session::SessionStore;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR";

/// Bulk payload returned by the remote authority on login or manual
/// refresh; raw objects are normalized by the record mapper downstream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AllUserData {
    #[serde(default)]
    pub projects: Vec<Value>,
    #[serde(default)]
    pub tasks: Vec<Value>,
    #[serde(default)]
    pub todos: Vec<Value>,
}

/// Typed surface of the planner backend consumed by the sync engine.
/// Completion has a dedicated action; un-completion goes through the
/// generic field update.
#[async_trait]
pub trait PlannerApi: Send + Sync {
    async fn fetch_all_user_data(&self) -> Result<AllUserData, GatewayError>;
    async fn complete_task(&self, task_id: &str) -> Result<Value, GatewayError>;
    async fn complete_todo(&self, todo_id: &str) -> Result<Value, GatewayError>;
    async fn update_task(&self, task_id: &str, patch: Value) -> Result<Value, GatewayError>;
    async fn update_todos(&self, todo_ids: &[String], patch: Value) -> Result<Value, GatewayError>;
}

/// The external learning-platform linking endpoints. `link_canvas_data`
/// performs server-side batch work: callers must use a no-retry profile so
/// a timeout cannot trigger a duplicate sync.
#[async_trait]
pub trait CanvasApi: Send + Sync {
    async fn setup_canvas(
        &self,
        institutional_url: &str,
        token: &str,
    ) -> Result<Value, GatewayError>;
    async fn link_canvas_data(&self) -> Result<Value, GatewayError>;
    async fn canvas_provider(&self) -> Result<Value, GatewayError>;
    async fn delete_all_canvas_data(&self) -> Result<Value, GatewayError>;
}

pub struct HttpGateway<S: SessionStore> {
    client: Client,
    config: ApiConfig,
    session: Arc<S>,
}

impl<S: SessionStore> HttpGateway<S> {
    pub fn new(config: ApiConfig, session: Arc<S>) -> Self {
        Self {
            client: Client::new(),
            config,
            session,
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        let base = Url::parse(&self.config.base_url)
            .map_err(|error| GatewayError::Network(format!("invalid base url: {error}")))?;
        base.join(path)
            .map_err(|error| GatewayError::Network(format!("invalid request path '{path}': {error}")))
    }

    /// Issues one request with the configured timeout, unwrapping the wire
    /// envelope. Only idempotent GETs are retried; mutations surface their
    /// first failure so a flaky network cannot double-submit them.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, GatewayError> {
        let retries = if method == Method::GET { self.config.retries } else { 0 };
        let mut attempt: u8 = 0;

        loop {
            match self.execute(method.clone(), path, body.as_ref()).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < retries => {
                    let delay = backoff_delay(self.config.retry_base_delay, attempt);
                    log::warn!(
                        "retrying {method} {path} after transient failure ({error}); attempt {}",
                        attempt + 1
                    );
                    sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, GatewayError> {
        let endpoint = self.endpoint(path)?;
        let mut request = self
            .client
            .request(method, endpoint)
            .timeout(self.config.timeout);

        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                GatewayError::Timeout(self.config.timeout.as_millis() as u64)
            } else {
                GatewayError::Network(error.to_string())
            }
        })?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|error| GatewayError::Network(format!("failed reading response body: {error}")))?;

        if !status.is_success() {
            return Err(parse_error_envelope(status, &body_text));
        }
        parse_success_envelope(status, &body_text)
    }
}

pub(crate) fn backoff_delay(base: Duration, attempt: u8) -> Duration {
    base * 2u32.saturating_pow(attempt as u32)
}

/// Unwraps `{ success, data, message?, timestamp? }`; a bare payload with
/// no envelope is accepted as-is for backward compatibility.
pub(crate) fn parse_success_envelope(status: StatusCode, body: &str) -> Result<Value, GatewayError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    let parsed: Value = serde_json::from_str(body)
        .map_err(|error| GatewayError::InvalidPayload(format!("invalid response body: {error}")))?;

    if parsed.get("success").is_none() {
        return Ok(parsed);
    }
    if parsed.get("success").and_then(Value::as_bool) == Some(false) {
        // 2xx carrying success=false is still a rejection.
        return Err(parse_error_envelope(status, body));
    }
    if let Some(data) = parsed.get("data") {
        if !data.is_null() {
            return Ok(data.clone());
        }
    }
    Ok(parsed)
}

/// Parses the structured error envelope `{ error: { code, message,
/// details } }`, falling back to the legacy `{ message, code }` top-level
/// shape, falling back to the HTTP status text.
pub(crate) fn parse_error_envelope(status: StatusCode, body: &str) -> GatewayError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);

    if let Some(error_object) = parsed.get("error").and_then(Value::as_object) {
        if let Some(code) = error_object.get("code").and_then(Value::as_str) {
            return GatewayError::Rejected {
                code: code.to_string(),
                status: status.as_u16(),
                message: error_object
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_else(|| status_text(status))
                    .to_string(),
                details: error_object.get("details").cloned().filter(|value| !value.is_null()),
            };
        }
    }

    GatewayError::Rejected {
        code: parsed
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_ERROR_CODE)
            .to_string(),
        status: status.as_u16(),
        message: parsed
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_else(|| status_text(status))
            .to_string(),
        details: if parsed.is_null() { None } else { Some(parsed) },
    }
}

fn status_text(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("request failed")
}

#[async_trait]
impl<S: SessionStore> PlannerApi for HttpGateway<S> {
    async fn fetch_all_user_data(&self) -> Result<AllUserData, GatewayError> {
        let data = self.request(Method::GET, "/main/all-data", None).await?;
        serde_json::from_value(data)
            .map_err(|error| GatewayError::InvalidPayload(format!("invalid bulk payload: {error}")))
    }

    async fn complete_task(&self, task_id: &str) -> Result<Value, GatewayError> {
        self.request(Method::POST, &format!("/tasks/{task_id}/complete"), None)
            .await
    }

    async fn complete_todo(&self, todo_id: &str) -> Result<Value, GatewayError> {
        self.request(Method::POST, &format!("/todos/{todo_id}/complete"), None)
            .await
    }

    async fn update_task(&self, task_id: &str, patch: Value) -> Result<Value, GatewayError> {
        self.request(Method::PATCH, &format!("/tasks/{task_id}"), Some(patch))
            .await
    }

    async fn update_todos(&self, todo_ids: &[String], patch: Value) -> Result<Value, GatewayError> {
        let body = serde_json::json!({ "todo_ids": todo_ids, "updates": patch });
        self.request(Method::PATCH, "/todos", Some(body)).await
    }
}

#[async_trait]
impl<S: SessionStore> CanvasApi for HttpGateway<S> {
    async fn setup_canvas(
        &self,
        institutional_url: &str,
        token: &str,
    ) -> Result<Value, GatewayError> {
        let body = serde_json::json!({
            "canvas_institutional_url": institutional_url,
            "canvas_token": token,
        });
        self.request(Method::POST, "/canvas/setup", Some(body)).await
    }

    async fn link_canvas_data(&self) -> Result<Value, GatewayError> {
        self.request(Method::POST, "/canvas/link-data", None).await
    }

    async fn canvas_provider(&self) -> Result<Value, GatewayError> {
        self.request(Method::GET, "/canvas/provider", None).await
    }

    async fn delete_all_canvas_data(&self) -> Result<Value, GatewayError> {
        self.request(Method::DELETE, "/canvas/delete-all", None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::Environment;
    use crate::infrastructure::session::InMemorySessionStore;

    fn gateway() -> HttpGateway<InMemorySessionStore> {
        let config = ApiConfig::resolve(Environment::Test, Some("http://localhost:3000".to_string()));
        HttpGateway::new(config, Arc::new(InMemorySessionStore::default()))
    }

    #[test]
    fn endpoint_joins_paths_against_the_base_url() {
        let gateway = gateway();
        let endpoint = gateway.endpoint("/tasks/tsk-1/complete").expect("endpoint");
        assert_eq!(endpoint.as_str(), "http://localhost:3000/tasks/tsk-1/complete");
    }

    #[test]
    fn structured_success_envelope_unwraps_data() {
        let body = r#"{ "success": true, "data": { "id": "tsk-1" }, "message": "ok", "timestamp": "2026-08-07T09:00:00Z" }"#;
        let value = parse_success_envelope(StatusCode::OK, body).expect("value");
        assert_eq!(value, serde_json::json!({ "id": "tsk-1" }));
    }

    #[test]
    fn legacy_bare_payload_is_accepted_as_is() {
        let body = r#"{ "id": "tsk-1", "title": "legacy" }"#;
        let value = parse_success_envelope(StatusCode::OK, body).expect("value");
        assert_eq!(value, serde_json::json!({ "id": "tsk-1", "title": "legacy" }));
    }

    #[test]
    fn envelope_without_data_falls_back_to_the_whole_body() {
        let body = r#"{ "success": true, "message": "accepted" }"#;
        let value = parse_success_envelope(StatusCode::OK, body).expect("value");
        assert_eq!(
            value,
            serde_json::json!({ "success": true, "message": "accepted" })
        );
    }

    #[test]
    fn empty_body_unwraps_to_null() {
        let value = parse_success_envelope(StatusCode::NO_CONTENT, "").expect("value");
        assert!(value.is_null());
    }

    #[test]
    fn two_hundred_with_success_false_is_a_rejection() {
        let body = r#"{ "success": false, "error": { "code": "LIMIT_REACHED", "message": "quota" } }"#;
        let error = parse_success_envelope(StatusCode::OK, body).expect_err("rejection");
        match error {
            GatewayError::Rejected { code, status, .. } => {
                assert_eq!(code, "LIMIT_REACHED");
                assert_eq!(status, 200);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn structured_error_envelope_is_parsed() {
        let body = r#"{ "success": false, "error": { "code": "NOT_AUTHORIZED", "message": "no token", "details": { "hint": "login" } } }"#;
        let error = parse_error_envelope(StatusCode::UNAUTHORIZED, body);
        match error {
            GatewayError::Rejected {
                code,
                status,
                message,
                details,
            } => {
                assert_eq!(code, "NOT_AUTHORIZED");
                assert_eq!(status, 401);
                assert_eq!(message, "no token");
                assert_eq!(details, Some(serde_json::json!({ "hint": "login" })));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn legacy_error_shape_falls_back_to_top_level_fields() {
        let body = r#"{ "message": "task missing", "code": "TASK_NOT_FOUND" }"#;
        let error = parse_error_envelope(StatusCode::NOT_FOUND, body);
        match error {
            GatewayError::Rejected { code, message, .. } => {
                assert_eq!(code, "TASK_NOT_FOUND");
                assert_eq!(message, "task missing");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn unparseable_error_body_falls_back_to_status_text() {
        let error = parse_error_envelope(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        match error {
            GatewayError::Rejected { code, message, status, .. } => {
                assert_eq!(code, "UNKNOWN_ERROR");
                assert_eq!(message, "Bad Gateway");
                assert_eq!(status, 502);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_millis(250);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(250));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(1_000));
    }

    #[test]
    fn transient_classification_covers_timeout_and_network() {
        assert!(GatewayError::Timeout(30_000).is_transient());
        assert!(GatewayError::Network("connection reset".to_string()).is_transient());
        assert!(!GatewayError::Rejected {
            code: "X".to_string(),
            status: 400,
            message: "bad".to_string(),
            details: None,
        }
        .is_transient());
        assert!(!GatewayError::InvalidPayload("bad json".to_string()).is_transient());
    }
}
