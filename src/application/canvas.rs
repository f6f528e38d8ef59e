use crate::infrastructure::error::GatewayError;
use crate::infrastructure::gateway::CanvasApi;
use serde_json::Value;
use std::sync::Arc;

/// Two-step linking workflow for an external learning platform: set up the
/// account with an institutional URL and token, then link its data into the
/// user's workspace. The linking call performs server-side batch work, so
/// the gateway behind this service must run the no-retry, long-timeout
/// profile (`ApiConfig::canvas_profile`).
pub struct CanvasLinkService<A: CanvasApi> {
    api: Arc<A>,
}

impl<A: CanvasApi> CanvasLinkService<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }

    pub async fn setup(&self, institutional_url: &str, token: &str) -> Result<Value, GatewayError> {
        ensure_non_empty(institutional_url, "institutional url")?;
        ensure_non_empty(token, "platform token")?;
        self.api
            .setup_canvas(institutional_url.trim(), token.trim())
            .await
    }

    /// Must be called after `setup`.
    pub async fn link_data(&self) -> Result<Value, GatewayError> {
        self.api.link_canvas_data().await
    }

    /// `None` when no account is linked.
    pub async fn provider_status(&self) -> Result<Option<Value>, GatewayError> {
        let status = self.api.canvas_provider().await?;
        Ok(if status.is_null() { None } else { Some(status) })
    }

    /// Deletes every linked project, task and todo along with the provider
    /// registration.
    pub async fn delete_all_data(&self) -> Result<Value, GatewayError> {
        self.api.delete_all_canvas_data().await
    }
}

fn ensure_non_empty(value: &str, field: &str) -> Result<(), GatewayError> {
    if value.trim().is_empty() {
        return Err(GatewayError::InvalidPayload(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}
