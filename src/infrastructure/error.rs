use thiserror::Error;

/// Failure surfaced by the remote gateway. `Timeout` and `Network` are
/// transient; `Rejected` carries the backend's structured error envelope.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request timed out after {0} ms")]
    Timeout(u64),
    #[error("network failure: {0}")]
    Network(String),
    #[error("remote rejected request: {code} (http {status}): {message}")]
    Rejected {
        code: String,
        status: u16,
        message: String,
        details: Option<serde_json::Value>,
    },
    #[error("invalid response payload: {0}")]
    InvalidPayload(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Network(_))
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("invalid cached record: {0}")]
    InvalidRecord(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("credential store error: {0}")]
    Store(String),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("record {id} not found in current view")]
    NotFound { id: String },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("sync engine state unavailable: {0}")]
    Unknown(String),
}
