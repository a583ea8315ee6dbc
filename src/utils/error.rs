use std::time::Duration;
use thiserror::Error;

/// 單一訊息送往後端時可能發生的錯誤，由批次協調器攔截，不會回傳給 HTTP 呼叫端
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to build backend request: {message}")]
    RequestBuild { message: String },

    #[error("Backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected status code {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode backend response: {message}")]
    Decode { message: String },

    #[error("Unexpected output shape: expected string, found {found}")]
    UnexpectedOutput { found: String },

    #[error("Prediction ended with status {status}: {detail}")]
    PredictionFailed { status: String, detail: String },

    #[error("Prediction did not finish within {}s", .waited.as_secs())]
    Timeout { waited: Duration },

    #[error("Backend call cancelled")]
    Cancelled,
}

impl BackendError {
    /// 錯誤回應的 body 只保留前段，避免把整份 HTML 錯誤頁寫進日誌
    pub fn status(status: u16, body: &str) -> Self {
        const MAX_BODY: usize = 512;
        let body = match body.char_indices().nth(MAX_BODY) {
            Some((idx, _)) => format!("{}...", &body[..idx]),
            None => body.to_string(),
        };
        BackendError::Status { status, body }
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

pub type Result<T> = std::result::Result<T, GatewayError>;
