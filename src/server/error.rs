use crate::utils::error::GatewayError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// 驗證失敗時回給客戶端的錯誤，內容為純文字
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request body")]
    InvalidBody,
    #[error("Messages array cannot be empty")]
    EmptyBatch,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::ValidationError { .. } => ApiError::EmptyBatch,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidBody | ApiError::EmptyBatch => StatusCode::BAD_REQUEST,
            ApiError::Internal(detail) => {
                tracing::error!("API internal error: {}", detail);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::InvalidBody.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::EmptyBatch.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal("boom".to_string()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validation_error_maps_to_empty_batch() {
        let err = ApiError::from(GatewayError::ValidationError {
            message: "Messages array cannot be empty".to_string(),
        });
        assert!(matches!(err, ApiError::EmptyBatch));
    }
}
