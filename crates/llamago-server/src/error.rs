//! HTTP error responses.
//!
//! Every failure leaves the server as `{"error": "<message>"}` with a status
//! chosen here.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use llamago_core::{EmbeddingError, EngineError};
use thiserror::Error;
use tracing::error;

/// Seconds a client should wait before retrying while the model loads.
const RETRY_AFTER_SECS: &str = "5";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or invalid request (400).
    #[error("{0}")]
    BadRequest(String),

    /// Unknown model or route (404).
    #[error("{0}")]
    NotFound(String),

    /// Engine not ready yet or failed to load (503).
    #[error("{message}")]
    Unavailable { message: String, retryable: bool },

    /// Engine or adapter failure (500).
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn model_not_found(name: &str) -> Self {
        Self::NotFound(format!("model '{name}' not found"))
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        if err.suggested_status_code() == 503 {
            return Self::Unavailable {
                retryable: err.is_retryable(),
                message: err.to_string(),
            };
        }
        error!("engine call failed: {err}");
        Self::Internal(err.to_string().trim().to_string())
    }
}

impl From<EmbeddingError> for ApiError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::InvalidInput => Self::BadRequest(err.to_string()),
            EmbeddingError::Malformed(_) | EmbeddingError::CountMismatch { .. } => {
                error!("embedding output rejected: {err}");
                Self::Internal(err.to_string())
            }
        }
    }
}

/// Build an error JSON object: `{"error": "message"}`.
pub fn error_body(msg: &str) -> serde_json::Value {
    serde_json::json!({ "error": msg })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retryable = matches!(self, Self::Unavailable { retryable: true, .. });
        let mut response = (status, Json(error_body(&self.to_string()))).into_response();

        if retryable {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from_static(RETRY_AFTER_SECS),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_becomes_retryable_503() {
        let err = ApiError::from(EngineError::NotReady);
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = err.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "5");
    }

    #[test]
    fn startup_failure_has_no_retry_hint() {
        let response = ApiError::from(EngineError::StartupFailed("bad gguf".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn engine_messages_are_trimmed() {
        let err = ApiError::from(EngineError::Generation("  decode failed\n".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "decode failed");
    }

    #[test]
    fn embedding_errors_split_by_blame() {
        assert_eq!(
            ApiError::from(EmbeddingError::InvalidInput).status(),
            StatusCode::BAD_REQUEST
        );
        let mismatch = ApiError::from(EmbeddingError::CountMismatch {
            got: 1,
            expected: 2,
        });
        assert_eq!(mismatch.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(mismatch.to_string(), "1 != 2");
    }
}
