//! HTTP error mapping.
//!
//! [`ApiError`] implements [`IntoResponse`] so handlers can return
//! `Result<…, ApiError>` directly. Every error body is `{"error": "…"}`.

use std::any::Any;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::conversations::ChatError;
use crate::llm::GeminiError;

/// Errors returned by request handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Conversation operation failed.
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// Text generation failed.
    #[error(transparent)]
    Generation(#[from] GeminiError),

    /// The request body is not valid JSON for the endpoint.
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// No route matched.
    #[error("endpoint not found")]
    RouteNotFound,

    /// A handler panicked.
    #[error("internal server error")]
    Internal,
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody(rejection.body_text())
    }
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Chat(ChatError::Validation(_)) | Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Chat(ChatError::NotFound(_)) | Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::Chat(ChatError::Persistence(_)) | Self::Generation(_) | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        } else {
            tracing::debug!(%status, error = %message, "request rejected");
        }
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Response used by the panic-catching layer.
pub fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    ApiError::Internal.into_response()
}

/// Fallback handler for unknown paths.
pub async fn not_found() -> ApiError {
    ApiError::RouteNotFound
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(ChatError::validation("x")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ChatError::not_found("c")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ChatError::Persistence("f".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(GeminiError::MissingApiKey).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::RouteNotFound.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_messages_are_passed_through() {
        let err = ApiError::from(ChatError::validation("conversation name is required"));
        assert_eq!(err.to_string(), "conversation name is required");
    }
}
