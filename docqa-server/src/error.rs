use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use docqa_rag::RagError;
use serde::Serialize;
use tracing::error;

/// API-layer error type
#[derive(Debug)]
pub enum ApiError {
    /// 400 - Bad request (invalid input)
    BadRequest(String),

    /// 413 - Upload larger than the configured limit
    PayloadTooLarge(String),

    /// 500 - Internal error
    Internal(String),

    /// 502 - Embedding or generation backend failed
    BadGateway(String),

    /// 504 - Generation did not finish in time
    GatewayTimeout(String),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "backend_error", msg),
            ApiError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, "timeout", msg),
        };

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "request failed");
        }

        (status, Json(ErrorBody { error: error_type, message })).into_response()
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let message = err.to_string();
        match err {
            RagError::Validation(_) | RagError::StoreNotInitialized => ApiError::BadRequest(message),
            RagError::Embedding { .. } | RagError::Generation { .. } => ApiError::BadGateway(message),
            RagError::GenerationTimeout { .. } => ApiError::GatewayTimeout(message),
            RagError::Storage { .. } | RagError::Extraction { .. } | RagError::Config(_) => {
                ApiError::Internal(message)
            }
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}
