use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Opaque message returned to callers for internal failures.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Errors surfaced at the HTTP boundary.
///
/// Each variant is one category of the authentication failure taxonomy and maps
/// to a fixed status code. Only `Internal` hides its detail from the caller.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or unparseable request fields.
    #[error("{0}")]
    RequestMalformed(String),

    /// The signed message carries no extractable nonce.
    #[error("Invalid message format - nonce not found")]
    ChallengeFormatInvalid,

    /// The nonce was never issued, was already consumed, or was swept.
    #[error("Invalid or reused nonce")]
    ChallengeInvalidOrReused,

    /// The signature does not belong to the claimed address.
    #[error("{0}")]
    SignatureInvalid(String),

    /// Randomness or verification backend failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::RequestMalformed(_) => StatusCode::BAD_REQUEST,
            AppError::ChallengeFormatInvalid => StatusCode::BAD_REQUEST,
            AppError::ChallengeInvalidOrReused => StatusCode::BAD_REQUEST,
            AppError::SignatureInvalid(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed with internal error");
                INTERNAL_ERROR_MESSAGE.to_string()
            }
            other => other.to_string(),
        };

        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}
