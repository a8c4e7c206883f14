// Error types for the API server

use crate::enhance::EnhanceError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// API server error types
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    PayloadTooLarge(String),
    InternalServerError(String),
    GatewayTimeout(String),

    // Application-specific errors
    ImageProcessingError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            Self::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Self::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),

            // Undecodable input is a client error
            Self::ImageProcessingError(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(json!({
            "error": {
                "status": status.as_u16(),
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<EnhanceError> for ApiError {
    fn from(error: EnhanceError) -> Self {
        match error {
            EnhanceError::UploadTooLarge { .. } | EnhanceError::ResolutionTooLarge { .. } => {
                Self::PayloadTooLarge(error.to_string())
            }
            EnhanceError::InvalidScale(_) => Self::BadRequest(error.to_string()),
            EnhanceError::WeightsNotFound(_)
            | EnhanceError::Inference(_)
            | EnhanceError::Postprocessing(_) => Self::InternalServerError(error.to_string()),
        }
    }
}
