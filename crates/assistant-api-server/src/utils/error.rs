use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Capacity error: {0}")]
    CapacityError(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Router error: {0}")]
    RouterError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "BadRequest", msg)
            }
            ApiError::StoreError(msg) => {
                tracing::error!("Store error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "StoreError", msg)
            }
            ApiError::CapacityError(msg) => {
                tracing::error!("Capacity error: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "CapacityError", msg)
            }
            ApiError::ModelError(msg) => {
                tracing::error!("Model error: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "ModelError", msg)
            }
            ApiError::RouterError(msg) => {
                tracing::error!("Router error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "RouterError", msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<crate::memory::backend::StoreError> for ApiError {
    fn from(e: crate::memory::backend::StoreError) -> Self {
        use crate::memory::backend::StoreError;
        match e {
            StoreError::Capacity(msg) => ApiError::CapacityError(msg),
            other => ApiError::StoreError(other.to_string()),
        }
    }
}
