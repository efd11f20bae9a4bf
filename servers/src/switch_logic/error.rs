use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lib_switch::StoreError;
use lib_switch::core::IngestError;
use thiserror::Error;
use tracing::error;

/// Handler failures and the plain-text responses they map to.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),

    #[error("Not found")]
    NotFound,
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::EmptyName => ApiError::BadRequest(INVALID_NAME),
            IngestError::Store(e) => ApiError::Store(e),
        }
    }
}

pub const INVALID_NAME: &str = "Missing or invalid 'name' in body";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Store(e) => {
                error!(error = %e, "Store error while handling request");
                (StatusCode::INTERNAL_SERVER_ERROR, "DB error").into_response()
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal error while handling request");
                (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
            }
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
        }
    }
}
