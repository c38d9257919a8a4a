//! Mapping of capture and API failures onto HTTP responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hookwire_proto::CaptureFailure;
use hookwire_store::StoreError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
}

fn error_response(status: StatusCode, code: &'static str) -> Response {
    (status, Json(ErrorBody { error: code })).into_response()
}

/// Failures of the public capture route
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid slug")]
    InvalidSlug,

    #[error("request body exceeds the size limit")]
    PayloadTooLarge,

    #[error("request body could not be read")]
    UnreadableBody,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for CaptureError {
    fn into_response(self) -> Response {
        match self {
            CaptureError::InvalidSlug => error_response(StatusCode::BAD_REQUEST, "invalid_slug"),
            CaptureError::PayloadTooLarge => {
                error_response(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large")
            }
            CaptureError::UnreadableBody => error_response(StatusCode::BAD_REQUEST, "invalid_body"),
            CaptureError::Store(err) => match err.failure() {
                CaptureFailure::NotFound => error_response(StatusCode::NOT_FOUND, "not_found"),
                CaptureFailure::Expired => error_response(StatusCode::GONE, "expired"),
                CaptureFailure::LimitExceeded => {
                    error_response(StatusCode::TOO_MANY_REQUESTS, "quota_exceeded")
                }
                CaptureFailure::Other(detail) => {
                    error!(error = %detail, "Capture failed in store");
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
                }
            },
        }
    }
}

/// Failures of the standalone management API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => error_response(StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Store(StoreError::NotFound) => {
                error_response(StatusCode::NOT_FOUND, "not_found")
            }
            ApiError::Store(StoreError::Expired) => error_response(StatusCode::GONE, "expired"),
            ApiError::Store(StoreError::SlugTaken(slug)) => {
                warn!(slug = %slug, "Endpoint slug already in use");
                error_response(StatusCode::CONFLICT, "slug_taken")
            }
            ApiError::Store(StoreError::InvalidEndpoint(reason)) => {
                warn!(reason = %reason, "Rejected endpoint definition");
                error_response(StatusCode::BAD_REQUEST, "invalid_endpoint")
            }
            ApiError::Store(err) => {
                error!(error = %err, "API store operation failed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}
