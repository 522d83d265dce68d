//! Error taxonomy for the geo index.
//!
//! `CapacityRejected` is deliberately absent here: cache admission
//! rejection is communicated as a `bool` return from
//! [`crate::cache::PointCache::update_point_in_sector`] and never
//! surfaces as an error (spec: capacity pressure drives the zoom-climb,
//! it does not fail the calling `UpdatePoint` request).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Serialize, PartialEq)]
#[serde(tag = "error", content = "message", rename_all = "snake_case")]
pub enum GeoError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("token expired")]
    TokenExpired,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, GeoError>;

impl GeoError {
    fn status_code(&self) -> StatusCode {
        match self {
            GeoError::AuthFailed(_) | GeoError::TokenExpired => StatusCode::UNAUTHORIZED,
            GeoError::NotFound(_) => StatusCode::NOT_FOUND,
            GeoError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for GeoError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

impl From<crate::projection::ProjectionError> for GeoError {
    fn from(err: crate::projection::ProjectionError) -> Self {
        GeoError::InvalidArgument(err.to_string())
    }
}
