// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Maps `DrmError` kinds to HTTP status codes (§7). The domain stays
//! transport agnostic - this is the one place that knows what a
//! `ForbiddenError` means to an HTTP client. Wraps `DrmError` rather than
//! implementing `IntoResponse` on it directly, since neither type is local
//! to this crate.

use audio_drm_domain::error::DrmError;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Seconds a `503 ResourceExhausted` response asks the caller to wait
/// before retrying (§7).
const RETRY_AFTER_SECS: u64 = 5;

pub struct ApiError(DrmError);

impl From<DrmError> for ApiError {
    fn from(error: DrmError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self.0 {
            DrmError::AuthError(msg) => (StatusCode::UNAUTHORIZED, "AuthError", msg.clone()),
            DrmError::ForbiddenError(msg) => (StatusCode::FORBIDDEN, "ForbiddenError", msg.clone()),
            DrmError::NotFoundError(msg) => (StatusCode::NOT_FOUND, "NotFoundError", msg.clone()),
            DrmError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "ValidationError", msg.clone()),
            // §7: a hash/tag mismatch is a 400 everywhere except mid-stream,
            // where `map_stream_error` below has already recast it.
            DrmError::IntegrityError(msg) => (StatusCode::BAD_REQUEST, "IntegrityError", msg.clone()),
            DrmError::ResourceExhausted(msg) => (StatusCode::SERVICE_UNAVAILABLE, "ResourceExhausted", msg.clone()),
            DrmError::IoError(msg) => {
                tracing::error!(error = %msg, "internal error surfaced to a client as a generic 500");
                (StatusCode::INTERNAL_SERVER_ERROR, "IoError", "internal server error".to_string())
            }
        };

        let mut response = (status, Json(json!({ "error": kind, "message": message }))).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }
        response
    }
}

/// Streaming endpoints surface a tag-verification failure as `500`, not the
/// `400` a finalize-time hash mismatch gets (§7: "400 on finalize, 500 on
/// stream"). Apply this instead of the plain `From` conversion in the
/// stream handlers.
pub fn map_stream_error(error: DrmError) -> ApiError {
    match error {
        DrmError::IntegrityError(msg) => ApiError(DrmError::IoError(msg)),
        other => ApiError(other),
    }
}
