// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Extracts the bearer-authenticated caller for the management API (§6).
//! Streaming endpoints authenticate differently - via the `token` query
//! parameter's session token, checked inside `StreamServer::authorize` -
//! so this extractor only guards `/audio/upload/*` and `/files/*`.

use crate::presentation::error_response::ApiError;
use crate::presentation::state::AppState;
use audio_drm_domain::error::DrmError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::sync::Arc;

pub use crate::infrastructure::adapters::AuthenticatedUser;

impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .ok_or_else(|| ApiError::from(DrmError::auth("missing bearer token")))?;
        let value = header.to_str().map_err(|_| ApiError::from(DrmError::auth("malformed authorization header")))?;
        let token = value.strip_prefix("Bearer ").ok_or_else(|| ApiError::from(DrmError::auth("expected a bearer token")))?;
        state.jwt.authenticate(token).map_err(ApiError::from)
    }
}
