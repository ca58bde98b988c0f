// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Handlers for the ingest endpoints (§6 `/audio/upload/*`), thin wrappers
//! over `UploadIngest` that translate the wire shape and enforce that only
//! the session's owner (or an admin) may touch it.

use crate::presentation::auth::AuthenticatedUser;
use crate::presentation::dto::{AudioFileResponse, UploadInitRequest, UploadInitResponse, UploadStatusResponse};
use crate::presentation::error_response::ApiError;
use crate::presentation::state::AppState;
use audio_drm_domain::error::DrmError;
use audio_drm_domain::value_objects::{UploadId, UserId};
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use std::sync::Arc;

async fn assert_owns_upload(state: &AppState, user: UserId, upload_id: UploadId) -> Result<(), ApiError> {
    let session = state
        .repository
        .get_session(upload_id)
        .await?
        .ok_or_else(|| DrmError::not_found(format!("upload {upload_id} not found")))?;
    if session.owner_user_id != user && !state.repository.is_admin(user).await? {
        return Err(DrmError::forbidden("not the owner of this upload session").into());
    }
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ApiError> {
    headers.get(name).and_then(|v| v.to_str().ok()).ok_or_else(|| ApiError::from(DrmError::validation(format!("missing or malformed {name} header"))))
}

pub async fn init(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(body): Json<UploadInitRequest>,
) -> Result<(StatusCode, Json<UploadInitResponse>), ApiError> {
    let session = state.upload_ingest.init(user.user_id, body.filename, body.file_size, body.total_chunks, body.sha256).await?;
    state.metrics.record_upload_started();
    Ok((StatusCode::CREATED, Json(UploadInitResponse { upload_id: session.upload_id.to_string(), chunk_size: state.config.chunk_bytes })))
}

/// §6 `/audio/upload/chunk`: the chunk's ordinal and owning session are
/// carried as headers (`X-Upload-Id`, `X-Chunk-Index`), the bytes as the
/// multipart body's first part.
pub async fn write_chunk(State(state): State<Arc<AppState>>, user: AuthenticatedUser, headers: HeaderMap, mut multipart: Multipart) -> Result<StatusCode, ApiError> {
    let upload_id: UploadId = header_str(&headers, "x-upload-id")?.parse().map_err(|_| ApiError::from(DrmError::validation("malformed X-Upload-Id")))?;
    let index: u32 = header_str(&headers, "x-chunk-index")?.parse().map_err(|_| ApiError::from(DrmError::validation("malformed X-Chunk-Index")))?;

    assert_owns_upload(&state, user.user_id, upload_id).await?;

    let field = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::from(DrmError::validation("malformed multipart body")))?
        .ok_or_else(|| ApiError::from(DrmError::validation("chunk upload is missing its body part")))?;
    let bytes = field.bytes().await.map_err(|_| ApiError::from(DrmError::validation("failed to read chunk body")))?;

    state.upload_ingest.write_chunk(upload_id, index, &bytes).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn status(State(state): State<Arc<AppState>>, user: AuthenticatedUser, Path(upload_id): Path<UploadId>) -> Result<Json<UploadStatusResponse>, ApiError> {
    assert_owns_upload(&state, user.user_id, upload_id).await?;
    let view = state.upload_ingest.status(upload_id).await?;
    Ok(Json(UploadStatusResponse::from_status(view.status, view.uploaded_chunks, view.total_chunks)))
}

pub async fn finalize(State(state): State<Arc<AppState>>, user: AuthenticatedUser, Path(upload_id): Path<UploadId>) -> Result<(StatusCode, Json<AudioFileResponse>), ApiError> {
    assert_owns_upload(&state, user.user_id, upload_id).await?;
    match state.upload_ingest.finalize(upload_id).await {
        Ok(file) => {
            state.metrics.record_upload_completed();
            Ok((StatusCode::CREATED, Json(AudioFileResponse::from(&file))))
        }
        Err(e) => {
            state.metrics.record_upload_failed();
            Err(ApiError::from(e))
        }
    }
}

/// Idempotent (§8): cancelling an already-gone or already-finalized upload
/// still reports success.
pub async fn cancel(State(state): State<Arc<AppState>>, user: AuthenticatedUser, Path(upload_id): Path<UploadId>) -> Result<StatusCode, ApiError> {
    if state.repository.get_session(upload_id).await?.is_some() {
        assert_owns_upload(&state, user.user_id, upload_id).await?;
    }
    state.upload_ingest.cancel(upload_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
