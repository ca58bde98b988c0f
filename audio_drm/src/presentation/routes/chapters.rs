// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Chapter CRUD, materialization kickoff, and signed stream-URL minting
//! (§6 `/files/{id}/chapters*`). Structural changes to a file's chapter
//! plan are an admin-only operation; a plain view grant only lets a caller
//! list chapters and mint a URL for one that is already `ready`.

use crate::presentation::auth::AuthenticatedUser;
use crate::presentation::dto::{ChapterPlanRequest, ChapterResponse, StreamUrlMintRequest, StreamUrlResponse};
use crate::presentation::error_response::ApiError;
use crate::presentation::state::AppState;
use audio_drm_domain::entities::{Chapter, ChapterStatus};
use audio_drm_domain::error::DrmError;
use audio_drm_domain::ports::{EnvelopeCryptoService, SessionTokenPayload};
use audio_drm_domain::services::{validate_chapter_plan, ChapterPlanItem};
use audio_drm_domain::value_objects::{AuthDecision, ChapterId, ChapterRange, FileId, ResourceRef, SignedTicket, END_OF_TRACK};
use axum::extract::{ConnectInfo, Path, State};
use axum::Json;
use std::net::SocketAddr;
use std::sync::Arc;

async fn require_file_and_decision(state: &AppState, user_id: audio_drm_domain::value_objects::UserId, file_id: FileId) -> Result<(audio_drm_domain::entities::AudioFile, AuthDecision), ApiError> {
    let file = state.repository.get_file(file_id).await?.ok_or_else(|| DrmError::not_found(format!("file {file_id} not found")))?;
    let decision = state.authorization.decide_for_file(user_id, &file).await?;
    Ok((file, decision))
}

fn require_admin(decision: AuthDecision) -> Result<(), ApiError> {
    if decision != AuthDecision::Admin {
        return Err(ApiError::from(DrmError::forbidden("chapter structure may only be changed by an administrator")));
    }
    Ok(())
}

pub async fn list(State(state): State<Arc<AppState>>, user: AuthenticatedUser, Path(file_id): Path<FileId>) -> Result<Json<Vec<ChapterResponse>>, ApiError> {
    let (_file, decision) = require_file_and_decision(&state, user.user_id, file_id).await?;
    if !decision.is_allowed() {
        return Err(ApiError::from(DrmError::forbidden(format!("user {} may not view file {file_id}", user.user_id))));
    }
    let chapters = state.repository.list_chapters(file_id).await?;
    Ok(Json(chapters.iter().map(ChapterResponse::from).collect()))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(file_id): Path<FileId>,
    Json(body): Json<ChapterPlanRequest>,
) -> Result<Json<Vec<ChapterResponse>>, ApiError> {
    let (_file, decision) = require_file_and_decision(&state, user.user_id, file_id).await?;
    require_admin(decision)?;

    let items: Vec<ChapterPlanItem> = body
        .0
        .into_iter()
        .map(|item| {
            let range = ChapterRange::new(item.start_time, item.end_time).map_err(|e| ApiError::from(DrmError::validation(e.to_string())))?;
            Ok(ChapterPlanItem { label: item.label, range })
        })
        .collect::<Result<_, ApiError>>()?;
    validate_chapter_plan(&items)?;

    state.repository.delete_chapters(file_id).await?;
    let mut created = Vec::with_capacity(items.len());
    for (order, item) in items.into_iter().enumerate() {
        let chapter = Chapter::new_pending(file_id, item.label, item.range, order as u32);
        state.repository.create_chapter(chapter.clone()).await?;
        created.push(chapter);
    }
    Ok(Json(created.iter().map(ChapterResponse::from).collect()))
}

pub async fn delete_all(State(state): State<Arc<AppState>>, user: AuthenticatedUser, Path(file_id): Path<FileId>) -> Result<axum::http::StatusCode, ApiError> {
    let (_file, decision) = require_file_and_decision(&state, user.user_id, file_id).await?;
    require_admin(decision)?;
    state.repository.delete_chapters(file_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// §4.5: kicks off materialization. The materializer enforces its own
/// per-run concurrency via the memory governor, so this handler just
/// awaits the whole run and reports the resulting chapter rows.
pub async fn finalize(State(state): State<Arc<AppState>>, user: AuthenticatedUser, Path(file_id): Path<FileId>) -> Result<Json<Vec<ChapterResponse>>, ApiError> {
    let (_file, decision) = require_file_and_decision(&state, user.user_id, file_id).await?;
    require_admin(decision)?;

    let attempted: std::collections::HashSet<_> =
        state.repository.list_chapters(file_id).await?.into_iter().filter(|c| c.status == ChapterStatus::Pending).map(|c| c.id).collect();

    state.chapter_materializer.materialize(file_id).await?;

    let chapters = state.repository.list_chapters(file_id).await?;
    for chapter in &chapters {
        if !attempted.contains(&chapter.id) {
            continue;
        }
        match chapter.status {
            ChapterStatus::Ready => state.metrics.record_chapter_materialized(),
            ChapterStatus::Failed => state.metrics.record_chapter_failed(),
            ChapterStatus::Pending => {}
        }
    }
    Ok(Json(chapters.iter().map(ChapterResponse::from).collect()))
}

/// §4.2/§6: mints a signed URL bound to the minting request's own client
/// IP, valid for `signed-url-ttl`, plus a session bearer carrying the same
/// resource reference so `StreamServer::authorize` can check both.
pub async fn mint_stream_url(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path((file_id, chapter_id)): Path<(FileId, ChapterId)>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<StreamUrlMintRequest>,
) -> Result<Json<StreamUrlResponse>, ApiError> {
    let (_file, decision) = require_file_and_decision(&state, user.user_id, file_id).await?;
    if !decision.is_allowed() {
        return Err(ApiError::from(DrmError::forbidden(format!("user {} may not view file {file_id}", user.user_id))));
    }
    let chapter = state.repository.get_chapter(file_id, chapter_id).await?.ok_or_else(|| DrmError::not_found(format!("chapter {chapter_id} not found")))?;
    if chapter.status != ChapterStatus::Ready {
        return Err(ApiError::from(DrmError::validation(format!("chapter {chapter_id} is not ready"))));
    }

    let now_ms = chrono::Utc::now().timestamp_millis();
    let expires_ms = now_ms + state.config.signed_url_ttl.as_millis() as i64;
    let resource = ResourceRef::Chapter(file_id, chapter_id);
    let ticket = SignedTicket {
        resource,
        start_seconds: body.start_seconds.unwrap_or(0),
        end_seconds: body.end_seconds.unwrap_or(END_OF_TRACK),
        expires_ms,
        client_ip: addr.ip(),
    };
    let signature_hex = state.signed_url_codec.sign(&ticket);

    let payload = SessionTokenPayload {
        resource_id: ticket.resource.to_string(),
        user_id: user.user_id.to_string(),
        issued_at_ms: now_ms,
        nonce: uuid::Uuid::new_v4().to_string(),
        expires_at_ms: expires_ms,
    };
    let bearer_token = state.crypto.session_token(&payload)?;

    let url = format!(
        "/files/{file_id}/chapters/{chapter_id}/stream?expires={}&sig={}&token={}&start={}&end={}",
        ticket.expires_ms, signature_hex, bearer_token, ticket.start_seconds, ticket.end_seconds
    );
    Ok(Json(StreamUrlResponse { url, expires_at_ms: expires_ms }))
}
