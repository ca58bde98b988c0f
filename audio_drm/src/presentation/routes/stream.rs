// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The two streaming endpoints (§4.6, §6): `/drm/audio/{id}/stream-signed`
//! for a master, `/files/{id}/chapters/{cid}/stream` for a chapter. Neither
//! goes through the bearer extractor - the ticket and its bearer travel in
//! the query string so the URL is shareable on its own, validated inside
//! `StreamServer::authorize`.

use crate::application::use_cases::stream_server::{StreamBody, StreamPlan, StreamRequestContext};
use crate::presentation::dto::StreamQuery;
use crate::presentation::error_response::{map_stream_error, ApiError};
use crate::presentation::state::AppState;
use audio_drm_domain::error::DrmError;
use audio_drm_domain::value_objects::{ChapterId, FileId, ResourceRef, SignedTicket, END_OF_TRACK};
use axum::body::Body;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

fn response_for(plan: crate::application::use_cases::stream_server::StreamPlan, filename: &str) -> Response {
    let mut response = match plan.body {
        StreamBody::Memory(bytes) => {
            let len = bytes.len();
            let mut response = Body::from(bytes).into_response();
            response.headers_mut().insert(header::CONTENT_LENGTH, len.into());
            response
        }
        StreamBody::Async(reader) => Body::from_stream(ReaderStream::new(reader)).into_response(),
    };

    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, plan.mime_type.parse().unwrap_or(header::HeaderValue::from_static("application/octet-stream")));
    headers.insert(header::CONTENT_DISPOSITION, format!("inline; filename=\"{filename}\"").parse().unwrap_or(header::HeaderValue::from_static("inline")));
    headers.insert(header::ACCEPT_RANGES, header::HeaderValue::from_static("none"));
    headers.insert("x-start-time", header::HeaderValue::from(plan.start_seconds));
    if let Some(len) = plan.content_length {
        headers.insert(header::CONTENT_LENGTH, len.into());
    }
    response
}

/// Label recorded against `stream_requests_total` (SPEC_FULL §11): `"ok"`
/// or the `DrmError` variant's snake_case name.
fn outcome_label(result: &Result<StreamPlan, DrmError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(DrmError::AuthError(_)) => "auth_error",
        Err(DrmError::ForbiddenError(_)) => "forbidden",
        Err(DrmError::NotFoundError(_)) => "not_found",
        Err(DrmError::ValidationError(_)) => "validation_error",
        Err(DrmError::IntegrityError(_)) => "integrity_error",
        Err(DrmError::ResourceExhausted(_)) => "resource_exhausted",
        Err(DrmError::IoError(_)) => "io_error",
    }
}

fn build_ticket(resource: ResourceRef, query: &StreamQuery, client_ip: std::net::IpAddr) -> SignedTicket {
    SignedTicket {
        resource,
        start_seconds: query.start.unwrap_or(0),
        end_seconds: query.end.unwrap_or(END_OF_TRACK),
        expires_ms: query.expires,
        client_ip,
    }
}

pub async fn stream_master(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<FileId>,
    Query(query): Query<StreamQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Response, ApiError> {
    let ticket = build_ticket(ResourceRef::Master(file_id), &query, addr.ip());
    let ctx = StreamRequestContext { ticket, signature_hex: query.sig, bearer_token: query.token, request_ip: addr.ip() };
    let filename = format!("master-{file_id}");
    let result = state.stream_server.stream_master(ctx).await;
    state.metrics.record_stream_request(outcome_label(&result));
    let plan = result.map_err(map_stream_error)?;
    Ok(response_for(plan, &filename))
}

pub async fn stream_chapter(
    State(state): State<Arc<AppState>>,
    Path((file_id, chapter_id)): Path<(FileId, ChapterId)>,
    Query(query): Query<StreamQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Response, ApiError> {
    let ticket = build_ticket(ResourceRef::Chapter(file_id, chapter_id), &query, addr.ip());
    let ctx = StreamRequestContext { ticket, signature_hex: query.sig, bearer_token: query.token, request_ip: addr.ip() };
    let filename = format!("chapter-{chapter_id}");
    let result = state.stream_server.stream_chapter(ctx).await;
    state.metrics.record_stream_request(outcome_label(&result));
    let plan = result.map_err(map_stream_error)?;
    Ok(response_for(plan, &filename))
}
