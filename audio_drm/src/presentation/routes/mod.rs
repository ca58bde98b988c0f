// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! §6 route table, wired onto one `AppState`.

pub mod chapters;
pub mod stream;
pub mod upload;

use crate::presentation::state::AppState;
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/audio/upload/init", post(upload::init))
        .route("/audio/upload/chunk", post(upload::write_chunk))
        .route("/audio/upload/status/:upload_id", get(upload::status))
        .route("/audio/upload/finalize/:upload_id", post(upload::finalize))
        .route("/audio/upload/cancel/:upload_id", delete(upload::cancel))
        .route("/files/:id/chapters", get(chapters::list).post(chapters::create).delete(chapters::delete_all))
        .route("/files/:id/chapters/finalize", post(chapters::finalize))
        .route("/files/:id/chapters/:cid/stream-url", post(chapters::mint_stream_url))
        .route("/files/:id/chapters/:cid/stream", get(stream::stream_chapter))
        .route("/drm/audio/:id/stream-signed", get(stream::stream_master))
        .with_state(state)
}
