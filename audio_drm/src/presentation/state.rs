// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The composed component graph (§9 Design Notes: "explicit component
//! graph constructed at process boot and passed by reference") axum's
//! router state carries. Built once in `main` and shared behind `Arc`.

use crate::application::services::AuthorizationService;
use crate::application::use_cases::{ChapterMaterializer, StreamServer, UploadIngest};
use crate::infrastructure::adapters::{AesGcmEnvelopeCrypto, JwtAuthenticator};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::metrics::MetricsService;
use audio_drm_domain::ports::{Repository, SignedUrlCodec};
use std::sync::Arc;

pub struct AppState {
    pub repository: Arc<dyn Repository>,
    pub upload_ingest: Arc<UploadIngest>,
    pub chapter_materializer: Arc<ChapterMaterializer>,
    pub stream_server: Arc<StreamServer>,
    pub crypto: Arc<AesGcmEnvelopeCrypto>,
    pub signed_url_codec: Arc<dyn SignedUrlCodec>,
    pub authorization: AuthorizationService,
    pub jwt: JwtAuthenticator,
    pub config: Arc<AppConfig>,
    pub metrics: Arc<MetricsService>,
}
