// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Configuration
//!
//! Loads the recognized-keys list (spec §6) from environment variables
//! (prefix `AUDIO_DRM__`, `__` as the nesting separator) layered over an
//! optional TOML file, via the `config` crate - the same two-source
//! layering the teacher's `infrastructure/config` module uses, just with
//! this server's own key set.

use crate::infrastructure::runtime::MemoryBandThresholds;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_MAX_FILE_BYTES: i64 = 2 * 1024 * 1024 * 1024;
const DEFAULT_CHUNK_BYTES: i64 = 5 * 1024 * 1024;
const DEFAULT_CHAPTER_DB_THRESHOLD: i64 = 10 * 1024 * 1024;
const DEFAULT_CHAPTER_STREAM_THRESHOLD: i64 = 50 * 1024 * 1024;
const DEFAULT_MAX_CONCURRENT_CHAPTERS: i64 = 3;
const DEFAULT_CHAPTER_PROCESSING_TIMEOUT_SECS: i64 = 300;
const DEFAULT_FFMPEG_TIMEOUT_SECS: i64 = 120;
const DEFAULT_SIGNED_URL_TTL_SECS: i64 = 30 * 60;
const DEFAULT_CHUNK_SESSION_TTL_SECS: i64 = 24 * 60 * 60;
const DEFAULT_FAILED_SESSION_TTL_SECS: i64 = 2 * 60 * 60;
const DEFAULT_JANITOR_INTERVAL_SECS: i64 = 30 * 60;

#[derive(Debug, Clone, serde::Deserialize)]
struct RawSettings {
    upload_root: String,
    chunks_root: String,
    chapter_root: String,
    temp_root: String,
    max_file_bytes: i64,
    chunk_bytes: i64,
    chapter_db_threshold: i64,
    chapter_stream_threshold: i64,
    max_concurrent_chapters: i64,
    chapter_processing_timeout_secs: i64,
    ffmpeg_timeout_secs: i64,
    memory_caution_bytes: i64,
    memory_warning_bytes: i64,
    memory_critical_bytes: i64,
    signed_url_secret: String,
    session_secret: String,
    auth_jwt_secret: String,
    signed_url_ttl_secs: i64,
    chunk_session_ttl_secs: i64,
    failed_session_ttl_secs: i64,
    janitor_interval_secs: i64,
    database_url: String,
}

/// Fully parsed, range-checked server configuration (spec §6's recognized
/// keys). Constructed once at boot and shared behind `Arc` through axum's
/// router state.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub upload_root: PathBuf,
    pub chunks_root: PathBuf,
    pub chapter_root: PathBuf,
    pub temp_root: PathBuf,
    pub max_file_bytes: u64,
    pub chunk_bytes: u64,
    pub chapter_db_threshold: u64,
    pub chapter_stream_threshold: u64,
    pub max_concurrent_chapters: usize,
    pub chapter_processing_timeout: Duration,
    pub ffmpeg_timeout: Duration,
    pub memory_bands: MemoryBandThresholds,
    pub signed_url_secret: String,
    pub session_secret: String,
    pub auth_jwt_secret: String,
    pub signed_url_ttl: Duration,
    pub chunk_session_ttl: chrono::Duration,
    pub failed_session_ttl: chrono::Duration,
    pub janitor_interval: Duration,
    pub database_url: String,
}

impl AppConfig {
    /// Loads configuration from `AUDIO_DRM__*` environment variables,
    /// optionally overlaid by a TOML file at `config_path`. Secrets have no
    /// defaults - a missing secret is a startup failure, not a silent
    /// empty string.
    pub fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("upload_root", "./data/uploads")?
            .set_default("chunks_root", "./data/chunks")?
            .set_default("chapter_root", "./data/uploads/chapters")?
            .set_default("temp_root", "./data/uploads/temp")?
            .set_default("max_file_bytes", DEFAULT_MAX_FILE_BYTES)?
            .set_default("chunk_bytes", DEFAULT_CHUNK_BYTES)?
            .set_default("chapter_db_threshold", DEFAULT_CHAPTER_DB_THRESHOLD)?
            .set_default("chapter_stream_threshold", DEFAULT_CHAPTER_STREAM_THRESHOLD)?
            .set_default("max_concurrent_chapters", DEFAULT_MAX_CONCURRENT_CHAPTERS)?
            .set_default("chapter_processing_timeout_secs", DEFAULT_CHAPTER_PROCESSING_TIMEOUT_SECS)?
            .set_default("ffmpeg_timeout_secs", DEFAULT_FFMPEG_TIMEOUT_SECS)?
            .set_default("memory_caution_bytes", (1.2 * 1024.0 * 1024.0 * 1024.0) as i64)?
            .set_default("memory_warning_bytes", (1.5 * 1024.0 * 1024.0 * 1024.0) as i64)?
            .set_default("memory_critical_bytes", (1.8 * 1024.0 * 1024.0 * 1024.0) as i64)?
            .set_default("signed_url_ttl_secs", DEFAULT_SIGNED_URL_TTL_SECS)?
            .set_default("chunk_session_ttl_secs", DEFAULT_CHUNK_SESSION_TTL_SECS)?
            .set_default("failed_session_ttl_secs", DEFAULT_FAILED_SESSION_TTL_SECS)?
            .set_default("janitor_interval_secs", DEFAULT_JANITOR_INTERVAL_SECS)?
            .set_default("database_url", "sqlite://./audio-drm.db")?;

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(config::Environment::with_prefix("AUDIO_DRM").separator("__"));

        let raw: RawSettings = builder.build().context("loading configuration")?.try_deserialize().context("parsing configuration")?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> anyhow::Result<Self> {
        anyhow::ensure!(!raw.signed_url_secret.is_empty(), "signed-url-secret must not be empty");
        anyhow::ensure!(!raw.session_secret.is_empty(), "session-secret must not be empty");
        anyhow::ensure!(!raw.auth_jwt_secret.is_empty(), "auth-jwt-secret must not be empty");
        anyhow::ensure!(raw.max_concurrent_chapters > 0, "max-concurrent-chapters must be positive");

        let upload_root = PathBuf::from(raw.upload_root);
        let chunks_root = PathBuf::from(raw.chunks_root);
        let chapter_root = PathBuf::from(raw.chapter_root);
        let temp_root = PathBuf::from(raw.temp_root);

        // §4.7 Janitor safety invariant: the reapable roots (chunks, temp)
        // must never coincide with the master-file root itself. `temp_root`
        // and `chapter_root` are expected to live *under* `upload_root`
        // per the on-disk layout (§6); only exact coincidence with the
        // master root is disallowed.
        anyhow::ensure!(chunks_root != upload_root, "chunks-root must not equal upload-root");
        anyhow::ensure!(temp_root != upload_root, "temp-root must not equal upload-root");

        Ok(Self {
            upload_root,
            chunks_root,
            chapter_root,
            temp_root,
            max_file_bytes: raw.max_file_bytes as u64,
            chunk_bytes: raw.chunk_bytes as u64,
            chapter_db_threshold: raw.chapter_db_threshold as u64,
            chapter_stream_threshold: raw.chapter_stream_threshold as u64,
            max_concurrent_chapters: raw.max_concurrent_chapters as usize,
            chapter_processing_timeout: Duration::from_secs(raw.chapter_processing_timeout_secs as u64),
            ffmpeg_timeout: Duration::from_secs(raw.ffmpeg_timeout_secs as u64),
            memory_bands: MemoryBandThresholds {
                caution_bytes: raw.memory_caution_bytes as u64,
                warning_bytes: raw.memory_warning_bytes as u64,
                critical_bytes: raw.memory_critical_bytes as u64,
            },
            signed_url_secret: raw.signed_url_secret,
            session_secret: raw.session_secret,
            auth_jwt_secret: raw.auth_jwt_secret,
            signed_url_ttl: Duration::from_secs(raw.signed_url_ttl_secs as u64),
            chunk_session_ttl: chrono::Duration::seconds(raw.chunk_session_ttl_secs),
            failed_session_ttl: chrono::Duration::seconds(raw.failed_session_ttl_secs),
            janitor_interval: Duration::from_secs(raw.janitor_interval_secs as u64),
            database_url: raw.database_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawSettings {
        RawSettings {
            upload_root: "/data/uploads".to_string(),
            chunks_root: "/data/chunks".to_string(),
            chapter_root: "/data/uploads/chapters".to_string(),
            temp_root: "/data/uploads/temp".to_string(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            chapter_db_threshold: DEFAULT_CHAPTER_DB_THRESHOLD,
            chapter_stream_threshold: DEFAULT_CHAPTER_STREAM_THRESHOLD,
            max_concurrent_chapters: DEFAULT_MAX_CONCURRENT_CHAPTERS,
            chapter_processing_timeout_secs: DEFAULT_CHAPTER_PROCESSING_TIMEOUT_SECS,
            ffmpeg_timeout_secs: DEFAULT_FFMPEG_TIMEOUT_SECS,
            memory_caution_bytes: 100,
            memory_warning_bytes: 200,
            memory_critical_bytes: 300,
            signed_url_secret: "s".to_string(),
            session_secret: "s".to_string(),
            auth_jwt_secret: "s".to_string(),
            signed_url_ttl_secs: DEFAULT_SIGNED_URL_TTL_SECS,
            chunk_session_ttl_secs: DEFAULT_CHUNK_SESSION_TTL_SECS,
            failed_session_ttl_secs: DEFAULT_FAILED_SESSION_TTL_SECS,
            janitor_interval_secs: DEFAULT_JANITOR_INTERVAL_SECS,
            database_url: "sqlite://./test.db".to_string(),
        }
    }

    #[test]
    fn from_raw_applies_ranges_and_defaults() {
        let config = AppConfig::from_raw(raw()).unwrap();
        assert_eq!(config.max_concurrent_chapters, 3);
        assert_eq!(config.signed_url_ttl, Duration::from_secs(1800));
    }

    #[test]
    fn rejects_empty_secret() {
        let mut r = raw();
        r.signed_url_secret.clear();
        assert!(AppConfig::from_raw(r).is_err());
    }

    #[test]
    fn rejects_chunks_root_equal_to_upload_root() {
        let mut r = raw();
        r.chunks_root = r.upload_root.clone();
        assert!(AppConfig::from_raw(r).is_err());
    }
}
