// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Wire DTOs for the §6 JSON surface. Kept separate from the domain
//! entities so a column rename or an internal refactor never leaks through
//! to a client's response shape.

use audio_drm_domain::entities::{AudioFile, Chapter, ChapterStatus, UploadStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInitRequest {
    pub filename: String,
    pub file_size: u64,
    pub total_chunks: u32,
    #[serde(default)]
    pub sha256: Option<String>,
    /// Accepted for wire compatibility; the server derives the mime type
    /// from `filename`'s extension rather than trusting a client-supplied
    /// value (§4.4).
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInitResponse {
    pub upload_id: String,
    pub chunk_size: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatusResponse {
    pub uploaded_chunks: u32,
    pub total_chunks: u32,
    pub is_complete: bool,
    pub status: &'static str,
}

impl UploadStatusResponse {
    pub fn from_status(status: UploadStatus, uploaded_chunks: u32, total_chunks: u32) -> Self {
        let status_label = match status {
            UploadStatus::Uploading => "uploading",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        };
        Self { uploaded_chunks, total_chunks, is_complete: uploaded_chunks >= total_chunks, status: status_label }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFileResponse {
    pub id: String,
    pub filename: String,
    pub size_bytes: u64,
    pub duration_seconds: u32,
    pub mime_type: String,
    pub is_public: bool,
    pub is_encrypted: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&AudioFile> for AudioFileResponse {
    fn from(file: &AudioFile) -> Self {
        Self {
            id: file.id.to_string(),
            filename: file.filename.clone(),
            size_bytes: file.ciphertext_size,
            duration_seconds: file.duration_seconds,
            mime_type: file.mime_type.clone(),
            is_public: file.is_public,
            is_encrypted: file.is_encrypted,
            created_at: file.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterPlanItemRequest {
    pub label: String,
    pub start_time: f64,
    #[serde(default)]
    pub end_time: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ChapterPlanRequest(pub Vec<ChapterPlanItemRequest>);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterResponse {
    pub id: String,
    pub file_id: String,
    pub label: String,
    pub start_time: f64,
    pub end_time: Option<f64>,
    pub order: u32,
    pub status: &'static str,
    pub ciphertext_size: Option<u64>,
}

impl From<&Chapter> for ChapterResponse {
    fn from(chapter: &Chapter) -> Self {
        let status = match chapter.status {
            ChapterStatus::Pending => "pending",
            ChapterStatus::Ready => "ready",
            ChapterStatus::Failed => "failed",
        };
        Self {
            id: chapter.id.to_string(),
            file_id: chapter.file_id.to_string(),
            label: chapter.label.clone(),
            start_time: chapter.range.start_seconds(),
            end_time: chapter.range.end_seconds(),
            order: chapter.order,
            status,
            ciphertext_size: chapter.ciphertext_size,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamUrlResponse {
    pub url: String,
    pub expires_at_ms: i64,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub expires: i64,
    pub sig: String,
    pub token: String,
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub end: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StreamUrlMintRequest {
    #[serde(default)]
    pub start_seconds: Option<i64>,
    #[serde(default)]
    pub end_seconds: Option<i64>,
}
