// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `Repository` (§6): the narrow facade over persisted entities. The core
//! never assumes row visibility ordering across calls and never issues SQL
//! of its own - every read/write the use cases need is named here. (§9
//! Design Notes: "Global Prisma client + ad-hoc repository calls ->
//! Repository Facade interface".)

use crate::entities::{AudioFile, Chapter, ChunkUploadSession, FileAccess};
use crate::error::DrmError;
use crate::value_objects::{ChapterId, FileId, UploadId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Repository: Send + Sync {
    // --- AudioFile ---

    async fn get_file(&self, id: FileId) -> Result<Option<AudioFile>, DrmError>;

    async fn create_file(&self, file: AudioFile) -> Result<(), DrmError>;

    /// Cascades to `FileAccess`, `Chapter` and any `ChunkUploadSession`
    /// rows that produced it (§3 AudioFile invariant).
    async fn delete_file_cascade(&self, id: FileId) -> Result<(), DrmError>;

    // --- FileAccess ---

    async fn get_file_access(&self, user: UserId, file: FileId) -> Result<Option<FileAccess>, DrmError>;

    async fn upsert_file_access(&self, access: FileAccess) -> Result<(), DrmError>;

    async fn is_admin(&self, user: UserId) -> Result<bool, DrmError>;

    // --- Chapter ---

    /// Ordered by `order` ascending (§3 total-order invariant).
    async fn list_chapters(&self, file_id: FileId) -> Result<Vec<Chapter>, DrmError>;

    async fn get_chapter(&self, file_id: FileId, chapter_id: ChapterId) -> Result<Option<Chapter>, DrmError>;

    async fn create_chapter(&self, chapter: Chapter) -> Result<(), DrmError>;

    async fn update_chapter(&self, chapter: &Chapter) -> Result<(), DrmError>;

    async fn delete_chapters(&self, file_id: FileId) -> Result<(), DrmError>;

    // --- ChunkUploadSession ---

    async fn get_session(&self, upload_id: UploadId) -> Result<Option<ChunkUploadSession>, DrmError>;

    async fn upsert_session(&self, session: &ChunkUploadSession) -> Result<(), DrmError>;

    async fn delete_sessions_in(&self, ids: &[UploadId]) -> Result<(), DrmError>;

    /// §4.7 Janitor sweep: sessions whose `createdAt` or `(status,
    /// updatedAt)` makes them reapable as of `now`.
    async fn list_reapable_sessions(
        &self,
        now: DateTime<Utc>,
        session_ttl: chrono::Duration,
        failed_ttl: chrono::Duration,
    ) -> Result<Vec<ChunkUploadSession>, DrmError>;
}
