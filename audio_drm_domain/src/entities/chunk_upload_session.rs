// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `ChunkUploadSession` (§3): the in-flight ingest row. Created by `init`,
//! mutated by chunk writes and `finalize`, and physically reaped by the
//! Janitor 24h after creation (2h if failed, §4.7).

use crate::value_objects::{UploadId, UserId};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Uploading,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ChunkUploadSession {
    pub upload_id: UploadId,
    pub owner_user_id: UserId,
    pub filename: String,
    pub declared_size: u64,
    pub total_chunks: u32,
    pub declared_sha256: Option<String>,
    pub status: UploadStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl ChunkUploadSession {
    pub fn new(owner_user_id: UserId, filename: String, declared_size: u64, total_chunks: u32, declared_sha256: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            upload_id: UploadId::new(),
            owner_user_id,
            filename,
            declared_size,
            total_chunks,
            declared_sha256,
            status: UploadStatus::Uploading,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn mark_completed(&mut self) {
        self.status = UploadStatus::Completed;
        self.touch();
    }

    pub fn mark_failed(&mut self) {
        self.status = UploadStatus::Failed;
        self.touch();
    }

    /// §4.7 Janitor reclamation policy.
    pub fn is_reapable(&self, now: DateTime<Utc>, session_ttl: chrono::Duration, failed_ttl: chrono::Duration) -> bool {
        if now - self.created_at >= session_ttl {
            return true;
        }
        self.status == UploadStatus::Failed && now - self.last_activity >= failed_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session() -> ChunkUploadSession {
        ChunkUploadSession::new(UserId::new(), "book.mp3".to_string(), 500_000_000, 100, Some("deadbeef".to_string()))
    }

    #[test]
    fn fresh_session_is_not_reapable() {
        let session = session();
        assert!(!session.is_reapable(Utc::now(), Duration::hours(24), Duration::hours(2)));
    }

    #[test]
    fn stale_session_is_reapable_regardless_of_status() {
        let mut session = session();
        session.created_at = Utc::now() - Duration::hours(25);
        assert!(session.is_reapable(Utc::now(), Duration::hours(24), Duration::hours(2)));
    }

    #[test]
    fn failed_session_reaped_after_shorter_ttl() {
        let mut session = session();
        session.mark_failed();
        session.last_activity = Utc::now() - Duration::hours(3);
        assert!(session.is_reapable(Utc::now(), Duration::hours(24), Duration::hours(2)));
    }
}
