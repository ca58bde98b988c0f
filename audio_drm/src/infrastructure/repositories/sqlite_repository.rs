// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite-backed `Repository` (§6 "Repository facade"). One narrow trait,
//! one concrete adapter - the core never assembles SQL itself.

use audio_drm_domain::entities::{AudioFile, Chapter, ChapterStatus, ChunkUploadSession, FileAccess, UploadStatus};
use audio_drm_domain::error::DrmError;
use audio_drm_domain::ports::Repository;
use audio_drm_domain::value_objects::{AuthTag, ChapterId, ChapterRange, EncryptionKey, FileId, Iv, UploadId, UserId};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_sqlx(e: sqlx::Error) -> DrmError {
        DrmError::io(format!("database error: {e}"))
    }

    fn row_to_audio_file(row: &sqlx::sqlite::SqliteRow) -> Result<AudioFile, DrmError> {
        let id: String = row.get("id");
        let key: Option<String> = row.get("encryption_key");
        let iv: Option<String> = row.get("iv");
        let tag: Option<String> = row.get("auth_tag");
        let created_at: String = row.get("created_at");

        Ok(AudioFile {
            id: id.parse().map_err(|_| DrmError::io("malformed file id in database"))?,
            filename: row.get("filename"),
            relative_path: row.get("relative_path"),
            ciphertext_size: row.get::<i64, _>("ciphertext_size") as u64,
            duration_seconds: row.get::<i64, _>("duration_seconds") as u32,
            mime_type: row.get("mime_type"),
            is_public: row.get::<i64, _>("is_public") != 0,
            is_encrypted: row.get::<i64, _>("is_encrypted") != 0,
            encryption_key: key.map(|h| EncryptionKey::from_hex(&h)).transpose().map_err(|_| DrmError::io("malformed key in database"))?,
            iv: iv.map(|h| Iv::from_hex(&h)).transpose().map_err(|_| DrmError::io("malformed iv in database"))?,
            auth_tag: tag.map(|h| AuthTag::from_hex(&h)).transpose().map_err(|_| DrmError::io("malformed tag in database"))?,
            created_at: DateTime::parse_from_rfc3339(&created_at).map_err(|_| DrmError::io("malformed timestamp in database"))?.with_timezone(&Utc),
        })
    }

    fn row_to_chapter(row: &sqlx::sqlite::SqliteRow) -> Result<Chapter, DrmError> {
        let id: String = row.get("id");
        let file_id: String = row.get("file_id");
        let status: String = row.get("status");
        let key: Option<String> = row.get("encryption_key");
        let iv: Option<String> = row.get("iv");
        let tag: Option<String> = row.get("auth_tag");
        let finalized_at: Option<String> = row.get("finalized_at");
        let end_seconds: Option<f64> = row.get("end_seconds");

        let range = ChapterRange::new(row.get("start_seconds"), end_seconds).map_err(|e| DrmError::io(format!("malformed chapter range in database: {e}")))?;

        Ok(Chapter {
            id: id.parse().map_err(|_| DrmError::io("malformed chapter id in database"))?,
            file_id: file_id.parse().map_err(|_| DrmError::io("malformed file id in database"))?,
            label: row.get("label"),
            range,
            order: row.get::<i64, _>("order_index") as u32,
            status: match status.as_str() {
                "pending" => ChapterStatus::Pending,
                "ready" => ChapterStatus::Ready,
                "failed" => ChapterStatus::Failed,
                other => return Err(DrmError::io(format!("unknown chapter status in database: {other}"))),
            },
            relative_path: row.get("relative_path"),
            plaintext_size: row.get::<Option<i64>, _>("plaintext_size").map(|v| v as u64),
            ciphertext_size: row.get::<Option<i64>, _>("ciphertext_size").map(|v| v as u64),
            encryption_key: key.map(|h| EncryptionKey::from_hex(&h)).transpose().map_err(|_| DrmError::io("malformed key in database"))?,
            iv: iv.map(|h| Iv::from_hex(&h)).transpose().map_err(|_| DrmError::io("malformed iv in database"))?,
            auth_tag: tag.map(|h| AuthTag::from_hex(&h)).transpose().map_err(|_| DrmError::io("malformed tag in database"))?,
            finalized_at: finalized_at
                .map(|s| DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
                .transpose()
                .map_err(|_| DrmError::io("malformed timestamp in database"))?,
        })
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<ChunkUploadSession, DrmError> {
        let upload_id: String = row.get("upload_id");
        let owner: String = row.get("owner_user_id");
        let status: String = row.get("status");
        let created_at: String = row.get("created_at");
        let last_activity: String = row.get("last_activity");

        Ok(ChunkUploadSession {
            upload_id: upload_id.parse().map_err(|_| DrmError::io("malformed upload id in database"))?,
            owner_user_id: owner.parse().map_err(|_| DrmError::io("malformed user id in database"))?,
            filename: row.get("filename"),
            declared_size: row.get::<i64, _>("declared_size") as u64,
            total_chunks: row.get::<i64, _>("total_chunks") as u32,
            declared_sha256: row.get("declared_sha256"),
            status: match status.as_str() {
                "uploading" => UploadStatus::Uploading,
                "completed" => UploadStatus::Completed,
                "failed" => UploadStatus::Failed,
                other => return Err(DrmError::io(format!("unknown session status in database: {other}"))),
            },
            created_at: DateTime::parse_from_rfc3339(&created_at).map_err(|_| DrmError::io("malformed timestamp in database"))?.with_timezone(&Utc),
            last_activity: DateTime::parse_from_rfc3339(&last_activity).map_err(|_| DrmError::io("malformed timestamp in database"))?.with_timezone(&Utc),
        })
    }

    fn session_status_str(status: UploadStatus) -> &'static str {
        match status {
            UploadStatus::Uploading => "uploading",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        }
    }

    fn chapter_status_str(status: ChapterStatus) -> &'static str {
        match status {
            ChapterStatus::Pending => "pending",
            ChapterStatus::Ready => "ready",
            ChapterStatus::Failed => "failed",
        }
    }
}

#[async_trait::async_trait]
impl Repository for SqliteRepository {
    async fn get_file(&self, id: FileId) -> Result<Option<AudioFile>, DrmError> {
        let row = sqlx::query("SELECT * FROM audio_files WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::map_sqlx)?;
        row.as_ref().map(Self::row_to_audio_file).transpose()
    }

    async fn create_file(&self, file: AudioFile) -> Result<(), DrmError> {
        sqlx::query(
            "INSERT INTO audio_files (id, filename, relative_path, ciphertext_size, duration_seconds, mime_type, \
             is_public, is_encrypted, encryption_key, iv, auth_tag, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(file.id.to_string())
        .bind(&file.filename)
        .bind(&file.relative_path)
        .bind(file.ciphertext_size as i64)
        .bind(file.duration_seconds as i64)
        .bind(&file.mime_type)
        .bind(file.is_public as i64)
        .bind(file.is_encrypted as i64)
        .bind(file.encryption_key.as_ref().map(|k| k.to_hex()))
        .bind(file.iv.as_ref().map(|iv| iv.to_hex()))
        .bind(file.auth_tag.as_ref().map(|t| t.to_hex()))
        .bind(file.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx)?;
        Ok(())
    }

    async fn delete_file_cascade(&self, id: FileId) -> Result<(), DrmError> {
        // `ON DELETE CASCADE` (migration 0001) handles `chapters` and
        // `file_access`; upload sessions are not tied to a file id once
        // the master exists, so nothing else to cascade here.
        sqlx::query("DELETE FROM audio_files WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx)?;
        Ok(())
    }

    async fn get_file_access(&self, user: UserId, file: FileId) -> Result<Option<FileAccess>, DrmError> {
        let row = sqlx::query("SELECT * FROM file_access WHERE user_id = ? AND file_id = ?")
            .bind(user.to_string())
            .bind(file.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::map_sqlx)?;

        let Some(row) = row else { return Ok(None) };
        let user_id: String = row.get("user_id");
        let file_id: String = row.get("file_id");
        let expires_at: Option<String> = row.get("expires_at");
        Ok(Some(FileAccess::new(
            user_id.parse().map_err(|_| DrmError::io("malformed user id in database"))?,
            file_id.parse().map_err(|_| DrmError::io("malformed file id in database"))?,
            row.get::<i64, _>("can_view") != 0,
            expires_at
                .map(|s| DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
                .transpose()
                .map_err(|_| DrmError::io("malformed timestamp in database"))?,
        )))
    }

    async fn upsert_file_access(&self, access: FileAccess) -> Result<(), DrmError> {
        sqlx::query(
            "INSERT INTO file_access (user_id, file_id, can_view, expires_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT (user_id, file_id) DO UPDATE SET can_view = excluded.can_view, expires_at = excluded.expires_at",
        )
        .bind(access.user_id.to_string())
        .bind(access.file_id.to_string())
        .bind(access.can_view as i64)
        .bind(access.expires_at.map(|d| d.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx)?;
        Ok(())
    }

    async fn is_admin(&self, user: UserId) -> Result<bool, DrmError> {
        let row = sqlx::query("SELECT 1 FROM admin_users WHERE user_id = ?")
            .bind(user.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::map_sqlx)?;
        Ok(row.is_some())
    }

    async fn list_chapters(&self, file_id: FileId) -> Result<Vec<Chapter>, DrmError> {
        let rows = sqlx::query("SELECT * FROM chapters WHERE file_id = ? ORDER BY order_index ASC")
            .bind(file_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(Self::map_sqlx)?;
        rows.iter().map(Self::row_to_chapter).collect()
    }

    async fn get_chapter(&self, file_id: FileId, chapter_id: ChapterId) -> Result<Option<Chapter>, DrmError> {
        let row = sqlx::query("SELECT * FROM chapters WHERE file_id = ? AND id = ?")
            .bind(file_id.to_string())
            .bind(chapter_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::map_sqlx)?;
        row.as_ref().map(Self::row_to_chapter).transpose()
    }

    async fn create_chapter(&self, chapter: Chapter) -> Result<(), DrmError> {
        sqlx::query(
            "INSERT INTO chapters (id, file_id, label, start_seconds, end_seconds, order_index, status, \
             relative_path, plaintext_size, ciphertext_size, encryption_key, iv, auth_tag, finalized_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(chapter.id.to_string())
        .bind(chapter.file_id.to_string())
        .bind(&chapter.label)
        .bind(chapter.range.start_seconds())
        .bind(chapter.range.end_seconds())
        .bind(chapter.order as i64)
        .bind(Self::chapter_status_str(chapter.status))
        .bind(&chapter.relative_path)
        .bind(chapter.plaintext_size.map(|v| v as i64))
        .bind(chapter.ciphertext_size.map(|v| v as i64))
        .bind(chapter.encryption_key.as_ref().map(|k| k.to_hex()))
        .bind(chapter.iv.as_ref().map(|iv| iv.to_hex()))
        .bind(chapter.auth_tag.as_ref().map(|t| t.to_hex()))
        .bind(chapter.finalized_at.map(|d| d.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx)?;
        Ok(())
    }

    async fn update_chapter(&self, chapter: &Chapter) -> Result<(), DrmError> {
        sqlx::query(
            "UPDATE chapters SET label = ?, start_seconds = ?, end_seconds = ?, order_index = ?, status = ?, \
             relative_path = ?, plaintext_size = ?, ciphertext_size = ?, encryption_key = ?, iv = ?, auth_tag = ?, \
             finalized_at = ? WHERE id = ? AND file_id = ?",
        )
        .bind(&chapter.label)
        .bind(chapter.range.start_seconds())
        .bind(chapter.range.end_seconds())
        .bind(chapter.order as i64)
        .bind(Self::chapter_status_str(chapter.status))
        .bind(&chapter.relative_path)
        .bind(chapter.plaintext_size.map(|v| v as i64))
        .bind(chapter.ciphertext_size.map(|v| v as i64))
        .bind(chapter.encryption_key.as_ref().map(|k| k.to_hex()))
        .bind(chapter.iv.as_ref().map(|iv| iv.to_hex()))
        .bind(chapter.auth_tag.as_ref().map(|t| t.to_hex()))
        .bind(chapter.finalized_at.map(|d| d.to_rfc3339()))
        .bind(chapter.id.to_string())
        .bind(chapter.file_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx)?;
        Ok(())
    }

    async fn delete_chapters(&self, file_id: FileId) -> Result<(), DrmError> {
        sqlx::query("DELETE FROM chapters WHERE file_id = ?")
            .bind(file_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx)?;
        Ok(())
    }

    async fn get_session(&self, upload_id: UploadId) -> Result<Option<ChunkUploadSession>, DrmError> {
        let row = sqlx::query("SELECT * FROM chunk_upload_sessions WHERE upload_id = ?")
            .bind(upload_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::map_sqlx)?;
        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn upsert_session(&self, session: &ChunkUploadSession) -> Result<(), DrmError> {
        sqlx::query(
            "INSERT INTO chunk_upload_sessions (upload_id, owner_user_id, filename, declared_size, total_chunks, \
             declared_sha256, status, created_at, last_activity) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (upload_id) DO UPDATE SET status = excluded.status, last_activity = excluded.last_activity, \
             declared_sha256 = excluded.declared_sha256",
        )
        .bind(session.upload_id.to_string())
        .bind(session.owner_user_id.to_string())
        .bind(&session.filename)
        .bind(session.declared_size as i64)
        .bind(session.total_chunks as i64)
        .bind(&session.declared_sha256)
        .bind(Self::session_status_str(session.status))
        .bind(session.created_at.to_rfc3339())
        .bind(session.last_activity.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx)?;
        Ok(())
    }

    async fn delete_sessions_in(&self, ids: &[UploadId]) -> Result<(), DrmError> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = std::iter::repeat("?").take(ids.len()).collect::<Vec<_>>().join(", ");
        let query = format!("DELETE FROM chunk_upload_sessions WHERE upload_id IN ({placeholders})");
        let mut q = sqlx::query(&query);
        for id in ids {
            q = q.bind(id.to_string());
        }
        q.execute(&self.pool).await.map_err(Self::map_sqlx)?;
        Ok(())
    }

    async fn list_reapable_sessions(
        &self,
        now: DateTime<Utc>,
        session_ttl: chrono::Duration,
        failed_ttl: chrono::Duration,
    ) -> Result<Vec<ChunkUploadSession>, DrmError> {
        let rows = sqlx::query("SELECT * FROM chunk_upload_sessions")
            .fetch_all(&self.pool)
            .await
            .map_err(Self::map_sqlx)?;
        rows.iter()
            .map(Self::row_to_session)
            .collect::<Result<Vec<_>, _>>()
            .map(|sessions| sessions.into_iter().filter(|s| s.is_reapable(now, session_ttl, failed_ttl)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::schema;
    use audio_drm_domain::value_objects::{EncryptionKey, Iv};
    use tempfile::NamedTempFile;

    async fn repo() -> SqliteRepository {
        let temp = NamedTempFile::new().unwrap();
        let db_url = format!("sqlite://{}", temp.path().to_str().unwrap());
        drop(temp);
        let pool = schema::initialize_database(&db_url).await.unwrap();
        SqliteRepository::new(pool)
    }

    fn sample_file() -> AudioFile {
        AudioFile::new_encrypted(
            "book.mp3".to_string(),
            "encrypted_abc.mp3".to_string(),
            1_000,
            "audio/mpeg".to_string(),
            EncryptionKey::generate(),
            Iv::generate(),
            None,
        )
    }

    #[tokio::test]
    async fn create_then_get_file_round_trips() {
        let repo = repo().await;
        let file = sample_file();
        repo.create_file(file.clone()).await.unwrap();

        let fetched = repo.get_file(file.id).await.unwrap().unwrap();
        assert_eq!(fetched.filename, file.filename);
        assert_eq!(fetched.ciphertext_size, file.ciphertext_size);
        assert_eq!(fetched.encryption_key.unwrap().as_bytes(), file.encryption_key.unwrap().as_bytes());
    }

    #[tokio::test]
    async fn missing_file_returns_none() {
        let repo = repo().await;
        assert!(repo.get_file(FileId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_file_cascade_removes_chapters() {
        let repo = repo().await;
        let file = sample_file();
        repo.create_file(file.clone()).await.unwrap();

        let range = ChapterRange::new(0.0, Some(60.0)).unwrap();
        let chapter = Chapter::new_pending(file.id, "Intro".to_string(), range, 0);
        repo.create_chapter(chapter.clone()).await.unwrap();

        repo.delete_file_cascade(file.id).await.unwrap();
        assert!(repo.get_chapter(file.id, chapter.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_access_round_trips_and_expires() {
        let repo = repo().await;
        let file = sample_file();
        repo.create_file(file.clone()).await.unwrap();
        let user = UserId::new();

        let access = FileAccess::new(user, file.id, true, None);
        repo.upsert_file_access(access).await.unwrap();
        assert!(repo.get_file_access(user, file.id).await.unwrap().unwrap().is_active(Utc::now()));
    }

    #[tokio::test]
    async fn list_chapters_returns_order_ascending() {
        let repo = repo().await;
        let file = sample_file();
        repo.create_file(file.clone()).await.unwrap();

        let r1 = ChapterRange::new(60.0, Some(120.0)).unwrap();
        let r0 = ChapterRange::new(0.0, Some(60.0)).unwrap();
        repo.create_chapter(Chapter::new_pending(file.id, "Second".to_string(), r1, 1)).await.unwrap();
        repo.create_chapter(Chapter::new_pending(file.id, "First".to_string(), r0, 0)).await.unwrap();

        let chapters = repo.list_chapters(file.id).await.unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].order, 0);
        assert_eq!(chapters[1].order, 1);
    }

    #[tokio::test]
    async fn reapable_sessions_honors_ttls() {
        let repo = repo().await;
        let mut session = ChunkUploadSession::new(UserId::new(), "book.mp3".to_string(), 1_000, 3, None);
        session.created_at = Utc::now() - chrono::Duration::hours(25);
        repo.upsert_session(&session).await.unwrap();

        let reapable = repo.list_reapable_sessions(Utc::now(), chrono::Duration::hours(24), chrono::Duration::hours(2)).await.unwrap();
        assert_eq!(reapable.len(), 1);
        assert_eq!(reapable[0].upload_id, session.upload_id);
    }

    #[tokio::test]
    async fn is_admin_false_for_unknown_user() {
        let repo = repo().await;
        assert!(!repo.is_admin(UserId::new()).await.unwrap());
    }
}
