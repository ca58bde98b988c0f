// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Tagged authorization decision (§9 Design Notes: "Dynamic route-level
//! variants (admin bypass scattered across controllers) -> tagged
//! authorization decision"), computed once per stream request and carried
//! through instead of being re-derived at every storage touchpoint.

use audio_drm_domain::entities::AudioFile;
use audio_drm_domain::error::DrmError;
use audio_drm_domain::ports::Repository;
use audio_drm_domain::value_objects::{AuthDecision, UserId};
use chrono::Utc;
use std::sync::Arc;

pub struct AuthorizationService {
    repository: Arc<dyn Repository>,
}

impl AuthorizationService {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// §4.6: admin bypass, else public, else an unexpired `FileAccess`
    /// grant, else deny. Takes an already-loaded `file` since every caller
    /// (Stream Server) has already fetched the row to check `is_public` and
    /// `is_encrypted` before getting here.
    pub async fn decide_for_file(&self, user: UserId, file: &AudioFile) -> Result<AuthDecision, DrmError> {
        if self.repository.is_admin(user).await? {
            return Ok(AuthDecision::Admin);
        }
        if file.is_public {
            return Ok(AuthDecision::Public);
        }
        if let Some(access) = self.repository.get_file_access(user, file.id).await? {
            let now = Utc::now();
            if access.is_active(now) {
                return Ok(AuthDecision::Owner { expires_at: access.expires_at });
            }
        }
        Ok(AuthDecision::Deny)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use audio_drm_domain::entities::{Chapter, ChunkUploadSession, FileAccess};
    use audio_drm_domain::value_objects::{ChapterId, EncryptionKey, FileId, Iv, UploadId};
    use chrono::{DateTime, Duration};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeRepository {
        admins: Mutex<Vec<UserId>>,
        accesses: Mutex<Vec<FileAccess>>,
    }

    #[async_trait]
    impl Repository for FakeRepository {
        async fn get_file(&self, _id: FileId) -> Result<Option<AudioFile>, DrmError> {
            unimplemented!()
        }
        async fn create_file(&self, _file: AudioFile) -> Result<(), DrmError> {
            unimplemented!()
        }
        async fn delete_file_cascade(&self, _id: FileId) -> Result<(), DrmError> {
            unimplemented!()
        }
        async fn get_file_access(&self, user: UserId, file: FileId) -> Result<Option<FileAccess>, DrmError> {
            Ok(self.accesses.lock().iter().find(|a| a.user_id == user && a.file_id == file).cloned())
        }
        async fn upsert_file_access(&self, access: FileAccess) -> Result<(), DrmError> {
            self.accesses.lock().push(access);
            Ok(())
        }
        async fn is_admin(&self, user: UserId) -> Result<bool, DrmError> {
            Ok(self.admins.lock().contains(&user))
        }
        async fn list_chapters(&self, _file_id: FileId) -> Result<Vec<Chapter>, DrmError> {
            unimplemented!()
        }
        async fn get_chapter(&self, _file_id: FileId, _chapter_id: ChapterId) -> Result<Option<Chapter>, DrmError> {
            unimplemented!()
        }
        async fn create_chapter(&self, _chapter: Chapter) -> Result<(), DrmError> {
            unimplemented!()
        }
        async fn update_chapter(&self, _chapter: &Chapter) -> Result<(), DrmError> {
            unimplemented!()
        }
        async fn delete_chapters(&self, _file_id: FileId) -> Result<(), DrmError> {
            unimplemented!()
        }
        async fn get_session(&self, _upload_id: UploadId) -> Result<Option<ChunkUploadSession>, DrmError> {
            unimplemented!()
        }
        async fn upsert_session(&self, _session: &ChunkUploadSession) -> Result<(), DrmError> {
            unimplemented!()
        }
        async fn delete_sessions_in(&self, _ids: &[UploadId]) -> Result<(), DrmError> {
            unimplemented!()
        }
        async fn list_reapable_sessions(
            &self,
            _now: DateTime<Utc>,
            _session_ttl: Duration,
            _failed_ttl: Duration,
        ) -> Result<Vec<ChunkUploadSession>, DrmError> {
            unimplemented!()
        }
    }

    fn file(is_public: bool) -> AudioFile {
        let mut file = AudioFile::new_encrypted(
            "book.mp3".to_string(),
            "uploads/encrypted_1.mp3".to_string(),
            1024,
            "audio/mpeg".to_string(),
            EncryptionKey::generate(),
            Iv::generate(),
            None,
        );
        file.is_public = is_public;
        file
    }

    #[tokio::test]
    async fn admin_bypasses_everything() {
        let repo = FakeRepository::default();
        let user = UserId::new();
        repo.admins.lock().push(user);
        let service = AuthorizationService::new(Arc::new(repo));

        let decision = service.decide_for_file(user, &file(false)).await.unwrap();
        assert_eq!(decision, AuthDecision::Admin);
    }

    #[tokio::test]
    async fn public_file_is_allowed_without_a_grant() {
        let service = AuthorizationService::new(Arc::new(FakeRepository::default()));
        let decision = service.decide_for_file(UserId::new(), &file(true)).await.unwrap();
        assert_eq!(decision, AuthDecision::Public);
    }

    #[tokio::test]
    async fn unexpired_grant_yields_owner() {
        let repo = FakeRepository::default();
        let user = UserId::new();
        let target = file(false);
        repo.accesses.lock().push(FileAccess::new(user, target.id, true, None));
        let service = AuthorizationService::new(Arc::new(repo));

        let decision = service.decide_for_file(user, &target).await.unwrap();
        assert_eq!(decision, AuthDecision::Owner { expires_at: None });
    }

    #[tokio::test]
    async fn no_grant_and_not_public_denies() {
        let service = AuthorizationService::new(Arc::new(FakeRepository::default()));
        let decision = service.decide_for_file(UserId::new(), &file(false)).await.unwrap();
        assert_eq!(decision, AuthDecision::Deny);
    }
}
