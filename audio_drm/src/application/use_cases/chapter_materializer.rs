// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Chapter Materializer (§4.5) - the memory-critical core. Decrypts the
//! master to a temp file once, then for each pending chapter: cuts a
//! self-contained segment with the transcoder, re-encrypts it streaming,
//! and commits the row. Batches are sized by the Memory Governor so a
//! 2 GiB host never holds more than one chapter's working set at a time.

use crate::application::services::ScopedTempFile;
use crate::application::use_cases::upload_ingest::guess_container;
use crate::infrastructure::config::AppConfig;
use audio_drm_domain::entities::{Chapter, ChapterStatus};
use audio_drm_domain::error::DrmError;
use audio_drm_domain::ports::{EnvelopeCryptoService, MemoryGovernor, Repository};
use audio_drm_domain::value_objects::FileId;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// §4.5 "polling with a 30 s cap" between batches.
const GOVERNOR_WAIT_CAP: Duration = Duration::from_secs(30);

pub struct ChapterMaterializer {
    repository: Arc<dyn Repository>,
    crypto: Arc<dyn EnvelopeCryptoService>,
    transcoder: Arc<dyn crate::infrastructure::adapters::Transcoder>,
    governor: Arc<dyn MemoryGovernor>,
    config: Arc<AppConfig>,
}

impl ChapterMaterializer {
    pub fn new(
        repository: Arc<dyn Repository>,
        crypto: Arc<dyn EnvelopeCryptoService>,
        transcoder: Arc<dyn crate::infrastructure::adapters::Transcoder>,
        governor: Arc<dyn MemoryGovernor>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self { repository, crypto, transcoder, governor, config }
    }

    /// Runs every `Pending` chapter of `file_id` to completion or failure.
    /// A step-1 decrypt failure aborts the whole run and leaves every
    /// chapter `Pending` (§4.5 failure policy); a per-chapter failure
    /// after that only marks that chapter `Failed`.
    pub async fn materialize(&self, file_id: FileId) -> Result<(), DrmError> {
        let file = self.repository.get_file(file_id).await?.ok_or_else(|| DrmError::not_found(format!("file {file_id} not found")))?;
        let key = file.encryption_key.clone().ok_or_else(|| DrmError::validation("master has no encryption key"))?;
        let iv = file.iv.clone().ok_or_else(|| DrmError::validation("master has no iv"))?;

        let mut pending: Vec<Chapter> = self
            .repository
            .list_chapters(file_id)
            .await?
            .into_iter()
            .filter(|c| c.status == ChapterStatus::Pending)
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.config.temp_root).await?;
        let extension = Path::new(&file.filename).extension().and_then(|e| e.to_str()).unwrap_or("bin");
        let decrypted = ScopedTempFile::new(self.config.temp_root.join(format!("dec_{file_id}.{extension}")));

        self.crypto.decrypt_to_file(&self.config.upload_root.join(&file.relative_path), decrypted.path(), &key, &iv).await?;

        let container = guess_container(&file.filename);

        while !pending.is_empty() {
            let batch_width = self.governor.admit(self.config.max_concurrent_chapters).max(1).min(pending.len());
            let batch: Vec<Chapter> = pending.drain(..batch_width).collect();

            let outcomes = futures::future::join_all(batch.into_iter().map(|chapter| self.materialize_one(file_id, decrypted.path(), container, chapter))).await;
            for outcome in outcomes {
                if let Err(e) = outcome {
                    tracing::warn!(%file_id, error = %e, "chapter materialization failed, isolated to that chapter");
                }
            }

            if !pending.is_empty() {
                self.governor.request_gc_hint();
                self.governor.wait_for_safe(GOVERNOR_WAIT_CAP).await;
            }
        }

        Ok(())
    }

    /// Steps 2-4 of §4.5 for one chapter. Returns `Err` only to report the
    /// failure to the caller's log; the chapter row itself is always left
    /// in a terminal, consistent state (`Ready` or `Failed`) before this
    /// returns.
    async fn materialize_one(&self, file_id: FileId, decrypted_master: &Path, container: &str, mut chapter: Chapter) -> Result<(), DrmError> {
        let result = self.cut_and_encrypt(file_id, decrypted_master, container, &chapter).await;
        match result {
            Ok((relative_path, plaintext_size, ciphertext_size, key, iv, tag)) => {
                chapter.mark_ready(relative_path, plaintext_size, ciphertext_size, key, iv, tag);
                self.repository.update_chapter(&chapter).await?;
                Ok(())
            }
            Err(e) => {
                chapter.mark_failed();
                self.repository.update_chapter(&chapter).await?;
                Err(e)
            }
        }
    }

    #[allow(clippy::type_complexity)]
    async fn cut_and_encrypt(
        &self,
        file_id: FileId,
        decrypted_master: &Path,
        container: &str,
        chapter: &Chapter,
    ) -> Result<(String, u64, u64, audio_drm_domain::value_objects::EncryptionKey, audio_drm_domain::value_objects::Iv, audio_drm_domain::value_objects::AuthTag), DrmError> {
        let chunk_temp = ScopedTempFile::new(self.config.temp_root.join(format!("chapter_{file_id}_{}_{}.tmp", chapter.id, chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())));

        self.transcoder
            .cut(decrypted_master, chunk_temp.path(), chapter.range.start_seconds(), chapter.range.end_seconds(), container)
            .await?;

        let plaintext_size = tokio::fs::metadata(chunk_temp.path()).await?.len();

        let relative_path = format!("chapter_{file_id}_{}_{}.enc", chapter.id, chrono::Utc::now().timestamp());
        let dest_path = self.config.chapter_root.join(&relative_path);
        tokio::fs::create_dir_all(&self.config.chapter_root).await?;

        let envelope = self.crypto.encrypt_segment_streaming(chunk_temp.path(), &dest_path).await?;

        Ok((relative_path, plaintext_size, envelope.ciphertext_size, envelope.key, envelope.iv, envelope.tag))
    }
}
