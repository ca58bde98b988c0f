// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Ingest Assembler (§4.3, §4.4): `init` opens a `ChunkUploadSession` and a
//! matching Chunk Store directory, `write_chunk` lands one chunk at a time,
//! `finalize` assembles the chunks into a plaintext temp file, optionally
//! verifies the declared SHA-256, runs Envelope Crypto once to produce the
//! canonical master ciphertext, and registers the `AudioFile` row.

use crate::infrastructure::adapters::chunk_store::{ChunkSessionMetadata, ChunkStore};
use crate::infrastructure::adapters::Transcoder;
use crate::infrastructure::config::AppConfig;
use audio_drm_domain::entities::{AudioFile, ChunkUploadSession, UploadStatus};
use audio_drm_domain::error::DrmError;
use audio_drm_domain::ports::{EnvelopeCryptoService, Repository};
use audio_drm_domain::services::Sha256Accumulator;
use audio_drm_domain::value_objects::{UploadId, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;

use super::super::services::ScopedTempFile;

/// §4.4 "schedules the chunk subdirectory for janitorial deletion after a
/// short grace period" - long enough for an in-flight status poll issued
/// just before finalize to still find the session, short enough that a
/// busy upload directory does not linger.
const FINALIZE_GRACE_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct UploadStatusView {
    pub status: UploadStatus,
    pub uploaded_chunks: u32,
    pub total_chunks: u32,
}

pub struct UploadIngest {
    repository: Arc<dyn Repository>,
    chunk_store: Arc<ChunkStore>,
    crypto: Arc<dyn EnvelopeCryptoService>,
    transcoder: Arc<dyn Transcoder>,
    config: Arc<AppConfig>,
}

impl UploadIngest {
    pub fn new(
        repository: Arc<dyn Repository>,
        chunk_store: Arc<ChunkStore>,
        crypto: Arc<dyn EnvelopeCryptoService>,
        transcoder: Arc<dyn Transcoder>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self { repository, chunk_store, crypto, transcoder, config }
    }

    pub async fn init(
        &self,
        owner_user_id: UserId,
        filename: String,
        declared_size: u64,
        total_chunks: u32,
        declared_sha256: Option<String>,
    ) -> Result<ChunkUploadSession, DrmError> {
        if declared_size == 0 || declared_size > self.config.max_file_bytes {
            return Err(DrmError::validation(format!("declared size {declared_size} is outside the admissible range")));
        }
        if total_chunks == 0 {
            return Err(DrmError::validation("total-chunks must be at least 1"));
        }

        let session = ChunkUploadSession::new(owner_user_id, filename.clone(), declared_size, total_chunks, declared_sha256);
        let metadata = ChunkSessionMetadata {
            upload_id: session.upload_id.to_string(),
            filename,
            declared_size,
            total_chunks,
            declared_sha256: session.declared_sha256.clone(),
            mime_type: guess_mime_type(&session.filename),
            last_activity: session.last_activity,
        };

        self.chunk_store.init_session(session.upload_id, &metadata).await?;
        self.repository.upsert_session(&session).await?;
        Ok(session)
    }

    pub async fn write_chunk(&self, upload_id: UploadId, index: u32, bytes: &[u8]) -> Result<(), DrmError> {
        let mut session = self.load_uploading_session(upload_id).await?;
        if index >= session.total_chunks {
            return Err(DrmError::validation(format!("chunk index {index} is out of range for {} total chunks", session.total_chunks)));
        }

        self.chunk_store.write_chunk(upload_id, index, bytes, self.config.chunk_bytes).await?;

        session.touch();
        self.repository.upsert_session(&session).await?;
        Ok(())
    }

    pub async fn status(&self, upload_id: UploadId) -> Result<UploadStatusView, DrmError> {
        let session = self.repository.get_session(upload_id).await?.ok_or_else(|| DrmError::not_found(format!("upload {upload_id} not found")))?;
        let uploaded_chunks = self.chunk_store.uploaded_chunk_count(upload_id, session.total_chunks).await;
        Ok(UploadStatusView { status: session.status, uploaded_chunks, total_chunks: session.total_chunks })
    }

    /// §4.4. Aborts with `IntegrityError` (and leaves no `AudioFile` row,
    /// per the property in §8) when a declared hash is present and does
    /// not match the assembled plaintext.
    pub async fn finalize(&self, upload_id: UploadId) -> Result<AudioFile, DrmError> {
        let mut session = self.load_uploading_session(upload_id).await?;

        let temp_dir = self.config.temp_root.clone();
        tokio::fs::create_dir_all(&temp_dir).await?;
        let plaintext_temp = ScopedTempFile::new(temp_dir.join(format!("upload_{upload_id}.plaintext")));

        let result = self.chunk_store.assemble_into(upload_id, session.total_chunks, plaintext_temp.path()).await;
        let assembled = match result {
            Ok(size) => size,
            Err(e) => {
                session.mark_failed();
                self.repository.upsert_session(&session).await?;
                return Err(e);
            }
        };

        if let Some(declared) = session.declared_sha256.clone() {
            let computed = hash_file(plaintext_temp.path()).await?;
            if !Sha256Accumulator::matches(&declared, &computed) {
                session.mark_failed();
                self.repository.upsert_session(&session).await?;
                return Err(DrmError::integrity(format!("declared sha256 {declared} does not match assembled plaintext {computed}")));
            }
        }

        let extension = extension_of(&session.filename);
        let relative_path = format!("encrypted_{upload_id}.{extension}");
        let dest_path = self.config.upload_root.join(&relative_path);
        if let Some(parent) = dest_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let envelope = self.crypto.encrypt_file(plaintext_temp.path(), &dest_path).await?;
        let _ = assembled;

        let mime_type = self
            .chunk_store
            .read_metadata(upload_id)
            .await?
            .map(|m| m.mime_type)
            .unwrap_or_else(|| guess_mime_type(&session.filename));

        // §4.4: the duration probe is non-fatal. A master with no duration
        // still streams fine; only chapter end-of-track math needs it.
        let duration_seconds = self.transcoder.probe_duration_seconds(plaintext_temp.path()).await.unwrap_or(0);

        let file = AudioFile::new_encrypted(
            session.filename.clone(),
            relative_path,
            envelope.ciphertext_size,
            mime_type,
            envelope.key,
            envelope.iv,
            envelope.tag,
        )
        .with_duration_seconds(duration_seconds);

        self.repository.create_file(file.clone()).await?;

        session.mark_completed();
        self.repository.upsert_session(&session).await?;

        let chunk_store = self.chunk_store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(FINALIZE_GRACE_PERIOD).await;
            if let Err(e) = chunk_store.remove_session_dir(upload_id).await {
                tracing::warn!(%upload_id, error = %e, "failed to reclaim chunk directory after finalize");
            }
        });

        Ok(file)
    }

    /// Idempotent: cancelling an already-gone or already-finalized upload
    /// is not an error, matching the §5 cancellation rule that the client
    /// and the Janitor may race to the same outcome.
    pub async fn cancel(&self, upload_id: UploadId) -> Result<(), DrmError> {
        if let Some(mut session) = self.repository.get_session(upload_id).await? {
            session.mark_failed();
            self.repository.upsert_session(&session).await?;
        }
        self.chunk_store.remove_session_dir(upload_id).await
    }

    async fn load_uploading_session(&self, upload_id: UploadId) -> Result<ChunkUploadSession, DrmError> {
        let session = self.repository.get_session(upload_id).await?.ok_or_else(|| DrmError::not_found(format!("upload {upload_id} not found")))?;
        if session.status != UploadStatus::Uploading {
            return Err(DrmError::validation(format!("upload {upload_id} is no longer accepting chunks")));
        }
        Ok(session)
    }
}

async fn hash_file(path: &std::path::Path) -> Result<String, DrmError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut accumulator = Sha256Accumulator::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        accumulator.update(&buf[..read]);
    }
    Ok(accumulator.finalize_hex())
}

fn extension_of(filename: &str) -> &str {
    std::path::Path::new(filename).extension().and_then(|e| e.to_str()).unwrap_or("bin")
}

/// Best-effort content-type guess from the declared filename's extension.
/// Used only to populate `AudioFile.mime_type`; never trusted for
/// authorization or transcoder container selection.
pub fn guess_mime_type(filename: &str) -> String {
    match extension_of(filename).to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "m4a" | "m4b" => "audio/mp4",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "ogg" | "oga" => "audio/ogg",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Maps a declared filename's extension to the container name the
/// transcoder's `-f` flag expects for §4.5 step-2 cuts and §4.6 seeks.
pub fn guess_container(filename: &str) -> &'static str {
    match extension_of(filename).to_ascii_lowercase().as_str() {
        "mp3" => "mp3",
        "m4a" | "m4b" | "mp4" => "mp4",
        "aac" => "adts",
        "flac" => "flac",
        "ogg" | "oga" => "ogg",
        "wav" => "wav",
        _ => "mp3",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_mime_type_from_extension() {
        assert_eq!(guess_mime_type("book.mp3"), "audio/mpeg");
        assert_eq!(guess_mime_type("book.M4A"), "audio/mp4");
        assert_eq!(guess_mime_type("book.xyz"), "application/octet-stream");
    }

    #[test]
    fn guesses_container_from_extension() {
        assert_eq!(guess_container("book.mp3"), "mp3");
        assert_eq!(guess_container("book.flac"), "flac");
        assert_eq!(guess_container("book.unknown"), "mp3");
    }
}
