//! Integration test for the chunked upload ingest pipeline (§4.3/§4.4):
//! `init` -> `write_chunk` (several, out of order) -> `finalize`, against
//! the real `ChunkStore` and `AesGcmEnvelopeCrypto` adapters with only the
//! repository and transcoder faked out, then an independent decrypt of
//! the produced ciphertext master to confirm it round-trips the upload.

use async_trait::async_trait;
use audio_drm::application::use_cases::UploadIngest;
use audio_drm::infrastructure::adapters::{AesGcmEnvelopeCrypto, ChunkStore, Transcoder};
use audio_drm::infrastructure::config::AppConfig;
use audio_drm::infrastructure::runtime::MemoryBandThresholds;
use audio_drm_domain::entities::{AudioFile, Chapter, ChunkUploadSession, FileAccess};
use audio_drm_domain::error::DrmError;
use audio_drm_domain::ports::{EnvelopeCryptoService, Repository};
use audio_drm_domain::value_objects::{ChapterId, EncryptionKey, FileId, UploadId, UserId};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::process::Child;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct FakeRepository {
    sessions: Mutex<Vec<ChunkUploadSession>>,
    files: Mutex<Vec<AudioFile>>,
}

#[async_trait]
impl Repository for FakeRepository {
    async fn get_file(&self, id: FileId) -> Result<Option<AudioFile>, DrmError> {
        Ok(self.files.lock().unwrap().iter().find(|f| f.id == id).cloned())
    }
    async fn create_file(&self, file: AudioFile) -> Result<(), DrmError> {
        self.files.lock().unwrap().push(file);
        Ok(())
    }
    async fn delete_file_cascade(&self, _id: FileId) -> Result<(), DrmError> {
        unimplemented!("not exercised by this test")
    }
    async fn get_file_access(&self, _user: UserId, _file: FileId) -> Result<Option<FileAccess>, DrmError> {
        unimplemented!("not exercised by this test")
    }
    async fn upsert_file_access(&self, _access: FileAccess) -> Result<(), DrmError> {
        unimplemented!("not exercised by this test")
    }
    async fn is_admin(&self, _user: UserId) -> Result<bool, DrmError> {
        unimplemented!("not exercised by this test")
    }
    async fn list_chapters(&self, _file_id: FileId) -> Result<Vec<Chapter>, DrmError> {
        unimplemented!("not exercised by this test")
    }
    async fn get_chapter(&self, _file_id: FileId, _chapter_id: ChapterId) -> Result<Option<Chapter>, DrmError> {
        unimplemented!("not exercised by this test")
    }
    async fn create_chapter(&self, _chapter: Chapter) -> Result<(), DrmError> {
        unimplemented!("not exercised by this test")
    }
    async fn update_chapter(&self, _chapter: &Chapter) -> Result<(), DrmError> {
        unimplemented!("not exercised by this test")
    }
    async fn delete_chapters(&self, _file_id: FileId) -> Result<(), DrmError> {
        unimplemented!("not exercised by this test")
    }
    async fn get_session(&self, upload_id: UploadId) -> Result<Option<ChunkUploadSession>, DrmError> {
        Ok(self.sessions.lock().unwrap().iter().find(|s| s.upload_id == upload_id).cloned())
    }
    async fn upsert_session(&self, session: &ChunkUploadSession) -> Result<(), DrmError> {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(existing) = sessions.iter_mut().find(|s| s.upload_id == session.upload_id) {
            *existing = session.clone();
        } else {
            sessions.push(session.clone());
        }
        Ok(())
    }
    async fn delete_sessions_in(&self, ids: &[UploadId]) -> Result<(), DrmError> {
        self.sessions.lock().unwrap().retain(|s| !ids.contains(&s.upload_id));
        Ok(())
    }
    async fn list_reapable_sessions(&self, _now: DateTime<Utc>, _session_ttl: chrono::Duration, _failed_ttl: chrono::Duration) -> Result<Vec<ChunkUploadSession>, DrmError> {
        unimplemented!("not exercised by this test")
    }
}

struct NoProbeTranscoder;

#[async_trait]
impl Transcoder for NoProbeTranscoder {
    async fn probe_duration_seconds(&self, _path: &Path) -> Option<u32> {
        None
    }
    async fn cut(&self, _input: &Path, _output: &Path, _start_seconds: f64, _end_seconds: Option<f64>, _container: &str) -> Result<audio_drm::infrastructure::adapters::ChapterCut, DrmError> {
        unimplemented!("not exercised by this test")
    }
    async fn seek_stream(&self, _input: &Path, _start_seconds: f64, _container: &str) -> Result<Child, DrmError> {
        unimplemented!("not exercised by this test")
    }
}

fn test_config(dir: &Path) -> std::sync::Arc<AppConfig> {
    std::sync::Arc::new(AppConfig {
        upload_root: dir.join("uploads"),
        chunks_root: dir.join("chunks"),
        chapter_root: dir.join("chapters"),
        temp_root: dir.join("temp"),
        max_file_bytes: 2 * 1024 * 1024 * 1024,
        chunk_bytes: 5 * 1024 * 1024,
        chapter_db_threshold: 10 * 1024 * 1024,
        chapter_stream_threshold: 50 * 1024 * 1024,
        max_concurrent_chapters: 3,
        chapter_processing_timeout: Duration::from_secs(300),
        ffmpeg_timeout: Duration::from_secs(120),
        memory_bands: MemoryBandThresholds::default(),
        signed_url_secret: "signed-url-secret".to_string(),
        session_secret: "session-secret".to_string(),
        auth_jwt_secret: "auth-jwt-secret".to_string(),
        signed_url_ttl: Duration::from_secs(1800),
        chunk_session_ttl: chrono::Duration::hours(24),
        failed_session_ttl: chrono::Duration::hours(2),
        janitor_interval: Duration::from_secs(1800),
        database_url: "sqlite://:memory:".to_string(),
    })
}

#[tokio::test]
async fn chunked_upload_finalizes_into_a_decryptable_master() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let repository = std::sync::Arc::new(FakeRepository::default());
    let chunk_store = std::sync::Arc::new(ChunkStore::new(config.chunks_root.clone()));
    let crypto = std::sync::Arc::new(AesGcmEnvelopeCrypto::new(EncryptionKey::from_bytes([3u8; 32])));
    let transcoder = std::sync::Arc::new(NoProbeTranscoder);

    let ingest = UploadIngest::new(repository.clone(), chunk_store, crypto.clone() as std::sync::Arc<dyn EnvelopeCryptoService>, transcoder, config.clone());

    let plaintext = vec![7u8; 200 * 1024 + 17];
    let chunks: Vec<&[u8]> = plaintext.chunks(64 * 1024).collect();
    let owner = UserId::new();

    let session = ingest.init(owner, "book.mp3".to_string(), plaintext.len() as u64, chunks.len() as u32, None).await.unwrap();

    // Written out of order: §4.3's chunk store must accept any arrival order.
    for index in (0..chunks.len() as u32).rev() {
        ingest.write_chunk(session.upload_id, index, chunks[index as usize]).await.unwrap();
    }

    let status = ingest.status(session.upload_id).await.unwrap();
    assert_eq!(status.uploaded_chunks, chunks.len() as u32);

    let file = ingest.finalize(session.upload_id).await.unwrap();
    assert!(file.is_encrypted);
    assert_eq!(file.mime_type, "audio/mpeg");

    let ciphertext_path = config.upload_root.join(&file.relative_path);
    let ciphertext = tokio::fs::read(&ciphertext_path).await.unwrap();
    assert_ne!(ciphertext, plaintext, "master must not be stored as plaintext");

    let decrypted_path = dir.path().join("roundtrip.bin");
    crypto
        .decrypt_to_file(&ciphertext_path, &decrypted_path, file.encryption_key.as_ref().unwrap(), file.iv.as_ref().unwrap())
        .await
        .unwrap();
    let decrypted = tokio::fs::read(&decrypted_path).await.unwrap();
    assert_eq!(decrypted, plaintext);

    assert_eq!(repository.files.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn finalize_rejects_a_mismatched_declared_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let repository = std::sync::Arc::new(FakeRepository::default());
    let chunk_store = std::sync::Arc::new(ChunkStore::new(config.chunks_root.clone()));
    let crypto = std::sync::Arc::new(AesGcmEnvelopeCrypto::new(EncryptionKey::from_bytes([3u8; 32])));
    let transcoder = std::sync::Arc::new(NoProbeTranscoder);

    let ingest = UploadIngest::new(repository.clone(), chunk_store, crypto as std::sync::Arc<dyn EnvelopeCryptoService>, transcoder, config);

    let owner = UserId::new();
    let session = ingest
        .init(owner, "book.mp3".to_string(), 8, 1, Some("0".repeat(64)))
        .await
        .unwrap();
    ingest.write_chunk(session.upload_id, 0, b"mismatch").await.unwrap();

    let result = ingest.finalize(session.upload_id).await;
    assert!(matches!(result, Err(DrmError::IntegrityError(_))));
    assert!(repository.files.lock().unwrap().is_empty(), "no AudioFile row on a checksum mismatch (§8)");
}
