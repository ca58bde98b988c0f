// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Stream Server (§4.6): validates a signed URL and its bearer, decides
//! authorization once via [`AuthorizationService`], then produces a
//! decrypted byte stream for either a master or a chapter. Holds the
//! concrete [`AesGcmEnvelopeCrypto`] adapter rather than the
//! `EnvelopeCryptoService` port, since the streaming-to-writer methods it
//! needs are a richer capability of the adapter than the domain port
//! expresses (see the port's module doc).

use crate::application::services::{AuthorizationService, ScopedTempFile};
use crate::application::use_cases::upload_ingest::guess_container;
use crate::infrastructure::adapters::encryption::AesGcmEnvelopeCrypto;
use crate::infrastructure::adapters::transcoder::Transcoder;
use crate::infrastructure::config::AppConfig;
use audio_drm_domain::entities::{Chapter, ChapterStatus};
use audio_drm_domain::error::DrmError;
use audio_drm_domain::ports::{EnvelopeCryptoService, Repository, SignedUrlCodec};
use audio_drm_domain::value_objects::{AuthDecision, ResourceRef, SignedTicket, UserId};
use std::net::IpAddr;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::{Child, ChildStdout};

/// Everything carried by a streaming request's query string (§4.2, §6):
/// the ticket itself, its claimed signature, and the bearer minted by
/// `session-token` at stream-url time.
#[derive(Debug, Clone)]
pub struct StreamRequestContext {
    pub ticket: SignedTicket,
    pub signature_hex: String,
    pub bearer_token: String,
    pub request_ip: IpAddr,
}

/// The decrypted body a handler writes to the response. `Memory` carries a
/// known `Content-Length`; `Async` is written as it decrypts and a handler
/// must stream it with chunked transfer encoding.
pub enum StreamBody {
    Memory(Vec<u8>),
    Async(Pin<Box<dyn AsyncRead + Send>>),
}

/// What a handler needs to write the §4.6 response: the body, the mime
/// type for `Content-Disposition`, a content length when known, and the
/// `X-Start-Time` the spec's mid-track-seek scenario names.
pub struct StreamPlan {
    pub body: StreamBody,
    pub mime_type: String,
    pub content_length: Option<u64>,
    pub start_seconds: i64,
}

pub struct StreamServer {
    repository: Arc<dyn Repository>,
    crypto: Arc<AesGcmEnvelopeCrypto>,
    signed_url_codec: Arc<dyn SignedUrlCodec>,
    transcoder: Arc<dyn Transcoder>,
    authorization: AuthorizationService,
    config: Arc<AppConfig>,
}

impl StreamServer {
    pub fn new(
        repository: Arc<dyn Repository>,
        crypto: Arc<AesGcmEnvelopeCrypto>,
        signed_url_codec: Arc<dyn SignedUrlCodec>,
        transcoder: Arc<dyn Transcoder>,
        config: Arc<AppConfig>,
    ) -> Self {
        let authorization = AuthorizationService::new(repository.clone());
        Self { repository, crypto, signed_url_codec, transcoder, authorization, config }
    }

    /// §4.6 master entry point. `start = 0` pipes the decrypt straight to
    /// the response; `start > 0` decrypts the master to a scoped temp file
    /// (the same "decrypt-to-temp" move the Chapter Materializer makes)
    /// and has the transcoder seek within it.
    pub async fn stream_master(&self, ctx: StreamRequestContext) -> Result<StreamPlan, DrmError> {
        let ResourceRef::Master(file_id) = ctx.ticket.resource else {
            return Err(DrmError::validation("ticket does not reference a master"));
        };

        let (file, _user, _decision) = self.authorize(&ctx).await?;
        let key = file.encryption_key.clone().ok_or_else(|| DrmError::validation("master has no encryption key"))?;
        let iv = file.iv.clone().ok_or_else(|| DrmError::validation("master has no iv"))?;
        let src = self.config.upload_root.join(&file.relative_path);

        let start_seconds = ctx.ticket.start_seconds;
        if start_seconds <= 0 {
            let body = self.direct_decrypt_master(src, key, iv);
            return Ok(StreamPlan { body: StreamBody::Async(body), mime_type: file.mime_type, content_length: None, start_seconds: 0 });
        }

        tracing::debug!(%file_id, start_seconds, "master stream seeking via transcoder");
        tokio::fs::create_dir_all(&self.config.temp_root).await?;
        let decrypted = ScopedTempFile::new(self.config.temp_root.join(format!("stream_dec_{file_id}_{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())));
        self.crypto.decrypt_to_file(&src, decrypted.path(), &key, &iv).await?;

        let container = guess_container(&file.filename);
        let child = self.transcoder.seek_stream(decrypted.path(), start_seconds as f64, container).await?;
        let body = self.transcoded_body(child, decrypted)?;

        Ok(StreamPlan { body: StreamBody::Async(body), mime_type: file.mime_type, content_length: None, start_seconds })
    }

    /// §4.6 chapter entry point. Chapters at or above
    /// `chapter-stream-threshold` are decrypted incrementally straight to
    /// the response; smaller ones are decrypted whole into memory.
    pub async fn stream_chapter(&self, ctx: StreamRequestContext) -> Result<StreamPlan, DrmError> {
        let ResourceRef::Chapter(file_id, chapter_id) = ctx.ticket.resource else {
            return Err(DrmError::validation("ticket does not reference a chapter"));
        };

        let (file, _user, _decision) = self.authorize(&ctx).await?;
        let chapter = self.repository.get_chapter(file_id, chapter_id).await?.ok_or_else(|| DrmError::not_found(format!("chapter {chapter_id} not found")))?;
        if chapter.status != ChapterStatus::Ready || !chapter.is_consistent() {
            return Err(DrmError::not_found(format!("chapter {chapter_id} is not ready")));
        }

        let relative_path = chapter.relative_path.clone().expect("ready chapter has a path");
        let key = chapter.encryption_key.clone().expect("ready chapter has a key");
        let iv = chapter.iv.clone().expect("ready chapter has an iv");
        let ciphertext_size = chapter.ciphertext_size.unwrap_or(0);
        let src = self.config.chapter_root.join(&relative_path);

        if ciphertext_size >= self.config.chapter_stream_threshold {
            tracing::debug!(%file_id, %chapter_id, ciphertext_size, "chapter stream served incrementally");
            let body = self.direct_decrypt_chapter(src, key, iv);
            return Ok(StreamPlan { body: StreamBody::Async(body), mime_type: file.mime_type, content_length: None, start_seconds: 0 });
        }

        // Chapters are always written in the streaming sub-header framing
        // (`ChapterMaterializer` always calls `encrypt_segment_streaming`),
        // so even the "small enough to buffer" path has to walk the chunk
        // stream rather than treat the file as one AEAD call - it just does
        // so into an in-memory `Vec<u8>` instead of a duplex pipe.
        tracing::debug!(%file_id, %chapter_id, ciphertext_size, "chapter stream served from memory");
        let mut plaintext = Vec::new();
        self.crypto.decrypt_segment_streaming_to_writer(&src, &key, &iv, &mut plaintext).await?;
        let len = plaintext.len() as u64;
        Ok(StreamPlan { body: StreamBody::Memory(plaintext), mime_type: file.mime_type, content_length: Some(len), start_seconds: 0 })
    }

    /// §4.2/§4.6 validation common to both entry points: bearer, then
    /// signature, then expiry, then IP binding, then the tagged
    /// authorization decision. Order matters - an expired or unsigned
    /// ticket never reaches a storage touch.
    async fn authorize(&self, ctx: &StreamRequestContext) -> Result<(audio_drm_domain::entities::AudioFile, UserId, AuthDecision), DrmError> {
        let payload = self.crypto.validate_session_token(&ctx.bearer_token)?;
        let now_ms = chrono::Utc::now().timestamp_millis();
        if payload.is_expired(now_ms) {
            return Err(DrmError::auth("session token expired"));
        }
        let user: UserId = payload.user_id.parse().map_err(|_| DrmError::auth("session token carries a malformed user id"))?;

        if !self.signed_url_codec.verify(&ctx.ticket, &ctx.signature_hex) {
            return Err(DrmError::auth("bad signature"));
        }
        if ctx.ticket.is_expired(now_ms) {
            return Err(DrmError::auth("signed url expired"));
        }
        if ctx.ticket.client_ip != ctx.request_ip {
            return Err(DrmError::auth("signed url is bound to a different client ip"));
        }

        let file_id = ctx.ticket.resource.file_id();
        let file = self.repository.get_file(file_id).await?.ok_or_else(|| DrmError::not_found(format!("file {file_id} not found")))?;

        let decision = self.authorization.decide_for_file(user, &file).await?;
        if !decision.is_allowed() {
            return Err(DrmError::forbidden(format!("user {user} may not access file {file_id}")));
        }

        Ok((file, user, decision))
    }

    /// Pipes Framing A (master) decryption straight into a duplex pipe's
    /// write half so the read half can be handed to the response as an
    /// `AsyncRead` without ever buffering the whole plaintext.
    fn direct_decrypt_master(&self, src: std::path::PathBuf, key: audio_drm_domain::value_objects::EncryptionKey, iv: audio_drm_domain::value_objects::Iv) -> Pin<Box<dyn AsyncRead + Send>> {
        let crypto = self.crypto.clone();
        let (mut write_half, read_half) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            if let Err(e) = crypto.decrypt_to_writer(&src, &key, &iv, &mut write_half).await {
                tracing::warn!(error = %e, "master stream decrypt failed mid-flight");
            }
        });
        Box::pin(read_half)
    }

    /// Same shape as `direct_decrypt_master` but for Framing B (chapter)
    /// ciphertext, which carries no leading iv prefix on disk.
    fn direct_decrypt_chapter(&self, src: std::path::PathBuf, key: audio_drm_domain::value_objects::EncryptionKey, iv: audio_drm_domain::value_objects::Iv) -> Pin<Box<dyn AsyncRead + Send>> {
        let crypto = self.crypto.clone();
        let (mut write_half, read_half) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            if let Err(e) = crypto.decrypt_segment_streaming_to_writer(&src, &key, &iv, &mut write_half).await {
                tracing::warn!(error = %e, "chapter stream decrypt failed mid-flight");
            }
        });
        Box::pin(read_half)
    }

    /// Wraps a spawned transcoder child in a guard that kills it on drop
    /// (§5 "transcoder receiving SIGKILL after a hard timeout" /
    /// client-disconnect cancellation), and keeps the decrypted-master
    /// temp file alive for exactly as long as the child needs it.
    fn transcoded_body(&self, mut child: Child, decrypted_master: ScopedTempFile) -> Result<Pin<Box<dyn AsyncRead + Send>>, DrmError> {
        let stdout = child.stdout.take().ok_or_else(|| DrmError::io("transcoder child has no stdout pipe"))?;
        Ok(Box::pin(TranscoderGuard { child, stdout, _decrypted_master: decrypted_master }))
    }
}

/// Delegates `AsyncRead` to the child's stdout; `Drop` sends `SIGKILL` so a
/// client disconnect tears the transcoder down instead of leaking it, and
/// keeps the master's scoped temp file alive until the process no longer
/// needs it.
struct TranscoderGuard {
    child: Child,
    stdout: ChildStdout,
    _decrypted_master: ScopedTempFile,
}

impl AsyncRead for TranscoderGuard {
    fn poll_read(self: Pin<&mut Self>, cx: &mut TaskContext<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.stdout).poll_read(cx, buf)
    }
}

impl Drop for TranscoderGuard {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::signed_url::HmacSignedUrlCodec;
    use crate::infrastructure::adapters::transcoder::ChapterCut;
    use async_trait::async_trait;
    use audio_drm_domain::entities::{AudioFile, ChunkUploadSession, FileAccess};
    use audio_drm_domain::value_objects::{ChapterId, EncryptionKey, FileId, Iv, END_OF_TRACK};
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use parking_lot::Mutex;
    use std::path::PathBuf;

    #[derive(Default)]
    struct FakeRepository {
        files: Mutex<Vec<AudioFile>>,
        admins: Mutex<Vec<UserId>>,
        accesses: Mutex<Vec<FileAccess>>,
    }

    #[async_trait]
    impl Repository for FakeRepository {
        async fn get_file(&self, id: FileId) -> Result<Option<AudioFile>, DrmError> {
            Ok(self.files.lock().iter().find(|f| f.id == id).cloned())
        }
        async fn create_file(&self, file: AudioFile) -> Result<(), DrmError> {
            self.files.lock().push(file);
            Ok(())
        }
        async fn delete_file_cascade(&self, _id: FileId) -> Result<(), DrmError> {
            unimplemented!()
        }
        async fn get_file_access(&self, user: UserId, file: FileId) -> Result<Option<FileAccess>, DrmError> {
            Ok(self.accesses.lock().iter().find(|a| a.user_id == user && a.file_id == file).cloned())
        }
        async fn upsert_file_access(&self, _access: FileAccess) -> Result<(), DrmError> {
            unimplemented!()
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
        async fn get_session(&self, _upload_id: audio_drm_domain::value_objects::UploadId) -> Result<Option<ChunkUploadSession>, DrmError> {
            unimplemented!()
        }
        async fn upsert_session(&self, _session: &ChunkUploadSession) -> Result<(), DrmError> {
            unimplemented!()
        }
        async fn delete_sessions_in(&self, _ids: &[audio_drm_domain::value_objects::UploadId]) -> Result<(), DrmError> {
            unimplemented!()
        }
        async fn list_reapable_sessions(&self, _now: DateTime<Utc>, _session_ttl: ChronoDuration, _failed_ttl: ChronoDuration) -> Result<Vec<ChunkUploadSession>, DrmError> {
            unimplemented!()
        }
    }

    struct FakeTranscoder;

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn probe_duration_seconds(&self, _path: &Path) -> Option<u32> {
            None
        }
        async fn cut(&self, _input: &Path, output: &Path, _start_seconds: f64, _end_seconds: Option<f64>, _container: &str) -> Result<ChapterCut, DrmError> {
            Ok(ChapterCut { output_path: output.to_path_buf() })
        }
        async fn seek_stream(&self, _input: &Path, _start_seconds: f64, _container: &str) -> Result<Child, DrmError> {
            unimplemented!("not exercised by the authorization unit tests")
        }
    }

    fn config() -> Arc<AppConfig> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(AppConfig {
            upload_root: dir.path().join("uploads"),
            chunks_root: dir.path().join("chunks"),
            chapter_root: dir.path().join("chapters"),
            temp_root: dir.path().join("temp"),
            max_file_bytes: 2 * 1024 * 1024 * 1024,
            chunk_bytes: 5 * 1024 * 1024,
            chapter_db_threshold: 10 * 1024 * 1024,
            chapter_stream_threshold: 50 * 1024 * 1024,
            max_concurrent_chapters: 3,
            chapter_processing_timeout: std::time::Duration::from_secs(300),
            ffmpeg_timeout: std::time::Duration::from_secs(120),
            memory_bands: crate::infrastructure::runtime::MemoryBandThresholds::default(),
            signed_url_secret: "signed-url-secret".to_string(),
            session_secret: "session-secret".to_string(),
            auth_jwt_secret: "auth-jwt-secret".to_string(),
            signed_url_ttl: std::time::Duration::from_secs(1800),
            chunk_session_ttl: ChronoDuration::hours(24),
            failed_session_ttl: ChronoDuration::hours(2),
            janitor_interval: std::time::Duration::from_secs(1800),
            database_url: "sqlite://:memory:".to_string(),
        })
    }

    fn server(repository: Arc<FakeRepository>) -> StreamServer {
        let config = config();
        let crypto = Arc::new(AesGcmEnvelopeCrypto::new(EncryptionKey::from_bytes([7u8; 32])));
        let signed_url_codec: Arc<dyn SignedUrlCodec> = Arc::new(HmacSignedUrlCodec::new(config.signed_url_secret.clone().into_bytes()));
        StreamServer::new(repository, crypto, signed_url_codec, Arc::new(FakeTranscoder), config)
    }

    fn bearer(crypto: &AesGcmEnvelopeCrypto, user: UserId, resource: &ResourceRef, now_ms: i64, ttl_ms: i64) -> String {
        let payload = audio_drm_domain::ports::SessionTokenPayload {
            resource_id: resource.to_string(),
            user_id: user.to_string(),
            issued_at_ms: now_ms,
            nonce: "n".to_string(),
            expires_at_ms: now_ms + ttl_ms,
        };
        crypto.session_token(&payload).unwrap()
    }

    fn file_row(id: FileId, public: bool) -> AudioFile {
        let mut file = AudioFile::new_encrypted(
            "book.mp3".to_string(),
            "encrypted_1.mp3".to_string(),
            1024,
            "audio/mpeg".to_string(),
            EncryptionKey::generate(),
            Iv::generate(),
            None,
        );
        file.id = id;
        file.is_public = public;
        file
    }

    #[tokio::test]
    async fn authorize_rejects_a_tampered_signature() {
        let repository = Arc::new(FakeRepository::default());
        let file_id = FileId::new();
        repository.files.lock().push(file_row(file_id, true));
        let crypto = Arc::new(AesGcmEnvelopeCrypto::new(EncryptionKey::from_bytes([7u8; 32])));

        let server = server(repository);
        let now_ms = Utc::now().timestamp_millis();
        let ticket = SignedTicket { resource: ResourceRef::Master(file_id), start_seconds: 0, end_seconds: END_OF_TRACK, expires_ms: now_ms + 60_000, client_ip: "10.0.0.1".parse().unwrap() };
        let bearer_token = bearer(&crypto, UserId::new(), &ticket.resource, now_ms, 60_000);

        let ctx = StreamRequestContext { ticket, signature_hex: "deadbeef".to_string(), bearer_token, request_ip: "10.0.0.1".parse().unwrap() };
        let result = server.authorize(&ctx).await;
        assert!(matches!(result, Err(DrmError::AuthError(_))));
    }

    #[tokio::test]
    async fn authorize_rejects_an_ip_mismatch() {
        let repository = Arc::new(FakeRepository::default());
        let file_id = FileId::new();
        repository.files.lock().push(file_row(file_id, true));
        let crypto = Arc::new(AesGcmEnvelopeCrypto::new(EncryptionKey::from_bytes([7u8; 32])));
        let config = config();
        let codec = HmacSignedUrlCodec::new(config.signed_url_secret.clone().into_bytes());

        let server = StreamServer::new(repository, crypto.clone(), Arc::new(codec.clone()), Arc::new(FakeTranscoder), config);
        let now_ms = Utc::now().timestamp_millis();
        let ticket = SignedTicket { resource: ResourceRef::Master(file_id), start_seconds: 0, end_seconds: END_OF_TRACK, expires_ms: now_ms + 60_000, client_ip: "10.0.0.1".parse().unwrap() };
        let signature_hex = codec.sign(&ticket);
        let bearer_token = bearer(&crypto, UserId::new(), &ticket.resource, now_ms, 60_000);

        let ctx = StreamRequestContext { ticket, signature_hex, bearer_token, request_ip: "10.0.0.2".parse().unwrap() };
        let result = server.authorize(&ctx).await;
        assert!(matches!(result, Err(DrmError::AuthError(_))));
    }

    #[tokio::test]
    async fn authorize_rejects_an_expired_ticket() {
        let repository = Arc::new(FakeRepository::default());
        let file_id = FileId::new();
        repository.files.lock().push(file_row(file_id, true));
        let crypto = Arc::new(AesGcmEnvelopeCrypto::new(EncryptionKey::from_bytes([7u8; 32])));
        let config = config();
        let codec = HmacSignedUrlCodec::new(config.signed_url_secret.clone().into_bytes());

        let server = StreamServer::new(repository, crypto.clone(), Arc::new(codec.clone()), Arc::new(FakeTranscoder), config);
        let now_ms = Utc::now().timestamp_millis();
        let ticket = SignedTicket { resource: ResourceRef::Master(file_id), start_seconds: 0, end_seconds: END_OF_TRACK, expires_ms: now_ms - 1, client_ip: "10.0.0.1".parse().unwrap() };
        let signature_hex = codec.sign(&ticket);
        let bearer_token = bearer(&crypto, UserId::new(), &ticket.resource, now_ms, 60_000);

        let ctx = StreamRequestContext { ticket, signature_hex, bearer_token, request_ip: "10.0.0.1".parse().unwrap() };
        let result = server.authorize(&ctx).await;
        assert!(matches!(result, Err(DrmError::AuthError(_))));
    }

    #[tokio::test]
    async fn authorize_denies_a_private_file_with_no_grant() {
        let repository = Arc::new(FakeRepository::default());
        let file_id = FileId::new();
        repository.files.lock().push(file_row(file_id, false));
        let crypto = Arc::new(AesGcmEnvelopeCrypto::new(EncryptionKey::from_bytes([7u8; 32])));
        let config = config();
        let codec = HmacSignedUrlCodec::new(config.signed_url_secret.clone().into_bytes());

        let server = StreamServer::new(repository, crypto.clone(), Arc::new(codec.clone()), Arc::new(FakeTranscoder), config);
        let now_ms = Utc::now().timestamp_millis();
        let ticket = SignedTicket { resource: ResourceRef::Master(file_id), start_seconds: 0, end_seconds: END_OF_TRACK, expires_ms: now_ms + 60_000, client_ip: "10.0.0.1".parse().unwrap() };
        let signature_hex = codec.sign(&ticket);
        let bearer_token = bearer(&crypto, UserId::new(), &ticket.resource, now_ms, 60_000);

        let ctx = StreamRequestContext { ticket, signature_hex, bearer_token, request_ip: "10.0.0.1".parse().unwrap() };
        let result = server.authorize(&ctx).await;
        assert!(matches!(result, Err(DrmError::ForbiddenError(_))));
    }

    #[tokio::test]
    async fn authorize_admits_a_public_file_with_a_valid_ticket() {
        let repository = Arc::new(FakeRepository::default());
        let file_id = FileId::new();
        repository.files.lock().push(file_row(file_id, true));
        let crypto = Arc::new(AesGcmEnvelopeCrypto::new(EncryptionKey::from_bytes([7u8; 32])));
        let config = config();
        let codec = HmacSignedUrlCodec::new(config.signed_url_secret.clone().into_bytes());

        let server = StreamServer::new(repository, crypto.clone(), Arc::new(codec.clone()), Arc::new(FakeTranscoder), config);
        let now_ms = Utc::now().timestamp_millis();
        let ticket = SignedTicket { resource: ResourceRef::Master(file_id), start_seconds: 0, end_seconds: END_OF_TRACK, expires_ms: now_ms + 60_000, client_ip: "10.0.0.1".parse().unwrap() };
        let signature_hex = codec.sign(&ticket);
        let bearer_token = bearer(&crypto, UserId::new(), &ticket.resource, now_ms, 60_000);

        let ctx = StreamRequestContext { ticket, signature_hex, bearer_token, request_ip: "10.0.0.1".parse().unwrap() };
        let (_file, _user, decision) = server.authorize(&ctx).await.unwrap();
        assert_eq!(decision, AuthDecision::Public);
    }

    #[tokio::test]
    async fn stream_chapter_serves_small_chapters_from_memory() {
        let repository = Arc::new(FakeRepository::default());
        let file_id = FileId::new();
        repository.files.lock().push(file_row(file_id, true));
        let crypto = Arc::new(AesGcmEnvelopeCrypto::new(EncryptionKey::from_bytes([7u8; 32])));
        let config = config();
        tokio::fs::create_dir_all(&config.chapter_root).await.unwrap();

        // Chapters are always written via the file-to-file streaming encryptor
        // (`ChapterMaterializer` never calls the in-memory `encrypt_segment`),
        // so the fixture must produce the same sub-header framing `stream_chapter`
        // decrypts, not a bare single-shot AEAD blob.
        let plaintext = b"chapter bytes".to_vec();
        let plain_src = config.temp_root.join("chapter_plain.bin");
        tokio::fs::create_dir_all(&config.temp_root).await.unwrap();
        tokio::fs::write(&plain_src, &plaintext).await.unwrap();
        let relative_path = "chapter_test.enc".to_string();
        let dest_path = config.chapter_root.join(&relative_path);
        let envelope = crypto.encrypt_segment_streaming(&plain_src, &dest_path).await.unwrap();

        let chapter_id = ChapterId::new();
        let mut chapter = Chapter::new_pending(file_id, "Ch1".to_string(), audio_drm_domain::value_objects::ChapterRange::new(0.0, None).unwrap(), 0);
        chapter.id = chapter_id;
        chapter.mark_ready(relative_path, envelope.plaintext_size, envelope.ciphertext_size, envelope.key, envelope.iv, envelope.tag);

        let codec = HmacSignedUrlCodec::new(config.signed_url_secret.clone().into_bytes());
        let ticket = SignedTicket {
            resource: ResourceRef::Chapter(file_id, chapter_id),
            start_seconds: 0,
            end_seconds: END_OF_TRACK,
            expires_ms: Utc::now().timestamp_millis() + 60_000,
            client_ip: "10.0.0.1".parse().unwrap(),
        };
        let signature_hex = codec.sign(&ticket);
        let now_ms = Utc::now().timestamp_millis();
        let bearer_token = bearer(&crypto, UserId::new(), &ticket.resource, now_ms, 60_000);

        repository.files.lock().last_mut().unwrap().id = file_id;

        struct ChapterRepository(Arc<FakeRepository>, Chapter);
        #[async_trait]
        impl Repository for ChapterRepository {
            async fn get_file(&self, id: FileId) -> Result<Option<AudioFile>, DrmError> {
                self.0.get_file(id).await
            }
            async fn create_file(&self, file: AudioFile) -> Result<(), DrmError> {
                self.0.create_file(file).await
            }
            async fn delete_file_cascade(&self, id: FileId) -> Result<(), DrmError> {
                self.0.delete_file_cascade(id).await
            }
            async fn get_file_access(&self, user: UserId, file: FileId) -> Result<Option<FileAccess>, DrmError> {
                self.0.get_file_access(user, file).await
            }
            async fn upsert_file_access(&self, access: FileAccess) -> Result<(), DrmError> {
                self.0.upsert_file_access(access).await
            }
            async fn is_admin(&self, user: UserId) -> Result<bool, DrmError> {
                self.0.is_admin(user).await
            }
            async fn list_chapters(&self, file_id: FileId) -> Result<Vec<Chapter>, DrmError> {
                self.0.list_chapters(file_id).await
            }
            async fn get_chapter(&self, _file_id: FileId, _chapter_id: ChapterId) -> Result<Option<Chapter>, DrmError> {
                Ok(Some(self.1.clone()))
            }
            async fn create_chapter(&self, chapter: Chapter) -> Result<(), DrmError> {
                self.0.create_chapter(chapter).await
            }
            async fn update_chapter(&self, chapter: &Chapter) -> Result<(), DrmError> {
                self.0.update_chapter(chapter).await
            }
            async fn delete_chapters(&self, file_id: FileId) -> Result<(), DrmError> {
                self.0.delete_chapters(file_id).await
            }
            async fn get_session(&self, upload_id: audio_drm_domain::value_objects::UploadId) -> Result<Option<ChunkUploadSession>, DrmError> {
                self.0.get_session(upload_id).await
            }
            async fn upsert_session(&self, session: &ChunkUploadSession) -> Result<(), DrmError> {
                self.0.upsert_session(session).await
            }
            async fn delete_sessions_in(&self, ids: &[audio_drm_domain::value_objects::UploadId]) -> Result<(), DrmError> {
                self.0.delete_sessions_in(ids).await
            }
            async fn list_reapable_sessions(&self, now: DateTime<Utc>, session_ttl: ChronoDuration, failed_ttl: ChronoDuration) -> Result<Vec<ChunkUploadSession>, DrmError> {
                self.0.list_reapable_sessions(now, session_ttl, failed_ttl).await
            }
        }

        let repository: Arc<dyn Repository> = Arc::new(ChapterRepository(repository, chapter));
        let signed_url_codec: Arc<dyn SignedUrlCodec> = Arc::new(codec);
        let server = StreamServer::new(repository, crypto, signed_url_codec, Arc::new(FakeTranscoder), config);

        let ctx = StreamRequestContext { ticket, signature_hex, bearer_token, request_ip: "10.0.0.1".parse().unwrap() };
        let plan = server.stream_chapter(ctx).await.unwrap();
        match plan.body {
            StreamBody::Memory(bytes) => assert_eq!(bytes, plaintext),
            StreamBody::Async(_) => panic!("expected an in-memory chapter body"),
        }
        assert_eq!(plan.content_length, Some(plaintext.len() as u64));
    }

    #[allow(dead_code)]
    fn _unused(_: PathBuf) {}
}
