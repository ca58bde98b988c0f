// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `EnvelopeCryptoService` (§4.1): the port every use case encrypts and
//! decrypts through. The file-to-file operations are what the domain needs
//! to express; the direct-to-response streaming decrypt used by the Stream
//! Server (§4.6) is a richer capability of the concrete adapter that
//! application code in the infrastructure crate calls directly, since it
//! returns a `tokio`/`futures` streaming type this crate does not depend
//! on (this crate stays free of an async runtime, matching the teacher's
//! domain-layer rule).

use crate::error::DrmError;
use crate::value_objects::{AuthTag, EncryptionKey, Iv};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The envelope minted for a whole-file artifact (§3: `(key, iv)`, plus an
/// optional tag when the framing stores it inline rather than in the row).
#[derive(Debug, Clone)]
pub struct EnvelopeResult {
    pub key: EncryptionKey,
    pub iv: Iv,
    pub tag: Option<AuthTag>,
    pub plaintext_size: u64,
    pub ciphertext_size: u64,
}

/// The envelope minted for a chapter segment (§4.5 step 3): always carries
/// its own tag since Framing B keeps it in the row, never on disk.
#[derive(Debug, Clone)]
pub struct SegmentEnvelope {
    pub key: EncryptionKey,
    pub iv: Iv,
    pub tag: AuthTag,
    pub plaintext_size: u64,
    pub ciphertext_size: u64,
}

/// The JSON payload wrapped by `session-token`/`validate-session-token`
/// (§4.1): resource id, user id, issue time, a nonce and an expiry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionTokenPayload {
    pub resource_id: String,
    pub user_id: String,
    pub issued_at_ms: i64,
    pub nonce: String,
    pub expires_at_ms: i64,
}

impl SessionTokenPayload {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

#[async_trait]
pub trait EnvelopeCryptoService: Send + Sync {
    /// §4.1 `encrypt-file`: generates a random `(key, iv)`, streams `src`
    /// through the GCM encryptor and emits `dst`. Guarantees `dst` is
    /// removed on failure.
    async fn encrypt_file(&self, src: &Path, dst: &Path) -> Result<EnvelopeResult, DrmError>;

    /// §4.1 `decrypt-stream` file-to-file variant, used by the Chapter
    /// Materializer's "decrypt-to-temp" step. `AuthError` if the tag does
    /// not verify, `FormatError`-shaped `ValidationError` if too short.
    async fn decrypt_to_file(&self, src: &Path, dst: &Path, key: &EncryptionKey, iv: &Iv) -> Result<u64, DrmError>;

    /// §4.1 `encrypt-segment`: in-memory, used for small chapter buffers.
    fn encrypt_segment(&self, plaintext: &[u8]) -> Result<(SegmentEnvelope, Vec<u8>), DrmError>;

    /// §4.1 `decrypt-segment`: in-memory, used by the Stream Server for
    /// chapters below `chapter-db-threshold`.
    fn decrypt_segment(&self, ciphertext: &[u8], key: &EncryptionKey, iv: &Iv, tag: &AuthTag) -> Result<Vec<u8>, DrmError>;

    /// §4.1 `encrypt-segment-streaming`: file-in/file-out, never buffers
    /// more than the working-buffer size. Used by the Chapter Materializer.
    async fn encrypt_segment_streaming(&self, src: &Path, dst: &Path) -> Result<SegmentEnvelope, DrmError>;

    /// §4.1 `session-token`: encrypts `payload` with the process-wide
    /// session secret, returns `iv:tag:hex-ciphertext`.
    fn session_token(&self, payload: &SessionTokenPayload) -> Result<String, DrmError>;

    /// §4.1 `validate-session-token`: the inverse of `session_token`.
    /// `ExpiredSession`/`InvalidSession` map to `DrmError::AuthError`.
    fn validate_session_token(&self, token: &str) -> Result<SessionTokenPayload, DrmError>;
}
