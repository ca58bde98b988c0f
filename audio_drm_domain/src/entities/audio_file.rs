// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `AudioFile` (§3): the encrypted master. Created by the Ingest Assembler,
//! deleted only via an admin action that cascades to `FileAccess`,
//! `ChunkUploadSession` and `Chapter` rows (the Repository owns the cascade,
//! §6).

use crate::value_objects::{AuthTag, EncryptionKey, FileId, Iv};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct AudioFile {
    pub id: FileId,
    pub filename: String,
    /// Path to the ciphertext, relative to `upload-root`.
    pub relative_path: String,
    /// Ciphertext size in bytes, including the IV/tag framing overhead.
    pub ciphertext_size: u64,
    /// Plaintext duration in seconds; 0 when the transcoder probe failed or
    /// was never run (§4.4 - non-fatal).
    pub duration_seconds: u32,
    pub mime_type: String,
    pub is_public: bool,
    pub is_encrypted: bool,
    pub encryption_key: Option<EncryptionKey>,
    pub iv: Option<Iv>,
    pub auth_tag: Option<AuthTag>,
    pub created_at: DateTime<Utc>,
}

impl AudioFile {
    /// Builds a freshly-ingested master. Callers go through the Ingest
    /// Assembler (§4.4), which is the only place a `(key, iv)` pair is
    /// minted for a master.
    #[allow(clippy::too_many_arguments)]
    pub fn new_encrypted(
        filename: String,
        relative_path: String,
        ciphertext_size: u64,
        mime_type: String,
        encryption_key: EncryptionKey,
        iv: Iv,
        auth_tag: Option<AuthTag>,
    ) -> Self {
        Self {
            id: FileId::new(),
            filename,
            relative_path,
            ciphertext_size,
            duration_seconds: 0,
            mime_type,
            is_public: false,
            is_encrypted: true,
            encryption_key: Some(encryption_key),
            iv: Some(iv),
            auth_tag,
            created_at: Utc::now(),
        }
    }

    /// §3 invariant: an encrypted file must carry both halves of its
    /// envelope key.
    pub fn has_complete_envelope(&self) -> bool {
        !self.is_encrypted || (self.encryption_key.is_some() && self.iv.is_some())
    }

    /// Overrides the duration probed from the plaintext after finalize (§4.4).
    pub fn with_duration_seconds(mut self, duration_seconds: u32) -> Self {
        self.duration_seconds = duration_seconds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AudioFile {
        AudioFile::new_encrypted(
            "book.mp3".to_string(),
            "uploads/encrypted_abc.mp3".to_string(),
            500_000_028,
            "audio/mpeg".to_string(),
            EncryptionKey::generate(),
            Iv::generate(),
            Some(AuthTag::from_bytes([0u8; 16])),
        )
    }

    #[test]
    fn new_master_starts_private_with_zero_duration() {
        let file = sample();
        assert!(!file.is_public);
        assert_eq!(file.duration_seconds, 0);
        assert!(file.has_complete_envelope());
    }
}
