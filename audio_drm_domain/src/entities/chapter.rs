// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `Chapter` (§3): a streamable slice of a master, produced by the Chapter
//! Materializer (§4.5). `(label, start, order)` are fixed at create time;
//! the envelope fields and paths stay null until materialization commits
//! the row to `Ready`.

use crate::value_objects::{AuthTag, ChapterId, ChapterRange, EncryptionKey, FileId, Iv};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterStatus {
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Chapter {
    pub id: ChapterId,
    pub file_id: FileId,
    pub label: String,
    pub range: ChapterRange,
    /// Stable order index; no two chapters of one file share an `order`
    /// (§3).
    pub order: u32,
    pub status: ChapterStatus,
    pub relative_path: Option<String>,
    pub plaintext_size: Option<u64>,
    pub ciphertext_size: Option<u64>,
    pub encryption_key: Option<EncryptionKey>,
    pub iv: Option<Iv>,
    pub auth_tag: Option<AuthTag>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Chapter {
    pub fn new_pending(file_id: FileId, label: String, range: ChapterRange, order: u32) -> Self {
        Self {
            id: ChapterId::new(),
            file_id,
            label,
            range,
            order,
            status: ChapterStatus::Pending,
            relative_path: None,
            plaintext_size: None,
            ciphertext_size: None,
            encryption_key: None,
            iv: None,
            auth_tag: None,
            finalized_at: None,
        }
    }

    /// §4.5 step 4 "Commit": populate the envelope/path/size fields and
    /// flip the status to `Ready` atomically from the caller's perspective.
    pub fn mark_ready(
        &mut self,
        relative_path: String,
        plaintext_size: u64,
        ciphertext_size: u64,
        encryption_key: EncryptionKey,
        iv: Iv,
        auth_tag: AuthTag,
    ) {
        self.relative_path = Some(relative_path);
        self.plaintext_size = Some(plaintext_size);
        self.ciphertext_size = Some(ciphertext_size);
        self.encryption_key = Some(encryption_key);
        self.iv = Some(iv);
        self.auth_tag = Some(auth_tag);
        self.finalized_at = Some(Utc::now());
        self.status = ChapterStatus::Ready;
    }

    /// §4.5 failure policy: a failed chapter marks only itself failed; any
    /// partial output it wrote must already have been deleted by the
    /// caller before this is called.
    pub fn mark_failed(&mut self) {
        self.status = ChapterStatus::Failed;
    }

    /// §3 invariant: fully populated iff ready.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            ChapterStatus::Ready => {
                self.relative_path.is_some()
                    && self.plaintext_size.is_some()
                    && self.ciphertext_size.is_some()
                    && self.encryption_key.is_some()
                    && self.iv.is_some()
                    && self.auth_tag.is_some()
                    && self.finalized_at.is_some()
            }
            ChapterStatus::Pending | ChapterStatus::Failed => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_chapter_has_no_envelope_fields() {
        let range = ChapterRange::new(0.0, Some(60.0)).unwrap();
        let chapter = Chapter::new_pending(FileId::new(), "Intro".to_string(), range, 0);
        assert_eq!(chapter.status, ChapterStatus::Pending);
        assert!(chapter.relative_path.is_none());
        assert!(chapter.is_consistent());
    }

    #[test]
    fn mark_ready_populates_every_field() {
        let range = ChapterRange::new(0.0, Some(60.0)).unwrap();
        let mut chapter = Chapter::new_pending(FileId::new(), "Intro".to_string(), range, 0);
        chapter.mark_ready(
            "chapters/chapter_1_2_3.enc".to_string(),
            1_000,
            1_028,
            EncryptionKey::generate(),
            Iv::generate(),
            AuthTag::from_bytes([1u8; 16]),
        );
        assert_eq!(chapter.status, ChapterStatus::Ready);
        assert!(chapter.is_consistent());
    }

    #[test]
    fn mark_failed_leaves_fields_null() {
        let range = ChapterRange::new(0.0, None).unwrap();
        let mut chapter = Chapter::new_pending(FileId::new(), "Outro".to_string(), range, 1);
        chapter.mark_failed();
        assert_eq!(chapter.status, ChapterStatus::Failed);
        assert!(chapter.is_consistent());
    }
}
