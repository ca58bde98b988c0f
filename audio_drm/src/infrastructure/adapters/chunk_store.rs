// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Chunk Store (§4.3): a filesystem directory rooted at `chunks-root`, one
//! subdirectory per upload holding raw `chunk_<index>` files and a
//! `metadata.json` sidecar. Chunk writes are idempotent (last-writer-wins,
//! §4.3 Concurrency) and never encrypted - the envelope is applied once,
//! at finalize.

use audio_drm_domain::error::DrmError;
use audio_drm_domain::value_objects::UploadId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSessionMetadata {
    pub upload_id: String,
    pub filename: String,
    pub declared_size: u64,
    pub total_chunks: u32,
    pub declared_sha256: Option<String>,
    pub mime_type: String,
    pub last_activity: chrono::DateTime<chrono::Utc>,
}

pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn upload_dir(&self, upload_id: UploadId) -> PathBuf {
        self.root.join(upload_id.to_string())
    }

    fn chunk_path(&self, upload_id: UploadId, index: u32) -> PathBuf {
        self.upload_dir(upload_id).join(format!("chunk_{index}"))
    }

    fn metadata_path(&self, upload_id: UploadId) -> PathBuf {
        self.upload_dir(upload_id).join("metadata.json")
    }

    pub async fn init_session(&self, upload_id: UploadId, metadata: &ChunkSessionMetadata) -> Result<(), DrmError> {
        fs::create_dir_all(self.upload_dir(upload_id)).await?;
        self.write_metadata(upload_id, metadata).await
    }

    pub async fn write_metadata(&self, upload_id: UploadId, metadata: &ChunkSessionMetadata) -> Result<(), DrmError> {
        let json = serde_json::to_vec_pretty(metadata)?;
        fs::write(self.metadata_path(upload_id), json).await?;
        Ok(())
    }

    pub async fn read_metadata(&self, upload_id: UploadId) -> Result<Option<ChunkSessionMetadata>, DrmError> {
        match fs::read(self.metadata_path(upload_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes a chunk. Idempotent: re-uploading `index` overwrites via a
    /// rename-into-place so a concurrent reader never observes a partial
    /// write (§4.3 "last-writer-wins and acceptable").
    pub async fn write_chunk(&self, upload_id: UploadId, index: u32, bytes: &[u8], max_chunk_bytes: u64) -> Result<(), DrmError> {
        if bytes.len() as u64 > max_chunk_bytes {
            return Err(DrmError::validation(format!("chunk {index} of {} bytes exceeds the {max_chunk_bytes} byte ceiling", bytes.len())));
        }
        let dir = self.upload_dir(upload_id);
        fs::create_dir_all(&dir).await?;

        let tmp_path = dir.join(format!("chunk_{index}.part"));
        {
            let mut tmp = fs::File::create(&tmp_path).await?;
            tmp.write_all(bytes).await?;
            tmp.flush().await?;
        }
        fs::rename(&tmp_path, self.chunk_path(upload_id, index)).await?;
        Ok(())
    }

    pub async fn chunk_exists(&self, upload_id: UploadId, index: u32) -> bool {
        fs::metadata(self.chunk_path(upload_id, index)).await.is_ok()
    }

    pub async fn uploaded_chunk_count(&self, upload_id: UploadId, total_chunks: u32) -> u32 {
        let mut count = 0;
        for index in 0..total_chunks {
            if self.chunk_exists(upload_id, index).await {
                count += 1;
            }
        }
        count
    }

    /// §4.4: verifies `chunk_0..chunk_{N-1}` all exist, then streams them in
    /// index order into `dst`, returning the assembled byte count.
    pub async fn assemble_into(&self, upload_id: UploadId, total_chunks: u32, dst: &Path) -> Result<u64, DrmError> {
        for index in 0..total_chunks {
            if !self.chunk_exists(upload_id, index).await {
                return Err(DrmError::validation(format!("upload incomplete: chunk {index} missing")));
            }
        }

        let mut out = fs::File::create(dst).await?;
        let mut total: u64 = 0;
        for index in 0..total_chunks {
            let bytes = fs::read(self.chunk_path(upload_id, index)).await?;
            out.write_all(&bytes).await?;
            total += bytes.len() as u64;
        }
        out.flush().await?;
        Ok(total)
    }

    /// §4.7 Janitor: removes the whole upload directory.
    pub async fn remove_session_dir(&self, upload_id: UploadId) -> Result<(), DrmError> {
        match fs::remove_dir_all(self.upload_dir(upload_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn metadata(upload_id: UploadId) -> ChunkSessionMetadata {
        ChunkSessionMetadata {
            upload_id: upload_id.to_string(),
            filename: "book.mp3".to_string(),
            declared_size: 15,
            total_chunks: 3,
            declared_sha256: None,
            mime_type: "audio/mpeg".to_string(),
            last_activity: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn writes_and_assembles_chunks_in_order() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        let upload_id = UploadId::new();

        store.init_session(upload_id, &metadata(upload_id)).await.unwrap();
        store.write_chunk(upload_id, 0, b"aaaaa", 10).await.unwrap();
        store.write_chunk(upload_id, 1, b"bbbbb", 10).await.unwrap();
        store.write_chunk(upload_id, 2, b"ccccc", 10).await.unwrap();

        let dst = dir.path().join("assembled.bin");
        let total = store.assemble_into(upload_id, 3, &dst).await.unwrap();
        assert_eq!(total, 15);
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"aaaaabbbbbccccc");
    }

    #[tokio::test]
    async fn re_uploading_a_chunk_overwrites_it() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        let upload_id = UploadId::new();

        store.write_chunk(upload_id, 0, b"first", 10).await.unwrap();
        store.write_chunk(upload_id, 0, b"secnd", 10).await.unwrap();

        let bytes = tokio::fs::read(store.chunk_path(upload_id, 0)).await.unwrap();
        assert_eq!(bytes, b"secnd");
    }

    #[tokio::test]
    async fn assemble_fails_when_a_chunk_is_missing() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        let upload_id = UploadId::new();

        store.write_chunk(upload_id, 0, b"aaaaa", 10).await.unwrap();
        // chunk 1 missing
        let dst = dir.path().join("assembled.bin");
        let result = store.assemble_into(upload_id, 2, &dst).await;
        assert!(matches!(result, Err(DrmError::ValidationError(_))));
    }

    #[tokio::test]
    async fn rejects_chunk_above_ceiling() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        let upload_id = UploadId::new();
        let result = store.write_chunk(upload_id, 0, &vec![0u8; 20], 10).await;
        assert!(matches!(result, Err(DrmError::ValidationError(_))));
    }
}
