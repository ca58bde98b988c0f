// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Janitor (§4.7): periodic reclamation of expired upload sessions, stale
//! temp files and orphaned chapter ciphertexts. Never touches the master
//! root directly - only `chunks-root` and the `temp`/`chapters`
//! subdirectories of `upload-root` (§4.7 safety invariant, §8 "Janitor
//! never deletes any path under `<upload-root>` that is not under
//! `<upload-root>/temp/` or `<upload-root>/chapters/`").

use crate::infrastructure::adapters::chunk_store::ChunkStore;
use crate::infrastructure::config::AppConfig;
use audio_drm_domain::error::DrmError;
use audio_drm_domain::ports::Repository;
use audio_drm_domain::value_objects::UploadId;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// §4.7 "Reap temp files... whose mtime is more than 1h old".
const TEMP_FILE_TTL: Duration = Duration::from_secs(60 * 60);

/// A single tick's outcome, logged and folded into the metrics counters by
/// the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct JanitorSweepReport {
    pub sessions_reaped: u64,
    pub temp_files_reaped: u64,
    pub orphaned_chapters_reaped: u64,
    pub bytes_reclaimed: u64,
}

pub struct Janitor {
    repository: Arc<dyn Repository>,
    chunk_store: Arc<ChunkStore>,
    config: Arc<AppConfig>,
}

impl Janitor {
    pub fn new(repository: Arc<dyn Repository>, chunk_store: Arc<ChunkStore>, config: Arc<AppConfig>) -> Self {
        Self { repository, chunk_store, config }
    }

    /// Fails fast if the configured roots would let a sweep wander into
    /// the master-file root (§4.7 "refuse to run otherwise"). Call once at
    /// startup; `run_once` assumes this already passed.
    pub fn verify_roots_disjoint(config: &AppConfig) -> Result<(), DrmError> {
        if config.chunks_root == config.upload_root {
            return Err(DrmError::validation("janitor refuses to run: chunks-root equals upload-root"));
        }
        if config.temp_root == config.upload_root {
            return Err(DrmError::validation("janitor refuses to run: temp-root equals upload-root"));
        }
        if config.chapter_root == config.upload_root {
            return Err(DrmError::validation("janitor refuses to run: chapter-root equals upload-root"));
        }
        Ok(())
    }

    /// Runs one full §4.7 tick. Each reclamation step is independent; a
    /// failure in one does not abort the others, matching the run's
    /// "best-effort background sweep" nature.
    pub async fn run_once(&self) -> JanitorSweepReport {
        let mut report = JanitorSweepReport::default();

        match self.reap_sessions().await {
            Ok((count, bytes)) => {
                report.sessions_reaped = count;
                report.bytes_reclaimed += bytes;
            }
            Err(e) => tracing::warn!(error = %e, "janitor: session reap step failed"),
        }

        match self.reap_stale_temp_files().await {
            Ok(count) => report.temp_files_reaped = count,
            Err(e) => tracing::warn!(error = %e, "janitor: temp file reap step failed"),
        }

        match self.reap_orphaned_chapters().await {
            Ok((count, bytes)) => {
                report.orphaned_chapters_reaped = count;
                report.bytes_reclaimed += bytes;
            }
            Err(e) => tracing::warn!(error = %e, "janitor: orphaned chapter reap step failed"),
        }

        tracing::info!(
            sessions_reaped = report.sessions_reaped,
            temp_files_reaped = report.temp_files_reaped,
            orphaned_chapters_reaped = report.orphaned_chapters_reaped,
            bytes_reclaimed = report.bytes_reclaimed,
            "janitor sweep complete"
        );

        report
    }

    /// §4.7: reap `ChunkUploadSession` rows past their TTL (24h, or 2h for
    /// `failed`), plus their on-disk chunk directories.
    async fn reap_sessions(&self) -> Result<(u64, u64), DrmError> {
        let now = Utc::now();
        let reapable = self
            .repository
            .list_reapable_sessions(now, self.config.chunk_session_ttl, self.config.failed_session_ttl)
            .await?;

        if reapable.is_empty() {
            return Ok((0, 0));
        }

        let mut bytes_reclaimed = 0u64;
        let mut ids: Vec<UploadId> = Vec::with_capacity(reapable.len());
        for session in &reapable {
            bytes_reclaimed += directory_size(&self.chunk_store.root().join(session.upload_id.to_string())).await;
            if let Err(e) = self.chunk_store.remove_session_dir(session.upload_id).await {
                tracing::warn!(upload_id = %session.upload_id, error = %e, "janitor: failed to remove chunk directory");
            }
            ids.push(session.upload_id);
        }

        self.repository.delete_sessions_in(&ids).await?;
        Ok((ids.len() as u64, bytes_reclaimed))
    }

    /// §4.7: reap `<upload-root>/temp/` entries whose mtime exceeds 1h, or
    /// whose name matches `temp_chapter_*`/`dec_*` for a file id no longer
    /// present (a crashed materialization run's leftovers, identifiable
    /// via the `(file-id, chapter-id, timestamp)` name scoping of §4.5).
    async fn reap_stale_temp_files(&self) -> Result<u64, DrmError> {
        let temp_root = &self.config.temp_root;
        let mut entries = match tokio::fs::read_dir(temp_root).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = std::time::SystemTime::now();
        let mut reaped = 0u64;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if !metadata.is_file() {
                continue;
            }

            let stale_by_age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age >= TEMP_FILE_TTL);

            let orphaned_by_name = self.is_orphaned_temp_name(&path).await;

            if stale_by_age || orphaned_by_name {
                if tokio::fs::remove_file(&path).await.is_ok() {
                    reaped += 1;
                }
            }
        }

        Ok(reaped)
    }

    /// A `dec_<file-id>.<ext>` whose file id has no row is a crashed
    /// materialization run's master-decrypt temp; `chapter_<fid>_<cid>_*`
    /// names follow the same test the orphaned-chapter step uses.
    async fn is_orphaned_temp_name(&self, path: &std::path::Path) -> bool {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return false;
        };
        let Some(rest) = stem.strip_prefix("dec_") else {
            return false;
        };
        match rest.parse() {
            Ok(file_id) => !matches!(self.repository.get_file(file_id).await, Ok(Some(_))),
            Err(_) => false,
        }
    }

    /// §4.7: reap `chapter_<fid>_<cid>_*.enc` files whose `(fid, cid)` has
    /// no `Chapter` row.
    async fn reap_orphaned_chapters(&self) -> Result<(u64, u64), DrmError> {
        let chapter_root = &self.config.chapter_root;
        let mut entries = match tokio::fs::read_dir(chapter_root).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((0, 0)),
            Err(e) => return Err(e.into()),
        };

        let mut reaped = 0u64;
        let mut bytes_reclaimed = 0u64;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            let Some((file_id, chapter_id)) = parse_chapter_filename(name) else { continue };

            let owning_chapter = self.repository.get_chapter(file_id, chapter_id).await.ok().flatten();
            if owning_chapter.is_none() {
                if let Ok(metadata) = tokio::fs::metadata(&path).await {
                    bytes_reclaimed += metadata.len();
                }
                if tokio::fs::remove_file(&path).await.is_ok() {
                    reaped += 1;
                }
            }
        }

        Ok((reaped, bytes_reclaimed))
    }
}

/// Parses `chapter_<fid>_<cid>_<ts>.enc` into its `(file-id, chapter-id)`
/// pair. Returns `None` for anything that doesn't match the shape, which
/// the caller treats as "not ours to reap".
fn parse_chapter_filename(name: &str) -> Option<(audio_drm_domain::value_objects::FileId, audio_drm_domain::value_objects::ChapterId)> {
    let stem = name.strip_suffix(".enc")?;
    let rest = stem.strip_prefix("chapter_")?;
    let mut parts = rest.splitn(3, '_');
    let file_id = parts.next()?.parse().ok()?;
    let chapter_id = parts.next()?.parse().ok()?;
    parts.next()?; // timestamp, unused
    Some((file_id, chapter_id))
}

/// Best-effort recursive size of a directory, for the janitor's
/// `bytes_reclaimed` report. Missing directories contribute 0.
async fn directory_size(path: &std::path::Path) -> u64 {
    let mut total = 0u64;
    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else { continue };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(metadata) = entry.metadata().await else { continue };
            if metadata.is_dir() {
                stack.push(entry.path());
            } else {
                total += metadata.len();
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_chapter_filename() {
        let file_id = audio_drm_domain::value_objects::FileId::new();
        let chapter_id = audio_drm_domain::value_objects::ChapterId::new();
        let name = format!("chapter_{file_id}_{chapter_id}_1700000000.enc");
        let parsed = parse_chapter_filename(&name);
        assert_eq!(parsed, Some((file_id, chapter_id)));
    }

    #[test]
    fn rejects_names_that_do_not_match_the_shape() {
        assert!(parse_chapter_filename("encrypted_abc.mp3").is_none());
        assert!(parse_chapter_filename("chapter_not-a-uuid_also-not.enc").is_none());
    }

    #[tokio::test]
    async fn directory_size_is_zero_for_a_missing_directory() {
        let size = directory_size(std::path::Path::new("/does/not/exist/at/all")).await;
        assert_eq!(size, 0);
    }

    #[tokio::test]
    async fn directory_size_sums_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a"), b"12345").await.unwrap();
        let nested = dir.path().join("nested");
        tokio::fs::create_dir(&nested).await.unwrap();
        tokio::fs::write(nested.join("b"), b"1234567890").await.unwrap();

        let size = directory_size(dir.path()).await;
        assert_eq!(size, 15);
    }
}
