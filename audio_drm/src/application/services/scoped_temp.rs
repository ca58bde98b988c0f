// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Scoped temp-file handle (§9 Design Notes: "Scattered `fs.*` temp-file
//! management -> Scoped Resource"). Every temp path the Chapter
//! Materializer acquires - the decrypted-master temp, each chapter's cut
//! temp - is wrapped here so release unlinks it on every exit path,
//! including an early `?` return or a panicking task.

use std::path::{Path, PathBuf};

pub struct ScopedTempFile {
    path: PathBuf,
}

impl ScopedTempFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedTempFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove scoped temp file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn drop_removes_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scoped.tmp");
        std::fs::write(&path, b"x").unwrap();

        {
            let scoped = ScopedTempFile::new(&path);
            assert_eq!(scoped.path(), path);
            assert!(path.exists());
        }

        assert!(!path.exists());
    }

    #[test]
    fn drop_is_a_noop_when_the_file_is_already_gone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("never-created.tmp");
        drop(ScopedTempFile::new(&path));
    }
}
