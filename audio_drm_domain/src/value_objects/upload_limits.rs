// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `ChunkSize`: the declared per-chunk byte size for a resumable upload
//! (§4.3). The server never trusts a client's declared size past a hard
//! ceiling - `ChunkSize::new` is the only constructor and enforces it.

use serde::{Deserialize, Serialize};

/// Default chunk size offered to clients by `init` (5 MiB).
pub const DEFAULT_CHUNK_BYTES: u64 = 5 * 1024 * 1024;

/// Hard ceiling no declared or observed chunk may exceed (6 MiB, §4.3/§6).
pub const MAX_CHUNK_BYTES: u64 = 6 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkSize(u64);

impl ChunkSize {
    pub fn new(bytes: u64) -> Result<Self, ChunkSizeError> {
        if bytes == 0 {
            return Err(ChunkSizeError::Zero);
        }
        if bytes > MAX_CHUNK_BYTES {
            return Err(ChunkSizeError::ExceedsCeiling {
                requested: bytes,
                ceiling: MAX_CHUNK_BYTES,
            });
        }
        Ok(Self(bytes))
    }

    pub fn default_size() -> Self {
        Self(DEFAULT_CHUNK_BYTES)
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChunkSizeError {
    #[error("chunk size must be greater than zero")]
    Zero,
    #[error("chunk size {requested} exceeds the {ceiling} byte ceiling")]
    ExceedsCeiling { requested: u64, ceiling: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_within_ceiling() {
        assert!(ChunkSize::default_size().bytes() <= MAX_CHUNK_BYTES);
    }

    #[test]
    fn rejects_above_ceiling() {
        assert_eq!(
            ChunkSize::new(MAX_CHUNK_BYTES + 1),
            Err(ChunkSizeError::ExceedsCeiling {
                requested: MAX_CHUNK_BYTES + 1,
                ceiling: MAX_CHUNK_BYTES,
            })
        );
    }

    #[test]
    fn rejects_zero() {
        assert_eq!(ChunkSize::new(0), Err(ChunkSizeError::Zero));
    }
}
