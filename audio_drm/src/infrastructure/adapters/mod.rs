// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Concrete implementations of the domain's port traits plus two adapters
//! the domain has no port for (`ChunkStore`, `Transcoder` - both are pure
//! infrastructure with no business rule the domain needs to own).

pub mod chunk_store;
pub mod encryption;
pub mod jwt;
pub mod signed_url;
pub mod transcoder;

pub use chunk_store::{ChunkSessionMetadata, ChunkStore};
pub use encryption::AesGcmEnvelopeCrypto;
pub use jwt::{AuthenticatedUser, JwtAuthenticator};
pub use signed_url::HmacSignedUrlCodec;
pub use transcoder::{ChapterCut, FfmpegTranscoder, Transcoder};
