// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Value objects: small, immutable types that make illegal states
//! unrepresentable at the type level instead of validating strings at every
//! call site.

mod authorization;
mod crypto;
mod ids;
mod signed_ticket;
mod time_range;
mod upload_limits;

pub use authorization::AuthDecision;
pub use crypto::{AuthTag, EncryptionKey, Iv, AUTH_TAG_LEN, ENCRYPTION_KEY_LEN, IV_LEN};
pub use ids::{ChapterId, FileId, UploadId, UserId};
pub use signed_ticket::{ResourceRef, ResourceRefParseError, SignedTicket, END_OF_TRACK};
pub use time_range::{ChapterRange, TimeRangeError};
pub use upload_limits::{ChunkSize, ChunkSizeError, DEFAULT_CHUNK_BYTES, MAX_CHUNK_BYTES};
