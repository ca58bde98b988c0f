// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `SignedTicket` (§3, §4.2): the tuple carried in a signed streaming URL.
//! Never persisted - reconstructed from query parameters on every request
//! and checked against its HMAC signature by the `SignedUrlCodec` port.

use crate::value_objects::{ChapterId, FileId};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Either a bare master file or a `(file, chapter)` pair, per §4.2:
/// `resource-ref` is either `<file-id>` or `<file-id>:<chapter-id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRef {
    Master(FileId),
    Chapter(FileId, ChapterId),
}

impl ResourceRef {
    pub fn file_id(&self) -> FileId {
        match self {
            ResourceRef::Master(id) => *id,
            ResourceRef::Chapter(id, _) => *id,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceRef::Master(id) => write!(f, "{id}"),
            ResourceRef::Chapter(id, chapter) => write!(f, "{id}:{chapter}"),
        }
    }
}

impl FromStr for ResourceRef {
    type Err = ResourceRefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((file, chapter)) => {
                let file_id = file.parse().map_err(|_| ResourceRefParseError)?;
                let chapter_id = chapter.parse().map_err(|_| ResourceRefParseError)?;
                Ok(ResourceRef::Chapter(file_id, chapter_id))
            }
            None => Ok(ResourceRef::Master(s.parse().map_err(|_| ResourceRefParseError)?)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed resource reference")]
pub struct ResourceRefParseError;

/// A `-1` end sentinel means "end of track" (§4.2).
pub const END_OF_TRACK: i64 = -1;

/// The signed payload: `(resource-ref, start, end, expires-ms, client-ip)`.
/// Constructed either by the minting side (stream-url endpoints) or by
/// parsing incoming query parameters; in both cases the canonical string
/// form is what gets HMAC-signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTicket {
    pub resource: ResourceRef,
    pub start_seconds: i64,
    pub end_seconds: i64,
    pub expires_ms: i64,
    pub client_ip: IpAddr,
}

impl SignedTicket {
    /// The exact byte string fed to HMAC-SHA256 (§4.2):
    /// `"<resource-ref>:<start>:<end>:<expires-ms>:<client-ip>"`.
    pub fn canonical_string(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.resource, self.start_seconds, self.end_seconds, self.expires_ms, self.client_ip
        )
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_ms
    }

    pub fn end_is_track_end(&self) -> bool {
        self.end_seconds == END_OF_TRACK
    }
}
