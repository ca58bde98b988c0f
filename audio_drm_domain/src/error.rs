// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error Taxonomy
//!
//! `DrmError` is the single error type returned by every domain trait and
//! value object in this crate. Each variant is a *kind* of failure, not a
//! specific message — the presentation layer maps kinds to HTTP status codes
//! (§7 of the error handling design) without needing to parse strings.
//!
//! The domain layer never logs; logging is an infrastructure concern. Domain
//! errors carry enough structure for a caller to decide what to do, and a
//! human-readable `Display` for operators reading logs further up the stack.

use thiserror::Error;

/// The domain-wide error type.
///
/// Variants map to the error taxonomy kinds, not to HTTP codes directly —
/// the presentation layer owns that mapping so the domain stays transport
/// agnostic.
#[derive(Error, Debug)]
pub enum DrmError {
    /// Bad or missing bearer token, bad or missing signed-URL signature, or
    /// an expired signature/session.
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// A referenced file, chapter, or upload session does not exist.
    #[error("not found: {0}")]
    NotFoundError(String),

    /// Authenticated, but the caller has no access grant for this resource.
    #[error("forbidden: {0}")]
    ForbiddenError(String),

    /// Malformed or out-of-range input: bad range, bad chunk index, oversize
    /// file, malformed chapter list.
    #[error("validation failed: {0}")]
    ValidationError(String),

    /// A hash or auth-tag check failed: finalize hash mismatch, or GCM tag
    /// verification failure on decrypt.
    #[error("integrity check failed: {0}")]
    IntegrityError(String),

    /// The system is declining to admit more work: memory governor refusal,
    /// transcoder timeout, full disk.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// An I/O failure, subprocess failure, or anything else unanticipated.
    /// The presentation layer must never leak this message to a client.
    #[error("internal error: {0}")]
    IoError(String),
}

impl DrmError {
    pub fn auth<S: Into<String>>(msg: S) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFoundError(msg.into())
    }

    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        Self::ForbiddenError(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn integrity<S: Into<String>>(msg: S) -> Self {
        Self::IntegrityError(msg.into())
    }

    pub fn exhausted<S: Into<String>>(msg: S) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    pub fn io<S: Into<String>>(msg: S) -> Self {
        Self::IoError(msg.into())
    }
}

impl From<std::io::Error> for DrmError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

impl From<serde_json::Error> for DrmError {
    fn from(e: serde_json::Error) -> Self {
        Self::ValidationError(format!("malformed json: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_does_not_panic_on_any_variant() {
        let variants = vec![
            DrmError::auth("bad bearer"),
            DrmError::not_found("file 1"),
            DrmError::forbidden("no access"),
            DrmError::validation("bad range"),
            DrmError::integrity("tag mismatch"),
            DrmError::exhausted("governor red"),
            DrmError::io("disk full"),
        ];
        for e in variants {
            assert!(!e.to_string().is_empty());
        }
    }
}
