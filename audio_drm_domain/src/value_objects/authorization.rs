// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `AuthDecision` replaces the scattered "is this user an admin?" checks the
//! source sprinkled across controllers (§9 Design Notes: "Dynamic
//! route-level variants -> tagged authorization decision"). It is computed
//! once per request by the stream server and carried through instead of
//! being re-derived at each step.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// The caller is an administrator; bypasses `FileAccess` entirely.
    Admin,
    /// The caller holds an unexpired `FileAccess` grant.
    Owner { expires_at: Option<DateTime<Utc>> },
    /// The file is public (`AudioFile::is_public`); no grant needed.
    Public,
    /// No grant, not public, not an admin.
    Deny,
}

impl AuthDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, AuthDecision::Deny)
    }
}
