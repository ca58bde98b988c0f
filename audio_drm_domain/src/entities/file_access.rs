// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `FileAccess` (§3): the authorization edge between a user and a file.
//! `(user_id, file_id)` is unique; an expired row is treated as absent by
//! every caller, never deleted eagerly.

use crate::value_objects::{FileId, UserId};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct FileAccess {
    pub user_id: UserId,
    pub file_id: FileId,
    pub can_view: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl FileAccess {
    pub fn new(user_id: UserId, file_id: FileId, can_view: bool, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            user_id,
            file_id,
            can_view,
            expires_at,
        }
    }

    /// §3: "expired rows are treated as absent".
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.can_view && self.expires_at.is_none_or(|exp| exp > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn unexpired_grant_is_active() {
        let access = FileAccess::new(UserId::new(), FileId::new(), true, Some(Utc::now() + Duration::hours(1)));
        assert!(access.is_active(Utc::now()));
    }

    #[test]
    fn expired_grant_is_not_active() {
        let access = FileAccess::new(UserId::new(), FileId::new(), true, Some(Utc::now() - Duration::hours(1)));
        assert!(!access.is_active(Utc::now()));
    }

    #[test]
    fn can_view_false_is_never_active() {
        let access = FileAccess::new(UserId::new(), FileId::new(), false, None);
        assert!(!access.is_active(Utc::now()));
    }
}
