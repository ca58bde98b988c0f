// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `ChapterRange`: a chapter's `(start, end)` offsets into the master, in
//! seconds. `end` is optional - a null end means "run to end of stream"
//! (§4.5 "Ordering & tie-breaks").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChapterRange {
    start_seconds: f64,
    end_seconds: Option<f64>,
}

impl ChapterRange {
    /// Builds a range, enforcing the §3 invariant: `start >= 0` and, when
    /// present, `end > start`.
    pub fn new(start_seconds: f64, end_seconds: Option<f64>) -> Result<Self, TimeRangeError> {
        if !start_seconds.is_finite() || start_seconds < 0.0 {
            return Err(TimeRangeError::NegativeStart);
        }
        if let Some(end) = end_seconds {
            if !end.is_finite() || end <= start_seconds {
                return Err(TimeRangeError::EndNotAfterStart);
            }
        }
        Ok(Self {
            start_seconds,
            end_seconds,
        })
    }

    pub fn start_seconds(&self) -> f64 {
        self.start_seconds
    }

    pub fn end_seconds(&self) -> Option<f64> {
        self.end_seconds
    }

    /// Duration in seconds, if the end is known.
    pub fn duration_seconds(&self) -> Option<f64> {
        self.end_seconds.map(|end| end - self.start_seconds)
    }

    /// Whether this range runs open-ended to the end of the stream.
    pub fn is_open_ended(&self) -> bool {
        self.end_seconds.is_none()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TimeRangeError {
    #[error("chapter start time must be non-negative and finite")]
    NegativeStart,
    #[error("chapter end time must be finite and strictly greater than start time")]
    EndNotAfterStart,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_open_ended_range() {
        let r = ChapterRange::new(120.0, None).unwrap();
        assert!(r.is_open_ended());
        assert_eq!(r.duration_seconds(), None);
    }

    #[test]
    fn rejects_end_before_or_equal_start() {
        assert_eq!(
            ChapterRange::new(10.0, Some(10.0)),
            Err(TimeRangeError::EndNotAfterStart)
        );
        assert_eq!(
            ChapterRange::new(10.0, Some(5.0)),
            Err(TimeRangeError::EndNotAfterStart)
        );
    }

    #[test]
    fn rejects_negative_start() {
        assert_eq!(ChapterRange::new(-1.0, None), Err(TimeRangeError::NegativeStart));
    }
}
