// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Validates a proposed chapter list before any `Chapter` rows are created
//! (§3 invariants: distinct `order`, total order by `order` ascending; §6
//! `POST /files/{id}/chapters` body is "an ordered list of
//! `{label,startTime,endTime?}`").

use crate::error::DrmError;
use crate::value_objects::ChapterRange;

#[derive(Debug, Clone)]
pub struct ChapterPlanItem {
    pub label: String,
    pub range: ChapterRange,
}

/// Checks the plan a client submits for `POST /files/{id}/chapters`: the
/// list order becomes the `order` column, so duplicates are impossible by
/// construction, but chapters must still be non-empty and internally
/// consistent (ranges that make sense relative to each other).
pub fn validate_chapter_plan(items: &[ChapterPlanItem]) -> Result<(), DrmError> {
    if items.is_empty() {
        return Err(DrmError::validation("chapter list must not be empty"));
    }

    for pair in items.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.range.start_seconds() < prev.range.start_seconds() {
            return Err(DrmError::validation(format!(
                "chapter \"{}\" starts before preceding chapter \"{}\"",
                next.label, prev.label
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(label: &str, start: f64, end: Option<f64>) -> ChapterPlanItem {
        ChapterPlanItem {
            label: label.to_string(),
            range: ChapterRange::new(start, end).unwrap(),
        }
    }

    #[test]
    fn rejects_empty_plan() {
        assert!(validate_chapter_plan(&[]).is_err());
    }

    #[test]
    fn accepts_monotonically_increasing_starts() {
        let items = vec![item("Intro", 0.0, Some(60.0)), item("Chapter 1", 60.0, Some(180.0)), item("Outro", 180.0, None)];
        assert!(validate_chapter_plan(&items).is_ok());
    }

    #[test]
    fn rejects_out_of_order_starts() {
        let items = vec![item("B", 100.0, Some(200.0)), item("A", 0.0, Some(50.0))];
        assert!(validate_chapter_plan(&items).is_err());
    }
}
