// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Pure domain services: logic that does not need a port because it never
//! touches disk, the clock source aside, or the network.

mod chapter_plan;
mod checksum;

pub use chapter_plan::{validate_chapter_plan, ChapterPlanItem};
pub use checksum::Sha256Accumulator;
