// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `MemoryGovernor` (§4.5, §5): an awaitable back-pressure gate, not an
//! imperative poll-the-heap-yourself API (§9 Design Notes: "Memory monitor
//! invoked imperatively -> back-pressure primitive"). Callers ask `admit`
//! how many chapters they may run concurrently and `wait_for_safe` to pause
//! between batches; neither exposes the raw RSS number.

use async_trait::async_trait;
use std::time::Duration;

/// Bands derived from resident-set thresholds (defaults 1.2/1.5/1.8 GiB,
/// §4.5/§6 `memory-bands`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MemoryBand {
    Safe,
    Caution,
    Warning,
    Critical,
}

#[async_trait]
pub trait MemoryGovernor: Send + Sync {
    /// Current band, sampled by the one background sampling thread (§5).
    fn band(&self) -> MemoryBand;

    /// The batch width the Chapter Materializer should use this round:
    /// `min(configured max, this band's concurrency cap)`. Critical clamps
    /// to 1 rather than 0 so a run always makes forward progress.
    fn admit(&self, configured_max: usize) -> usize;

    /// Blocks (polling, §4.5 "30 s cap") until the band is `Safe` or the
    /// timeout elapses. Returns whether it observed `Safe`.
    async fn wait_for_safe(&self, timeout: Duration) -> bool;

    /// Requests a GC hint between batches (§4.5). Best-effort; the
    /// standard library has no forced-collection primitive, so adapters
    /// typically drop any buffers they can before returning.
    fn request_gc_hint(&self);
}
