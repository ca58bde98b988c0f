// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Memory Governor
//!
//! The Chapter Materializer's back-pressure gate (§4.5, §5, §9 Design
//! Notes: "Memory monitor invoked imperatively -> back-pressure
//! primitive"). A single background thread samples the process's resident
//! set via `sysinfo` and publishes a `MemoryBand`; every worker reads that
//! band through `admit`/`wait_for_safe` instead of querying the OS itself.
//!
//! The sampler-thread-plus-atomic-gauge shape is the same pattern the
//! teacher's resource manager used for CPU/IO semaphores - only the
//! quantity being gated changed.

use audio_drm_domain::ports::{MemoryBand, MemoryGovernor};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, System};

/// Resident-set thresholds that separate the four bands (§4.5 defaults:
/// 1.2 / 1.5 / 1.8 GiB).
#[derive(Debug, Clone, Copy)]
pub struct MemoryBandThresholds {
    pub caution_bytes: u64,
    pub warning_bytes: u64,
    pub critical_bytes: u64,
}

impl Default for MemoryBandThresholds {
    fn default() -> Self {
        Self {
            caution_bytes: (1.2 * 1024.0 * 1024.0 * 1024.0) as u64,
            warning_bytes: (1.5 * 1024.0 * 1024.0 * 1024.0) as u64,
            critical_bytes: (1.8 * 1024.0 * 1024.0 * 1024.0) as u64,
        }
    }
}

impl MemoryBandThresholds {
    fn band_for(&self, rss_bytes: u64) -> MemoryBand {
        if rss_bytes >= self.critical_bytes {
            MemoryBand::Critical
        } else if rss_bytes >= self.warning_bytes {
            MemoryBand::Warning
        } else if rss_bytes >= self.caution_bytes {
            MemoryBand::Caution
        } else {
            MemoryBand::Safe
        }
    }
}

fn band_to_u8(band: MemoryBand) -> u8 {
    match band {
        MemoryBand::Safe => 0,
        MemoryBand::Caution => 1,
        MemoryBand::Warning => 2,
        MemoryBand::Critical => 3,
    }
}

fn u8_to_band(raw: u8) -> MemoryBand {
    match raw {
        0 => MemoryBand::Safe,
        1 => MemoryBand::Caution,
        2 => MemoryBand::Warning,
        _ => MemoryBand::Critical,
    }
}

/// Sampling cadence for the background thread.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(2);

/// The Memory Governor (§4.5, §8 "Memory Governor"). Clamps chapter
/// concurrency to the current band's cap and exposes a polling
/// `wait_for_safe` so the Materializer can pause between batches.
pub struct SysinfoMemoryGovernor {
    band: Arc<AtomicU8>,
    thresholds: MemoryBandThresholds,
}

impl SysinfoMemoryGovernor {
    /// Spawns the one sampling thread and returns the governor handle.
    /// Callers construct exactly one of these per process, at boot, from
    /// `AppConfig`'s `memory-bands`.
    pub fn spawn(thresholds: MemoryBandThresholds) -> Self {
        let band = Arc::new(AtomicU8::new(band_to_u8(MemoryBand::Safe)));
        let sampler_band = Arc::clone(&band);
        let pid = Pid::from_u32(std::process::id());

        std::thread::Builder::new()
            .name("memory-governor-sampler".to_string())
            .spawn(move || {
                let mut system = System::new();
                loop {
                    system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
                    if let Some(process) = system.process(pid) {
                        let rss = process.memory();
                        sampler_band.store(band_to_u8(thresholds.band_for(rss)), Ordering::Relaxed);
                    }
                    std::thread::sleep(SAMPLE_INTERVAL);
                }
            })
            .expect("failed to spawn memory governor sampling thread");

        Self { band, thresholds }
    }

    /// Test/inline constructor that never spawns a thread - the caller
    /// drives the band directly via `set_band_for_test`.
    #[cfg(test)]
    fn inert() -> Self {
        Self {
            band: Arc::new(AtomicU8::new(band_to_u8(MemoryBand::Safe))),
            thresholds: MemoryBandThresholds::default(),
        }
    }

    #[cfg(test)]
    fn set_band_for_test(&self, band: MemoryBand) {
        self.band.store(band_to_u8(band), Ordering::Relaxed);
    }
}

#[async_trait::async_trait]
impl MemoryGovernor for SysinfoMemoryGovernor {
    fn band(&self) -> MemoryBand {
        u8_to_band(self.band.load(Ordering::Relaxed))
    }

    fn admit(&self, configured_max: usize) -> usize {
        let cap = match self.band() {
            MemoryBand::Safe => configured_max,
            MemoryBand::Caution => configured_max.max(2) / 2,
            MemoryBand::Warning => 1,
            // Critical still clamps to 1, never 0, so a run always makes
            // forward progress (§4.5).
            MemoryBand::Critical => 1,
        };
        cap.max(1).min(configured_max.max(1))
    }

    async fn wait_for_safe(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.band() == MemoryBand::Safe {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    fn request_gc_hint(&self) {
        // The standard library has no forced-collection primitive; this
        // is the documented best-effort no-op (§4.5, §9).
    }
}
