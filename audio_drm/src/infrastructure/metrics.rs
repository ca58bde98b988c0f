// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Prometheus counters/gauges for the server (SPEC_FULL §11): upload
//! sessions started/completed/failed, chapters materialized/failed, stream
//! requests by outcome, janitor bytes reclaimed, and the current memory
//! band. Exposed as text on an internal `/metrics` endpoint.

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

#[derive(Clone)]
pub struct MetricsService {
    registry: Registry,

    upload_sessions_started_total: IntCounter,
    upload_sessions_completed_total: IntCounter,
    upload_sessions_failed_total: IntCounter,

    chapters_materialized_total: IntCounter,
    chapters_failed_total: IntCounter,

    stream_requests_total: IntCounterVec,

    janitor_bytes_reclaimed_total: IntCounter,
    janitor_sessions_reaped_total: IntCounter,

    memory_band: IntGauge,
}

impl MetricsService {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let upload_sessions_started_total =
            IntCounter::with_opts(Opts::new("upload_sessions_started_total", "Upload sessions started").namespace("audio_drm"))?;
        let upload_sessions_completed_total =
            IntCounter::with_opts(Opts::new("upload_sessions_completed_total", "Upload sessions completed").namespace("audio_drm"))?;
        let upload_sessions_failed_total =
            IntCounter::with_opts(Opts::new("upload_sessions_failed_total", "Upload sessions failed").namespace("audio_drm"))?;
        let chapters_materialized_total =
            IntCounter::with_opts(Opts::new("chapters_materialized_total", "Chapters materialized").namespace("audio_drm"))?;
        let chapters_failed_total = IntCounter::with_opts(Opts::new("chapters_failed_total", "Chapters failed materialization").namespace("audio_drm"))?;
        let stream_requests_total =
            IntCounterVec::new(Opts::new("stream_requests_total", "Stream requests by outcome").namespace("audio_drm"), &["outcome"])?;
        let janitor_bytes_reclaimed_total =
            IntCounter::with_opts(Opts::new("janitor_bytes_reclaimed_total", "Bytes reclaimed by the janitor").namespace("audio_drm"))?;
        let janitor_sessions_reaped_total =
            IntCounter::with_opts(Opts::new("janitor_sessions_reaped_total", "Upload sessions reaped by the janitor").namespace("audio_drm"))?;
        let memory_band = IntGauge::with_opts(Opts::new("memory_band", "Current memory governor band (0=safe..3=critical)").namespace("audio_drm"))?;

        registry.register(Box::new(upload_sessions_started_total.clone()))?;
        registry.register(Box::new(upload_sessions_completed_total.clone()))?;
        registry.register(Box::new(upload_sessions_failed_total.clone()))?;
        registry.register(Box::new(chapters_materialized_total.clone()))?;
        registry.register(Box::new(chapters_failed_total.clone()))?;
        registry.register(Box::new(stream_requests_total.clone()))?;
        registry.register(Box::new(janitor_bytes_reclaimed_total.clone()))?;
        registry.register(Box::new(janitor_sessions_reaped_total.clone()))?;
        registry.register(Box::new(memory_band.clone()))?;

        Ok(Self {
            registry,
            upload_sessions_started_total,
            upload_sessions_completed_total,
            upload_sessions_failed_total,
            chapters_materialized_total,
            chapters_failed_total,
            stream_requests_total,
            janitor_bytes_reclaimed_total,
            janitor_sessions_reaped_total,
            memory_band,
        })
    }

    pub fn record_upload_started(&self) {
        self.upload_sessions_started_total.inc();
    }

    pub fn record_upload_completed(&self) {
        self.upload_sessions_completed_total.inc();
    }

    pub fn record_upload_failed(&self) {
        self.upload_sessions_failed_total.inc();
    }

    pub fn record_chapter_materialized(&self) {
        self.chapters_materialized_total.inc();
    }

    pub fn record_chapter_failed(&self) {
        self.chapters_failed_total.inc();
    }

    pub fn record_stream_request(&self, outcome: &str) {
        self.stream_requests_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_janitor_sweep(&self, bytes_reclaimed: u64, sessions_reaped: u64) {
        self.janitor_bytes_reclaimed_total.inc_by(bytes_reclaimed);
        self.janitor_sessions_reaped_total.inc_by(sessions_reaped);
    }

    pub fn set_memory_band(&self, band: audio_drm_domain::ports::MemoryBand) {
        let value = match band {
            audio_drm_domain::ports::MemoryBand::Safe => 0,
            audio_drm_domain::ports::MemoryBand::Caution => 1,
            audio_drm_domain::ports::MemoryBand::Warning => 2,
            audio_drm_domain::ports::MemoryBand::Critical => 3,
        };
        self.memory_band.set(value);
    }

    /// Renders the registry in Prometheus text exposition format for the
    /// `/metrics` endpoint.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = prometheus::TextEncoder::new();
        let families = self.registry.gather();
        encoder.encode_to_string(&families)
    }
}

impl Default for MetricsService {
    fn default() -> Self {
        Self::new().expect("failed to construct default MetricsService")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metric_names() {
        let metrics = MetricsService::new().unwrap();
        metrics.record_upload_started();
        metrics.record_stream_request("ok");
        let text = metrics.render().unwrap();
        assert!(text.contains("audio_drm_upload_sessions_started_total"));
        assert!(text.contains("audio_drm_stream_requests_total"));
    }

    #[test]
    fn set_memory_band_reflects_current_band() {
        let metrics = MetricsService::new().unwrap();
        metrics.set_memory_band(audio_drm_domain::ports::MemoryBand::Critical);
        let text = metrics.render().unwrap();
        assert!(text.contains("audio_drm_memory_band 3"));
    }
}
