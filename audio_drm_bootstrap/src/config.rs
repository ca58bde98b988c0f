// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Configuration
//!
//! The thin slice of configuration the bootstrap layer needs before the
//! rest of the application exists: log level and a handful of CLI-derived
//! overrides. The server's actual operating configuration (storage roots,
//! timeouts, secrets, §6 of the specification) lives in
//! `audio_drm::infrastructure::config` and is loaded once `main` has a
//! `ValidatedCli` in hand.

use std::path::PathBuf;

/// Logging verbosity, mirrored onto a `tracing` filter level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Bootstrap-phase application identity, set before the DI container and
/// the richer `AppConfig` exist.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub log_level: LogLevel,
    pub config_path: Option<PathBuf>,
    pub verbose: bool,
}

impl AppConfig {
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    app_name: Option<String>,
    log_level: Option<LogLevel>,
    config_path: Option<PathBuf>,
    verbose: bool,
}

impl AppConfigBuilder {
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn build(self) -> AppConfig {
        AppConfig {
            app_name: self.app_name.unwrap_or_else(|| "audio-drm-server".to_string()),
            log_level: self.log_level.unwrap_or_default(),
            config_path: self.config_path,
            verbose: self.verbose,
        }
    }
}
