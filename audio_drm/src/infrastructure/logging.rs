// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Logging
//!
//! Structured logging for the server, built on `tracing` +
//! `tracing-subscriber`. Initialized exactly once, from `main`, before any
//! other component is constructed - the Memory Governor's sampler thread
//! and every request handler log through the subscriber installed here.
//!
//! The env filter honors `RUST_LOG` when set (`RUST_LOG=audio_drm=debug,tower_http=info`),
//! falling back to the level requested on the CLI (`--verbose` maps to
//! `debug`, otherwise `info`).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global `tracing` subscriber. Safe to call at most once per
/// process; a second call is a logic error and panics rather than silently
/// discarding the caller's configuration.
pub fn init_tracing(default_level: tracing::Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let fmt_layer = fmt::layer().with_target(true).with_thread_names(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .expect("tracing subscriber already initialized");
}
