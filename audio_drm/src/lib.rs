// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Audio DRM
//!
//! A DRM-protected audio library server: chunked upload ingest, envelope
//! encryption of the uploaded master, on-demand chapter materialization, and
//! signed-URL streaming of either a whole master or a single chapter.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Presentation Layer                         │
//! │  (axum routes, DTOs, auth extractor, error mapping)         │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Application Layer                          │
//! │  (Upload Ingest, Chapter Materializer, Stream Server,       │
//! │   Janitor, and the small services they share)               │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer                              │
//! │  (audio-drm-domain: entities, value objects, ports)         │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Infrastructure Layer                          │
//! │  (sqlite repository, AES-256-GCM envelope crypto, HMAC      │
//! │   signed URLs, the ffmpeg transcoder adapter, the memory    │
//! │   governor, config loading and metrics)                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core concepts
//!
//! - **Chunked ingest**: a client uploads a file as independently-retriable
//!   chunks; `finalize` assembles them, optionally verifies a declared
//!   SHA-256, probes the duration, and runs envelope encryption exactly once
//!   to produce the canonical ciphertext master.
//! - **Chapter materialization**: splits a master into independently
//!   streamable, independently encrypted chapters, bounded by the memory
//!   governor so a constrained host never holds more than a governed number
//!   of chapters' working sets in memory at a time.
//! - **Signed-URL streaming**: a minted URL binds `(resource, start, end,
//!   expiry, client ip)`, HMAC-signed and checked against a session bearer
//!   token before a single byte of ciphertext is touched.
//!
//! ## License
//!
//! This project is licensed under the BSD 3-Clause License - see LICENSE file
//! for details.

pub mod application;
pub mod infrastructure;
pub mod presentation;

// Tests are organized as:
// - Unit tests: #[cfg(test)] modules within each source file
// - Integration tests: separate files in tests/ directory
