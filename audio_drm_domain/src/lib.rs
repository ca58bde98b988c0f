// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DRM Audio Domain
//!
//! Pure domain layer for the DRM-protected audio library server: the
//! entities and value objects of §3, the ports (`Repository`,
//! `EnvelopeCryptoService`, `SignedUrlCodec`, `MemoryGovernor`) that
//! infrastructure adapters implement, and the error taxonomy of §7.
//!
//! This crate has no `tokio`, no SQL driver and no HTTP - the same rule
//! the teacher crate's domain layer follows. I/O-bound ports are still
//! `async fn` (via `async-trait`), since the *contract* is async even
//! though this crate never drives an executor itself.

pub mod entities;
pub mod error;
pub mod ports;
pub mod services;
pub mod value_objects;

pub use error::DrmError;
