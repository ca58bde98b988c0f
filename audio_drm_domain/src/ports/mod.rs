// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Ports: the traits infrastructure adapters implement and application use
//! cases depend on. The domain layer owns these contracts but none of
//! their concrete I/O (§9 Design Notes: "Global Prisma client + ad-hoc
//! repository calls -> Repository Facade interface").

mod envelope_crypto;
mod memory_governor;
mod repository;
mod signed_url_codec;

pub use envelope_crypto::{EnvelopeCryptoService, EnvelopeResult, SegmentEnvelope, SessionTokenPayload};
pub use memory_governor::{MemoryBand, MemoryGovernor};
pub use repository::Repository;
pub use signed_url_codec::SignedUrlCodec;
