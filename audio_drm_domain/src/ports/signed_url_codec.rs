// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `SignedUrlCodec` (§4.2): HMAC-SHA256 over the ticket's canonical string,
//! constant-time verified. Pure CPU, no I/O, so the port stays synchronous.

use crate::value_objects::SignedTicket;

pub trait SignedUrlCodec: Send + Sync {
    /// Returns the lowercase hex HMAC-SHA256 signature for `ticket`.
    fn sign(&self, ticket: &SignedTicket) -> String;

    /// Constant-time comparison against a caller-supplied signature.
    fn verify(&self, ticket: &SignedTicket, signature_hex: &str) -> bool;
}
