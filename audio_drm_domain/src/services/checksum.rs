// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SHA-256 accumulation for the Ingest Assembler's whole-file hash check
//! (§4.4, §8 "For every upload session U with declared hash h..."). The
//! accumulator itself never touches disk - the caller feeds it chunk
//! bytes as they are read, in index order.

use sha2::{Digest, Sha256};

#[derive(Default)]
pub struct Sha256Accumulator {
    hasher: Sha256,
}

impl Sha256Accumulator {
    pub fn new() -> Self {
        Self { hasher: Sha256::new() }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    /// Case-insensitive comparison, since clients may send either case.
    pub fn matches(declared: &str, computed_hex: &str) -> bool {
        declared.eq_ignore_ascii_case(computed_hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_across_multiple_updates() {
        let mut whole = Sha256Accumulator::new();
        whole.update(b"hello world");
        let whole_digest = whole.finalize_hex();

        let mut split = Sha256Accumulator::new();
        split.update(b"hello ");
        split.update(b"world");
        let split_digest = split.finalize_hex();

        assert_eq!(whole_digest, split_digest);
    }

    #[test]
    fn matches_is_case_insensitive() {
        assert!(Sha256Accumulator::matches("DEADBEEF", "deadbeef"));
        assert!(!Sha256Accumulator::matches("deadbeef", "cafebabe"));
    }
}
