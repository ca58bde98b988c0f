// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Envelope crypto value objects (§4.1): a 32-byte AES-256-GCM key, a 12-byte
//! IV and a 16-byte GCM authentication tag. All three round-trip through hex
//! for storage in the repository and in the `AudioFile`/`Chapter` rows.
//!
//! Invariant: for any encrypted artifact the `(key, iv)` pair is unique
//! (§3). Generation always goes through `EncryptionKey::generate`/
//! `Iv::generate`, which use the OS CSPRNG.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const ENCRYPTION_KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const AUTH_TAG_LEN: usize = 16;

/// A 256-bit AES-GCM data key. Zeroized on drop; `Debug` never prints the
/// bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EncryptionKey([u8; ENCRYPTION_KEY_LEN]);

impl EncryptionKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; ENCRYPTION_KEY_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; ENCRYPTION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoValueError> {
        let bytes = hex::decode(s).map_err(|_| CryptoValueError::InvalidHex("encryption key"))?;
        let bytes: [u8; ENCRYPTION_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoValueError::WrongLength("encryption key", ENCRYPTION_KEY_LEN))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; ENCRYPTION_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EncryptionKey").field(&"<redacted>").finish()
    }
}

impl TryFrom<String> for EncryptionKey {
    type Error = CryptoValueError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<EncryptionKey> for String {
    fn from(k: EncryptionKey) -> Self {
        k.to_hex()
    }
}

/// A 96-bit AES-GCM IV, unique per encrypted artifact.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Iv([u8; IV_LEN]);

impl Iv {
    pub fn generate() -> Self {
        let mut bytes = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; IV_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoValueError> {
        let bytes = hex::decode(s).map_err(|_| CryptoValueError::InvalidHex("iv"))?;
        let bytes: [u8; IV_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoValueError::WrongLength("iv", IV_LEN))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }
}

impl fmt::Debug for Iv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iv({})", self.to_hex())
    }
}

impl TryFrom<String> for Iv {
    type Error = CryptoValueError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<Iv> for String {
    fn from(iv: Iv) -> Self {
        iv.to_hex()
    }
}

/// A 128-bit GCM authentication tag.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AuthTag([u8; AUTH_TAG_LEN]);

impl AuthTag {
    pub fn from_bytes(bytes: [u8; AUTH_TAG_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoValueError> {
        let bytes = hex::decode(s).map_err(|_| CryptoValueError::InvalidHex("auth tag"))?;
        let bytes: [u8; AUTH_TAG_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoValueError::WrongLength("auth tag", AUTH_TAG_LEN))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; AUTH_TAG_LEN] {
        &self.0
    }
}

impl fmt::Debug for AuthTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthTag({})", self.to_hex())
    }
}

impl TryFrom<String> for AuthTag {
    type Error = CryptoValueError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<AuthTag> for String {
    fn from(tag: AuthTag) -> Self {
        tag.to_hex()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoValueError {
    #[error("invalid hex encoding for {0}")]
    InvalidHex(&'static str),
    #[error("{0} must be exactly {1} bytes")]
    WrongLength(&'static str, usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_hex_round_trips() {
        let key = EncryptionKey::generate();
        let hex = key.to_hex();
        let parsed = EncryptionKey::from_hex(&hex).unwrap();
        assert_eq!(key.as_bytes(), parsed.as_bytes());
        assert_eq!(hex.len(), ENCRYPTION_KEY_LEN * 2);
    }

    #[test]
    fn iv_hex_round_trips_and_is_unique_per_call() {
        let a = Iv::generate();
        let b = Iv::generate();
        assert_ne!(a, b);
        assert_eq!(a, Iv::from_hex(&a.to_hex()).unwrap());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            EncryptionKey::from_hex("aa"),
            Err(CryptoValueError::WrongLength("encryption key", ENCRYPTION_KEY_LEN))
        ));
    }

    #[test]
    fn debug_never_prints_key_material() {
        let key = EncryptionKey::generate();
        assert_eq!(format!("{:?}", key), "EncryptionKey(\"<redacted>\")");
    }
}
