// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Minimal HS256 bearer verification for the management API (§6
//! `auth-jwt-secret`). This only establishes caller identity (the `sub`
//! claim); it is never the authority for admin or access-grant decisions -
//! those stay with `Repository::is_admin` and `FileAccess`, read fresh on
//! every request, the same way the stream server never trusts a signed
//! URL's claims past what `AuthorizationService` re-derives (§9 "tagged
//! authorization decision").
//!
//! No JWT crate is pulled in for this - the claim set is one string and one
//! timestamp, and the stack already carries `hmac`/`sha2`/`base64` for the
//! signed-URL codec, so hand-rolling the HS256 compact-serialization check
//! reuses exactly those crates instead of adding a new dependency for it.

use audio_drm_domain::error::DrmError;
use audio_drm_domain::value_objects::UserId;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

/// The identity established by a verified bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

pub struct JwtAuthenticator {
    secret: Vec<u8>,
}

impl JwtAuthenticator {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts a key of any length")
    }

    /// Verifies a compact `header.payload.signature` HS256 token and
    /// returns the identity it carries. Rejects a malformed shape, a bad
    /// signature, or an expired `exp` without distinguishing which to the
    /// caller - all are `AuthError` at the wire (§7).
    pub fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, DrmError> {
        let segments: Vec<&str> = token.split('.').collect();
        let [header_b64, payload_b64, signature_b64] = segments[..] else {
            return Err(DrmError::auth("malformed bearer token"));
        };

        let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|_| DrmError::auth("malformed bearer token signature"))?;
        let mut mac = self.mac();
        mac.update(format!("{header_b64}.{payload_b64}").as_bytes());
        let expected = mac.finalize().into_bytes();
        if expected.as_slice().ct_eq(&signature).unwrap_u8() != 1 {
            return Err(DrmError::auth("bearer token signature does not verify"));
        }

        let payload_json = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| DrmError::auth("malformed bearer token payload"))?;
        let claims: Claims = serde_json::from_slice(&payload_json).map_err(|_| DrmError::auth("malformed bearer token claims"))?;

        if chrono::Utc::now().timestamp() >= claims.exp {
            return Err(DrmError::auth("bearer token expired"));
        }

        let user_id: UserId = claims.sub.parse().map_err(|_| DrmError::auth("bearer token carries a malformed subject"))?;
        Ok(AuthenticatedUser { user_id })
    }
}
