//! Webhook signature verification.
//!
//! The platform signs every request body with HMAC-SHA256 keyed by the channel
//! secret and sends the base64 digest in the `x-line-signature` header.

use base64::{Engine, prelude::BASE64_STANDARD};
use ring::hmac;

use crate::base::errors::AuthError;

/// Verifies request bodies against the channel secret.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct SignatureVerifier {
    key: hmac::Key,
}

impl SignatureVerifier {
    pub fn new(channel_secret: &str) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, channel_secret.as_bytes()),
        }
    }

    /// The base64 signature the platform would send for `body`.
    pub fn sign(&self, body: &[u8]) -> String {
        BASE64_STANDARD.encode(hmac::sign(&self.key, body).as_ref())
    }

    /// Check `signature` against `body` in constant time.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), AuthError> {
        let signature = signature.map(str::trim).filter(|s| !s.is_empty()).ok_or(AuthError::MissingSignature)?;
        let tag = BASE64_STANDARD.decode(signature).map_err(|_| AuthError::InvalidSignature)?;

        hmac::verify(&self.key, body, &tag).map_err(|_| AuthError::InvalidSignature)
    }
}
