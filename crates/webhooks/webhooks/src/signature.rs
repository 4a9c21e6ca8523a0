//! HMAC signature generation and verification.
//!
//! The signed message is the base64 encoding of the exact JSON body bytes,
//! so a receiver can recompute it as
//! `HMAC_SHA256(secret, base64(JSON.stringify(body)))` in uppercase hex.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{WebhookError, WebhookResult};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature on outbound requests.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Webhook signer for generating and verifying signatures.
pub struct WebhookSigner {
    secret: String,
}

impl WebhookSigner {
    /// Creates a new signer with the given secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    /// Creates a signer, rejecting an empty secret.
    pub fn for_subscriber(subscriber_id: &str, secret: &str) -> WebhookResult<Self> {
        if secret.is_empty() {
            return Err(WebhookError::MissingSecret(subscriber_id.to_string()));
        }
        Ok(Self::new(secret))
    }

    /// Generates the uppercase hex signature for a body.
    pub fn sign(&self, body: &[u8]) -> String {
        let encoded = BASE64.encode(body);

        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC can take key of any size");
        mac.update(encoded.as_bytes());

        hex::encode_upper(mac.finalize().into_bytes())
    }

    /// Verifies a signature against the body.
    pub fn verify(&self, body: &[u8], signature: &str) -> bool {
        let expected = self.sign(body);
        constant_time_compare(&expected, signature)
    }

    /// Verifies a signature, returning an error on mismatch.
    pub fn verify_strict(&self, body: &[u8], signature: &str) -> WebhookResult<()> {
        if self.verify(body, signature) {
            Ok(())
        } else {
            Err(WebhookError::InvalidSignature)
        }
    }
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
