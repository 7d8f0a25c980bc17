//! Webhook signature verification.
//!
//! Emitters sign the raw request body with HMAC-SHA256 keyed by the shared
//! webhook secret and send the lowercase hex digest in a header. The
//! comparison runs in constant time via `Mac::verify_slice`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Check a hex-encoded HMAC-SHA256 signature over `body`.
///
/// Returns false for malformed hex as well as for digest mismatches.
#[must_use]
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(provided) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

/// Produce the lowercase hex signature an emitter would send.
#[must_use]
pub fn sign(secret: &str, body: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_verifies() {
        let body = br#"{"doctype":"Customer","name":"C1"}"#;
        let signature = sign("shared-secret", body);
        assert_eq!(signature.len(), 64);
        assert!(verify_signature("shared-secret", body, &signature));
    }

    #[test]
    fn wrong_secret_or_body_fails() {
        let body = br#"{"doctype":"Customer","name":"C1"}"#;
        let signature = sign("shared-secret", body);
        assert!(!verify_signature("other-secret", body, &signature));
        assert!(!verify_signature("shared-secret", b"tampered", &signature));
    }

    #[test]
    fn malformed_hex_fails_closed() {
        assert!(!verify_signature("secret", b"body", "deadbeef"));
        assert!(!verify_signature("secret", b"body", "not hex at all"));
        assert!(!verify_signature("secret", b"body", ""));
    }
}
