//! Webhook authentication: hex-encoded HMAC-SHA256 over the raw request
//! body, carried in the `X-Hub-Signature` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature";

pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time verification via `Mac::verify_slice`.
pub fn verify(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-webhook-secret";

    #[test]
    fn sign_and_verify_round_trip() {
        let body = br#"{"data":{"id":123},"external_reference":"ref-1"}"#;
        let sig = sign(SECRET, body).unwrap();
        assert!(verify(SECRET, body, &sig));
    }

    #[test]
    fn single_byte_tamper_is_rejected() {
        let body = br#"{"data":{"id":123},"external_reference":"ref-1"}"#.to_vec();
        let sig = sign(SECRET, &body).unwrap();
        let mut tampered = body.clone();
        tampered[10] ^= 0x01;
        assert!(!verify(SECRET, &tampered, &sig));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let body = b"payload";
        let sig = sign(SECRET, body).unwrap();
        assert!(!verify("other-secret", body, &sig));
    }

    #[test]
    fn malformed_signature_is_rejected() {
        assert!(!verify(SECRET, b"payload", "not-hex!"));
        assert!(!verify(SECRET, b"payload", ""));
    }

    #[test]
    fn signature_is_deterministic_hex() {
        let sig = sign(SECRET, b"payload").unwrap();
        assert_eq!(sig, sign(SECRET, b"payload").unwrap());
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
