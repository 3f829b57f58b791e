//! HMAC-SHA256 webhook payload signatures.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature, inbound and outbound.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// Algorithm prefix in the signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Signs and verifies raw webhook bodies with a shared secret.
#[derive(Clone)]
pub struct WebhookSigner {
    secret: Vec<u8>,
}

impl fmt::Debug for WebhookSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookSigner").finish_non_exhaustive()
    }
}

impl WebhookSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Hex-encoded HMAC-SHA256 of exactly `payload`.
    pub fn sign(&self, payload: &[u8]) -> String {
        hex::encode(self.mac(payload).finalize().into_bytes())
    }

    /// `sha256=<hex>` header value for `payload`.
    pub fn signature_header(&self, payload: &[u8]) -> String {
        format!("{SIGNATURE_PREFIX}{}", self.sign(payload))
    }

    /// Verifies a signature header value against `payload`.
    ///
    /// A missing or empty header never verifies. The `sha256=` prefix is
    /// optional; the comparison is constant time.
    pub fn verify(&self, header_value: Option<&str>, payload: &[u8]) -> bool {
        let Some(value) = header_value.map(str::trim).filter(|v| !v.is_empty()) else {
            return false;
        };
        let hex_signature = value.strip_prefix(SIGNATURE_PREFIX).unwrap_or(value);

        let Ok(signature) = hex::decode(hex_signature) else {
            return false;
        };

        self.mac(payload).verify_slice(&signature).is_ok()
    }

    fn mac(&self, payload: &[u8]) -> HmacSha256 {
        // HMAC accepts keys of any length, so this cannot fail.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC key length is unrestricted"));
        mac.update(payload);
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify_known_payload() {
        let signer = WebhookSigner::new("s3cr3t");
        let payload = br#"{"a":1}"#;

        let header = format!("sha256={}", signer.sign(payload));

        assert!(signer.verify(Some(header.as_str()), payload));
        assert!(!signer.verify(Some(header.as_str()), br#"{"a":2}"#));
    }

    #[test]
    fn test_signature_is_lowercase_hex_sha256() {
        let signature = WebhookSigner::new("s3cr3t").sign(b"payload");

        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_prefix_is_optional() {
        let signer = WebhookSigner::new("s3cr3t");
        let payload = b"hello";

        assert!(signer.verify(Some(signer.sign(payload).as_str()), payload));
        assert!(signer.verify(Some(signer.signature_header(payload).as_str()), payload));
    }

    #[test]
    fn test_missing_or_empty_header_fails() {
        let signer = WebhookSigner::new("s3cr3t");

        assert!(!signer.verify(None, b"hello"));
        assert!(!signer.verify(Some(""), b"hello"));
        assert!(!signer.verify(Some("sha256="), b"hello"));
    }

    #[test]
    fn test_any_changed_byte_fails() {
        let signer = WebhookSigner::new("s3cr3t");
        let payload = br#"{"type":"message_received","from":"123"}"#.to_vec();
        let header = signer.signature_header(&payload);

        for i in 0..payload.len() {
            let mut tampered = payload.clone();
            tampered[i] ^= 0x01;
            assert!(!signer.verify(Some(header.as_str()), &tampered), "byte {i} accepted");
        }
    }

    #[test]
    fn test_wrong_secret_or_garbage_fails() {
        let payload = b"hello";
        let header = WebhookSigner::new("one").signature_header(payload);

        assert!(!WebhookSigner::new("two").verify(Some(header.as_str()), payload));
        assert!(!WebhookSigner::new("one").verify(Some("sha256=zz-not-hex"), payload));
        assert!(!WebhookSigner::new("one").verify(Some("sha256=abcd"), payload));
    }
}
