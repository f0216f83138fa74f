//! HMAC request signatures for the contact endpoint.
//!
//! A signed request carries `X-Timestamp` (milliseconds since the Unix epoch)
//! and `X-Signature`, the base64 HMAC-SHA256 of `"{timestamp}.{body}"` under
//! the shared secret.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use ring::hmac;
use std::time::Duration;

/// Default tolerated clock distance between signer and verifier.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(5 * 60);

/// Why a signature was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    /// Timestamp is not an integer.
    MalformedTimestamp,
    /// Timestamp is outside the freshness window.
    Expired,
    /// Signature is not base64 or does not match.
    Mismatch,
}

/// Signs and verifies request bodies.
pub struct RequestSigner {
    key: hmac::Key,
    freshness: Duration,
}

impl RequestSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
            freshness: DEFAULT_FRESHNESS,
        }
    }

    /// Set the freshness window.
    pub fn freshness(mut self, window: Duration) -> Self {
        self.freshness = window;
        self
    }

    /// Signature for `body` at `timestamp` (ms since epoch).
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> String {
        let tag = hmac::sign(&self.key, &signed_payload(timestamp, body));
        BASE64.encode(tag.as_ref())
    }

    /// Check a signature against the current time.
    pub fn verify(&self, timestamp: &str, signature: &str, body: &[u8]) -> Result<(), SignatureError> {
        self.verify_at(timestamp, signature, body, Utc::now())
    }

    /// Check a signature against `now`. The timestamp may be off in either
    /// direction by at most the freshness window.
    pub fn verify_at(
        &self,
        timestamp: &str,
        signature: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let millis: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| SignatureError::MalformedTimestamp)?;

        let skew = now.timestamp_millis().abs_diff(millis);
        if u128::from(skew) > self.freshness.as_millis() {
            return Err(SignatureError::Expired);
        }

        let tag = BASE64
            .decode(signature.trim())
            .map_err(|_| SignatureError::Mismatch)?;

        // ring compares in constant time
        hmac::verify(&self.key, &signed_payload(timestamp.trim(), body), &tag)
            .map_err(|_| SignatureError::Mismatch)
    }
}

fn signed_payload(timestamp: &str, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(timestamp.len() + 1 + body.len());
    payload.extend_from_slice(timestamp.as_bytes());
    payload.push(b'.');
    payload.extend_from_slice(body);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = RequestSigner::new("shared-secret");
        let ts = now().timestamp_millis().to_string();
        let body = br#"{"name":"Jane"}"#;

        let signature = signer.sign(&ts, body);
        assert!(signer.verify_at(&ts, &signature, body, now()).is_ok());
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let signer = RequestSigner::new("shared-secret");
        let ts = now().timestamp_millis().to_string();
        let signature = signer.sign(&ts, b"original");

        assert_eq!(
            signer.verify_at(&ts, &signature, b"tampered", now()),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let ts = now().timestamp_millis().to_string();
        let signature = RequestSigner::new("other").sign(&ts, b"body");
        assert_eq!(
            RequestSigner::new("shared-secret").verify_at(&ts, &signature, b"body", now()),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_freshness_window_both_directions() {
        let signer = RequestSigner::new("s");
        let six_minutes = 6 * 60 * 1000;

        let old = (now().timestamp_millis() - six_minutes).to_string();
        let sig = signer.sign(&old, b"b");
        assert_eq!(
            signer.verify_at(&old, &sig, b"b", now()),
            Err(SignatureError::Expired)
        );

        let future = (now().timestamp_millis() + six_minutes).to_string();
        let sig = signer.sign(&future, b"b");
        assert_eq!(
            signer.verify_at(&future, &sig, b"b", now()),
            Err(SignatureError::Expired)
        );

        let recent = (now().timestamp_millis() - 60_000).to_string();
        let sig = signer.sign(&recent, b"b");
        assert!(signer.verify_at(&recent, &sig, b"b", now()).is_ok());
    }

    #[test]
    fn test_malformed_inputs() {
        let signer = RequestSigner::new("s");
        assert_eq!(
            signer.verify_at("yesterday", "abc", b"b", now()),
            Err(SignatureError::MalformedTimestamp)
        );
        let ts = now().timestamp_millis().to_string();
        assert_eq!(
            signer.verify_at(&ts, "%%%not-base64", b"b", now()),
            Err(SignatureError::Mismatch)
        );
    }
}
