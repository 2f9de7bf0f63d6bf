//! Stripe webhook signature verification.
//!
//! Stripe signs every delivery with HMAC-SHA256 and sends the result in the
//! `Stripe-Signature` header:
//!
//! ```text
//! Stripe-Signature: t=1492774577,v1=5257a869e7...,v0=6ffbb59b2300...
//! ```
//!
//! The signed message is `"{t}.{raw body}"`. Only `v1` entries are checked;
//! any one matching entry is enough, which lets Stripe roll secrets.
//! Reference: https://stripe.com/docs/webhooks/signatures

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the provider signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

const TIMESTAMP_KEY: &str = "t";
const SIGNATURE_SCHEME: &str = "v1";

/// Shared webhook signing secret.
///
/// Cheap to clone; the `Debug` output never contains the secret.
#[derive(Clone)]
pub struct WebhookSecret(Arc<[u8]>);

impl WebhookSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(secret.into()))
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookSecret(<redacted>)")
    }
}

/// A payload whose signature has been checked.
///
/// Only [`SignatureVerifier`] can build one, so the event decoder can never
/// be handed bytes that skipped verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayload(Bytes);

impl VerifiedPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Reasons a signed payload is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("signature header missing")]
    MissingHeader,

    #[error("signature header malformed: {0}")]
    MalformedHeader(&'static str),

    #[error("signature header has no v1 signatures")]
    NoSignatures,

    #[error("timestamp outside tolerance: age {age_seconds}s exceeds {tolerance_seconds}s")]
    TimestampOutsideTolerance {
        age_seconds: u64,
        tolerance_seconds: u64,
    },

    #[error("no signature matched the payload")]
    Mismatch,
}

impl VerificationError {
    /// Short machine-readable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingHeader => "missing_header",
            Self::MalformedHeader(_) => "malformed_header",
            Self::NoSignatures => "no_signatures",
            Self::TimestampOutsideTolerance { .. } => "timestamp_outside_tolerance",
            Self::Mismatch => "mismatch",
        }
    }
}

/// Parsed form of the signature header.
#[derive(Debug)]
struct SignatureHeader {
    timestamp: u64,
    signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    fn parse(raw: &str) -> Result<Self, VerificationError> {
        if raw.trim().is_empty() {
            return Err(VerificationError::MissingHeader);
        }

        let mut timestamp = None;
        let mut signatures = Vec::new();

        for item in raw.split(',') {
            let (key, value) = item
                .trim()
                .split_once('=')
                .ok_or(VerificationError::MalformedHeader("entry without '='"))?;

            match key {
                TIMESTAMP_KEY => {
                    let t = value
                        .parse::<u64>()
                        .map_err(|_| VerificationError::MalformedHeader("invalid timestamp"))?;
                    timestamp = Some(t);
                }
                SIGNATURE_SCHEME => {
                    // Undecodable entries are skipped, the rest may still match.
                    if let Ok(sig) = hex::decode(value) {
                        signatures.push(sig);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(VerificationError::MalformedHeader("missing timestamp"))?;

        if signatures.is_empty() {
            return Err(VerificationError::NoSignatures);
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Verifies provider signatures with a fixed secret and tolerance.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    secret: WebhookSecret,
    tolerance_seconds: u64,
}

impl SignatureVerifier {
    pub fn new(secret: WebhookSecret, tolerance_seconds: u64) -> Self {
        Self {
            secret,
            tolerance_seconds,
        }
    }

    /// Verify `payload` against the raw header value using the system clock.
    pub fn verify(&self, payload: Bytes, header: &str) -> Result<VerifiedPayload, VerificationError> {
        self.verify_at(payload, header, unix_now())
    }

    /// Verify `payload` as if the current time were `now` (Unix seconds).
    pub fn verify_at(
        &self,
        payload: Bytes,
        header: &str,
        now: u64,
    ) -> Result<VerifiedPayload, VerificationError> {
        let result = self.check(&payload, header, now);

        match result {
            Ok(()) => Ok(VerifiedPayload(payload)),
            Err(e) => {
                warn!(
                    reason = e.kind(),
                    payload_length = payload.len(),
                    header_length = header.len(),
                    "stripe_signature_invalid"
                );
                Err(e)
            }
        }
    }

    fn check(&self, payload: &[u8], header: &str, now: u64) -> Result<(), VerificationError> {
        let header = SignatureHeader::parse(header)?;

        // Replay defense, checked before any HMAC work
        let age = now.abs_diff(header.timestamp);
        if age > self.tolerance_seconds {
            return Err(VerificationError::TimestampOutsideTolerance {
                age_seconds: age,
                tolerance_seconds: self.tolerance_seconds,
            });
        }

        let mac = signed_payload_mac(self.secret.as_bytes(), header.timestamp, payload);

        // verify_slice compares in constant time
        let matched = header
            .signatures
            .iter()
            .any(|sig| mac.clone().verify_slice(sig).is_ok());

        if matched {
            Ok(())
        } else {
            Err(VerificationError::Mismatch)
        }
    }
}

/// Build a valid `Stripe-Signature` header for `payload`.
///
/// Handy for replaying captured events against a local server.
pub fn sign_header(payload: &[u8], secret: &[u8], timestamp: u64) -> String {
    let signature = hex::encode(
        signed_payload_mac(secret, timestamp, payload)
            .finalize()
            .into_bytes(),
    );

    format!("{TIMESTAMP_KEY}={timestamp},{SIGNATURE_SCHEME}={signature}")
}

fn signed_payload_mac(secret: &[u8], timestamp: u64, payload: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
