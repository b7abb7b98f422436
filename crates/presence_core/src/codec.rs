//! Signed transport envelope for the daily credential.
//!
//! # Responsibility
//! - Turn `{secret, issue_date}` into a compact, copy-paste friendly string.
//! - Verify that a presented string was produced with the server-held key.
//!
//! # Invariants
//! - Wire format: `pt1.<payload>.<mac>` where `payload` is URL-safe base64
//!   (no padding) of the JSON object `{"secret", "issue_date"}` and `mac` is
//!   URL-safe base64 of HMAC-SHA256 over `pt1.<payload>`.
//! - The MAC is checked, in constant time, before the payload is parsed.
//! - No business rule (date freshness, store contents) is evaluated here.

use crate::clock::IssueDate;
use crate::model::token::TokenSecret;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

const ENVELOPE_VERSION: &str = "pt1";
const MAC_LEN: usize = 32;
/// Minimum accepted signing key length in bytes.
pub const MIN_KEY_BYTES: usize = 32;
/// Upper bound on accepted envelope length; real envelopes are ~170 chars.
const MAX_ENVELOPE_CHARS: usize = 1024;

pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Envelope cannot be parsed.
    Malformed(&'static str),
    /// Envelope parsed but the MAC does not match the server key.
    InvalidSignature,
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(reason) => write!(f, "malformed envelope: {reason}"),
            Self::InvalidSignature => write!(f, "envelope signature does not match"),
        }
    }
}

impl Error for CodecError {}

/// Errors raised while loading a signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningKeyError {
    InvalidHex,
    TooShort { len: usize },
    /// The MAC backend refused the key material.
    Rejected,
}

impl Display for SigningKeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidHex => write!(f, "signing key must be hex encoded"),
            Self::TooShort { len } => write!(
                f,
                "signing key has {len} bytes; at least {MIN_KEY_BYTES} required"
            ),
            Self::Rejected => write!(f, "signing key rejected by HMAC-SHA256"),
        }
    }
}

impl Error for SigningKeyError {}

/// Server-held symmetric key. Never serialized, never printed.
///
/// The keyed HMAC state is built once here, so signing and verifying only
/// clone it.
#[derive(Clone)]
pub struct SigningKey {
    bytes: Vec<u8>,
    keyed: HmacSha256,
}

impl SigningKey {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, SigningKeyError> {
        let bytes = bytes.into();
        if bytes.len() < MIN_KEY_BYTES {
            return Err(SigningKeyError::TooShort { len: bytes.len() });
        }
        let keyed = HmacSha256::new_from_slice(&bytes).map_err(|_| SigningKeyError::Rejected)?;
        Ok(Self { bytes, keyed })
    }

    pub fn from_hex(value: &str) -> Result<Self, SigningKeyError> {
        let bytes = hex::decode(value.trim()).map_err(|_| SigningKeyError::InvalidHex)?;
        Self::from_bytes(bytes)
    }
}

impl PartialEq for SigningKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for SigningKey {}

impl Debug for SigningKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<{} bytes>)", self.bytes.len())
    }
}

/// Claims carried by an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvelopeClaims {
    pub secret: TokenSecret,
    pub issue_date: IssueDate,
}

/// Stateless sign/verify pair over the server key.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    key: Arc<SigningKey>,
}

impl EnvelopeCodec {
    pub fn new(key: SigningKey) -> Self {
        Self { key: Arc::new(key) }
    }

    /// Produces the deterministic envelope for one secret/date pair.
    pub fn sign(&self, secret: &TokenSecret, issue_date: IssueDate) -> String {
        let claims = EnvelopeClaims {
            secret: secret.clone(),
            issue_date,
        };
        // Serializing a struct of a string and a date cannot fail.
        let json = serde_json::to_vec(&claims).unwrap_or_default();
        let signing_input = format!("{ENVELOPE_VERSION}.{}", URL_SAFE_NO_PAD.encode(json));
        let mac = self.mac_for(signing_input.as_bytes()).finalize().into_bytes();
        format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(mac))
    }

    /// Checks the MAC and decodes the claims of a presented envelope.
    ///
    /// # Errors
    /// - `Malformed` when the string does not have the envelope shape or its
    ///   authenticated payload is not a valid claims object.
    /// - `InvalidSignature` when the MAC segment is not the MAC of the rest.
    pub fn verify(&self, envelope: &str) -> CodecResult<EnvelopeClaims> {
        let envelope = envelope.trim();
        if envelope.is_empty() {
            return Err(CodecError::Malformed("empty envelope"));
        }
        if envelope.len() > MAX_ENVELOPE_CHARS {
            return Err(CodecError::Malformed("envelope too long"));
        }

        let mut parts = envelope.split('.');
        let (Some(version), Some(payload), Some(mac), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CodecError::Malformed("expected three dot-separated segments"));
        };
        if version != ENVELOPE_VERSION {
            return Err(CodecError::Malformed("unknown envelope version"));
        }
        if payload.is_empty() {
            return Err(CodecError::Malformed("empty payload segment"));
        }

        // A MAC segment that does not even decode is still a signature failure.
        let mac = URL_SAFE_NO_PAD
            .decode(mac)
            .map_err(|_| CodecError::InvalidSignature)?;
        if mac.len() != MAC_LEN {
            return Err(CodecError::InvalidSignature);
        }

        let signing_input = &envelope[..version.len() + 1 + payload.len()];
        self.mac_for(signing_input.as_bytes())
            .verify_slice(&mac)
            .map_err(|_| CodecError::InvalidSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| CodecError::Malformed("payload is not base64"))?;
        serde_json::from_slice(&json).map_err(|_| CodecError::Malformed("payload is not valid claims"))
    }

    fn mac_for(&self, input: &[u8]) -> HmacSha256 {
        let mut mac = self.key.keyed.clone();
        mac.update(input);
        mac
    }
}
