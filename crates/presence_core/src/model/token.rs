//! Daily credential model.
//!
//! # Responsibility
//! - Define the stored form of the day's credential (`DailyToken`).
//! - Generate high-entropy secrets from the OS random source.
//!
//! # Invariants
//! - A `TokenSecret` always carries at least 256 bits of entropy, hex encoded.
//! - Secrets are never rendered by `Debug`; only `expose()` reveals them.

use crate::clock::IssueDate;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// Number of random bytes drawn for each daily secret.
pub const SECRET_BYTES: usize = 32;

/// Validation errors for secret values read from storage or the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretValidationError {
    TooShort { hex_len: usize },
    NotHex,
}

impl Display for SecretValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort { hex_len } => write!(
                f,
                "secret has {hex_len} hex chars; at least {} required",
                SECRET_BYTES * 2
            ),
            Self::NotHex => write!(f, "secret must be lowercase hex"),
        }
    }
}

impl Error for SecretValidationError {}

/// Opaque day-scoped secret trusted by the store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenSecret(String);

impl TokenSecret {
    /// Draws a fresh secret from the operating system RNG.
    pub fn generate() -> Self {
        let mut bytes = [0_u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Validates an externally supplied secret.
    pub fn parse(value: impl Into<String>) -> Result<Self, SecretValidationError> {
        let value = value.into();
        if value.len() < SECRET_BYTES * 2 {
            return Err(SecretValidationError::TooShort {
                hex_len: value.len(),
            });
        }
        if !value
            .bytes()
            .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte))
        {
            return Err(SecretValidationError::NotHex);
        }
        Ok(Self(value))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for TokenSecret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenSecret(<redacted>)")
    }
}

impl TryFrom<String> for TokenSecret {
    type Error = SecretValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TokenSecret> for String {
    fn from(value: TokenSecret) -> Self {
        value.0
    }
}

/// The single credential valid for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyToken {
    /// Authorization scope; not a timestamp.
    pub issue_date: IssueDate,
    pub secret: TokenSecret,
    /// Unix epoch milliseconds. Informational only.
    pub created_at: i64,
}

/// A day's credential together with its signed transport form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: DailyToken,
    /// Signed envelope for QR display or copy-paste distribution.
    pub envelope: String,
    /// Whether this call wrote a new secret (create or rotation).
    pub freshly_issued: bool,
}

impl IssuedToken {
    pub fn issue_date(&self) -> IssueDate {
        self.token.issue_date
    }
}
