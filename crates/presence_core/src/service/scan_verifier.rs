//! Scan verification use-case.
//!
//! # Responsibility
//! - Validate a presented envelope against the signing key, the calendar and
//!   the stored credential.
//! - Record attendance for the authenticated caller on success.
//!
//! # Invariants
//! - The clock is read once per scan; the same instant decides freshness and
//!   stamps the record.
//! - Only the stored token of the envelope's own issue date is trusted, and
//!   only while that date is today (or inside the midnight grace window).
//! - No lock is held across verify-then-record; the ledger's unique
//!   constraint is the only serialization point.

use crate::clock::{elapsed_since_midnight, Clock, IssueDate};
use crate::codec::{CodecError, EnvelopeCodec};
use crate::model::attendance::{AttendanceRecord, RecordOutcome, ScanMethod};
use crate::model::principal::Principal;
use crate::repo::attendance_repo::AttendanceRepository;
use crate::repo::token_repo::TokenRepository;
use crate::repo::RepoError;
use crate::service::attendance_recorder::{AttendanceRecorder, RecordError};
use chrono::Duration;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Typed scan rejection.
#[derive(Debug)]
pub enum ScanRejection {
    /// Envelope cannot be parsed.
    Malformed(&'static str),
    /// MAC mismatch; treated as a potential forgery.
    InvalidSignature,
    /// Authentic envelope scoped to another day.
    Expired {
        issue_date: IssueDate,
        today: IssueDate,
    },
    /// Authentic envelope whose secret is not the stored one (rotated or
    /// never stored).
    InvalidCredential,
    /// Caller already checked in for the day. Benign.
    AlreadyRecorded(AttendanceRecord),
    /// Caller identity is unusable.
    InvalidIdentity(String),
    /// Persistence failed; safe to retry.
    StoreUnavailable(RepoError),
}

impl ScanRejection {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::InvalidSignature => "invalid_signature",
            Self::Expired { .. } => "expired",
            Self::InvalidCredential => "invalid_credential",
            Self::AlreadyRecorded(_) => "already_recorded",
            Self::InvalidIdentity(_) => "invalid_identity",
            Self::StoreUnavailable(_) => "store_unavailable",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Expected outcome of a retry or double scan; not a failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::AlreadyRecorded(_))
    }
}

impl Display for ScanRejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(reason) => write!(f, "attendance code is not readable: {reason}"),
            Self::InvalidSignature => write!(f, "attendance code is not authentic"),
            Self::Expired { issue_date, today } => write!(
                f,
                "attendance code was issued for {issue_date}, not today ({today}); scan today's code"
            ),
            Self::InvalidCredential => {
                write!(f, "attendance code has been replaced; scan the current code")
            }
            Self::AlreadyRecorded(record) => write!(
                f,
                "attendance already recorded for {} on {}",
                record.identity_id, record.date
            ),
            Self::InvalidIdentity(value) => write!(f, "invalid identity id: `{value}`"),
            Self::StoreUnavailable(err) => write!(f, "attendance store unavailable: {err}"),
        }
    }
}

impl Error for ScanRejection {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreUnavailable(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CodecError> for ScanRejection {
    fn from(value: CodecError) -> Self {
        match value {
            CodecError::Malformed(reason) => Self::Malformed(reason),
            CodecError::InvalidSignature => Self::InvalidSignature,
        }
    }
}

impl From<RecordError> for ScanRejection {
    fn from(value: RecordError) -> Self {
        match value {
            RecordError::InvalidIdentity(id) => Self::InvalidIdentity(id),
            RecordError::StoreUnavailable(err) => Self::StoreUnavailable(err),
        }
    }
}

impl From<RepoError> for ScanRejection {
    fn from(value: RepoError) -> Self {
        Self::StoreUnavailable(value)
    }
}

/// Successful check-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReceipt {
    pub record: AttendanceRecord,
}

impl ScanReceipt {
    pub fn recorded_at(&self) -> i64 {
        self.record.recorded_at
    }
}

/// Verification service over the token store and the ledger.
pub struct ScanVerifier<T: TokenRepository, A: AttendanceRepository> {
    tokens: T,
    recorder: AttendanceRecorder<A>,
    codec: EnvelopeCodec,
    clock: Arc<dyn Clock>,
    grace: Duration,
}

impl<T: TokenRepository, A: AttendanceRepository> ScanVerifier<T, A> {
    /// Creates a strict verifier (no midnight grace).
    pub fn new(
        tokens: T,
        recorder: AttendanceRecorder<A>,
        codec: EnvelopeCodec,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tokens,
            recorder,
            codec,
            clock,
            grace: Duration::zero(),
        }
    }

    /// Accepts the previous day's envelope for `grace` after local midnight.
    pub fn with_midnight_grace(mut self, grace: Duration) -> Self {
        self.grace = grace.max(Duration::zero());
        self
    }

    /// Verifies `presented` and records attendance for `principal`.
    pub fn scan(
        &self,
        principal: &Principal,
        presented: &str,
        method: ScanMethod,
    ) -> Result<ScanReceipt, ScanRejection> {
        let now = self.clock.now();
        let today = now.date_naive();

        let claims = match self.codec.verify(presented) {
            Ok(claims) => claims,
            Err(err) => return Err(self.reject(principal, err.into())),
        };

        if !self.is_current(claims.issue_date, today, elapsed_since_midnight(now)) {
            return Err(self.reject(
                principal,
                ScanRejection::Expired {
                    issue_date: claims.issue_date,
                    today,
                },
            ));
        }

        let stored = match self.tokens.find_by_date(claims.issue_date) {
            Ok(stored) => stored,
            Err(err) => return Err(self.reject(principal, err.into())),
        };
        if stored.map(|token| token.secret) != Some(claims.secret) {
            return Err(self.reject(principal, ScanRejection::InvalidCredential));
        }

        let outcome = self
            .recorder
            .record_at(
                &principal.id,
                claims.issue_date,
                method,
                now.timestamp_millis(),
            )
            .map_err(|err| self.reject(principal, err.into()))?;

        match outcome {
            RecordOutcome::Recorded(record) => {
                info!(
                    "event=scan module=scan status=ok identity_id={} date={} method={}",
                    record.identity_id,
                    record.date,
                    method.as_str()
                );
                Ok(ScanReceipt { record })
            }
            RecordOutcome::AlreadyRecorded(record) => Err(self.reject(
                principal,
                ScanRejection::AlreadyRecorded(record),
            )),
        }
    }

    fn is_current(&self, issue_date: IssueDate, today: IssueDate, since_midnight: Duration) -> bool {
        if issue_date == today {
            return true;
        }
        today.pred_opt() == Some(issue_date) && since_midnight < self.grace
    }

    fn reject(&self, principal: &Principal, rejection: ScanRejection) -> ScanRejection {
        match &rejection {
            ScanRejection::InvalidSignature => warn!(
                "event=scan module=scan status=rejected reason={} identity_id={} note=potential_forgery",
                rejection.code(),
                principal.id
            ),
            ScanRejection::StoreUnavailable(err) => error!(
                "event=scan module=scan status=error reason={} identity_id={} error={}",
                rejection.code(),
                principal.id,
                err
            ),
            _ => info!(
                "event=scan module=scan status=rejected reason={} identity_id={}",
                rejection.code(),
                principal.id
            ),
        }
        rejection
    }
}
