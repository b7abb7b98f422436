//! Attendance ledger use-case.
//!
//! # Responsibility
//! - Record one presence event per identity per day, idempotently.
//! - Serve role-scoped ledger listings.
//!
//! # Invariants
//! - Duplicate or concurrent calls for one `(identity_id, date)` produce one
//!   row; every caller sees that row's timestamp.
//! - Employees only ever list their own records.

use crate::clock::{Clock, IssueDate};
use crate::model::attendance::{AttendanceRecord, RecordOutcome, ScanMethod};
use crate::model::principal::Principal;
use crate::repo::attendance_repo::{AttendanceListQuery, AttendanceRepository};
use crate::repo::RepoError;
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

const MAX_IDENTITY_CHARS: usize = 128;

/// Service error for ledger use-cases.
#[derive(Debug)]
pub enum RecordError {
    /// Identity id is empty or too long.
    InvalidIdentity(String),
    /// Persistence failed; safe to retry.
    StoreUnavailable(RepoError),
}

impl RecordError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentity(value) => write!(f, "invalid identity id: `{value}`"),
            Self::StoreUnavailable(err) => write!(f, "attendance store unavailable: {err}"),
        }
    }
}

impl Error for RecordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreUnavailable(err) => Some(err),
            Self::InvalidIdentity(_) => None,
        }
    }
}

impl From<RepoError> for RecordError {
    fn from(value: RepoError) -> Self {
        Self::StoreUnavailable(value)
    }
}

/// Ledger service over an attendance repository.
pub struct AttendanceRecorder<A: AttendanceRepository> {
    repo: A,
    clock: Arc<dyn Clock>,
}

impl<A: AttendanceRepository> AttendanceRecorder<A> {
    pub fn new(repo: A, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Records presence for `identity_id` on `date`, stamped with the clock's
    /// current instant.
    pub fn record_if_absent(
        &self,
        identity_id: &str,
        date: IssueDate,
        method: ScanMethod,
    ) -> Result<RecordOutcome, RecordError> {
        let recorded_at = self.clock.now().timestamp_millis();
        self.record_at(identity_id, date, method, recorded_at)
    }

    /// Same as [`Self::record_if_absent`] with a caller-supplied timestamp, so
    /// a scan can stamp the record with the instant it was verified at.
    pub fn record_at(
        &self,
        identity_id: &str,
        date: IssueDate,
        method: ScanMethod,
        recorded_at: i64,
    ) -> Result<RecordOutcome, RecordError> {
        let identity_id = normalize_identity(identity_id)?;
        let candidate = AttendanceRecord {
            uuid: Uuid::new_v4(),
            identity_id,
            date,
            recorded_at,
            method,
        };

        match self.repo.insert_if_absent(&candidate) {
            Ok(outcome) => {
                info!(
                    "event=attendance_record module=recorder status=ok outcome={} identity_id={} date={} method={}",
                    if outcome.is_new() { "recorded" } else { "already_recorded" },
                    candidate.identity_id,
                    date,
                    method.as_str()
                );
                Ok(outcome)
            }
            Err(err) => {
                error!(
                    "event=attendance_record module=recorder status=error identity_id={} date={} error_code=store_unavailable error={}",
                    candidate.identity_id, date, err
                );
                Err(err.into())
            }
        }
    }

    /// Lists ledger rows visible to `principal`.
    ///
    /// Employees are pinned to their own identity regardless of the
    /// requested `identity_id`; admins may filter freely.
    pub fn list(
        &self,
        principal: &Principal,
        query: &AttendanceListQuery,
    ) -> Result<Vec<AttendanceRecord>, RecordError> {
        let mut scoped = query.clone();
        if !principal.is_admin() {
            scoped.identity_id = Some(principal.id.clone());
        }
        Ok(self.repo.list(&scoped)?)
    }
}

fn normalize_identity(value: &str) -> Result<String, RecordError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_IDENTITY_CHARS {
        return Err(RecordError::InvalidIdentity(value.to_string()));
    }
    Ok(trimmed.to_string())
}
