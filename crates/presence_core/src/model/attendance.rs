//! Attendance ledger model.
//!
//! # Invariants
//! - `(identity_id, date)` is unique across all records.
//! - `date` comes from the server clock via the verified envelope, never from
//!   client input.
//! - Records are immutable once written.

use crate::clock::IssueDate;
use crate::model::principal::IdentityId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the credential reached the server. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMethod {
    /// QR code decoded by a camera.
    Camera,
    /// Envelope text pasted by hand.
    Manual,
}

impl ScanMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "camera" => Some(Self::Camera),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// One confirmed presence event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub uuid: Uuid,
    pub identity_id: IdentityId,
    pub date: IssueDate,
    /// Unix epoch milliseconds of confirmation.
    pub recorded_at: i64,
    pub method: ScanMethod,
}

/// Result of an idempotent insert into the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// This call created the record.
    Recorded(AttendanceRecord),
    /// A record for the pair already existed; carries the first writer's row.
    AlreadyRecorded(AttendanceRecord),
}

impl RecordOutcome {
    pub fn record(&self) -> &AttendanceRecord {
        match self {
            Self::Recorded(record) | Self::AlreadyRecorded(record) => record,
        }
    }

    pub fn into_record(self) -> AttendanceRecord {
        match self {
            Self::Recorded(record) | Self::AlreadyRecorded(record) => record,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Recorded(_))
    }
}
