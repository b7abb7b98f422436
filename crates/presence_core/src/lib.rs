//! Core domain logic for daily presence tokens.
//! This crate is the single source of truth for issuance, scan verification
//! and attendance invariants.

pub mod clock;
pub mod codec;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod scheduler;
pub mod service;

pub use clock::{Clock, IssueDate, ManualClock, SystemClock};
pub use codec::{CodecError, EnvelopeClaims, EnvelopeCodec, SigningKey, SigningKeyError};
pub use config::{ConfigError, PresenceConfig, SIGNING_KEY_ENV};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::attendance::{AttendanceRecord, RecordOutcome, ScanMethod};
pub use model::principal::{IdentityId, Principal, Role};
pub use model::token::{DailyToken, IssuedToken, TokenSecret};
pub use repo::attendance_repo::{
    AttendanceListQuery, AttendanceRepository, SqliteAttendanceRepository,
};
pub use repo::token_repo::{SqliteTokenRepository, TokenRepository};
pub use repo::{RepoError, RepoResult};
pub use scheduler::{DailyScheduler, PollOutcome, RunReport, SchedulerHandle};
pub use service::attendance_recorder::{AttendanceRecorder, RecordError};
pub use service::scan_verifier::{ScanReceipt, ScanRejection, ScanVerifier};
pub use service::token_issuer::{IssueError, TokenIssuer};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
