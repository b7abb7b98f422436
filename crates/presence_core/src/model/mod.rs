//! Domain model for daily credentials and attendance.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep the stored secret and the signed transport envelope as two
//!   separate representations of one daily credential.
//!
//! # Invariants
//! - At most one `DailyToken` exists per `IssueDate`.
//! - At most one `AttendanceRecord` exists per `(identity_id, date)`.

pub mod attendance;
pub mod principal;
pub mod token;
