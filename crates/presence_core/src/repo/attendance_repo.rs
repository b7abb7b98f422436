//! Attendance ledger repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Insert attendance rows idempotently under concurrency.
//! - Serve filtered, paginated ledger reads.
//!
//! # Invariants
//! - `insert_if_absent` is a single `INSERT .. ON CONFLICT DO NOTHING`; the
//!   `UNIQUE (identity_id, attendance_date)` constraint arbitrates races.
//! - A losing insert reports the winner's row, never its own.
//! - List ordering is `attendance_date DESC, recorded_at ASC, uuid ASC`.

use crate::clock::IssueDate;
use crate::model::attendance::{AttendanceRecord, RecordOutcome, ScanMethod};
use crate::repo::{date_to_db, ensure_tables, parse_db_date, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

const LIST_DEFAULT_LIMIT: u32 = 50;
const LIST_LIMIT_MAX: u32 = 500;

const RECORD_SELECT_SQL: &str = "SELECT
    uuid,
    identity_id,
    attendance_date,
    recorded_at,
    method
FROM attendance_records";

/// Filters for ledger reads. All bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceListQuery {
    pub date: Option<IssueDate>,
    pub since: Option<IssueDate>,
    pub until: Option<IssueDate>,
    pub identity_id: Option<String>,
    /// Defaults to 50 and clamps to 500.
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for the attendance ledger.
pub trait AttendanceRepository {
    /// Inserts `record` unless one exists for its `(identity_id, date)`.
    fn insert_if_absent(&self, record: &AttendanceRecord) -> RepoResult<RecordOutcome>;
    fn find(&self, identity_id: &str, date: IssueDate) -> RepoResult<Option<AttendanceRecord>>;
    fn list(&self, query: &AttendanceListQuery) -> RepoResult<Vec<AttendanceRecord>>;
}

/// SQLite-backed attendance repository.
pub struct SqliteAttendanceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAttendanceRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["attendance_records"])?;
        Ok(Self { conn })
    }
}

impl AttendanceRepository for SqliteAttendanceRepository<'_> {
    fn insert_if_absent(&self, record: &AttendanceRecord) -> RepoResult<RecordOutcome> {
        let changed = self.conn.execute(
            "INSERT INTO attendance_records (
                uuid,
                identity_id,
                attendance_date,
                recorded_at,
                method
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (identity_id, attendance_date) DO NOTHING;",
            params![
                record.uuid.to_string(),
                record.identity_id.as_str(),
                date_to_db(record.date),
                record.recorded_at,
                record.method.as_str(),
            ],
        )?;

        if changed == 1 {
            return Ok(RecordOutcome::Recorded(record.clone()));
        }

        // Rows are never deleted, so the conflicting winner must be readable.
        let existing = self
            .find(&record.identity_id, record.date)?
            .ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "insert for ({}, {}) conflicted but no row is visible",
                    record.identity_id, record.date
                ))
            })?;
        Ok(RecordOutcome::AlreadyRecorded(existing))
    }

    fn find(&self, identity_id: &str, date: IssueDate) -> RepoResult<Option<AttendanceRecord>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "{RECORD_SELECT_SQL}
                     WHERE identity_id = ?1
                       AND attendance_date = ?2;"
                ),
                params![identity_id, date_to_db(date)],
                |row| Ok(parse_record_row(row)),
            )
            .optional()?;

        row.transpose()
    }

    fn list(&self, query: &AttendanceListQuery) -> RepoResult<Vec<AttendanceRecord>> {
        let mut sql = format!("{RECORD_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(date) = query.date {
            sql.push_str(" AND attendance_date = ?");
            bind_values.push(Value::Text(date_to_db(date)));
        }
        if let Some(since) = query.since {
            sql.push_str(" AND attendance_date >= ?");
            bind_values.push(Value::Text(date_to_db(since)));
        }
        if let Some(until) = query.until {
            sql.push_str(" AND attendance_date <= ?");
            bind_values.push(Value::Text(date_to_db(until)));
        }
        if let Some(identity_id) = query.identity_id.as_ref() {
            sql.push_str(" AND identity_id = ?");
            bind_values.push(Value::Text(identity_id.clone()));
        }

        sql.push_str(" ORDER BY attendance_date DESC, recorded_at ASC, uuid ASC");
        sql.push_str(" LIMIT ?");
        bind_values.push(Value::Integer(i64::from(normalize_list_limit(query.limit))));
        if query.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(row)?);
        }

        Ok(records)
    }
}

/// Normalizes list limit according to the ledger read contract.
pub fn normalize_list_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => LIST_DEFAULT_LIMIT,
        Some(value) if value > LIST_LIMIT_MAX => LIST_LIMIT_MAX,
        Some(value) => value,
    }
}

fn parse_record_row(row: &Row<'_>) -> RepoResult<AttendanceRecord> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid value `{uuid_text}` in attendance_records.uuid"
        ))
    })?;

    let date_text: String = row.get("attendance_date")?;
    let method_text: String = row.get("method")?;
    let method = ScanMethod::parse(&method_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid method `{method_text}` in attendance_records.method"
        ))
    })?;

    Ok(AttendanceRecord {
        uuid,
        identity_id: row.get("identity_id")?,
        date: parse_db_date(&date_text, "attendance_records.attendance_date")?,
        recorded_at: row.get("recorded_at")?,
        method,
    })
}

#[cfg(test)]
mod tests {
    use super::normalize_list_limit;

    #[test]
    fn list_limit_defaults_and_clamps() {
        assert_eq!(normalize_list_limit(None), 50);
        assert_eq!(normalize_list_limit(Some(0)), 50);
        assert_eq!(normalize_list_limit(Some(7)), 7);
        assert_eq!(normalize_list_limit(Some(10_000)), 500);
    }
}
