//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for tokens and
//!   attendance.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Uniqueness (`one token per date`, `one record per identity per date`) is
//!   enforced by schema constraints, never by a read-then-write check.
//! - Repository APIs return semantic errors (`Conflict`) in addition to DB
//!   transport errors.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::clock::IssueDate;
use crate::db::DbError;
use crate::model::token::SecretValidationError;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod attendance_repo;
pub mod token_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by token and attendance persistence.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// A token already exists for the date; rotation must use `replace`.
    Conflict(IssueDate),
    InvalidData(String),
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Conflict(date) => write!(f, "token already exists for {date}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "required table `{table}` is missing; run migrations first")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Conflict(_) | Self::InvalidData(_) | Self::MissingRequiredTable(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<SecretValidationError> for RepoError {
    fn from(value: SecretValidationError) -> Self {
        Self::InvalidData(value.to_string())
    }
}

pub(crate) fn ensure_tables(conn: &Connection, tables: &[&'static str]) -> RepoResult<()> {
    for table in tables {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [*table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingRequiredTable(*table));
        }
    }
    Ok(())
}

pub(crate) fn date_to_db(date: IssueDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_db_date(value: &str, column: &str) -> RepoResult<IssueDate> {
    IssueDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| RepoError::InvalidData(format!("invalid date `{value}` in {column}")))
}
