//! Daily token repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the single active credential per calendar date.
//! - Provide the atomic overwrite used by forced rotation.
//!
//! # Invariants
//! - `daily_tokens.issue_date` is the primary key, so two rows for one date
//!   cannot coexist even across processes.
//! - `replace` is one upsert statement; a later `find_by_date` on any
//!   connection observes it once it returns.
//! - Concurrent `replace` calls resolve as last writer wins.

use crate::clock::IssueDate;
use crate::model::token::{DailyToken, TokenSecret};
use crate::repo::{date_to_db, ensure_tables, parse_db_date, RepoError, RepoResult};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Repository interface for the daily credential store.
pub trait TokenRepository {
    /// Point lookup with no side effects.
    fn find_by_date(&self, date: IssueDate) -> RepoResult<Option<DailyToken>>;
    /// Inserts the first token for `date`; `Conflict` when one already exists.
    fn create(
        &self,
        date: IssueDate,
        secret: &TokenSecret,
        created_at: i64,
    ) -> RepoResult<DailyToken>;
    /// Atomically writes `secret` as the token for `date`, overwriting any
    /// previous one.
    fn replace(
        &self,
        date: IssueDate,
        secret: &TokenSecret,
        created_at: i64,
    ) -> RepoResult<DailyToken>;
}

/// SQLite-backed token repository.
pub struct SqliteTokenRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTokenRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["daily_tokens"])?;
        Ok(Self { conn })
    }
}

impl TokenRepository for SqliteTokenRepository<'_> {
    fn find_by_date(&self, date: IssueDate) -> RepoResult<Option<DailyToken>> {
        let row = self
            .conn
            .query_row(
                "SELECT issue_date, secret, created_at
                 FROM daily_tokens
                 WHERE issue_date = ?1;",
                [date_to_db(date)],
                |row| Ok(parse_token_row(row)),
            )
            .optional()?;

        row.transpose()
    }

    fn create(
        &self,
        date: IssueDate,
        secret: &TokenSecret,
        created_at: i64,
    ) -> RepoResult<DailyToken> {
        let result = self.conn.execute(
            "INSERT INTO daily_tokens (issue_date, secret, created_at)
             VALUES (?1, ?2, ?3);",
            params![date_to_db(date), secret.expose(), created_at],
        );

        match result {
            Ok(_) => {
                debug!("event=token_store_create module=repo status=ok issue_date={date}");
                Ok(DailyToken {
                    issue_date: date,
                    secret: secret.clone(),
                    created_at,
                })
            }
            Err(err) => {
                let err = RepoError::from(err);
                if is_constraint_violation(&err) {
                    return Err(RepoError::Conflict(date));
                }
                Err(err)
            }
        }
    }

    fn replace(
        &self,
        date: IssueDate,
        secret: &TokenSecret,
        created_at: i64,
    ) -> RepoResult<DailyToken> {
        self.conn.execute(
            "INSERT INTO daily_tokens (issue_date, secret, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (issue_date) DO UPDATE SET
                secret = excluded.secret,
                created_at = excluded.created_at;",
            params![date_to_db(date), secret.expose(), created_at],
        )?;
        debug!("event=token_store_replace module=repo status=ok issue_date={date}");

        Ok(DailyToken {
            issue_date: date,
            secret: secret.clone(),
            created_at,
        })
    }
}

fn is_constraint_violation(err: &RepoError) -> bool {
    matches!(err, RepoError::Db(db) if db.is_constraint_violation())
}

fn parse_token_row(row: &Row<'_>) -> RepoResult<DailyToken> {
    let date_text: String = row.get("issue_date")?;
    let secret_text: String = row.get("secret")?;
    Ok(DailyToken {
        issue_date: parse_db_date(&date_text, "daily_tokens.issue_date")?,
        secret: TokenSecret::parse(secret_text)?,
        created_at: row.get("created_at")?,
    })
}
