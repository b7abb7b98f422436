use presence_core::db::DbError;
use presence_core::{ConfigError, IssueError, RecordError, RepoError, ScanRejection};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Store error: {0}")]
    Repo(#[from] RepoError),

    #[error("{0}")]
    Issue(#[from] IssueError),

    #[error("{0}")]
    Scan(#[from] ScanRejection),

    #[error("{0}")]
    Record(#[from] RecordError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CliError {
    /// Stable machine-readable code for JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Logging(_) => "logging",
            Self::Db(_) | Self::Repo(_) => "store_unavailable",
            Self::Issue(IssueError::Forbidden { .. }) => "forbidden",
            Self::Issue(IssueError::StoreUnavailable(_)) => "store_unavailable",
            Self::Scan(rejection) => rejection.code(),
            Self::Record(RecordError::InvalidIdentity(_)) => "invalid_identity",
            Self::Record(RecordError::StoreUnavailable(_)) => "store_unavailable",
            Self::InvalidInput(_) => "invalid_input",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
