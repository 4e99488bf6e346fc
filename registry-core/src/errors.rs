//! Error taxonomy shared across every datastore crate (§7).
//!
//! Kinds describe *why* an operation failed, not which driver produced the
//! failure. Errors propagate unchanged; nothing in this datastore retries or
//! silently reclassifies an error into another kind.

use thiserror;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The caller expected the row to exist. Only raised by `Delete`,
    /// `Update`, and `Postpone`.
    #[error("not found")]
    NotFound,

    /// Digest parse failure, unknown digest algorithm, or an empty field
    /// where the schema requires non-null.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Same as `InvalidInput`, specialized for digest parsing so callers can
    /// match on it without string comparison.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// Unique-constraint violation on `Create`; the caller should have used
    /// `CreateOrFind`.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transport, ping, or pool-exhaustion failure.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Any other driver error, wrapping the original.
    #[error("statement failed: {0}")]
    StatementFailed(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The transaction is in an unrecoverable state; caller must rollback.
    #[error("transaction aborted")]
    TxAborted,

    /// A `ContentStore` couldn't find the requested path (§6): "missing
    /// repository folder" rather than a genuine I/O failure. The importer
    /// treats this as non-fatal; everything else aborts the run (§7).
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// The importer was asked to import a repository the source content
    /// store has no record of (§4.6 step 7). Non-fatal, like `PathNotFound`.
    #[error("repository unknown: {0}")]
    RepositoryUnknown(String),
}

impl Error {
    pub fn statement_failed<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::StatementFailed(Box::new(e))
    }

    /// Importer-only classification (§4.6 step 7, §7): `PathNotFound` and
    /// `RepositoryUnknown` are demoted to warnings and the current
    /// repository is skipped; every other error aborts the run.
    pub fn is_non_fatal_for_import(&self) -> bool {
        matches!(self, Error::PathNotFound(_) | Error::RepositoryUnknown(_))
    }
}

/// Classifies a driver error into one of §7's kinds. This is the only place
/// such classification happens; everywhere else a `sqlx::Error` is mapped
/// through this `From` impl rather than re-inspected ad hoc.
impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Error::NotFound,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Error::Unavailable(e.to_string())
            }
            sqlx::Error::Database(ref dberr) if dberr.kind() == sqlx::error::ErrorKind::UniqueViolation => {
                Error::Conflict(dberr.to_string())
            }
            other => Error::statement_failed(other),
        }
    }
}

impl From<sea_query::error::Error> for Error {
    fn from(e: sea_query::error::Error) -> Self {
        Error::statement_failed(e)
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Error::statement_failed(e)
    }
}
