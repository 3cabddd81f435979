//! Error classification for database calls.
//!
//! Driver failures never leave this layer as raw `sqlx::Error` values. They are
//! mapped onto a closed [`ErrorKind`] using the SQLSTATE code the server reports
//! and wrapped in a [`DbError`] that records which stage of the query failed.

use std::fmt;
use thiserror::Error;

use super::query::BuildError;
use super::storage::QueryContext;

/// SQLSTATE codes recognised by [`classify_sqlstate`].
pub mod sqlstate {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
}

/// Stable classification of a datastore failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UniqueViolation,
    ForeignKeyViolation,
    /// Zero rows where exactly one was expected.
    NotFound,
    Unclassified,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UniqueViolation => "unique_violation",
            ErrorKind::ForeignKeyViolation => "fk_violation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a driver error.
///
/// Only structured fields are inspected (the variant and the SQLSTATE code),
/// never the message text.
pub fn classify(err: &sqlx::Error) -> ErrorKind {
    match err {
        sqlx::Error::RowNotFound => ErrorKind::NotFound,
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| classify_sqlstate(&code))
            .unwrap_or(ErrorKind::Unclassified),
        _ => ErrorKind::Unclassified,
    }
}

/// Classify a raw SQLSTATE code.
pub fn classify_sqlstate(code: &str) -> ErrorKind {
    match code {
        sqlstate::UNIQUE_VIOLATION => ErrorKind::UniqueViolation,
        sqlstate::FOREIGN_KEY_VIOLATION => ErrorKind::ForeignKeyViolation,
        _ => ErrorKind::Unclassified,
    }
}

/// Error returned by every repository call.
#[derive(Debug, Error)]
pub enum DbError {
    /// The query could not be rendered. Always a programming error.
    #[error("failed to build query on {table}: {source}")]
    Construction {
        table: &'static str,
        #[source]
        source: BuildError,
    },
    #[error("query on {} failed ({kind}): {source}", .context.table)]
    Execution {
        kind: ErrorKind,
        #[source]
        source: sqlx::Error,
        context: QueryContext,
    },
    #[error("failed to scan row from {} ({kind}): {source}", .context.table)]
    Scan {
        kind: ErrorKind,
        #[source]
        source: sqlx::Error,
        context: QueryContext,
    },
    /// The caller's context was cancelled or its deadline passed.
    #[error("query on {} cancelled", .context.table)]
    Cancelled { context: QueryContext },
}

impl DbError {
    pub(crate) fn execution(source: sqlx::Error, context: &QueryContext) -> Self {
        DbError::Execution {
            kind: classify(&source),
            source,
            context: context.clone(),
        }
    }

    pub(crate) fn scan(source: sqlx::Error, context: &QueryContext) -> Self {
        DbError::Scan {
            kind: classify(&source),
            source,
            context: context.clone(),
        }
    }

    /// A not-found execution error for a query that matched no rows.
    pub fn not_found(context: &QueryContext) -> Self {
        Self::execution(sqlx::Error::RowNotFound, context)
    }

    /// Classified datastore kind, if the failure came from the datastore.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            DbError::Execution { kind, .. } | DbError::Scan { kind, .. } => Some(*kind),
            DbError::Construction { .. } | DbError::Cancelled { .. } => None,
        }
    }

    pub fn context(&self) -> Option<&QueryContext> {
        match self {
            DbError::Execution { context, .. }
            | DbError::Scan { context, .. }
            | DbError::Cancelled { context } => Some(context),
            DbError::Construction { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(ErrorKind::NotFound)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DbError::Cancelled { .. })
    }
}
