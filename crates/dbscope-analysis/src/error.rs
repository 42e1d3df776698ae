//! Error types for database analysis

use crate::types::DatabaseType;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors that abort an analyzer call.
///
/// Problems found *inside* a readable database are not errors: they are
/// reported as findings, warnings or degraded fields on the returned values.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The path does not exist
    #[error("Database file not found: {0}")]
    NotFound(PathBuf),

    /// The path exists but is a directory or special file
    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),

    /// The file header matches no known database signature
    #[error("Unknown database type for file: {0}")]
    UnknownFormat(PathBuf),

    /// A database type was recognised but cannot be analysed
    #[error("Schema analysis for {db_type} is not implemented: {path}")]
    Unsupported { path: PathBuf, db_type: DatabaseType },

    /// The engine refused to open the file
    #[error("Failed to open database {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },

    /// Another connection holds a lock that outlasted the busy timeout
    #[error("Database is locked by another connection: {path}")]
    Locked { path: PathBuf },

    /// A query failed on an open connection
    #[error("Query failed ({context}): {source}")]
    Query {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// The requested table is not part of the schema
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalysisError {
    pub(crate) fn query(context: impl Into<String>, source: sqlx::Error) -> Self {
        AnalysisError::Query {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn locked(path: &Path) -> Self {
        AnalysisError::Locked {
            path: path.to_path_buf(),
        }
    }

    /// True for errors about a single table rather than the whole file
    pub fn is_table_scoped(&self) -> bool {
        match self {
            AnalysisError::TableNotFound(_) => true,
            AnalysisError::Query { source, .. } => !is_lock_contention(source),
            _ => false,
        }
    }

    /// True when the engine reported `SQLITE_BUSY` or `SQLITE_LOCKED`
    pub fn is_locked(&self) -> bool {
        match self {
            AnalysisError::Locked { .. } => true,
            AnalysisError::Open { source, .. } | AnalysisError::Query { source, .. } => {
                is_lock_contention(source)
            }
            _ => false,
        }
    }

    /// Replace engine lock contention with `Locked` for `path`
    pub(crate) fn locked_at(self, path: &Path) -> Self {
        if self.is_locked() {
            AnalysisError::locked(path)
        } else {
            self
        }
    }
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Busy and locked result codes, extended codes included
fn is_lock_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
        _ => false,
    }
}

impl From<AnalysisError> for dbscope_core::Error {
    fn from(err: AnalysisError) -> Self {
        dbscope_core::Error::tool_failed(crate::tool::TOOL_NAME, err)
    }
}
