//! Error types for store setup and access.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned while opening or using the embedded store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The database location could not be prepared.
    #[error("cannot prepare database location {path}: {message}")]
    Location {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O failure.
        message: String,
    },

    /// SQLite refused to switch the database into write-ahead logging.
    #[error("journal mode is '{0}', expected 'wal'")]
    JournalMode(String),

    /// The database was written by a newer schema than this build knows.
    #[error("schema version {found} is newer than supported version {supported}")]
    SchemaTooNew {
        /// Version recorded in the database.
        found: i32,
        /// Highest version this build can migrate to.
        supported: i32,
    },

    /// A pooled connection could not be obtained.
    #[error("connection pool error: {0}")]
    Pool(Arc<dyn std::error::Error + Send + Sync>),

    /// A statement failed.
    #[error("database error: {0}")]
    Database(Arc<dyn std::error::Error + Send + Sync>),

    /// A persisted value could not be decoded into its domain type.
    #[error("corrupt row in {table}: {message}")]
    CorruptRow {
        /// Table holding the row.
        table: &'static str,
        /// Decoding failure.
        message: String,
    },

    /// The blocking database task panicked or was cancelled.
    #[error("blocking database task failed: {0}")]
    Join(String),
}

impl StoreError {
    /// Wraps a pool acquisition error.
    pub fn pool(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Pool(Arc::new(err))
    }

    /// Wraps a statement error.
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Database(Arc::new(err))
    }

    /// Builds a decoding error for the given table.
    pub fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        Self::CorruptRow {
            table,
            message: message.into(),
        }
    }
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        Self::database(err)
    }
}
