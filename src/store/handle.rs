//! Connection pool, pragmas, and blocking execution helpers.

use super::{StoreError, StoreResult, UnitOfWork, migrations};
use crate::config::StoreConfig;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::sql_types::Text;
use diesel::sqlite::SqliteConnection;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// SQLite connection pool type used by every adapter.
pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

/// Write-ahead log and shared-memory files SQLite keeps beside the database.
const SIDECAR_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

/// Handle to the embedded database.
///
/// Cheap to clone; every clone shares the same pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Copy)]
struct ConnectionPragmas {
    busy_timeout_ms: u64,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, connection: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        connection
            .batch_execute(&format!(
                "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON; PRAGMA synchronous = FULL;",
                self.busy_timeout_ms
            ))
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

#[derive(QueryableByName)]
struct JournalModeRow {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}

impl Store {
    /// Opens (creating if needed) the database described by `config`.
    ///
    /// Removes orphaned `-wal`/`-shm` sidecars when the main file is absent,
    /// switches the file to write-ahead logging, and applies migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the location cannot be prepared, WAL mode
    /// cannot be enabled, or a migration fails.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let path = config.path.as_path();
        remove_orphaned_sidecars(path)?;
        ensure_parent_directory(path)?;

        let manager = ConnectionManager::<SqliteConnection>::new(path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(Duration::from_millis(config.busy_timeout_ms.max(1000)))
            .connection_customizer(Box::new(ConnectionPragmas {
                busy_timeout_ms: config.busy_timeout_ms,
            }))
            .build(manager)
            .map_err(StoreError::pool)?;

        let mut connection = pool.get().map_err(StoreError::pool)?;
        enable_wal(&mut connection)?;
        migrations::run(&mut connection)?;
        info!(path = %path.display(), "store opened");

        Ok(Self { pool })
    }

    /// Runs a read-only closure on a pooled connection off the async
    /// executor.
    pub(crate) async fn read<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(StoreError::pool)?;
            f(&mut connection)
        })
        .await
        .map_err(|err| E::from(StoreError::Join(err.to_string())))?
    }

    /// Runs `f` inside one `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken up front, so concurrent writers serialize on
    /// SQLite's busy timeout instead of failing with a lock upgrade error.
    /// Returning `Err` from `f` rolls back everything it did.
    pub(crate) async fn write<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + From<diesel::result::Error> + Send + 'static,
    {
        self.read(move |connection| {
            connection.immediate_transaction(|transaction| {
                let mut unit_of_work = UnitOfWork::new(transaction);
                f(&mut unit_of_work)
            })
        })
        .await
    }
}

fn enable_wal(connection: &mut SqliteConnection) -> StoreResult<()> {
    let row = diesel::sql_query("PRAGMA journal_mode = WAL")
        .get_result::<JournalModeRow>(connection)?;
    if !row.journal_mode.eq_ignore_ascii_case("wal") {
        return Err(StoreError::JournalMode(row.journal_mode));
    }
    Ok(())
}

fn ensure_parent_directory(path: &Path) -> StoreResult<()> {
    let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) else {
        return Ok(());
    };
    std::fs::create_dir_all(parent).map_err(|err| StoreError::Location {
        path: parent.to_path_buf(),
        message: err.to_string(),
    })
}

fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Deletes journal sidecars left behind by a database file that no longer
/// exists. SQLite would otherwise replay a stale WAL into a fresh database.
pub(super) fn remove_orphaned_sidecars(path: &Path) -> StoreResult<()> {
    if path.exists() {
        return Ok(());
    }
    for suffix in SIDECAR_SUFFIXES {
        let sidecar = sidecar_path(path, suffix);
        if !sidecar.exists() {
            continue;
        }
        warn!(path = %sidecar.display(), "removing orphaned journal file");
        std::fs::remove_file(&sidecar).map_err(|err| StoreError::Location {
            path: sidecar.clone(),
            message: err.to_string(),
        })?;
    }
    debug!(path = %path.display(), "no database file yet, starting fresh");
    Ok(())
}
