//! Schema versioning and startup migrations.
//!
//! The base schema is created idempotently (`IF NOT EXISTS`). Columns added
//! after the first release are listed in [`ADDITIVE_COLUMNS`] and applied on
//! every startup; a column that already exists is tolerated. Indexes that
//! depend on those columns are created afterwards.

use super::{StoreError, StoreResult, format_timestamp};
use chrono::Utc;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel::sql_types::{Integer, Text};
use diesel::sqlite::SqliteConnection;
use tracing::{debug, info};

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

const BASE_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS issues (
    provider TEXT NOT NULL CHECK (provider IN ('github', 'gitlab')),
    repository TEXT NOT NULL,
    issue_number INTEGER NOT NULL CHECK (issue_number > 0),
    project TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    eligible INTEGER NOT NULL DEFAULT 1 CHECK (eligible IN (0, 1)),
    updated_at TEXT NOT NULL,
    PRIMARY KEY (provider, repository, issue_number)
);

CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY NOT NULL,
    provider TEXT NOT NULL,
    repository TEXT NOT NULL,
    issue_number INTEGER NOT NULL,
    project TEXT NOT NULL,
    state TEXT NOT NULL CHECK (state IN (
        'queued', 'planning', 'implementing', 'reviewing', 'testing',
        'rebasing', 'resolving_conflicts', 'ready', 'approved',
        'rejected', 'failed', 'cancelled'
    )),
    iteration INTEGER NOT NULL DEFAULT 0 CHECK (iteration >= 0),
    max_iterations INTEGER NOT NULL CHECK (max_iterations > 0),
    workspace_path TEXT,
    branch_name TEXT,
    base_commit TEXT,
    notes TEXT NOT NULL DEFAULT '',
    error_message TEXT,
    pr_url TEXT,
    pr_merged_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    FOREIGN KEY (provider, repository, issue_number)
        REFERENCES issues (provider, repository, issue_number)
);

CREATE INDEX IF NOT EXISTS idx_jobs_state_created ON jobs (state, created_at);

CREATE TABLE IF NOT EXISTS notification_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL REFERENCES jobs (id),
    event_type TEXT NOT NULL CHECK (event_type IN (
        'needs-review', 'failed', 'pr-created', 'pr-merged', 'pr-closed', 'cancelled'
    )),
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN (
        'pending', 'processing', 'sent', 'failed', 'skipped'
    )),
    attempts INTEGER NOT NULL DEFAULT 0 CHECK (attempts >= 0),
    last_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notification_events_status
    ON notification_events (status, updated_at);
CREATE INDEX IF NOT EXISTS idx_notification_events_job
    ON notification_events (job_id);

CREATE TABLE IF NOT EXISTS llm_sessions (
    id TEXT PRIMARY KEY NOT NULL,
    job_id TEXT NOT NULL REFERENCES jobs (id),
    iteration INTEGER NOT NULL CHECK (iteration >= 0),
    stage TEXT NOT NULL CHECK (stage IN (
        'planning', 'implementing', 'reviewing', 'testing', 'conflict_resolution'
    )),
    model TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('running', 'completed', 'failed', 'cancelled')),
    input_tokens INTEGER,
    output_tokens INTEGER,
    duration_ms INTEGER,
    error_message TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_llm_sessions_job ON llm_sessions (job_id);
CREATE INDEX IF NOT EXISTS idx_llm_sessions_status ON llm_sessions (status);

CREATE TABLE IF NOT EXISTS artifacts (
    id TEXT PRIMARY KEY NOT NULL,
    job_id TEXT NOT NULL REFERENCES jobs (id),
    iteration INTEGER NOT NULL CHECK (iteration >= 0),
    kind TEXT NOT NULL CHECK (kind IN ('plan', 'diff', 'review', 'test_report', 'log')),
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_artifacts_job ON artifacts (job_id, iteration);
";

/// Columns introduced after version 1, applied on every startup.
const ADDITIVE_COLUMNS: [AdditiveColumn; 2] = [
    AdditiveColumn {
        table: "jobs",
        column: "head_commit",
        definition: "TEXT",
    },
    AdditiveColumn {
        table: "jobs",
        column: "pr_closed_at",
        definition: "TEXT",
    },
];

/// At most one active job per issue. Rejected, failed, and cancelled jobs
/// are fully terminal, as is an approved job whose PR was merged or closed.
const POST_COLUMN_INDEXES: &str = r"
CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_one_active_per_issue
    ON jobs (provider, repository, issue_number)
    WHERE state NOT IN ('rejected', 'failed', 'cancelled')
      AND NOT (state = 'approved' AND (pr_merged_at IS NOT NULL OR pr_closed_at IS NOT NULL));
";

#[derive(Debug, Clone, Copy)]
struct AdditiveColumn {
    table: &'static str,
    column: &'static str,
    definition: &'static str,
}

#[derive(QueryableByName)]
struct VersionRow {
    #[diesel(sql_type = Integer)]
    version: i32,
}

/// Brings the schema up to [`CURRENT_SCHEMA_VERSION`].
pub(super) fn run(connection: &mut SqliteConnection) -> StoreResult<()> {
    connection.immediate_transaction(|transaction| {
        transaction.batch_execute(BASE_SCHEMA)?;
        let found = recorded_version(transaction)?;
        if found > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::SchemaTooNew {
                found,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }

        for column in ADDITIVE_COLUMNS {
            add_column(transaction, column)?;
        }
        transaction.batch_execute(POST_COLUMN_INDEXES)?;

        if found < CURRENT_SCHEMA_VERSION {
            record_version(transaction, CURRENT_SCHEMA_VERSION)?;
            info!(
                from = found,
                to = CURRENT_SCHEMA_VERSION,
                "schema migrated"
            );
        }
        Ok(())
    })
}

/// Returns the recorded schema version, or `0` for a fresh database.
pub(super) fn recorded_version(connection: &mut SqliteConnection) -> StoreResult<i32> {
    let row = diesel::sql_query("SELECT version FROM schema_version WHERE id = 1")
        .get_result::<VersionRow>(connection)
        .optional()?;
    Ok(row.map_or(0, |found| found.version))
}

pub(super) fn record_version(connection: &mut SqliteConnection, version: i32) -> StoreResult<()> {
    diesel::sql_query(concat!(
        "INSERT INTO schema_version (id, version, applied_at) VALUES (1, ?1, ?2) ",
        "ON CONFLICT (id) DO UPDATE SET version = excluded.version, ",
        "applied_at = excluded.applied_at",
    ))
    .bind::<Integer, _>(version)
    .bind::<Text, _>(format_timestamp(Utc::now()))
    .execute(connection)?;
    Ok(())
}

fn add_column(connection: &mut SqliteConnection, column: AdditiveColumn) -> StoreResult<()> {
    let statement = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        column.table, column.column, column.definition
    );
    match connection.batch_execute(&statement) {
        Ok(()) => {
            info!(table = column.table, column = column.column, "column added");
            Ok(())
        }
        Err(err) if is_duplicate_column(&err) => {
            debug!(
                table = column.table,
                column = column.column,
                "column already present"
            );
            Ok(())
        }
        Err(err) => Err(StoreError::from(err)),
    }
}

fn is_duplicate_column(err: &DieselError) -> bool {
    match err {
        DieselError::DatabaseError(_, info) => {
            info.message().contains("duplicate column name")
        }
        _ => false,
    }
}
