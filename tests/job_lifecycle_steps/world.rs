//! Shared world state for job lifecycle BDD scenarios.

use std::sync::Arc;

use conveyor::config::StoreConfig;
use conveyor::job::{
    adapters::sqlite::SqliteJobRepository,
    domain::Job,
    services::{JobLifecycleError, JobLifecycleService},
};
use conveyor::notification::adapters::sqlite::SqliteNotificationRepository;
use conveyor::store::Store;
use mockable::DefaultClock;
use rstest::fixture;
use tempfile::TempDir;

/// Issue coordinates and project recorded by a given step.
#[derive(Debug, Clone)]
pub struct PendingIssue {
    pub provider: String,
    pub repository: String,
    pub issue_number: u64,
    pub project: String,
}

/// Service type used by the BDD world.
pub type TestJobService = JobLifecycleService<SqliteJobRepository, DefaultClock>;

/// Scenario world for job lifecycle behaviour tests.
pub struct JobLifecycleWorld {
    pub service: TestJobService,
    pub outbox: SqliteNotificationRepository,
    pub pending_issue: Option<PendingIssue>,
    pub last_job: Option<Job>,
    pub claimed: Option<Option<Job>>,
    pub last_result: Option<Result<Job, JobLifecycleError>>,
    _dir: TempDir,
}

impl JobLifecycleWorld {
    /// Creates a world over a fresh database.
    ///
    /// # Panics
    ///
    /// Panics if the temporary database cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::open(&StoreConfig {
            path: dir.path().join("lifecycle.db"),
            ..StoreConfig::default()
        })
        .expect("open store");
        let service = JobLifecycleService::new(
            Arc::new(SqliteJobRepository::new(store.clone())),
            Arc::new(DefaultClock),
        );

        Self {
            service,
            outbox: SqliteNotificationRepository::new(store),
            pending_issue: None,
            last_job: None,
            claimed: None,
            last_result: None,
            _dir: dir,
        }
    }

    /// Returns the issue recorded by the scenario.
    ///
    /// # Errors
    ///
    /// Returns an error when no issue has been recorded yet.
    pub fn issue(&self) -> Result<&PendingIssue, eyre::Report> {
        self.pending_issue
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing issue in scenario world"))
    }

    /// Returns the job created by the scenario.
    ///
    /// # Errors
    ///
    /// Returns an error when no job has been created yet.
    pub fn job(&self) -> Result<&Job, eyre::Report> {
        self.last_job
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing job in scenario world"))
    }
}

impl Default for JobLifecycleWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> JobLifecycleWorld {
    JobLifecycleWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

/// Parses a comma-separated list of state names.
///
/// # Errors
///
/// Returns an error naming the first unknown state.
pub fn parse_states(
    path: &str,
) -> Result<Vec<conveyor::job::domain::JobState>, eyre::Report> {
    path.split(',')
        .map(|name| {
            conveyor::job::domain::JobState::try_from(name.trim())
                .map_err(|err| eyre::eyre!("unknown state in scenario: {err}"))
        })
        .collect()
}
