//! Shared test helpers for SQLite integration tests.

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use conveyor::config::{ConveyorConfig, StoreConfig};
use conveyor::job::adapters::sqlite::SqliteJobRepository;
use conveyor::job::domain::{Job, JobState};
use conveyor::job::services::{JobLifecycleResult, JobLifecycleService};
use conveyor::notification::adapters::sqlite::SqliteNotificationRepository;
use conveyor::notification::domain::{EventType, NotificationPayload};
use conveyor::notification::ports::{NotificationSender, SenderError, SenderSet};
use conveyor::notification::services::NotificationDispatcher;
use conveyor::session::adapters::sqlite::SqliteSessionRepository;
use conveyor::store::Store;
use mockable::Clock;
use rstest::fixture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Lifecycle service type used by the integration tests.
pub type TestService = JobLifecycleService<SqliteJobRepository, ManualClock>;

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock fixed at 2026-03-01 09:00 UTC.
    #[must_use]
    pub fn new() -> Self {
        let start = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid start time");
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, delta: TimeDelta) {
        *self.now.lock().expect("clock lock") += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

/// A database in a temporary directory plus the pieces tests wire together.
pub struct TestContext {
    /// Configuration pointing at the temporary database.
    pub config: ConveyorConfig,
    /// Opened store.
    pub store: Store,
    /// Shared manual clock.
    pub clock: Arc<ManualClock>,
    _dir: TempDir,
}

impl TestContext {
    /// Builds a lifecycle service that also cancels sessions.
    #[must_use]
    pub fn service(&self) -> TestService {
        JobLifecycleService::new(
            Arc::new(SqliteJobRepository::new(self.store.clone())),
            Arc::clone(&self.clock),
        )
        .with_session_repository(Arc::new(self.sessions()))
    }

    /// Builds a session repository over the store.
    #[must_use]
    pub fn sessions(&self) -> SqliteSessionRepository {
        SqliteSessionRepository::new(self.store.clone())
    }

    /// Builds an outbox repository over the store.
    #[must_use]
    pub fn outbox(&self) -> SqliteNotificationRepository {
        SqliteNotificationRepository::new(self.store.clone())
    }

    /// Builds a dispatcher delivering to `senders`.
    #[must_use]
    pub fn dispatcher(
        &self,
        senders: Vec<Arc<dyn NotificationSender>>,
    ) -> NotificationDispatcher<ManualClock> {
        NotificationDispatcher::new(
            Arc::new(self.outbox()),
            Arc::new(SqliteJobRepository::new(self.store.clone())),
            SenderSet::new(senders),
            self.config.dispatcher.clone(),
            Arc::clone(&self.clock),
        )
    }

    /// Opens a second store over the same file, as a restarted process would.
    ///
    /// # Panics
    ///
    /// Panics if the store cannot be reopened.
    #[must_use]
    pub fn reopen(&self) -> Store {
        Store::open(&self.config.store).expect("reopen store")
    }
}

/// Provides a fresh database with fast daemon timings.
#[fixture]
pub fn context() -> TestContext {
    let dir = TempDir::new().expect("temp dir");
    let mut config = ConveyorConfig {
        store: StoreConfig {
            path: dir.path().join("conveyor.db"),
            ..StoreConfig::default()
        },
        shutdown_deadline_secs: 5,
        ..ConveyorConfig::default()
    };
    config.workers.count = 2;
    config.workers.idle_poll_ms = 50;
    config.dispatcher.poll_interval_ms = 50;
    config.dispatcher.sender_timeout_ms = 500;
    let store = Store::open(&config.store).expect("open store");
    TestContext {
        config,
        store,
        clock: Arc::new(ManualClock::new()),
        _dir: dir,
    }
}

/// Channel that records every payload it accepts.
#[derive(Debug, Default)]
pub struct RecordingSender {
    received: Mutex<Vec<NotificationPayload>>,
}

impl RecordingSender {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the event types received, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<EventType> {
        self.received
            .lock()
            .expect("recorder lock")
            .iter()
            .map(|payload| payload.event_type)
            .collect()
    }

    /// Returns every payload received.
    #[must_use]
    pub fn payloads(&self) -> Vec<NotificationPayload> {
        self.received.lock().expect("recorder lock").clone()
    }

    /// Waits up to five seconds for `count` deliveries.
    pub async fn wait_for(&self, count: usize) -> bool {
        for _ in 0..250 {
            if self.received.lock().expect("recorder lock").len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), SenderError> {
        self.received
            .lock()
            .expect("recorder lock")
            .push(payload.clone());
        Ok(())
    }
}

/// Pipeline path from `planning` to `ready` through one review round.
pub const TO_READY: [JobState; 4] = [
    JobState::Implementing,
    JobState::Reviewing,
    JobState::Testing,
    JobState::Ready,
];

/// Walks `job` through `path`, each step guarded on the previous state.
///
/// # Errors
///
/// Returns the first refused transition.
pub async fn walk(service: &TestService, job: &Job, path: &[JobState]) -> JobLifecycleResult<Job> {
    let mut current = job.clone();
    for next in path {
        current = service
            .transition(current.id(), current.state(), *next)
            .await?;
    }
    Ok(current)
}
