//! Shared fixtures for notification tests.

use crate::config::DispatcherConfig;
use crate::job::adapters::sqlite::SqliteJobRepository;
use crate::job::domain::{IssueRecord, IssueRef, Job};
use crate::job::ports::JobRepository;
use crate::notification::adapters::sqlite::SqliteNotificationRepository;
use crate::notification::domain::{EventType, NotificationEvent, NotificationPayload};
use crate::notification::ports::{
    NotificationRepository, NotificationSender, SenderError, SenderSet,
};
use crate::notification::services::NotificationDispatcher;
use crate::test_support::{ManualClock, TempStore, temp_store};
use async_trait::async_trait;
use mockable::Clock;
use rstest::fixture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a fake channel answers.
#[derive(Debug, Clone)]
pub(super) enum Reply {
    Accept,
    Reject(String),
    Hang,
}

/// Channel that records what it was asked to deliver.
#[derive(Debug)]
pub(super) struct FakeSender {
    name: String,
    reply: Reply,
    calls: AtomicUsize,
    delivered: Mutex<Vec<NotificationPayload>>,
}

impl FakeSender {
    pub(super) fn new(name: &str, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            reply,
            calls: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        })
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(super) fn delivered(&self) -> Vec<NotificationPayload> {
        self.delivered.lock().expect("payload lock").clone()
    }
}

#[async_trait]
impl NotificationSender for FakeSender {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), SenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Accept => {
                self.delivered
                    .lock()
                    .expect("payload lock")
                    .push(payload.clone());
                Ok(())
            }
            Reply::Reject(message) => Err(SenderError::Transport(message.clone())),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }
        }
    }
}

pub(super) struct Harness {
    _fixture: TempStore,
    pub(super) clock: Arc<ManualClock>,
    pub(super) outbox: Arc<SqliteNotificationRepository>,
    pub(super) jobs: Arc<SqliteJobRepository>,
}

#[fixture]
pub(super) fn harness() -> Harness {
    let fixture = temp_store();
    let outbox = Arc::new(SqliteNotificationRepository::new(fixture.store.clone()));
    let jobs = Arc::new(SqliteJobRepository::new(fixture.store.clone()));
    Harness {
        _fixture: fixture,
        clock: Arc::new(ManualClock::default()),
        outbox,
        jobs,
    }
}

impl Harness {
    /// Stores a queued job for `acme/widgets#number` with a cached title.
    pub(super) async fn job(&self, number: u64, title: &str) -> Job {
        let issue_ref =
            IssueRef::from_parts("github", "acme/widgets", number).expect("issue reference");
        let job = Job::new_queued(issue_ref.clone(), "widgets", 3, &*self.clock).expect("job");
        self.jobs.store(&job).await.expect("store job");
        self.jobs
            .upsert_issue(&IssueRecord {
                issue_ref,
                project: "widgets".to_owned(),
                title: title.to_owned(),
                eligible: true,
                updated_at: self.clock.utc(),
            })
            .await
            .expect("issue");
        job
    }

    pub(super) async fn enqueue(&self, job: &Job, event_type: EventType) -> NotificationEvent {
        self.outbox
            .enqueue(job.id(), event_type, self.clock.utc())
            .await
            .expect("enqueue")
    }

    pub(super) fn dispatcher(
        &self,
        senders: Vec<Arc<dyn NotificationSender>>,
        config: DispatcherConfig,
    ) -> NotificationDispatcher<ManualClock> {
        NotificationDispatcher::new(
            Arc::clone(&self.outbox) as Arc<dyn NotificationRepository>,
            Arc::clone(&self.jobs) as Arc<dyn JobRepository>,
            SenderSet::new(senders),
            config,
            Arc::clone(&self.clock),
        )
    }
}
