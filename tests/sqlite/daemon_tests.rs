//! Worker pool, dispatcher task, and shutdown deadline.

use crate::sqlite::helpers::{ManualClock, RecordingSender, TO_READY, TestContext, context, walk};
use async_trait::async_trait;
use conveyor::daemon::{Daemon, DaemonError, DaemonLifecycle, JobRunner, JobRunnerError};
use conveyor::job::domain::{Job, JobId, JobState};
use conveyor::job::ports::JobFilter;
use conveyor::config::ConfigError;
use conveyor::job::services::CreateJobRequest;
use conveyor::notification::domain::EventType;
use conveyor::notification::ports::NotificationRepository;
use conveyor::notification::ports::NotificationSender;
use rstest::rstest;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runner that drives every claimed job straight to `ready`.
struct StraightToReady {
    lifecycle: DaemonLifecycle<ManualClock>,
    finished: Mutex<Vec<JobId>>,
}

#[async_trait]
impl JobRunner for StraightToReady {
    async fn run(&self, job: Job, _shutdown: &CancellationToken) -> Result<(), JobRunnerError> {
        let ready = walk(&self.lifecycle, &job, &TO_READY)
            .await
            .map_err(|err| JobRunnerError(err.to_string()))?;
        self.finished
            .lock()
            .map_err(|err| JobRunnerError(err.to_string()))?
            .push(ready.id());
        Ok(())
    }
}

/// Runner that gives up on every job.
#[derive(Default)]
struct GivesUp {
    calls: AtomicUsize,
}

#[async_trait]
impl JobRunner for GivesUp {
    async fn run(&self, _job: Job, _shutdown: &CancellationToken) -> Result<(), JobRunnerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(JobRunnerError("git clone failed".to_owned()))
    }
}

/// Runner that ignores shutdown.
struct Stubborn;

#[async_trait]
impl JobRunner for Stubborn {
    async fn run(&self, _job: Job, _shutdown: &CancellationToken) -> Result<(), JobRunnerError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn daemon_runs_jobs_and_delivers_their_notifications(context: TestContext) {
    let daemon = Daemon::new(
        context.config.clone(),
        context.store.clone(),
        Arc::clone(&context.clock),
    )
    .expect("daemon");
    let lifecycle = daemon.lifecycle();
    let runner = Arc::new(StraightToReady {
        lifecycle: lifecycle.clone(),
        finished: Mutex::new(Vec::new()),
    });
    let recorder = RecordingSender::new();
    daemon
        .senders()
        .replace(vec![Arc::clone(&recorder) as Arc<dyn NotificationSender>])
        .await;
    let wake = daemon.wake_handle();
    let configured = daemon.with_runner(Arc::clone(&runner) as Arc<dyn JobRunner>);

    let shutdown = CancellationToken::new();
    let running = tokio::spawn(configured.run(shutdown.clone()));

    let mut created = Vec::new();
    for number in [1, 2, 3] {
        let job = lifecycle
            .create_job(CreateJobRequest::new("github", "acme/widgets", number, "widgets"))
            .await
            .expect("job");
        created.push(job.id());
        wake.notify_one();
    }

    assert!(recorder.wait_for(3).await, "notifications were not delivered");
    shutdown.cancel();
    running
        .await
        .expect("daemon task")
        .expect("clean shutdown");

    let mut finished = runner.finished.lock().expect("finished lock").clone();
    finished.sort();
    created.sort();
    assert_eq!(finished, created);
    assert_eq!(recorder.event_types(), vec![EventType::NeedsReview; 3]);
    for id in created {
        let job = lifecycle.find_job(id).await.expect("find").expect("job");
        assert_eq!(job.state(), JobState::Ready);
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn daemon_recovers_in_flight_jobs_before_claiming(context: TestContext) {
    let service = context.service();
    let job = service
        .create_job(CreateJobRequest::new("github", "acme/widgets", 9, "widgets"))
        .await
        .expect("job");
    service.claim_job().await.expect("claim").expect("job");

    let daemon = Daemon::new(
        context.config.clone(),
        context.store.clone(),
        Arc::clone(&context.clock),
    )
    .expect("daemon");
    let runner = Arc::new(StraightToReady {
        lifecycle: daemon.lifecycle(),
        finished: Mutex::new(Vec::new()),
    });
    let configured = daemon.with_runner(Arc::clone(&runner) as Arc<dyn JobRunner>);
    let shutdown = CancellationToken::new();
    let running = tokio::spawn(configured.run(shutdown.clone()));

    let mut reached_ready = false;
    for _ in 0..250 {
        let current = service.find_job(job.id()).await.expect("find").expect("job");
        if current.state() == JobState::Ready {
            reached_ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    shutdown.cancel();
    running.await.expect("daemon task").expect("clean shutdown");

    assert!(reached_ready, "recovered job was never picked up");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn daemon_without_runner_only_dispatches(context: TestContext) {
    let service = context.service();
    let job = service
        .create_job(CreateJobRequest::new("github", "acme/widgets", 12, "widgets"))
        .await
        .expect("job");

    let daemon = Daemon::new(
        context.config.clone(),
        context.store.clone(),
        Arc::clone(&context.clock),
    )
    .expect("daemon");
    let shutdown = CancellationToken::new();
    let running = tokio::spawn(daemon.run(shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.cancel();
    running.await.expect("daemon task").expect("clean shutdown");

    let untouched = service.find_job(job.id()).await.expect("find").expect("job");
    assert_eq!(untouched.state(), JobState::Queued);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn shutdown_deadline_aborts_stuck_workers(mut context: TestContext) {
    context.config.shutdown_deadline_secs = 1;
    let service = context.service();
    service
        .create_job(CreateJobRequest::new("github", "acme/widgets", 13, "widgets"))
        .await
        .expect("job");

    let daemon = Daemon::new(
        context.config.clone(),
        context.store.clone(),
        Arc::clone(&context.clock),
    )
    .expect("daemon")
    .with_runner(Arc::new(Stubborn));
    let shutdown = CancellationToken::new();
    let running = tokio::spawn(daemon.run(shutdown.clone()));

    let mut claimed = false;
    for _ in 0..250 {
        let jobs = service
            .list_jobs(&JobFilter {
                states: vec![JobState::Planning],
                ..Default::default()
            })
            .await
            .expect("list");
        if !jobs.is_empty() {
            claimed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(claimed, "job was never claimed");
    shutdown.cancel();

    let result = running.await.expect("daemon task");
    assert!(matches!(
        result,
        Err(DaemonError::ShutdownTimedOut(deadline)) if deadline == Duration::from_secs(1)
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn runner_error_fails_the_job_and_notifies(context: TestContext) {
    let daemon = Daemon::new(
        context.config.clone(),
        context.store.clone(),
        Arc::clone(&context.clock),
    )
    .expect("daemon");
    let lifecycle = daemon.lifecycle();
    let runner = Arc::new(GivesUp::default());
    let configured = daemon.with_runner(Arc::clone(&runner) as Arc<dyn JobRunner>);
    let shutdown = CancellationToken::new();
    let running = tokio::spawn(configured.run(shutdown.clone()));

    let job = lifecycle
        .create_job(CreateJobRequest::new("github", "acme/widgets", 14, "widgets"))
        .await
        .expect("job");

    let mut failed = None;
    for _ in 0..250 {
        let current = lifecycle.find_job(job.id()).await.expect("find").expect("job");
        if current.state() == JobState::Failed {
            failed = Some(current);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    shutdown.cancel();
    running.await.expect("daemon task").expect("clean shutdown");

    let failed_job = failed.expect("job never failed after its runner gave up");
    assert_eq!(failed_job.error_message(), Some("git clone failed"));
    assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    let events = context.outbox().list_for_job(job.id()).await.expect("events");
    assert!(
        events
            .iter()
            .any(|event| event.event_type == EventType::Failed),
        "no failed notification among {events:?}"
    );
    assert!(lifecycle.claim_job().await.expect("claim").is_none());
}

#[rstest]
fn zero_cleanup_interval_is_refused(mut context: TestContext) {
    context.config.dispatcher.cleanup_interval_secs = 0;

    let result = Daemon::new(
        context.config.clone(),
        context.store.clone(),
        Arc::clone(&context.clock),
    );

    assert!(matches!(
        result,
        Err(DaemonError::Config(ConfigError::Invalid {
            field: "dispatcher.cleanup_interval_secs",
            ..
        }))
    ));
}
