//! Long-running daemon: recovery, worker pool, dispatcher, shutdown.
//!
//! Workers and the dispatcher are independent tokio tasks that coordinate
//! only through the store. A [`Notify`] wakes idle workers early when new
//! work is created; correctness never depends on it, because the database
//! claim is what hands a job to exactly one worker.

use crate::config::{ConfigError, ConveyorConfig};
use crate::job::adapters::sqlite::SqliteJobRepository;
use crate::job::domain::{Job, JobId, JobState};
use crate::job::ports::JobRepositoryError;
use crate::job::services::{JobLifecycleError, JobLifecycleService};
use crate::notification::adapters::sqlite::SqliteNotificationRepository;
use crate::notification::adapters::webhook::WebhookSender;
use crate::notification::ports::{IssueLookup, NotificationSender, SenderSet};
use crate::notification::services::NotificationDispatcher;
use crate::recovery::{CrashRecovery, RecoveryError};
use crate::session::adapters::sqlite::SqliteSessionRepository;
use crate::store::Store;
use async_trait::async_trait;
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Failure reported by a job runner.
#[derive(Debug, Clone, Error)]
#[error("job runner failed: {0}")]
pub struct JobRunnerError(pub String);

/// Drives a claimed job through the pipeline.
///
/// The daemon hands each claimed job, already in `planning`, to the runner
/// and waits for it before claiming again. The runner records progress
/// through [`JobLifecycleService`]; when `shutdown` fires it should stop at
/// the next safe point and leave the job where it is, since recovery
/// requeues it on the next start. An error fails the job if it is still
/// in flight.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Runs one claimed job.
    async fn run(&self, job: Job, shutdown: &CancellationToken) -> Result<(), JobRunnerError>;
}

/// Daemon runtime errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Startup recovery failed.
    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    /// Workers or the dispatcher did not stop within the deadline.
    #[error("shutdown did not finish within {0:?}")]
    ShutdownTimedOut(Duration),
}

/// Lifecycle service type the daemon and its runner share.
pub type DaemonLifecycle<C> = JobLifecycleService<SqliteJobRepository, C>;

/// The assembled daemon.
pub struct Daemon<C>
where
    C: Clock + Send + Sync + 'static,
{
    config: ConveyorConfig,
    store: Store,
    clock: Arc<C>,
    lifecycle: DaemonLifecycle<C>,
    senders: SenderSet,
    runner: Option<Arc<dyn JobRunner>>,
    issue_lookup: Option<Arc<dyn IssueLookup>>,
    wake: Arc<Notify>,
}

impl<C> Daemon<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Assembles a daemon over an opened store.
    ///
    /// Webhook channels from `config` are installed in the sender set.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Config`] when `config` fails validation.
    pub fn new(config: ConveyorConfig, store: Store, clock: Arc<C>) -> Result<Self, DaemonError> {
        config.validate()?;
        let wake = Arc::new(Notify::new());
        let lifecycle = JobLifecycleService::new(
            Arc::new(SqliteJobRepository::new(store.clone())),
            Arc::clone(&clock),
        )
        .with_session_repository(Arc::new(SqliteSessionRepository::new(store.clone())))
        .with_wake(Arc::clone(&wake));

        let client = reqwest::Client::new();
        let webhooks: Vec<Arc<dyn NotificationSender>> = config
            .webhooks
            .iter()
            .map(|hook| {
                Arc::new(WebhookSender::with_client(
                    hook.name.clone(),
                    hook.url.clone(),
                    client.clone(),
                )) as Arc<dyn NotificationSender>
            })
            .collect();

        Ok(Self {
            config,
            store,
            clock,
            lifecycle,
            senders: SenderSet::new(webhooks),
            runner: None,
            issue_lookup: None,
            wake,
        })
    }

    /// Attaches the pipeline runner; without one no workers start.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn JobRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Attaches a fallback issue-title lookup for notifications.
    #[must_use]
    pub fn with_issue_lookup(mut self, lookup: Arc<dyn IssueLookup>) -> Self {
        self.issue_lookup = Some(lookup);
        self
    }

    /// Returns the lifecycle service bound to this daemon's store.
    #[must_use]
    pub fn lifecycle(&self) -> DaemonLifecycle<C> {
        self.lifecycle.clone()
    }

    /// Returns the live sender set.
    #[must_use]
    pub fn senders(&self) -> SenderSet {
        self.senders.clone()
    }

    /// Returns the handle that wakes one idle worker. The daemon's lifecycle
    /// service signals it whenever a job is queued.
    #[must_use]
    pub fn wake_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Runs recovery, then workers and the dispatcher until `shutdown` is
    /// cancelled, then waits for them under the configured deadline.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Recovery`] when startup recovery fails and
    /// [`DaemonError::ShutdownTimedOut`] when tasks outlive the deadline.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), DaemonError> {
        let report = CrashRecovery::new(self.store.clone(), Arc::clone(&self.clock))
            .run()
            .await?;
        if !report.is_clean() {
            warn!(
                requeued_jobs = report.requeued_jobs.len(),
                "previous run ended uncleanly"
            );
        }

        let mut tasks = JoinSet::new();
        self.spawn_dispatcher(&mut tasks, &shutdown);
        self.spawn_workers(&mut tasks, &shutdown);
        info!(tasks = tasks.len(), "daemon running");

        shutdown.cancelled().await;
        info!("shutdown requested");
        self.wake.notify_waiters();

        let deadline = self.config.shutdown_deadline();
        let drained = tokio::time::timeout(deadline, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined {
                    error!(error = %err, "daemon task ended abnormally");
                }
            }
        })
        .await;

        if drained.is_err() {
            tasks.abort_all();
            error!(deadline_secs = deadline.as_secs(), "shutdown deadline exceeded");
            return Err(DaemonError::ShutdownTimedOut(deadline));
        }
        info!("daemon stopped");
        Ok(())
    }

    fn spawn_dispatcher(&self, tasks: &mut JoinSet<()>, shutdown: &CancellationToken) {
        let jobs = Arc::new(SqliteJobRepository::new(self.store.clone()));
        let outbox = Arc::new(SqliteNotificationRepository::new(self.store.clone()));
        let mut dispatcher = NotificationDispatcher::new(
            outbox,
            jobs,
            self.senders.clone(),
            self.config.dispatcher.clone(),
            Arc::clone(&self.clock),
        );
        if let Some(lookup) = &self.issue_lookup {
            dispatcher = dispatcher.with_issue_lookup(Arc::clone(lookup));
        }
        let token = shutdown.clone();
        tasks.spawn(async move { dispatcher.run(token).await });
    }

    fn spawn_workers(&self, tasks: &mut JoinSet<()>, shutdown: &CancellationToken) {
        let Some(runner) = &self.runner else {
            info!("no job runner attached; workers not started");
            return;
        };
        for index in 0..self.config.workers.count {
            let worker = Worker {
                index,
                lifecycle: self.lifecycle.clone(),
                runner: Arc::clone(runner),
                wake: Arc::clone(&self.wake),
                idle_poll: self.config.workers.idle_poll(),
                shutdown: shutdown.clone(),
            };
            tasks.spawn(worker.run());
        }
    }
}

struct Worker<C>
where
    C: Clock + Send + Sync + 'static,
{
    index: usize,
    lifecycle: DaemonLifecycle<C>,
    runner: Arc<dyn JobRunner>,
    wake: Arc<Notify>,
    idle_poll: Duration,
    shutdown: CancellationToken,
}

impl<C> Worker<C>
where
    C: Clock + Send + Sync + 'static,
{
    async fn run(self) {
        info!(worker = self.index, "worker started");
        while !self.shutdown.is_cancelled() {
            match self.lifecycle.claim_job().await {
                Ok(Some(job)) => {
                    self.run_job(job).await;
                    continue;
                }
                Ok(None) => {}
                Err(err) => error!(worker = self.index, error = %err, "job claim failed"),
            }
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = self.wake.notified() => {}
                () = tokio::time::sleep(self.idle_poll) => {}
            }
        }
        info!(worker = self.index, "worker stopped");
    }

    async fn run_job(&self, job: Job) {
        let job_id = job.id();
        info!(worker = self.index, job_id = %job_id, "job claimed");
        if let Err(err) = self.runner.run(job, &self.shutdown).await {
            error!(worker = self.index, job_id = %job_id, error = %err, "job run failed");
            if self.shutdown.is_cancelled() {
                return;
            }
            self.fail_job(job_id, &err).await;
        }
    }

    /// Moves a job whose runner gave up to `failed`, unless it already left
    /// the pipeline.
    async fn fail_job(&self, job_id: JobId, err: &JobRunnerError) {
        let current = match self.lifecycle.find_job(job_id).await {
            Ok(Some(job)) if job.state().is_in_flight() => job,
            Ok(_) => return,
            Err(lookup_err) => {
                error!(job_id = %job_id, error = %lookup_err, "cannot reload failed job");
                return;
            }
        };
        if let Err(record_err) = self.lifecycle.record_error(job_id, err.0.clone()).await {
            warn!(job_id = %job_id, error = %record_err, "cannot record runner error");
        }
        match self
            .lifecycle
            .transition(job_id, current.state(), JobState::Failed)
            .await
        {
            Ok(_) => info!(job_id = %job_id, from = %current.state(), "job failed"),
            Err(JobLifecycleError::Repository(JobRepositoryError::ConcurrentModification {
                actual,
                ..
            })) => debug!(job_id = %job_id, state = %actual, "job moved before it could fail"),
            Err(transition_err) => {
                error!(job_id = %job_id, error = %transition_err, "cannot fail job");
            }
        }
    }
}
