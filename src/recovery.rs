//! Startup reconciliation after an unclean shutdown.
//!
//! Runs once, before any worker or the dispatcher starts. Nothing can be
//! holding a job, a session, or an event at that point, so anything still
//! marked as held belongs to the previous process:
//!
//! 1. in-flight jobs go back to `queued` with their notes and history intact,
//! 2. `running` sessions are failed with zeroed missing counters,
//! 3. `processing` events are failed and re-enter the backoff schedule.
//!
//! Each step commits on its own. A failing step aborts startup.

use crate::job::adapters::sqlite::requeue_in_flight;
use crate::job::domain::JobId;
use crate::notification::adapters::sqlite::fail_processing_in;
use crate::notification::domain::EventId;
use crate::session::adapters::sqlite::fail_running_in;
use crate::store::{Store, StoreError, UnitOfWork};
use mockable::Clock;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Error stored on sessions that were running when the process died.
pub const SESSION_RECOVERY_MESSAGE: &str = "recovered on startup";

/// Error stored on events that were being delivered when the process died.
pub const EVENT_RECOVERY_MESSAGE: &str = "dispatcher restarted";

/// Recovery step, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStep {
    /// Requeue in-flight jobs.
    RequeueJobs,
    /// Fail running sessions.
    FailSessions,
    /// Fail events left in `processing`.
    FailEvents,
}

impl fmt::Display for RecoveryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RequeueJobs => "requeue in-flight jobs",
            Self::FailSessions => "fail running sessions",
            Self::FailEvents => "fail processing events",
        })
    }
}

/// Fatal recovery failure.
#[derive(Debug, Clone, Error)]
pub enum RecoveryError {
    /// A step could not be committed.
    #[error("crash recovery failed to {step}: {source}")]
    Step {
        /// Step that failed.
        step: RecoveryStep,
        /// Store failure.
        #[source]
        source: StoreError,
    },
}

/// What recovery changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Jobs moved back to `queued`.
    pub requeued_jobs: Vec<JobId>,
    /// Sessions marked failed.
    pub failed_sessions: u64,
    /// Events moved from `processing` to `failed`.
    pub failed_events: Vec<EventId>,
}

impl RecoveryReport {
    /// Returns whether the previous process left nothing behind.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.requeued_jobs.is_empty() && self.failed_sessions == 0 && self.failed_events.is_empty()
    }
}

/// Startup reconciliation sequence.
pub struct CrashRecovery<C>
where
    C: Clock + Send + Sync,
{
    store: Store,
    clock: Arc<C>,
}

impl<C> CrashRecovery<C>
where
    C: Clock + Send + Sync,
{
    /// Creates the recovery sequence over an opened store.
    #[must_use]
    pub const fn new(store: Store, clock: Arc<C>) -> Self {
        Self { store, clock }
    }

    /// Runs every step in order.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Step`] naming the first step that failed.
    /// Steps before it stay committed; running recovery again is safe.
    pub async fn run(&self) -> Result<RecoveryReport, RecoveryError> {
        let now = self.clock.utc();

        let requeued_jobs = self
            .step(RecoveryStep::RequeueJobs, move |uow| requeue_in_flight(uow, now))
            .await?;
        for job_id in &requeued_jobs {
            warn!(job_id = %job_id, "in-flight job requeued after restart");
        }

        let failed_sessions = self
            .step(RecoveryStep::FailSessions, move |uow| {
                fail_running_in(uow, SESSION_RECOVERY_MESSAGE, now)
            })
            .await?;

        let failed_events = self
            .step(RecoveryStep::FailEvents, move |uow| {
                fail_processing_in(uow, EVENT_RECOVERY_MESSAGE, now)
            })
            .await?;

        let report = RecoveryReport {
            requeued_jobs,
            failed_sessions,
            failed_events,
        };
        info!(
            requeued_jobs = report.requeued_jobs.len(),
            failed_sessions = report.failed_sessions,
            failed_events = report.failed_events.len(),
            "crash recovery complete"
        );
        Ok(report)
    }

    async fn step<F, T>(&self, step: RecoveryStep, f: F) -> Result<T, RecoveryError>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        self.store
            .write(f)
            .await
            .map_err(|source| RecoveryError::Step { step, source })
    }
}
