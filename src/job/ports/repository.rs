//! Repository port for job persistence and atomic state changes.

use crate::job::domain::{IssueRecord, IssueRef, Job, JobDetail, JobId, JobState, StateChange};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for job repository operations.
pub type JobRepositoryResult<T> = Result<T, JobRepositoryError>;

/// Filter for listing jobs. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    /// Restrict to these states.
    pub states: Vec<JobState>,
    /// Restrict to one project.
    pub project: Option<String>,
    /// Maximum number of rows, newest first.
    pub limit: Option<u32>,
}

/// How a finished job re-enters the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueMode {
    /// Start from scratch: iteration, workspace, branch, commits, error, and
    /// PR fields are cleared and notes are replaced.
    Reset,
    /// Continue from the existing workspace: only the error is cleared and
    /// notes are appended. Refused once the iteration budget is spent.
    Resume,
}

/// Parameters for [`JobRepository::requeue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequeueRequest {
    /// Job to requeue.
    pub job_id: JobId,
    /// Reset or resume.
    pub mode: RequeueMode,
    /// Notes to store.
    pub notes: String,
    /// Timestamp of the change.
    pub at: DateTime<Utc>,
}

/// Job persistence contract.
///
/// Every method that changes a job's state runs in one store transaction
/// together with the notification it triggers.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Inserts or refreshes a tracked issue.
    async fn upsert_issue(&self, issue: &IssueRecord) -> JobRepositoryResult<()>;

    /// Flips an issue's eligibility. Returns `false` if the issue is unknown.
    async fn set_issue_eligibility(
        &self,
        issue_ref: &IssueRef,
        eligible: bool,
        at: DateTime<Utc>,
    ) -> JobRepositoryResult<bool>;

    /// Finds a tracked issue.
    async fn find_issue(&self, issue_ref: &IssueRef) -> JobRepositoryResult<Option<IssueRecord>>;

    /// Stores a new queued job, registering its issue if unseen.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::DuplicateActiveJob`] when the issue
    /// already has an active job.
    async fn store(&self, job: &Job) -> JobRepositoryResult<()>;

    /// Finds a job by identifier.
    async fn find_by_id(&self, id: JobId) -> JobRepositoryResult<Option<Job>>;

    /// Finds the active job for an issue, if any.
    async fn find_active_for_issue(&self, issue_ref: &IssueRef)
    -> JobRepositoryResult<Option<Job>>;

    /// Lists jobs matching `filter`, newest first.
    async fn list(&self, filter: &JobFilter) -> JobRepositoryResult<Vec<Job>>;

    /// Counts jobs per state. States with no jobs are omitted.
    async fn state_counts(&self) -> JobRepositoryResult<Vec<(JobState, u64)>>;

    /// Atomically moves the oldest queued job of an eligible issue to
    /// `planning`. Returns `None` when nothing is eligible.
    async fn claim_next(&self, at: DateTime<Utc>) -> JobRepositoryResult<Option<Job>>;

    /// Applies a validated state change guarded by the expected current
    /// state, enqueuing the entry notification in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::ConcurrentModification`] when the job is
    /// no longer in `change.from()`.
    async fn transition(&self, change: StateChange) -> JobRepositoryResult<Job>;

    /// Moves a `ready` job to `approved`. Returns `false` without error if the
    /// job already left `ready`.
    async fn ensure_approved(&self, id: JobId, at: DateTime<Utc>) -> JobRepositoryResult<bool>;

    /// Cancels every job in a cancellable state. Returns the cancelled jobs.
    async fn cancel_all(&self, at: DateTime<Utc>) -> JobRepositoryResult<Vec<Job>>;

    /// Moves a failed, rejected, or cancelled job back to `queued`.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::NotRequeueable`],
    /// [`JobRepositoryError::IneligibleIssue`],
    /// [`JobRepositoryError::ActiveSiblingExists`], or
    /// [`JobRepositoryError::IterationBudgetExhausted`] naming the cause.
    async fn requeue(&self, request: RequeueRequest) -> JobRepositoryResult<Job>;

    /// Records the PR merge. Returns `false` if it was already recorded.
    async fn mark_merged(&self, id: JobId, at: DateTime<Utc>) -> JobRepositoryResult<bool>;

    /// Records the PR closing unmerged. Returns `false` if already recorded.
    async fn mark_pr_closed(&self, id: JobId, at: DateTime<Utc>) -> JobRepositoryResult<bool>;

    /// Applies pipeline bookkeeping without touching the state.
    async fn record_detail(
        &self,
        id: JobId,
        detail: JobDetail,
        at: DateTime<Utc>,
    ) -> JobRepositoryResult<Job>;
}

/// Errors returned by job repository implementations.
#[derive(Debug, Clone, Error)]
pub enum JobRepositoryError {
    /// The issue already has an active job.
    #[error("issue {0} already has an active job")]
    DuplicateActiveJob(IssueRef),

    /// The job was not found.
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// The guarded update matched no row: another actor moved the job.
    #[error("job {job_id} was modified concurrently: expected state {expected}, found {actual}")]
    ConcurrentModification {
        /// Job targeted by the change.
        job_id: JobId,
        /// State the caller expected.
        expected: JobState,
        /// State found after the guard failed.
        actual: JobState,
    },

    /// Reset or resume was requested for a job in the wrong state.
    #[error("job {job_id} cannot be requeued from state {state}")]
    NotRequeueable {
        /// Job targeted.
        job_id: JobId,
        /// State the job is in.
        state: JobState,
    },

    /// The owning issue no longer passes inclusion rules.
    #[error("issue {0} is not eligible for processing")]
    IneligibleIssue(IssueRef),

    /// Another job for the same issue is still active.
    #[error("job {sibling_id} for issue {issue_ref} is still active in state {sibling_state}")]
    ActiveSiblingExists {
        /// Issue shared by both jobs.
        issue_ref: IssueRef,
        /// The active sibling.
        sibling_id: JobId,
        /// Sibling's state.
        sibling_state: JobState,
    },

    /// Resume or iteration advance would exceed the iteration budget.
    #[error("job {job_id} has used {iteration} of {max_iterations} iterations")]
    IterationBudgetExhausted {
        /// Job targeted.
        job_id: JobId,
        /// Current iteration.
        iteration: u32,
        /// Budget.
        max_iterations: u32,
    },

    /// A merge or close was recorded for a job that is not approved.
    #[error("job {job_id} has no approved PR to update (state {state})")]
    InvalidPrTarget {
        /// Job targeted.
        job_id: JobId,
        /// State the job is in.
        state: JobState,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl JobRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
