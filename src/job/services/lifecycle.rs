//! Service layer for job creation, claiming, and state changes.

use crate::job::{
    domain::{
        IssueRecord, IssueRef, Job, JobDetail, JobDomainError, JobId, JobState, StateChange,
    },
    ports::{
        JobFilter, JobRepository, JobRepositoryError, RequeueMode, RequeueRequest,
        WorkspaceCleaner,
    },
};
use crate::session::ports::SessionRepository;
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Request payload for recording a tracked issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterIssueRequest {
    provider: String,
    repository: String,
    issue_number: u64,
    project: String,
    title: String,
    eligible: bool,
}

impl RegisterIssueRequest {
    /// Creates an eligible, untitled issue request.
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        repository: impl Into<String>,
        issue_number: u64,
        project: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            repository: repository.into(),
            issue_number,
            project: project.into(),
            title: String::new(),
            eligible: true,
        }
    }

    /// Sets the cached issue title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets whether the issue passes inclusion rules.
    #[must_use]
    pub const fn with_eligible(mut self, eligible: bool) -> Self {
        self.eligible = eligible;
        self
    }
}

/// Request payload for creating a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateJobRequest {
    provider: String,
    repository: String,
    issue_number: u64,
    project: String,
    max_iterations: u32,
}

impl CreateJobRequest {
    /// Default iteration budget.
    pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

    /// Creates a request with the default iteration budget.
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        repository: impl Into<String>,
        issue_number: u64,
        project: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            repository: repository.into(),
            issue_number,
            project: project.into(),
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Sets the iteration budget.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Outcome of cancelling one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationOutcome {
    /// The cancelled job.
    pub job: Job,
    /// Side effects that failed. The cancellation itself stands.
    pub warnings: Vec<String>,
}

/// Outcome of cancelling every cancellable job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkCancellation {
    /// Jobs moved to `cancelled`.
    pub job_ids: Vec<JobId>,
    /// Side effects that failed.
    pub warnings: Vec<String>,
}

/// Service-level errors for job lifecycle operations.
#[derive(Debug, Clone, Error)]
pub enum JobLifecycleError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] JobDomainError),
    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] JobRepositoryError),
}

/// Result type for job lifecycle service operations.
pub type JobLifecycleResult<T> = Result<T, JobLifecycleError>;

/// Job lifecycle orchestration service.
///
/// Every mutation is delegated to the repository, which validates the
/// current state and writes the outbox row in the same transaction. The
/// service adds input validation, timestamps from the injected clock, and
/// best-effort cancellation side effects.
pub struct JobLifecycleService<R, C>
where
    R: JobRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    clock: Arc<C>,
    sessions: Option<Arc<dyn SessionRepository>>,
    workspace_cleaner: Option<Arc<dyn WorkspaceCleaner>>,
    wake: Option<Arc<Notify>>,
}

impl<R, C> Clone for JobLifecycleService<R, C>
where
    R: JobRepository,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            clock: Arc::clone(&self.clock),
            sessions: self.sessions.clone(),
            workspace_cleaner: self.workspace_cleaner.clone(),
            wake: self.wake.clone(),
        }
    }
}

impl<R, C> JobLifecycleService<R, C>
where
    R: JobRepository,
    C: Clock + Send + Sync,
{
    /// Creates a new job lifecycle service.
    #[must_use]
    pub const fn new(repository: Arc<R>, clock: Arc<C>) -> Self {
        Self {
            repository,
            clock,
            sessions: None,
            workspace_cleaner: None,
            wake: None,
        }
    }

    /// Cancels running sessions whenever a job is cancelled.
    #[must_use]
    pub fn with_session_repository(mut self, sessions: Arc<dyn SessionRepository>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Removes workspaces whenever a job is cancelled.
    #[must_use]
    pub fn with_workspace_cleaner(mut self, cleaner: Arc<dyn WorkspaceCleaner>) -> Self {
        self.workspace_cleaner = Some(cleaner);
        self
    }

    /// Wakes one idle worker whenever a job enters the queue.
    #[must_use]
    pub fn with_wake(mut self, wake: Arc<Notify>) -> Self {
        self.wake = Some(wake);
        self
    }

    /// Records or refreshes a tracked issue.
    ///
    /// # Errors
    ///
    /// Returns [`JobLifecycleError`] when the issue reference or project is
    /// invalid or persistence fails.
    pub async fn register_issue(
        &self,
        request: RegisterIssueRequest,
    ) -> JobLifecycleResult<IssueRecord> {
        let issue_ref =
            IssueRef::from_parts(&request.provider, &request.repository, request.issue_number)?;
        let project = request.project.trim();
        if project.is_empty() {
            return Err(JobDomainError::EmptyProjectName.into());
        }

        let record = IssueRecord {
            issue_ref,
            project: project.to_owned(),
            title: request.title,
            eligible: request.eligible,
            updated_at: self.clock.utc(),
        };
        self.repository.upsert_issue(&record).await?;
        Ok(record)
    }

    /// Updates an issue's eligibility. Returns `false` for unknown issues.
    ///
    /// # Errors
    ///
    /// Returns [`JobLifecycleError::Repository`] when persistence fails.
    pub async fn set_issue_eligibility(
        &self,
        issue_ref: &IssueRef,
        eligible: bool,
    ) -> JobLifecycleResult<bool> {
        Ok(self
            .repository
            .set_issue_eligibility(issue_ref, eligible, self.clock.utc())
            .await?)
    }

    /// Creates a queued job for an issue.
    ///
    /// # Errors
    ///
    /// Returns [`JobLifecycleError`] when input validation fails or the issue
    /// already has an active job.
    pub async fn create_job(&self, request: CreateJobRequest) -> JobLifecycleResult<Job> {
        let issue_ref =
            IssueRef::from_parts(&request.provider, &request.repository, request.issue_number)?;
        let job = Job::new_queued(
            issue_ref,
            &request.project,
            request.max_iterations,
            &*self.clock,
        )?;
        self.repository.store(&job).await?;
        info!(job_id = %job.id(), issue = %job.issue_ref(), "job created");
        self.signal_queued();
        Ok(job)
    }

    /// Retrieves a job by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`JobLifecycleError::Repository`] when persistence lookup
    /// fails.
    pub async fn find_job(&self, id: JobId) -> JobLifecycleResult<Option<Job>> {
        Ok(self.repository.find_by_id(id).await?)
    }

    /// Lists jobs matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`JobLifecycleError::Repository`] when persistence lookup
    /// fails.
    pub async fn list_jobs(&self, filter: &JobFilter) -> JobLifecycleResult<Vec<Job>> {
        Ok(self.repository.list(filter).await?)
    }

    /// Retrieves the active job for an issue, if any.
    ///
    /// # Errors
    ///
    /// Returns [`JobLifecycleError::Repository`] when persistence lookup
    /// fails.
    pub async fn find_active_job_for_issue(
        &self,
        issue_ref: &IssueRef,
    ) -> JobLifecycleResult<Option<Job>> {
        Ok(self.repository.find_active_for_issue(issue_ref).await?)
    }

    /// Counts jobs per state.
    ///
    /// # Errors
    ///
    /// Returns [`JobLifecycleError::Repository`] when persistence lookup
    /// fails.
    pub async fn state_counts(&self) -> JobLifecycleResult<Vec<(JobState, u64)>> {
        Ok(self.repository.state_counts().await?)
    }

    /// Claims the oldest queued job of an eligible issue.
    ///
    /// # Errors
    ///
    /// Returns [`JobLifecycleError::Repository`] when persistence fails.
    pub async fn claim_job(&self) -> JobLifecycleResult<Option<Job>> {
        Ok(self.repository.claim_next(self.clock.utc()).await?)
    }

    /// Moves a job from `from` to `to`.
    ///
    /// Re-entering `queued` goes through [`Self::reset_for_retry`] or
    /// [`Self::resume`], which check eligibility and siblings.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidStateTransition`] for edges outside
    /// the transition table, [`JobDomainError::RequeueRequiresRetry`] for
    /// a target of `queued`, and
    /// [`JobRepositoryError::ConcurrentModification`] when the job is no
    /// longer in `from`.
    pub async fn transition(
        &self,
        id: JobId,
        from: JobState,
        to: JobState,
    ) -> JobLifecycleResult<Job> {
        if to == JobState::Queued {
            return Err(JobDomainError::RequeueRequiresRetry { job_id: id, from }.into());
        }
        let change = StateChange::new(id, from, to, self.clock.utc())?;
        let job = self.repository.transition(change).await?;
        debug!(job_id = %id, from = %from, to = %to, "job transitioned");
        Ok(job)
    }

    /// Approves a job if it is still `ready`.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::NotFound`] for unknown jobs.
    pub async fn ensure_approved(&self, id: JobId) -> JobLifecycleResult<bool> {
        Ok(self.repository.ensure_approved(id, self.clock.utc()).await?)
    }

    /// Cancels a job and runs cancellation side effects.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::NotCancellable`] naming the current state
    /// when the job cannot be cancelled, or a repository error when it does
    /// not exist or changed concurrently.
    pub async fn cancel_job(&self, id: JobId) -> JobLifecycleResult<CancellationOutcome> {
        let current = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(JobRepositoryError::NotFound(id))?;
        if !current.state().is_cancellable() {
            return Err(JobDomainError::NotCancellable {
                job_id: id,
                state: current.state(),
            }
            .into());
        }

        let change = StateChange::new(id, current.state(), JobState::Cancelled, self.clock.utc())?;
        let job = self.repository.transition(change).await?;
        info!(job_id = %id, from = %current.state(), "job cancelled");
        let warnings = self.run_cancellation_side_effects(&job).await;
        Ok(CancellationOutcome { job, warnings })
    }

    /// Cancels every cancellable job in one transaction, then runs side
    /// effects for each.
    ///
    /// # Errors
    ///
    /// Returns [`JobLifecycleError::Repository`] when persistence fails.
    pub async fn cancel_all(&self) -> JobLifecycleResult<BulkCancellation> {
        let cancelled = self.repository.cancel_all(self.clock.utc()).await?;
        let mut outcome = BulkCancellation::default();
        for job in &cancelled {
            outcome.job_ids.push(job.id());
            let warnings = self.run_cancellation_side_effects(job).await;
            outcome.warnings.extend(warnings);
        }
        info!(count = outcome.job_ids.len(), "jobs cancelled");
        Ok(outcome)
    }

    /// Requeues a finished job from scratch, replacing its notes.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::NotRequeueable`],
    /// [`JobRepositoryError::IneligibleIssue`], or
    /// [`JobRepositoryError::ActiveSiblingExists`] when a guard refuses.
    pub async fn reset_for_retry(&self, id: JobId, notes: &str) -> JobLifecycleResult<Job> {
        self.requeue(id, RequeueMode::Reset, notes).await
    }

    /// Requeues a finished job keeping its work, appending `notes`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::reset_for_retry`], plus
    /// [`JobRepositoryError::IterationBudgetExhausted`].
    pub async fn resume(&self, id: JobId, notes: &str) -> JobLifecycleResult<Job> {
        self.requeue(id, RequeueMode::Resume, notes).await
    }

    /// Records that the job's PR merged at `at`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::InvalidPrTarget`] when the job is not
    /// approved.
    pub async fn mark_merged(&self, id: JobId, at: DateTime<Utc>) -> JobLifecycleResult<bool> {
        Ok(self.repository.mark_merged(id, at).await?)
    }

    /// Records that the job's PR closed unmerged at `at`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::InvalidPrTarget`] when the job is not
    /// approved.
    pub async fn mark_pr_closed(&self, id: JobId, at: DateTime<Utc>) -> JobLifecycleResult<bool> {
        Ok(self.repository.mark_pr_closed(id, at).await?)
    }

    /// Records the prepared workspace.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::NotFound`] for unknown jobs.
    pub async fn record_workspace(
        &self,
        id: JobId,
        path: impl Into<String>,
        branch: impl Into<String>,
        base_commit: impl Into<String>,
    ) -> JobLifecycleResult<Job> {
        self.record(
            id,
            JobDetail::Workspace {
                path: path.into(),
                branch: branch.into(),
                base_commit: base_commit.into(),
            },
        )
        .await
    }

    /// Records the latest pushed commit.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::NotFound`] for unknown jobs.
    pub async fn record_head_commit(
        &self,
        id: JobId,
        commit: impl Into<String>,
    ) -> JobLifecycleResult<Job> {
        self.record(id, JobDetail::HeadCommit(commit.into())).await
    }

    /// Records the job's PR URL.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::NotFound`] for unknown jobs.
    pub async fn record_pr_url(&self, id: JobId, url: impl Into<String>) -> JobLifecycleResult<Job> {
        self.record(id, JobDetail::PrUrl(url.into())).await
    }

    /// Records a pipeline error without changing state.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::NotFound`] for unknown jobs.
    pub async fn record_error(
        &self,
        id: JobId,
        message: impl Into<String>,
    ) -> JobLifecycleResult<Job> {
        self.record(id, JobDetail::Error(message.into())).await
    }

    /// Replaces the job's notes.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::NotFound`] for unknown jobs.
    pub async fn set_notes(&self, id: JobId, notes: impl Into<String>) -> JobLifecycleResult<Job> {
        self.record(id, JobDetail::Notes(notes.into())).await
    }

    /// Starts the next iteration.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::IterationBudgetExhausted`] when the
    /// budget is spent.
    pub async fn advance_iteration(&self, id: JobId) -> JobLifecycleResult<Job> {
        self.record(id, JobDetail::AdvanceIteration).await
    }

    async fn record(&self, id: JobId, detail: JobDetail) -> JobLifecycleResult<Job> {
        Ok(self
            .repository
            .record_detail(id, detail, self.clock.utc())
            .await?)
    }

    async fn requeue(&self, id: JobId, mode: RequeueMode, notes: &str) -> JobLifecycleResult<Job> {
        let job = self
            .repository
            .requeue(RequeueRequest {
                job_id: id,
                mode,
                notes: notes.to_owned(),
                at: self.clock.utc(),
            })
            .await?;
        info!(job_id = %id, mode = ?mode, iteration = job.iteration(), "job requeued");
        self.signal_queued();
        Ok(job)
    }

    fn signal_queued(&self) {
        if let Some(wake) = &self.wake {
            wake.notify_one();
        }
    }

    async fn run_cancellation_side_effects(&self, job: &Job) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(sessions) = &self.sessions {
            match sessions.cancel_running_for_job(job.id(), self.clock.utc()).await {
                Ok(count) if count > 0 => {
                    debug!(job_id = %job.id(), sessions = count, "running sessions cancelled");
                }
                Ok(_) => {}
                Err(err) => {
                    warnings.push(format!("job {}: cannot cancel sessions: {err}", job.id()));
                }
            }
        }
        let cleaner = self
            .workspace_cleaner
            .as_ref()
            .filter(|_| job.workspace_path().is_some());
        if let Some(workspace_cleaner) = cleaner {
            if let Err(err) = workspace_cleaner.remove_workspace(job).await {
                warnings.push(format!("job {}: {err}", job.id()));
            }
        }
        for warning in &warnings {
            warn!(job_id = %job.id(), warning = %warning, "cancellation side effect failed");
        }
        warnings
    }
}
