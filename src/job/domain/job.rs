//! Job snapshot and pipeline bookkeeping updates.

use super::{IssueRef, JobDomainError, JobId, JobState};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// A job as read from the store.
///
/// Jobs are never mutated in memory: every change goes through the store so
/// that concurrent workers observe one linear history. A `Job` is the
/// snapshot returned by the operation that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    issue_ref: IssueRef,
    project: String,
    state: JobState,
    iteration: u32,
    max_iterations: u32,
    workspace_path: Option<String>,
    branch_name: Option<String>,
    base_commit: Option<String>,
    head_commit: Option<String>,
    notes: String,
    error_message: Option<String>,
    pr_url: Option<String>,
    pr_merged_at: Option<DateTime<Utc>>,
    pr_closed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedJobData {
    /// Job identifier.
    pub id: JobId,
    /// Owning issue.
    pub issue_ref: IssueRef,
    /// Project name.
    pub project: String,
    /// Lifecycle state.
    pub state: JobState,
    /// Current iteration.
    pub iteration: u32,
    /// Iteration budget.
    pub max_iterations: u32,
    /// Workspace directory.
    pub workspace_path: Option<String>,
    /// Working branch.
    pub branch_name: Option<String>,
    /// Commit the branch was cut from.
    pub base_commit: Option<String>,
    /// Latest pushed commit.
    pub head_commit: Option<String>,
    /// Notes.
    pub notes: String,
    /// Last error.
    pub error_message: Option<String>,
    /// PR URL.
    pub pr_url: Option<String>,
    /// PR merge timestamp.
    pub pr_merged_at: Option<DateTime<Utc>>,
    /// PR close timestamp.
    pub pr_closed_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Last claim timestamp.
    pub started_at: Option<DateTime<Utc>>,
    /// Last attempt end timestamp.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Bookkeeping written by the pipeline collaborator. None of these change
/// the job's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobDetail {
    /// Workspace prepared for the job.
    Workspace {
        /// Workspace directory.
        path: String,
        /// Working branch.
        branch: String,
        /// Commit the branch was cut from.
        base_commit: String,
    },
    /// Latest commit pushed to the working branch.
    HeadCommit(String),
    /// Pull or merge request opened for the job.
    PrUrl(String),
    /// Error observed by the pipeline.
    Error(String),
    /// Replacement notes.
    Notes(String),
    /// Start the next iteration; refused past the budget.
    AdvanceIteration,
}

impl Job {
    /// Creates a new queued job for `issue_ref`.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::EmptyProjectName`] for a blank project and
    /// [`JobDomainError::InvalidMaxIterations`] for a zero budget or one that
    /// does not fit the schema.
    pub fn new_queued(
        issue_ref: IssueRef,
        project: &str,
        max_iterations: u32,
        clock: &impl Clock,
    ) -> Result<Self, JobDomainError> {
        let normalized_project = project.trim();
        if normalized_project.is_empty() {
            return Err(JobDomainError::EmptyProjectName);
        }
        if max_iterations == 0 || i32::try_from(max_iterations).is_err() {
            return Err(JobDomainError::InvalidMaxIterations(max_iterations));
        }

        let timestamp = clock.utc();
        Ok(Self {
            id: JobId::new(),
            issue_ref,
            project: normalized_project.to_owned(),
            state: JobState::Queued,
            iteration: 0,
            max_iterations,
            workspace_path: None,
            branch_name: None,
            base_commit: None,
            head_commit: None,
            notes: String::new(),
            error_message: None,
            pr_url: None,
            pr_merged_at: None,
            pr_closed_at: None,
            created_at: timestamp,
            updated_at: timestamp,
            started_at: None,
            completed_at: None,
        })
    }

    /// Reconstructs a job from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedJobData) -> Self {
        Self {
            id: data.id,
            issue_ref: data.issue_ref,
            project: data.project,
            state: data.state,
            iteration: data.iteration,
            max_iterations: data.max_iterations,
            workspace_path: data.workspace_path,
            branch_name: data.branch_name,
            base_commit: data.base_commit,
            head_commit: data.head_commit,
            notes: data.notes,
            error_message: data.error_message,
            pr_url: data.pr_url,
            pr_merged_at: data.pr_merged_at,
            pr_closed_at: data.pr_closed_at,
            created_at: data.created_at,
            updated_at: data.updated_at,
            started_at: data.started_at,
            completed_at: data.completed_at,
        }
    }

    /// Returns the job identifier.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// Returns the owning issue.
    #[must_use]
    pub const fn issue_ref(&self) -> &IssueRef {
        &self.issue_ref
    }

    /// Returns the project name.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> JobState {
        self.state
    }

    /// Returns the current iteration.
    #[must_use]
    pub const fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Returns the iteration budget.
    #[must_use]
    pub const fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Returns the workspace directory, if prepared.
    #[must_use]
    pub fn workspace_path(&self) -> Option<&str> {
        self.workspace_path.as_deref()
    }

    /// Returns the working branch, if created.
    #[must_use]
    pub fn branch_name(&self) -> Option<&str> {
        self.branch_name.as_deref()
    }

    /// Returns the commit the branch was cut from.
    #[must_use]
    pub fn base_commit(&self) -> Option<&str> {
        self.base_commit.as_deref()
    }

    /// Returns the latest pushed commit.
    #[must_use]
    pub fn head_commit(&self) -> Option<&str> {
        self.head_commit.as_deref()
    }

    /// Returns the notes.
    #[must_use]
    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Returns the last error.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns the PR URL.
    #[must_use]
    pub fn pr_url(&self) -> Option<&str> {
        self.pr_url.as_deref()
    }

    /// Returns when the PR was merged.
    #[must_use]
    pub const fn pr_merged_at(&self) -> Option<DateTime<Utc>> {
        self.pr_merged_at
    }

    /// Returns when the PR was closed without merging.
    #[must_use]
    pub const fn pr_closed_at(&self) -> Option<DateTime<Utc>> {
        self.pr_closed_at
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns when a worker last claimed the job.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns when the last attempt ended.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns whether this job blocks another job for the same issue.
    ///
    /// Every state except `rejected`, `failed`, and `cancelled` is active,
    /// and so is `approved` until its PR is merged or closed.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        match self.state {
            JobState::Rejected | JobState::Failed | JobState::Cancelled => false,
            JobState::Approved => self.pr_merged_at.is_none() && self.pr_closed_at.is_none(),
            _ => true,
        }
    }
}
