//! Error types for job domain validation and parsing.

use super::{JobId, JobState};
use thiserror::Error;

/// Errors returned while constructing or validating job domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobDomainError {
    /// The issue provider value is unsupported.
    #[error("unsupported issue provider: {0}")]
    InvalidIssueProvider(String),

    /// The repository name does not follow `owner/repo` format.
    #[error("invalid repository name '{0}', expected owner/repo")]
    InvalidRepository(String),

    /// The issue number is invalid.
    #[error("invalid issue number {0}, expected a positive integer")]
    InvalidIssueNumber(u64),

    /// The project name is empty after trimming.
    #[error("project name must not be empty")]
    EmptyProjectName,

    /// The iteration budget is zero or too large to persist.
    #[error("invalid iteration budget {0}, expected 1..={max}", max = i32::MAX)]
    InvalidMaxIterations(u32),

    /// The requested edge is not in the transition table.
    #[error("invalid state transition for job {job_id}: {from} -> {to}")]
    InvalidStateTransition {
        /// Job being transitioned.
        job_id: JobId,
        /// Current state.
        from: JobState,
        /// Requested state.
        to: JobState,
    },

    /// A plain transition tried to put a finished job back in the queue.
    #[error("job {job_id} in state {from} re-enters the queue only through reset or resume")]
    RequeueRequiresRetry {
        /// Job being transitioned.
        job_id: JobId,
        /// Current state.
        from: JobState,
    },

    /// Cancellation was requested for a job that is not cancellable.
    #[error("job {job_id} cannot be cancelled in state {state}")]
    NotCancellable {
        /// Job that was targeted.
        job_id: JobId,
        /// State the job is in.
        state: JobState,
    },
}

/// Error returned while parsing job states from persistence or input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown job state: {0}")]
pub struct ParseJobStateError(pub String);
