//! Job lifecycle states and the transition table.

use super::{JobDomainError, JobId, ParseJobStateError};
use crate::notification::domain::EventType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for a worker.
    Queued,
    /// A worker is producing a plan.
    Planning,
    /// A worker is implementing the plan.
    Implementing,
    /// The change is under automated review.
    Reviewing,
    /// The change is being tested.
    Testing,
    /// The branch is being rebased onto its target.
    Rebasing,
    /// Rebase conflicts are being resolved.
    ResolvingConflicts,
    /// Work is ready for human review.
    Ready,
    /// A human approved the change.
    Approved,
    /// A human rejected the change.
    Rejected,
    /// The pipeline gave up.
    Failed,
    /// The job was cancelled.
    Cancelled,
}

impl JobState {
    /// Every state, in pipeline order.
    pub const ALL: [Self; 12] = [
        Self::Queued,
        Self::Planning,
        Self::Implementing,
        Self::Reviewing,
        Self::Testing,
        Self::Rebasing,
        Self::ResolvingConflicts,
        Self::Ready,
        Self::Approved,
        Self::Rejected,
        Self::Failed,
        Self::Cancelled,
    ];

    /// States a worker may be holding; reset to `queued` on crash recovery.
    pub const IN_FLIGHT: [Self; 6] = [
        Self::Planning,
        Self::Implementing,
        Self::Reviewing,
        Self::Testing,
        Self::Rebasing,
        Self::ResolvingConflicts,
    ];

    /// States that may be cancelled.
    pub const CANCELLABLE: [Self; 7] = [
        Self::Queued,
        Self::Planning,
        Self::Implementing,
        Self::Reviewing,
        Self::Testing,
        Self::Rebasing,
        Self::ResolvingConflicts,
    ];

    /// States from which a job may be reset or resumed.
    pub const REQUEUEABLE: [Self; 3] = [Self::Failed, Self::Rejected, Self::Cancelled];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Planning => "planning",
            Self::Implementing => "implementing",
            Self::Reviewing => "reviewing",
            Self::Testing => "testing",
            Self::Rebasing => "rebasing",
            Self::ResolvingConflicts => "resolving_conflicts",
            Self::Ready => "ready",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns the states this state may move to.
    #[must_use]
    pub const fn allowed_targets(self) -> &'static [Self] {
        match self {
            Self::Queued => &[Self::Planning, Self::Cancelled],
            Self::Planning => &[Self::Implementing, Self::Failed, Self::Cancelled],
            Self::Implementing => &[Self::Reviewing, Self::Failed, Self::Cancelled],
            Self::Reviewing => &[
                Self::Implementing,
                Self::Testing,
                Self::Failed,
                Self::Cancelled,
            ],
            Self::Testing => &[
                Self::Ready,
                Self::Implementing,
                Self::Rebasing,
                Self::Failed,
                Self::Cancelled,
            ],
            Self::Rebasing => &[
                Self::ResolvingConflicts,
                Self::Ready,
                Self::Failed,
                Self::Cancelled,
            ],
            Self::ResolvingConflicts => &[Self::Ready, Self::Failed, Self::Cancelled],
            Self::Ready => &[Self::Approved, Self::Rejected],
            Self::Approved | Self::Rejected | Self::Failed | Self::Cancelled => &[Self::Queued],
        }
    }

    /// Returns whether moving to `target` is in the transition table.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Returns whether the job may be cancelled from this state.
    #[must_use]
    pub const fn is_cancellable(self) -> bool {
        matches!(
            self,
            Self::Queued
                | Self::Planning
                | Self::Implementing
                | Self::Reviewing
                | Self::Testing
                | Self::Rebasing
                | Self::ResolvingConflicts
        )
    }

    /// Returns whether no worker will pick the job up from this state.
    ///
    /// An approved job with an open PR is terminal here but still counts as
    /// active for the one-job-per-issue rule; see [`super::Job::is_active`].
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !self.is_cancellable()
    }

    /// Returns whether entering this state ends an attempt and stamps
    /// `completed_at`.
    #[must_use]
    pub const fn ends_attempt(self) -> bool {
        self.is_terminal()
    }

    /// Returns whether a worker may be holding a job in this state.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        self.is_cancellable() && !matches!(self, Self::Queued)
    }

    /// Returns whether reset and resume accept this state.
    #[must_use]
    pub const fn is_requeueable(self) -> bool {
        matches!(self, Self::Failed | Self::Rejected | Self::Cancelled)
    }
}

impl TryFrom<&str> for JobState {
    type Error = ParseJobStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| ParseJobStateError(value.to_owned()))
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the notification enqueued when a job moves `from` → `to`.
///
/// `ready` reached through rebasing or conflict resolution is a side effect
/// of keeping the branch current, not new work, so it stays silent.
/// `approved` only announces a PR the job already carries.
#[must_use]
pub const fn entry_notification(from: JobState, to: JobState, has_pr_url: bool) -> Option<EventType> {
    match to {
        JobState::Ready => match from {
            JobState::Rebasing | JobState::ResolvingConflicts => None,
            _ => Some(EventType::NeedsReview),
        },
        JobState::Failed => Some(EventType::Failed),
        JobState::Approved if has_pr_url => Some(EventType::PrCreated),
        _ => None,
    }
}

/// A validated edge of the transition table, ready to be applied.
///
/// The only way to build one is [`StateChange::new`], which rejects edges
/// outside [`JobState::allowed_targets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    job_id: JobId,
    from: JobState,
    to: JobState,
    at: DateTime<Utc>,
}

impl StateChange {
    /// Validates and builds a state change.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidStateTransition`] when `to` is not an
    /// allowed target of `from`.
    pub fn new(
        job_id: JobId,
        from: JobState,
        to: JobState,
        at: DateTime<Utc>,
    ) -> Result<Self, JobDomainError> {
        if !from.can_transition_to(to) {
            return Err(JobDomainError::InvalidStateTransition { job_id, from, to });
        }
        Ok(Self {
            job_id,
            from,
            to,
            at,
        })
    }

    /// Returns the job being transitioned.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Returns the expected current state.
    #[must_use]
    pub const fn from(&self) -> JobState {
        self.from
    }

    /// Returns the target state.
    #[must_use]
    pub const fn to(&self) -> JobState {
        self.to
    }

    /// Returns the transition timestamp.
    #[must_use]
    pub const fn at(&self) -> DateTime<Utc> {
        self.at
    }
}
