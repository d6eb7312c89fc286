//! Outbox event records and their closed vocabularies.

use crate::job::domain::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error returned when a stored event type or status is not recognised.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown notification {kind}: {value}")]
pub struct ParseNotificationError {
    /// Which vocabulary rejected the value.
    pub kind: &'static str,
    /// The rejected value.
    pub value: String,
}

/// What happened to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    /// Work reached `ready` and awaits a human.
    NeedsReview,
    /// The pipeline gave up on the job.
    Failed,
    /// The job was approved with an open PR.
    PrCreated,
    /// The job's PR was merged.
    PrMerged,
    /// The job's PR was closed without merging.
    PrClosed,
    /// The job was cancelled outside a transition, such as the issue closing.
    Cancelled,
}

impl EventType {
    /// Every event type.
    pub const ALL: [Self; 6] = [
        Self::NeedsReview,
        Self::Failed,
        Self::PrCreated,
        Self::PrMerged,
        Self::PrClosed,
        Self::Cancelled,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NeedsReview => "needs-review",
            Self::Failed => "failed",
            Self::PrCreated => "pr-created",
            Self::PrMerged => "pr-merged",
            Self::PrClosed => "pr-closed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns a short human phrase for message headlines.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::NeedsReview => "needs review",
            Self::Failed => "failed",
            Self::PrCreated => "opened a pull request",
            Self::PrMerged => "pull request merged",
            Self::PrClosed => "pull request closed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<&str> for EventType {
    type Error = ParseNotificationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|event_type| event_type.as_str() == value)
            .ok_or_else(|| ParseNotificationError {
                kind: "event type",
                value: value.to_owned(),
            })
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status of an outbox event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Waiting for the dispatcher.
    Pending,
    /// Claimed by the dispatcher.
    Processing,
    /// Delivered to at least one channel.
    Sent,
    /// Every channel failed; retried after backoff.
    Failed,
    /// Not delivered and never retried.
    Skipped,
}

impl EventStatus {
    /// Every status.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Processing,
        Self::Sent,
        Self::Failed,
        Self::Skipped,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Returns whether the dispatcher is done with the event.
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        matches!(self, Self::Sent | Self::Skipped)
    }
}

impl TryFrom<&str> for EventStatus {
    type Error = ParseNotificationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| ParseNotificationError {
                kind: "status",
                value: value.to_owned(),
            })
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbox row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(i64);

impl EventId {
    /// Wraps a stored identifier.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the stored identifier.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One outbox row: "job X experienced event Y".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Event identifier.
    pub id: EventId,
    /// Job the event belongs to.
    pub job_id: JobId,
    /// What happened.
    pub event_type: EventType,
    /// Delivery status.
    pub status: EventStatus,
    /// Failed delivery attempts so far.
    pub attempts: u32,
    /// Last delivery error or skip reason.
    pub last_error: Option<String>,
    /// When the triggering change committed.
    pub created_at: DateTime<Utc>,
    /// Last status change; the backoff clock for failed events.
    pub updated_at: DateTime<Utc>,
}
