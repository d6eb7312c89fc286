//! Repository port for the notification outbox.

use crate::job::domain::JobId;
use crate::notification::domain::{EventId, EventStatus, EventType, NotificationEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for outbox operations.
pub type NotificationRepositoryResult<T> = Result<T, NotificationRepositoryError>;

/// Outbox persistence contract.
///
/// Status updates are guarded on the event still being `processing`; they
/// return `false` when another actor resolved it first.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Enqueues an event outside a job transition.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationRepositoryError::JobNotFound`] when the job does
    /// not exist.
    async fn enqueue(
        &self,
        job_id: JobId,
        event_type: EventType,
        at: DateTime<Utc>,
    ) -> NotificationRepositoryResult<NotificationEvent>;

    /// Atomically claims the oldest deliverable event and marks it
    /// `processing`.
    ///
    /// Deliverable means `pending`, or `failed` with its backoff elapsed at
    /// `now`, and in both cases fewer than `max_attempts` attempts.
    async fn claim_next(
        &self,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> NotificationRepositoryResult<Option<NotificationEvent>>;

    /// Marks a claimed event delivered.
    async fn mark_sent(&self, id: EventId, at: DateTime<Utc>) -> NotificationRepositoryResult<bool>;

    /// Marks a claimed event failed, incrementing its attempt count.
    async fn mark_failed(
        &self,
        id: EventId,
        error: &str,
        at: DateTime<Utc>,
    ) -> NotificationRepositoryResult<bool>;

    /// Marks a claimed event skipped with `reason`.
    async fn mark_skipped(
        &self,
        id: EventId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> NotificationRepositoryResult<bool>;

    /// Moves `failed` events with at least `max_attempts` attempts to
    /// `skipped`. Returns how many moved.
    async fn promote_exhausted(
        &self,
        max_attempts: u32,
        at: DateTime<Utc>,
    ) -> NotificationRepositoryResult<u64>;

    /// Deletes `sent` and `skipped` events last updated before `cutoff`.
    async fn purge_resolved(&self, cutoff: DateTime<Utc>) -> NotificationRepositoryResult<u64>;

    /// Finds an event by identifier.
    async fn find_by_id(&self, id: EventId)
    -> NotificationRepositoryResult<Option<NotificationEvent>>;

    /// Lists a job's events in creation order.
    async fn list_for_job(&self, job_id: JobId)
    -> NotificationRepositoryResult<Vec<NotificationEvent>>;

    /// Counts events per status. Statuses with no events are omitted.
    async fn status_counts(&self) -> NotificationRepositoryResult<Vec<(EventStatus, u64)>>;
}

/// Errors returned by outbox implementations.
#[derive(Debug, Clone, Error)]
pub enum NotificationRepositoryError {
    /// The referenced job does not exist.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl NotificationRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
