//! SQLite implementation of the notification outbox.

use super::models::{
    EVENT_COLUMNS, EventRow, NewEventRow, StatusCountRow, corrupt_event, row_to_event,
};
use crate::job::domain::JobId;
use crate::notification::{
    domain::{
        BACKOFF_CEILING_ATTEMPTS, EventId, EventStatus, EventType, NotificationEvent,
        retry_backoff,
    },
    ports::{NotificationRepository, NotificationRepositoryError, NotificationRepositoryResult},
};
use crate::store::schema::{jobs, notification_events};
use crate::store::{Store, StoreError, StoreResult, UnitOfWork, format_timestamp};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel::sql_types::{BigInt, Integer, Text};
use tracing::debug;

/// SQLite-backed notification outbox.
#[derive(Debug, Clone)]
pub struct SqliteNotificationRepository {
    store: Store,
}

impl SqliteNotificationRepository {
    /// Creates a repository over an opened store.
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }
}

impl From<StoreError> for NotificationRepositoryError {
    fn from(err: StoreError) -> Self {
        Self::persistence(err)
    }
}

impl From<DieselError> for NotificationRepositoryError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

/// Appends a `pending` event inside `uow`.
///
/// Callers pass the same unit of work that carries the triggering job
/// change, so the event commits if and only if that change does.
pub(crate) fn enqueue_in(
    uow: &mut UnitOfWork<'_>,
    job_id: JobId,
    event_type: EventType,
    at: DateTime<Utc>,
) -> StoreResult<NotificationEvent> {
    let timestamp = format_timestamp(at);
    let row = diesel::insert_into(notification_events::table)
        .values(&NewEventRow {
            job_id: job_id.to_string(),
            event_type: event_type.as_str().to_owned(),
            status: EventStatus::Pending.as_str().to_owned(),
            attempts: 0,
            created_at: timestamp.clone(),
            updated_at: timestamp,
        })
        .returning(EventRow::as_returning())
        .get_result::<EventRow>(uow.connection())?;
    let event = row_to_event(row)?;
    debug!(event_id = %event.id, job_id = %job_id, event = %event_type, "notification enqueued");
    Ok(event)
}

/// Fails every `processing` event inside `uow`, counting the interrupted
/// delivery as an attempt. Returns the affected events.
pub(crate) fn fail_processing_in(
    uow: &mut UnitOfWork<'_>,
    message: &str,
    at: DateTime<Utc>,
) -> StoreResult<Vec<EventId>> {
    let rows = diesel::sql_query(format!(
        concat!(
            "UPDATE notification_events SET status = 'failed', attempts = attempts + 1, ",
            "last_error = ?1, updated_at = ?2 WHERE status = 'processing' RETURNING {}",
        ),
        EVENT_COLUMNS
    ))
    .bind::<Text, _>(message)
    .bind::<Text, _>(format_timestamp(at))
    .load::<EventRow>(uow.connection())?;
    Ok(rows.into_iter().map(|row| EventId::new(row.id)).collect())
}

#[async_trait]
impl NotificationRepository for SqliteNotificationRepository {
    async fn enqueue(
        &self,
        job_id: JobId,
        event_type: EventType,
        at: DateTime<Utc>,
    ) -> NotificationRepositoryResult<NotificationEvent> {
        self.store
            .write(move |uow: &mut UnitOfWork<'_>| {
                let exists: i64 = jobs::table
                    .filter(jobs::id.eq(job_id.to_string()))
                    .count()
                    .get_result(uow.connection())?;
                if exists == 0 {
                    return Err(NotificationRepositoryError::JobNotFound(job_id));
                }
                Ok(enqueue_in(uow, job_id, event_type, at)?)
            })
            .await
    }

    async fn claim_next(
        &self,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> NotificationRepositoryResult<Option<NotificationEvent>> {
        let ceiling = i32::try_from(max_attempts).unwrap_or(i32::MAX);
        let cutoff = |attempts: u32| format_timestamp(now - retry_backoff(attempts));
        let cutoffs = [
            cutoff(1),
            cutoff(2),
            cutoff(3),
            cutoff(BACKOFF_CEILING_ATTEMPTS),
        ];
        let timestamp = format_timestamp(now);

        self.store
            .write(move |uow: &mut UnitOfWork<'_>| {
                let [first, second, third, ceiling_cutoff] = cutoffs;
                let row = diesel::sql_query(format!(
                    concat!(
                        "UPDATE notification_events SET status = 'processing', updated_at = ?1 ",
                        "WHERE id = (",
                        "SELECT id FROM notification_events WHERE attempts < ?2 AND (",
                        "status = 'pending' OR (status = 'failed' AND (",
                        "(attempts <= 1 AND updated_at <= ?3) OR ",
                        "(attempts = 2 AND updated_at <= ?4) OR ",
                        "(attempts = 3 AND updated_at <= ?5) OR ",
                        "(attempts >= 4 AND updated_at <= ?6)))) ",
                        "ORDER BY created_at, id LIMIT 1",
                        ") AND status IN ('pending', 'failed') RETURNING {}",
                    ),
                    EVENT_COLUMNS
                ))
                .bind::<Text, _>(timestamp)
                .bind::<Integer, _>(ceiling)
                .bind::<Text, _>(first)
                .bind::<Text, _>(second)
                .bind::<Text, _>(third)
                .bind::<Text, _>(ceiling_cutoff)
                .get_result::<EventRow>(uow.connection())
                .optional()?;
                Ok(row.map(row_to_event).transpose()?)
            })
            .await
    }

    async fn mark_sent(&self, id: EventId, at: DateTime<Utc>) -> NotificationRepositoryResult<bool> {
        self.resolve(id, EventStatus::Sent, None, at).await
    }

    async fn mark_failed(
        &self,
        id: EventId,
        error: &str,
        at: DateTime<Utc>,
    ) -> NotificationRepositoryResult<bool> {
        let message = error.to_owned();
        self.store
            .write(move |uow: &mut UnitOfWork<'_>| {
                let updated = diesel::sql_query(concat!(
                    "UPDATE notification_events SET status = 'failed', ",
                    "attempts = attempts + 1, last_error = ?1, updated_at = ?2 ",
                    "WHERE id = ?3 AND status = 'processing'",
                ))
                .bind::<Text, _>(&message)
                .bind::<Text, _>(format_timestamp(at))
                .bind::<BigInt, _>(id.value())
                .execute(uow.connection())?;
                Ok(updated > 0)
            })
            .await
    }

    async fn mark_skipped(
        &self,
        id: EventId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> NotificationRepositoryResult<bool> {
        self.resolve(id, EventStatus::Skipped, Some(reason.to_owned()), at)
            .await
    }

    async fn promote_exhausted(
        &self,
        max_attempts: u32,
        at: DateTime<Utc>,
    ) -> NotificationRepositoryResult<u64> {
        let ceiling = i32::try_from(max_attempts).unwrap_or(i32::MAX);
        self.store
            .write(move |uow: &mut UnitOfWork<'_>| {
                let promoted = diesel::sql_query(concat!(
                    "UPDATE notification_events SET status = 'skipped', ",
                    "last_error = 'attempts exhausted: ' || COALESCE(last_error, ''), ",
                    "updated_at = ?1 WHERE status = 'failed' AND attempts >= ?2",
                ))
                .bind::<Text, _>(format_timestamp(at))
                .bind::<Integer, _>(ceiling)
                .execute(uow.connection())?;
                Ok(u64::try_from(promoted).unwrap_or(u64::MAX))
            })
            .await
    }

    async fn purge_resolved(&self, cutoff: DateTime<Utc>) -> NotificationRepositoryResult<u64> {
        self.store
            .write(move |uow: &mut UnitOfWork<'_>| {
                let purged = diesel::delete(
                    notification_events::table
                        .filter(notification_events::status.eq_any([
                            EventStatus::Sent.as_str(),
                            EventStatus::Skipped.as_str(),
                        ]))
                        .filter(notification_events::updated_at.lt(format_timestamp(cutoff))),
                )
                .execute(uow.connection())?;
                Ok(u64::try_from(purged).unwrap_or(u64::MAX))
            })
            .await
    }

    async fn find_by_id(
        &self,
        id: EventId,
    ) -> NotificationRepositoryResult<Option<NotificationEvent>> {
        self.store
            .read(move |connection| {
                let row = notification_events::table
                    .find(id.value())
                    .select(EventRow::as_select())
                    .first::<EventRow>(connection)
                    .optional()?;
                Ok(row.map(row_to_event).transpose()?)
            })
            .await
    }

    async fn list_for_job(
        &self,
        job_id: JobId,
    ) -> NotificationRepositoryResult<Vec<NotificationEvent>> {
        self.store
            .read(move |connection| {
                let rows = notification_events::table
                    .filter(notification_events::job_id.eq(job_id.to_string()))
                    .order(notification_events::id.asc())
                    .select(EventRow::as_select())
                    .load::<EventRow>(connection)?;
                Ok(rows
                    .into_iter()
                    .map(row_to_event)
                    .collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }

    async fn status_counts(&self) -> NotificationRepositoryResult<Vec<(EventStatus, u64)>> {
        self.store
            .read(|connection| {
                let rows = diesel::sql_query(
                    "SELECT status, COUNT(*) AS count FROM notification_events GROUP BY status",
                )
                .load::<StatusCountRow>(connection)?;
                let mut counts = Vec::with_capacity(rows.len());
                for row in rows {
                    let status = EventStatus::try_from(row.status.as_str()).map_err(corrupt_event)?;
                    let count = u64::try_from(row.count).map_err(corrupt_event)?;
                    counts.push((status, count));
                }
                counts.sort_by_key(|(status, _)| {
                    EventStatus::ALL.iter().position(|candidate| candidate == status)
                });
                Ok(counts)
            })
            .await
    }
}

impl SqliteNotificationRepository {
    async fn resolve(
        &self,
        id: EventId,
        status: EventStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> NotificationRepositoryResult<bool> {
        self.store
            .write(move |uow: &mut UnitOfWork<'_>| {
                let updated = diesel::update(
                    notification_events::table
                        .filter(notification_events::id.eq(id.value()))
                        .filter(notification_events::status.eq(EventStatus::Processing.as_str())),
                )
                .set((
                    notification_events::status.eq(status.as_str()),
                    notification_events::last_error.eq(reason),
                    notification_events::updated_at.eq(format_timestamp(at)),
                ))
                .execute(uow.connection())?;
                Ok(updated > 0)
            })
            .await
    }
}
