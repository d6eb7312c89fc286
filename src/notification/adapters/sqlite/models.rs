//! Diesel row models for the notification outbox.

use crate::job::domain::JobId;
use crate::notification::domain::{EventId, EventStatus, EventType, NotificationEvent};
use crate::store::schema::notification_events;
use crate::store::{StoreError, StoreResult, parse_timestamp};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};

/// Column list returned by every raw outbox statement.
pub(super) const EVENT_COLUMNS: &str =
    "id, job_id, event_type, status, attempts, last_error, created_at, updated_at";

/// Query result row for outbox events.
#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = notification_events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(super) struct EventRow {
    pub id: i64,
    pub job_id: String,
    pub event_type: String,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Insert model for outbox events.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notification_events)]
pub(super) struct NewEventRow {
    pub job_id: String,
    pub event_type: String,
    pub status: String,
    pub attempts: i32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, QueryableByName)]
pub(super) struct StatusCountRow {
    #[diesel(sql_type = Text)]
    pub status: String,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

pub(super) fn row_to_event(row: EventRow) -> StoreResult<NotificationEvent> {
    Ok(NotificationEvent {
        id: EventId::new(row.id),
        job_id: row.job_id.parse::<JobId>().map_err(corrupt_event)?,
        event_type: EventType::try_from(row.event_type.as_str()).map_err(corrupt_event)?,
        status: EventStatus::try_from(row.status.as_str()).map_err(corrupt_event)?,
        attempts: u32::try_from(row.attempts).map_err(corrupt_event)?,
        last_error: row.last_error,
        created_at: parse_timestamp(&row.created_at).map_err(corrupt_event)?,
        updated_at: parse_timestamp(&row.updated_at).map_err(corrupt_event)?,
    })
}

pub(super) fn corrupt_event(err: impl std::fmt::Display) -> StoreError {
    StoreError::corrupt("notification_events", err.to_string())
}
