//! Domain model for the notification outbox.

mod backoff;
mod event;
mod payload;

pub use backoff::{BACKOFF_CEILING_ATTEMPTS, retry_backoff};
pub use event::{EventId, EventStatus, EventType, NotificationEvent, ParseNotificationError};
pub use payload::NotificationPayload;
