//! SQLite adapter for the notification outbox.

mod models;
mod repository;

pub use repository::SqliteNotificationRepository;
pub(crate) use repository::{enqueue_in, fail_processing_in};
