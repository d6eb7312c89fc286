//! SQLite adapter for job and tracked-issue persistence.

mod models;
mod repository;

pub(crate) use repository::requeue_in_flight;
pub use repository::SqliteJobRepository;
