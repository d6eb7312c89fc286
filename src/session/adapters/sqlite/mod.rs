//! SQLite adapter for sessions and artifacts.

mod models;
mod repository;

pub(crate) use repository::fail_running_in;
pub use repository::SqliteSessionRepository;
