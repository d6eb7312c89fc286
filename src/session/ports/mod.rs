//! Port contracts for session and artifact persistence.

mod repository;

pub use repository::{SessionRepository, SessionRepositoryError, SessionRepositoryResult};
