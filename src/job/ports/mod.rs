//! Port contracts for the job state machine.
//!
//! Ports define infrastructure-agnostic interfaces used by job services.

pub mod repository;
pub mod workspace;

pub use repository::{
    JobFilter, JobRepository, JobRepositoryError, JobRepositoryResult, RequeueMode, RequeueRequest,
};
pub use workspace::{WorkspaceCleaner, WorkspaceCleanupError};
#[cfg(test)]
pub use workspace::MockWorkspaceCleaner;
