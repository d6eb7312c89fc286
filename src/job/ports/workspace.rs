//! Port for removing a job's on-disk workspace.

use crate::job::domain::Job;
use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by a workspace cleaner.
#[derive(Debug, Clone, Error)]
#[error("workspace cleanup failed: {0}")]
pub struct WorkspaceCleanupError(pub String);

/// Removes worktrees and branches the pipeline created for a job.
///
/// Implemented by the git collaborator. Cleanup is best effort: a failure is
/// reported to the operator but never rolls back the state change that
/// triggered it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkspaceCleaner: Send + Sync {
    /// Removes the workspace for `job`, if it has one.
    async fn remove_workspace(&self, job: &Job) -> Result<(), WorkspaceCleanupError>;
}
