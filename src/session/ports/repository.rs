//! Repository port for LLM sessions and artifacts.

use crate::job::domain::JobId;
use crate::session::domain::{
    Artifact, LlmSession, NewArtifact, NewSession, SessionId, SessionUsage, UsageSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for session repository operations.
pub type SessionRepositoryResult<T> = Result<T, SessionRepositoryError>;

/// Session and artifact persistence contract.
///
/// Finishing operations only touch `running` sessions and report whether
/// one was updated.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Records a running session.
    async fn start(
        &self,
        session: &NewSession,
        at: DateTime<Utc>,
    ) -> SessionRepositoryResult<LlmSession>;

    /// Completes a running session with its usage counters.
    async fn complete(
        &self,
        id: SessionId,
        usage: SessionUsage,
        at: DateTime<Utc>,
    ) -> SessionRepositoryResult<bool>;

    /// Fails a running session.
    async fn fail(
        &self,
        id: SessionId,
        message: &str,
        at: DateTime<Utc>,
    ) -> SessionRepositoryResult<bool>;

    /// Cancels every running session of a job. Returns how many changed.
    async fn cancel_running_for_job(
        &self,
        job_id: JobId,
        at: DateTime<Utc>,
    ) -> SessionRepositoryResult<u64>;

    /// Lists a job's sessions in start order.
    async fn list_for_job(&self, job_id: JobId) -> SessionRepositoryResult<Vec<LlmSession>>;

    /// Sums token and duration counters over a job's sessions.
    async fn usage_summary(&self, job_id: JobId) -> SessionRepositoryResult<UsageSummary>;

    /// Stores an artifact.
    async fn record_artifact(
        &self,
        artifact: &NewArtifact,
        at: DateTime<Utc>,
    ) -> SessionRepositoryResult<Artifact>;

    /// Lists a job's artifacts, optionally for one iteration, oldest first.
    async fn list_artifacts(
        &self,
        job_id: JobId,
        iteration: Option<u32>,
    ) -> SessionRepositoryResult<Vec<Artifact>>;
}

/// Errors returned by session repository implementations.
#[derive(Debug, Clone, Error)]
pub enum SessionRepositoryError {
    /// The owning job does not exist.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl SessionRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
