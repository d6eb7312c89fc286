//! LLM session rows written by the pipeline.

use crate::job::domain::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error returned when a stored session or artifact value is unknown.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseSessionError {
    /// Which enum failed to parse.
    pub kind: &'static str,
    /// Offending value.
    pub value: String,
}

/// Unique identifier for an LLM session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new random session identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a session identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline stage a session ran for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    /// Plan generation.
    Planning,
    /// Code changes.
    Implementing,
    /// Automated review.
    Reviewing,
    /// Test runs and triage.
    Testing,
    /// Rebase conflict resolution.
    ConflictResolution,
}

impl SessionStage {
    /// Every stage.
    pub const ALL: [Self; 5] = [
        Self::Planning,
        Self::Implementing,
        Self::Reviewing,
        Self::Testing,
        Self::ConflictResolution,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Implementing => "implementing",
            Self::Reviewing => "reviewing",
            Self::Testing => "testing",
            Self::ConflictResolution => "conflict_resolution",
        }
    }
}

impl TryFrom<&str> for SessionStage {
    type Error = ParseSessionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == value)
            .ok_or_else(|| ParseSessionError {
                kind: "session stage",
                value: value.to_owned(),
            })
    }
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Still running, or interrupted before it could finish.
    Running,
    /// Finished normally.
    Completed,
    /// Finished with an error.
    Failed,
    /// Stopped because its job was cancelled.
    Cancelled,
}

impl SessionStatus {
    /// Every status.
    pub const ALL: [Self; 4] = [Self::Running, Self::Completed, Self::Failed, Self::Cancelled];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<&str> for SessionStatus {
    type Error = ParseSessionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| ParseSessionError {
                kind: "session status",
                value: value.to_owned(),
            })
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to record a session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    /// Owning job.
    pub job_id: JobId,
    /// Job iteration the session belongs to.
    pub iteration: u32,
    /// Pipeline stage.
    pub stage: SessionStage,
    /// Model name.
    pub model: String,
}

/// Counters reported when a session completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionUsage {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// One recorded LLM session.
///
/// Counters stay `None` while the session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSession {
    /// Session identifier.
    pub id: SessionId,
    /// Owning job.
    pub job_id: JobId,
    /// Job iteration.
    pub iteration: u32,
    /// Pipeline stage.
    pub stage: SessionStage,
    /// Model name.
    pub model: String,
    /// Outcome.
    pub status: SessionStatus,
    /// Prompt tokens.
    pub input_tokens: Option<u64>,
    /// Completion tokens.
    pub output_tokens: Option<u64>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// Failure message.
    pub error_message: Option<String>,
    /// Start timestamp.
    pub started_at: DateTime<Utc>,
    /// Finish timestamp.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Aggregated usage for one job across all its sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSummary {
    /// Sessions recorded.
    pub sessions: u64,
    /// Total prompt tokens.
    pub input_tokens: u64,
    /// Total completion tokens.
    pub output_tokens: u64,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
}
