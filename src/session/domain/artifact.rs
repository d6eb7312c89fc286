//! Artifacts produced per job iteration.

use super::ParseSessionError;
use crate::job::domain::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    /// Creates a new random artifact identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ArtifactId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Implementation plan.
    Plan,
    /// Code diff.
    Diff,
    /// Review findings.
    Review,
    /// Test output summary.
    TestReport,
    /// Free-form log.
    Log,
}

impl ArtifactKind {
    /// Every kind.
    pub const ALL: [Self; 5] = [
        Self::Plan,
        Self::Diff,
        Self::Review,
        Self::TestReport,
        Self::Log,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Diff => "diff",
            Self::Review => "review",
            Self::TestReport => "test_report",
            Self::Log => "log",
        }
    }
}

impl TryFrom<&str> for ArtifactKind {
    type Error = ParseSessionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| ParseSessionError {
                kind: "artifact kind",
                value: value.to_owned(),
            })
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to record an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArtifact {
    /// Owning job.
    pub job_id: JobId,
    /// Job iteration.
    pub iteration: u32,
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Artifact body.
    pub content: String,
}

/// A stored artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Artifact identifier.
    pub id: ArtifactId,
    /// Owning job.
    pub job_id: JobId,
    /// Job iteration.
    pub iteration: u32,
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Artifact body.
    pub content: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
