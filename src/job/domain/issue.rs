//! Issue reference and tracked-issue record.

use super::{IssueNumber, JobDomainError, RepositoryFullName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported external issue providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueProvider {
    /// GitHub issues.
    #[serde(rename = "github")]
    GitHub,
    /// GitLab issues.
    #[serde(rename = "gitlab")]
    GitLab,
}

impl IssueProvider {
    /// Returns provider name in canonical storage format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
        }
    }
}

impl TryFrom<&str> for IssueProvider {
    type Error = JobDomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            _ => Err(JobDomainError::InvalidIssueProvider(value.to_owned())),
        }
    }
}

impl fmt::Display for IssueProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical external issue reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueRef {
    provider: IssueProvider,
    repository: RepositoryFullName,
    issue_number: IssueNumber,
}

impl IssueRef {
    /// Creates an issue reference from validated components.
    #[must_use]
    pub const fn new(
        provider: IssueProvider,
        repository: RepositoryFullName,
        issue_number: IssueNumber,
    ) -> Self {
        Self {
            provider,
            repository,
            issue_number,
        }
    }

    /// Creates an issue reference from raw external values.
    ///
    /// # Errors
    ///
    /// Returns a [`JobDomainError`] when any component is invalid.
    pub fn from_parts(
        provider: &str,
        repository: &str,
        issue_number: u64,
    ) -> Result<Self, JobDomainError> {
        Ok(Self::new(
            IssueProvider::try_from(provider)?,
            RepositoryFullName::new(repository)?,
            IssueNumber::new(issue_number)?,
        ))
    }

    /// Returns the issue provider.
    #[must_use]
    pub const fn provider(&self) -> IssueProvider {
        self.provider
    }

    /// Returns the repository identifier.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryFullName {
        &self.repository
    }

    /// Returns the issue number.
    #[must_use]
    pub const fn issue_number(&self) -> IssueNumber {
        self.issue_number
    }
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/#{}",
            self.provider, self.repository, self.issue_number
        )
    }
}

/// A tracked issue as maintained by the sync collaborator.
///
/// `eligible` reflects the source's inclusion and exclusion rules. Only jobs
/// whose issue is eligible can be claimed or requeued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRecord {
    /// Issue identity.
    pub issue_ref: IssueRef,
    /// Project the issue belongs to.
    pub project: String,
    /// Cached title; empty when the source has not provided one.
    pub title: String,
    /// Whether the issue passes inclusion rules.
    pub eligible: bool,
    /// Last sync timestamp.
    pub updated_at: DateTime<Utc>,
}
