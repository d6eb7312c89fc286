//! Best-effort issue title lookup used when the cached title is empty.

use crate::job::domain::IssueRef;
use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by an issue lookup.
#[derive(Debug, Clone, Error)]
#[error("issue lookup failed: {0}")]
pub struct IssueLookupError(pub String);

/// Fetches issue details from the source tracker.
#[async_trait]
pub trait IssueLookup: Send + Sync {
    /// Returns the issue's title, or `None` if the tracker has none.
    async fn issue_title(&self, issue_ref: &IssueRef) -> Result<Option<String>, IssueLookupError>;
}
