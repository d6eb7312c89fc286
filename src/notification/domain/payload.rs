//! Delivery payload built from an event and its job.

use super::{EventId, EventType, NotificationEvent};
use crate::job::domain::{Job, JobId, JobState};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What a sender receives.
///
/// Serialized as-is by the webhook sender, so field names are part of the
/// wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    /// Outbox event identifier; receivers may use it to drop duplicates.
    pub event_id: EventId,
    /// What happened.
    pub event_type: EventType,
    /// Job identifier.
    pub job_id: JobId,
    /// Project name.
    pub project: String,
    /// Issue provider.
    pub provider: String,
    /// Repository in `owner/repo` form.
    pub repository: String,
    /// Issue number.
    pub issue_number: u64,
    /// Issue title; empty when unknown.
    pub issue_title: String,
    /// Job state at delivery time.
    pub state: JobState,
    /// Iteration the job is on.
    pub iteration: u32,
    /// PR URL, if any.
    pub pr_url: Option<String>,
    /// Last job error, if any.
    pub error_message: Option<String>,
    /// When the triggering change committed.
    pub occurred_at: DateTime<Utc>,
    /// One-line human summary.
    pub text: String,
}

impl NotificationPayload {
    /// Builds the payload for `event` from the current job snapshot.
    #[must_use]
    pub fn new(event: &NotificationEvent, job: &Job, issue_title: String) -> Self {
        let issue_ref = job.issue_ref();
        let text = headline(event.event_type, job, &issue_title);
        Self {
            event_id: event.id,
            event_type: event.event_type,
            job_id: job.id(),
            project: job.project().to_owned(),
            provider: issue_ref.provider().as_str().to_owned(),
            repository: issue_ref.repository().as_str().to_owned(),
            issue_number: issue_ref.issue_number().value(),
            issue_title,
            state: job.state(),
            iteration: job.iteration(),
            pr_url: job.pr_url().map(str::to_owned),
            error_message: job.error_message().map(str::to_owned),
            occurred_at: event.created_at,
            text,
        }
    }
}

fn headline(event_type: EventType, job: &Job, issue_title: &str) -> String {
    let issue_ref = job.issue_ref();
    let mut line = format!(
        "[{}] {}#{} {}",
        job.project(),
        issue_ref.repository(),
        issue_ref.issue_number(),
        event_type.describe()
    );
    if !issue_title.is_empty() {
        line.push_str(": ");
        line.push_str(issue_title);
    }
    if let Some(url) = job.pr_url() {
        line.push_str(" (");
        line.push_str(url);
        line.push(')');
    }
    line
}
