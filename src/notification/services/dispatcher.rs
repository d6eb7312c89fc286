//! Outbox dispatcher: claims events, fans them out, records the result.

use super::sanitize::sanitize_error;
use crate::config::DispatcherConfig;
use crate::job::ports::JobRepository;
use crate::notification::{
    domain::{EventId, NotificationEvent, NotificationPayload},
    ports::{
        IssueLookup, NotificationRepository, NotificationRepositoryError, NotificationSender,
        SenderError, SenderSet,
    },
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Errors that stop a dispatch pass. Channel failures are not among them;
/// they are recorded on the event.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The outbox could not be read or updated.
    #[error(transparent)]
    Outbox(#[from] NotificationRepositoryError),
}

/// What happened to one claimed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// At least one channel accepted the event.
    Sent {
        /// Event delivered.
        event_id: EventId,
        /// Channels that accepted it.
        delivered: Vec<String>,
    },
    /// Every channel failed; the event waits for its backoff.
    Failed {
        /// Event that failed.
        event_id: EventId,
        /// Sanitized error summary stored on the event.
        error: String,
    },
    /// The event will not be delivered.
    Skipped {
        /// Event skipped.
        event_id: EventId,
        /// Reason stored on the event.
        reason: String,
    },
}

/// Result of one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Failed events moved to skipped after exhausting their attempts.
    pub promoted: u64,
    /// Sent and skipped events deleted after the retention window.
    pub purged: u64,
}

type DeliveryResult = (String, Result<(), String>);

/// Drains the notification outbox.
///
/// One dispatcher runs per daemon. It holds no delivery state between
/// calls: whatever it was doing when the process died is found `processing`
/// by crash recovery and re-enters the retry path.
pub struct NotificationDispatcher<C>
where
    C: Clock + Send + Sync,
{
    outbox: Arc<dyn NotificationRepository>,
    jobs: Arc<dyn JobRepository>,
    senders: SenderSet,
    issue_lookup: Option<Arc<dyn IssueLookup>>,
    config: DispatcherConfig,
    clock: Arc<C>,
}

impl<C> NotificationDispatcher<C>
where
    C: Clock + Send + Sync,
{
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(
        outbox: Arc<dyn NotificationRepository>,
        jobs: Arc<dyn JobRepository>,
        senders: SenderSet,
        config: DispatcherConfig,
        clock: Arc<C>,
    ) -> Self {
        Self {
            outbox,
            jobs,
            senders,
            issue_lookup: None,
            config,
            clock,
        }
    }

    /// Adds a fallback lookup for issues whose cached title is empty.
    #[must_use]
    pub fn with_issue_lookup(mut self, lookup: Arc<dyn IssueLookup>) -> Self {
        self.issue_lookup = Some(lookup);
        self
    }

    /// Returns the live channel set; replacing its contents takes effect on
    /// the next claimed event.
    #[must_use]
    pub const fn senders(&self) -> &SenderSet {
        &self.senders
    }

    /// Claims and dispatches one event. Returns `None` when nothing is
    /// deliverable.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the outbox cannot be read or updated.
    pub async fn dispatch_next(&self) -> Result<Option<DispatchOutcome>, DispatchError> {
        let claimed = self
            .outbox
            .claim_next(self.clock.utc(), self.config.max_attempts)
            .await?;
        let Some(event) = claimed else {
            return Ok(None);
        };

        let senders = self.senders.snapshot().await;
        if senders.is_empty() {
            let reason = "no notification channels configured".to_owned();
            return self.skip(&event, reason).await.map(Some);
        }
        if self.config.is_disabled(event.event_type) {
            let reason = format!("{} notifications are disabled", event.event_type);
            return self.skip(&event, reason).await.map(Some);
        }

        let payload = match self.build_payload(&event).await {
            Ok(payload) => payload,
            Err(message) => return self.fail(&event, message).await.map(Some),
        };

        let results = self.deliver_all(senders, payload).await;
        let (delivered, failures): (Vec<DeliveryResult>, Vec<DeliveryResult>) =
            results.into_iter().partition(|(_, result)| result.is_ok());

        if delivered.is_empty() {
            let summary = failures
                .iter()
                .map(|(channel, result)| {
                    format!("{channel}: {}", result.as_ref().err().map_or("", String::as_str))
                })
                .collect::<Vec<_>>()
                .join("; ");
            return self.fail(&event, summary).await.map(Some);
        }

        for (channel, result) in &failures {
            if let Err(message) = result {
                warn!(
                    event_id = %event.id,
                    channel = %channel,
                    error = %message,
                    "channel failed; event delivered elsewhere"
                );
            }
        }
        self.resolve_sent(&event).await?;
        Ok(Some(DispatchOutcome::Sent {
            event_id: event.id,
            delivered: delivered.into_iter().map(|(channel, _)| channel).collect(),
        }))
    }

    /// Promotes exhausted events and purges old resolved ones.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the outbox cannot be updated.
    pub async fn cleanup(&self) -> Result<CleanupReport, DispatchError> {
        let now = self.clock.utc();
        let promoted = self
            .outbox
            .promote_exhausted(self.config.max_attempts, now)
            .await?;
        let purged = self
            .outbox
            .purge_resolved(now - self.config.retention())
            .await?;
        Ok(CleanupReport { promoted, purged })
    }

    /// Runs until `shutdown` is cancelled.
    ///
    /// Drains the outbox without sleeping while claims succeed, then waits
    /// for the poll interval. Cleanup runs on its own, longer period.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut cleanup_tick = tokio::time::interval(self.config.cleanup_interval());
        cleanup_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            "notification dispatcher started"
        );

        loop {
            self.drain(&shutdown).await;
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = cleanup_tick.tick() => self.run_cleanup().await,
                () = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }
        info!("notification dispatcher stopped");
    }

    async fn drain(&self, shutdown: &CancellationToken) {
        while !shutdown.is_cancelled() {
            match self.dispatch_next().await {
                Ok(Some(outcome)) => log_outcome(&outcome),
                Ok(None) => break,
                Err(err) => {
                    error!(error = %err, "notification dispatch failed");
                    break;
                }
            }
        }
    }

    async fn run_cleanup(&self) {
        match self.cleanup().await {
            Ok(report) if report.promoted > 0 || report.purged > 0 => {
                info!(
                    promoted = report.promoted,
                    purged = report.purged,
                    "notification outbox cleaned"
                );
            }
            Ok(_) => {}
            Err(err) => error!(error = %err, "notification cleanup failed"),
        }
    }

    async fn build_payload(&self, event: &NotificationEvent) -> Result<NotificationPayload, String> {
        let job = self
            .jobs
            .find_by_id(event.job_id)
            .await
            .map_err(|err| sanitize_error(&err.to_string()))?
            .ok_or_else(|| format!("job {} not found", event.job_id))?;

        let cached_title = match self.jobs.find_issue(job.issue_ref()).await {
            Ok(issue) => issue.map(|record| record.title).unwrap_or_default(),
            Err(err) => {
                debug!(event_id = %event.id, error = %err, "issue record unavailable");
                String::new()
            }
        };
        let title = if cached_title.is_empty() {
            self.lookup_title(&job).await
        } else {
            cached_title
        };
        Ok(NotificationPayload::new(event, &job, title))
    }

    async fn lookup_title(&self, job: &crate::job::domain::Job) -> String {
        let Some(lookup) = &self.issue_lookup else {
            return String::new();
        };
        match lookup.issue_title(job.issue_ref()).await {
            Ok(title) => title.unwrap_or_default(),
            Err(err) => {
                debug!(job_id = %job.id(), error = %err, "issue title lookup failed");
                String::new()
            }
        }
    }

    async fn deliver_all(
        &self,
        senders: Vec<Arc<dyn NotificationSender>>,
        payload: NotificationPayload,
    ) -> Vec<DeliveryResult> {
        let timeout = self.config.sender_timeout();
        let timeout_ms = self.config.sender_timeout_ms;
        let shared = Arc::new(payload);
        let mut deliveries = JoinSet::new();

        for sender in senders {
            let delivery_payload = Arc::clone(&shared);
            deliveries.spawn(async move {
                let channel = sender.name().to_owned();
                let outcome = match tokio::time::timeout(timeout, sender.deliver(&delivery_payload))
                    .await
                {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(err)) => Err(sanitize_error(&err.to_string())),
                    Err(_) => Err(SenderError::TimedOut(timeout_ms).to_string()),
                };
                (channel, outcome)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => results.push((
                    "unknown".to_owned(),
                    Err(format!("delivery task failed: {err}")),
                )),
            }
        }
        results
    }

    async fn skip(
        &self,
        event: &NotificationEvent,
        reason: String,
    ) -> Result<DispatchOutcome, DispatchError> {
        let resolved = self
            .outbox
            .mark_skipped(event.id, &reason, self.clock.utc())
            .await?;
        warn_if_unresolved(event.id, resolved);
        Ok(DispatchOutcome::Skipped {
            event_id: event.id,
            reason,
        })
    }

    async fn fail(
        &self,
        event: &NotificationEvent,
        error: String,
    ) -> Result<DispatchOutcome, DispatchError> {
        let resolved = self
            .outbox
            .mark_failed(event.id, &error, self.clock.utc())
            .await?;
        warn_if_unresolved(event.id, resolved);
        Ok(DispatchOutcome::Failed {
            event_id: event.id,
            error,
        })
    }

    async fn resolve_sent(&self, event: &NotificationEvent) -> Result<(), DispatchError> {
        let resolved = self.outbox.mark_sent(event.id, self.clock.utc()).await?;
        warn_if_unresolved(event.id, resolved);
        Ok(())
    }
}

fn warn_if_unresolved(event_id: EventId, resolved: bool) {
    if !resolved {
        warn!(event_id = %event_id, "event was no longer processing when resolved");
    }
}

fn log_outcome(outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Sent {
            event_id,
            delivered,
        } => info!(event_id = %event_id, channels = ?delivered, "notification sent"),
        DispatchOutcome::Failed { event_id, error } => {
            warn!(event_id = %event_id, error = %error, "notification delivery failed");
        }
        DispatchOutcome::Skipped { event_id, reason } => {
            debug!(event_id = %event_id, reason = %reason, "notification skipped");
        }
    }
}
