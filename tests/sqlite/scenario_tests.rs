//! Issue-to-merge flows with notification delivery.

use crate::sqlite::helpers::{RecordingSender, TO_READY, TestContext, context, walk};
use conveyor::job::domain::JobState;
use conveyor::job::ports::JobRepositoryError;
use conveyor::job::services::{CreateJobRequest, JobLifecycleError, RegisterIssueRequest};
use conveyor::notification::domain::{EventStatus, EventType};
use conveyor::notification::ports::{NotificationRepository, NotificationSender};
use conveyor::notification::services::DispatchOutcome;
use conveyor::session::domain::{ArtifactKind, NewArtifact};
use conveyor::session::ports::SessionRepository;
use mockable::Clock;
use rstest::rstest;
use std::sync::Arc;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn approved_and_merged_job_notifies_each_milestone(context: TestContext) {
    let service = context.service();
    service
        .register_issue(
            RegisterIssueRequest::new("github", "acme/widgets", 101, "widgets")
                .with_title("Widgets overflow on resize"),
        )
        .await
        .expect("register");
    let job = service
        .create_job(CreateJobRequest::new("github", "acme/widgets", 101, "widgets"))
        .await
        .expect("job");
    let claimed = service.claim_job().await.expect("claim").expect("job");
    service
        .record_workspace(job.id(), "/srv/work/101", "conveyor/101", "a1b2c3")
        .await
        .expect("workspace");
    context
        .sessions()
        .record_artifact(
            &NewArtifact {
                job_id: job.id(),
                iteration: 0,
                kind: ArtifactKind::Plan,
                content: "1. reproduce\n2. fix".to_owned(),
            },
            context.clock.utc(),
        )
        .await
        .expect("artifact");
    walk(&service, &claimed, &TO_READY).await.expect("to ready");
    service
        .record_pr_url(job.id(), "https://github.com/acme/widgets/pull/9")
        .await
        .expect("pr url");
    assert!(service.ensure_approved(job.id()).await.expect("approve"));
    assert!(
        service
            .mark_merged(job.id(), context.clock.utc())
            .await
            .expect("merge")
    );

    let recorder = RecordingSender::new();
    let dispatcher =
        context.dispatcher(vec![Arc::clone(&recorder) as Arc<dyn NotificationSender>]);
    let mut outcomes = Vec::new();
    while let Some(outcome) = dispatcher.dispatch_next().await.expect("dispatch") {
        outcomes.push(outcome);
    }

    assert_eq!(outcomes.len(), 3);
    assert!(
        outcomes
            .iter()
            .all(|outcome| matches!(outcome, DispatchOutcome::Sent { .. }))
    );
    assert_eq!(
        recorder.event_types(),
        vec![EventType::NeedsReview, EventType::PrCreated, EventType::PrMerged]
    );
    assert!(recorder.payloads().iter().all(|payload| {
        payload.issue_title == "Widgets overflow on resize" && payload.job_id == job.id()
    }));

    let merged = service.find_job(job.id()).await.expect("find").expect("job");
    assert_eq!(merged.state(), JobState::Approved);
    assert!(!merged.is_active());
    let follow_up = service
        .create_job(CreateJobRequest::new("github", "acme/widgets", 101, "widgets"))
        .await
        .expect("a merged job no longer blocks its issue");
    assert_eq!(follow_up.state(), JobState::Queued);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn review_rounds_stop_at_the_iteration_budget(context: TestContext) {
    let service = context.service();
    let job = service
        .create_job(
            CreateJobRequest::new("github", "acme/widgets", 102, "widgets").with_max_iterations(2),
        )
        .await
        .expect("job");
    let claimed = service.claim_job().await.expect("claim").expect("job");
    let mut current = walk(
        &service,
        &claimed,
        &[JobState::Implementing, JobState::Reviewing],
    )
    .await
    .expect("first round");

    for _ in 0..2 {
        service.advance_iteration(job.id()).await.expect("iteration");
        current = walk(&service, &current, &[JobState::Implementing, JobState::Reviewing])
            .await
            .expect("another round");
    }
    let exhausted = service.advance_iteration(job.id()).await;
    assert!(matches!(
        exhausted,
        Err(JobLifecycleError::Repository(
            JobRepositoryError::IterationBudgetExhausted { iteration: 2, max_iterations: 2, .. }
        ))
    ));

    service
        .record_error(job.id(), "review still failing after 2 rounds")
        .await
        .expect("error");
    let failed = walk(&service, &current, &[JobState::Failed])
        .await
        .expect("fail");
    assert_eq!(failed.error_message(), Some("review still failing after 2 rounds"));
    assert!(failed.completed_at().is_some());

    let events = context.outbox().list_for_job(job.id()).await.expect("events");
    let types: Vec<_> = events.iter().map(|event| event.event_type).collect();
    assert_eq!(types, vec![EventType::Failed]);
    assert!(events.iter().all(|event| event.status == EventStatus::Pending));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rejected_job_can_be_retried_from_scratch(context: TestContext) {
    let service = context.service();
    let job = service
        .create_job(CreateJobRequest::new("github", "acme/widgets", 103, "widgets"))
        .await
        .expect("job");
    let claimed = service.claim_job().await.expect("claim").expect("job");
    service
        .record_workspace(job.id(), "/srv/work/103", "conveyor/103", "d4e5f6")
        .await
        .expect("workspace");
    let ready = walk(&service, &claimed, &TO_READY).await.expect("ready");
    walk(&service, &ready, &[JobState::Rejected])
        .await
        .expect("reject");

    let retried = service
        .reset_for_retry(job.id(), "Use the layout engine instead")
        .await
        .expect("retry");
    assert_eq!(retried.state(), JobState::Queued);
    assert_eq!(retried.workspace_path(), None);

    let reclaimed = service.claim_job().await.expect("claim").expect("job");
    assert_eq!(reclaimed.id(), job.id());
    assert_eq!(reclaimed.notes(), "Use the layout engine instead");
}
