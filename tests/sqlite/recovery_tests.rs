//! Restart after an unclean shutdown.

use crate::sqlite::helpers::{TestContext, context, walk};
use chrono::TimeDelta;
use conveyor::job::domain::JobState;
use conveyor::job::services::CreateJobRequest;
use conveyor::notification::adapters::sqlite::SqliteNotificationRepository;
use conveyor::notification::domain::{EventStatus, EventType};
use conveyor::notification::ports::NotificationRepository;
use conveyor::recovery::{CrashRecovery, EVENT_RECOVERY_MESSAGE, SESSION_RECOVERY_MESSAGE};
use conveyor::session::adapters::sqlite::SqliteSessionRepository;
use conveyor::session::domain::{NewSession, SessionStage, SessionStatus};
use conveyor::session::ports::SessionRepository;
use mockable::Clock;
use rstest::rstest;
use std::sync::Arc;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn restart_requeues_work_and_releases_held_rows(context: TestContext) {
    let service = context.service();
    let job = service
        .create_job(CreateJobRequest::new("github", "acme/widgets", 7, "widgets"))
        .await
        .expect("job");
    service.set_notes(job.id(), "keep me").await.expect("notes");
    let claimed = service.claim_job().await.expect("claim").expect("job");
    let testing = walk(
        &service,
        &claimed,
        &[JobState::Implementing, JobState::Reviewing, JobState::Testing],
    )
    .await
    .expect("walk");
    context
        .sessions()
        .start(
            &NewSession {
                job_id: job.id(),
                iteration: 0,
                stage: SessionStage::Testing,
                model: "sonnet".to_owned(),
            },
            context.clock.utc(),
        )
        .await
        .expect("session");
    let outbox = context.outbox();
    let held_event = outbox
        .enqueue(job.id(), EventType::Cancelled, context.clock.utc())
        .await
        .expect("enqueue");
    outbox
        .claim_next(context.clock.utc(), 5)
        .await
        .expect("claim event")
        .expect("event");
    assert_eq!(testing.state(), JobState::Testing);

    // The process dies here: nothing above is finished.
    let restarted = context.reopen();
    context.clock.advance(TimeDelta::minutes(10));
    let report = CrashRecovery::new(restarted.clone(), Arc::clone(&context.clock))
        .run()
        .await
        .expect("recovery");

    assert_eq!(report.requeued_jobs, vec![job.id()]);
    assert_eq!(report.failed_sessions, 1);
    assert_eq!(report.failed_events, vec![held_event.id]);
    assert!(!report.is_clean());

    let recovered = service.find_job(job.id()).await.expect("find").expect("job");
    assert_eq!(recovered.state(), JobState::Queued);
    assert_eq!(recovered.notes(), "keep me");
    assert_eq!(recovered.started_at(), None);

    let sessions = SqliteSessionRepository::new(restarted.clone())
        .list_for_job(job.id())
        .await
        .expect("sessions");
    assert_eq!(sessions.len(), 1);
    assert!(sessions.iter().all(|session| {
        session.status == SessionStatus::Failed
            && session.error_message.as_deref() == Some(SESSION_RECOVERY_MESSAGE)
            && session.input_tokens == Some(0)
            && session.duration_ms == Some(0)
    }));

    let restarted_outbox = SqliteNotificationRepository::new(restarted);
    let event = restarted_outbox
        .find_by_id(held_event.id)
        .await
        .expect("find")
        .expect("event");
    assert_eq!(event.status, EventStatus::Failed);
    assert_eq!(event.attempts, 1);
    assert_eq!(event.last_error.as_deref(), Some(EVENT_RECOVERY_MESSAGE));

    assert!(
        restarted_outbox
            .claim_next(context.clock.utc(), 5)
            .await
            .expect("claim")
            .is_none(),
        "recovered event skipped its backoff"
    );
    context.clock.advance(TimeDelta::seconds(5));
    let retried = restarted_outbox
        .claim_next(context.clock.utc(), 5)
        .await
        .expect("claim")
        .expect("event after backoff");
    assert_eq!(retried.id, held_event.id);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn recovery_leaves_settled_rows_alone(context: TestContext) {
    let service = context.service();
    let queued = service
        .create_job(CreateJobRequest::new("github", "acme/widgets", 8, "widgets"))
        .await
        .expect("job");
    let other = service
        .create_job(CreateJobRequest::new("github", "acme/widgets", 9, "widgets"))
        .await
        .expect("job");
    let claimed = service.claim_job().await.expect("claim").expect("job");
    assert_eq!(claimed.id(), queued.id());
    let ready = walk(&service, &claimed, &crate::sqlite::helpers::TO_READY)
        .await
        .expect("walk");

    let report = CrashRecovery::new(context.store.clone(), Arc::clone(&context.clock))
        .run()
        .await
        .expect("recovery");
    let again = CrashRecovery::new(context.store.clone(), Arc::clone(&context.clock))
        .run()
        .await
        .expect("second recovery");

    assert!(report.is_clean());
    assert!(again.is_clean());
    let still_ready = service.find_job(ready.id()).await.expect("find").expect("job");
    assert_eq!(still_ready.state(), JobState::Ready);
    let still_queued = service.find_job(other.id()).await.expect("find").expect("job");
    assert_eq!(still_queued.state(), JobState::Queued);
    let pending = context
        .outbox()
        .list_for_job(ready.id())
        .await
        .expect("events");
    assert!(pending.iter().all(|event| event.status == EventStatus::Pending));
}
