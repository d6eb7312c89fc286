//! Unit tests for session and artifact bookkeeping.

use crate::job::adapters::sqlite::SqliteJobRepository;
use crate::job::domain::{IssueRef, Job, JobId};
use crate::job::ports::JobRepository;
use crate::session::adapters::sqlite::SqliteSessionRepository;
use crate::session::domain::{
    ArtifactKind, NewArtifact, NewSession, SessionStage, SessionStatus, SessionUsage,
    UsageSummary,
};
use crate::session::ports::{SessionRepository, SessionRepositoryError};
use crate::test_support::{ManualClock, TempStore, temp_store};
use chrono::TimeDelta;
use mockable::Clock;
use rstest::{fixture, rstest};
use std::sync::Arc;

struct Harness {
    _fixture: TempStore,
    clock: Arc<ManualClock>,
    sessions: SqliteSessionRepository,
    job: Job,
}

#[fixture]
async fn harness() -> Harness {
    let fixture = temp_store();
    let clock = Arc::new(ManualClock::default());
    let issue_ref = IssueRef::from_parts("github", "acme/widgets", 5).expect("issue");
    let job = Job::new_queued(issue_ref, "widgets", 3, &*clock).expect("job");
    SqliteJobRepository::new(fixture.store.clone())
        .store(&job)
        .await
        .expect("store job");
    Harness {
        sessions: SqliteSessionRepository::new(fixture.store.clone()),
        _fixture: fixture,
        clock,
        job,
    }
}

fn new_session(job_id: JobId, iteration: u32, stage: SessionStage) -> NewSession {
    NewSession {
        job_id,
        iteration,
        stage,
        model: "sonnet".to_owned(),
    }
}

#[rstest]
#[case("conflict_resolution", SessionStage::ConflictResolution)]
#[case("planning", SessionStage::Planning)]
fn stages_parse_from_storage_names(#[case] raw: &str, #[case] expected: SessionStage) {
    assert_eq!(SessionStage::try_from(raw), Ok(expected));
}

#[rstest]
fn unknown_statuses_name_their_vocabulary() {
    let err = SessionStatus::try_from("paused").expect_err("unknown status");
    assert_eq!(err.kind, "session status");
    assert_eq!(err.to_string(), "unknown session status: paused");
}

#[rstest]
fn artifact_kinds_use_snake_case() {
    assert_eq!(ArtifactKind::TestReport.as_str(), "test_report");
    assert_eq!(ArtifactKind::try_from("test_report"), Ok(ArtifactKind::TestReport));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn completed_sessions_feed_the_usage_summary(#[future] harness: Harness) {
    let ctx = harness.await;
    let job_id = ctx.job.id();
    let first = ctx
        .sessions
        .start(&new_session(job_id, 0, SessionStage::Planning), ctx.clock.utc())
        .await
        .expect("start");
    assert_eq!(first.status, SessionStatus::Running);
    assert_eq!(first.input_tokens, None);

    ctx.clock.advance(TimeDelta::seconds(3));
    let usage = SessionUsage {
        input_tokens: 1_200,
        output_tokens: 300,
        duration_ms: 3_000,
    };
    assert!(
        ctx
            .sessions
            .complete(first.id, usage, ctx.clock.utc())
            .await
            .expect("complete")
    );
    assert!(
        !ctx
            .sessions
            .complete(first.id, usage, ctx.clock.utc())
            .await
            .expect("complete twice")
    );

    ctx
        .sessions
        .start(&new_session(job_id, 0, SessionStage::Implementing), ctx.clock.utc())
        .await
        .expect("start");

    let summary = ctx.sessions.usage_summary(job_id).await.expect("summary");
    assert_eq!(
        summary,
        UsageSummary {
            sessions: 2,
            input_tokens: 1_200,
            output_tokens: 300,
            duration_ms: 3_000,
        }
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancel_only_touches_running_sessions(#[future] harness: Harness) {
    let ctx = harness.await;
    let job_id = ctx.job.id();
    let done = ctx
        .sessions
        .start(&new_session(job_id, 0, SessionStage::Planning), ctx.clock.utc())
        .await
        .expect("start");
    ctx
        .sessions
        .fail(done.id, "model overloaded", ctx.clock.utc())
        .await
        .expect("fail");
    ctx
        .sessions
        .start(&new_session(job_id, 0, SessionStage::Reviewing), ctx.clock.utc())
        .await
        .expect("start");

    let cancelled = ctx
        .sessions
        .cancel_running_for_job(job_id, ctx.clock.utc())
        .await
        .expect("cancel");

    assert_eq!(cancelled, 1);
    let statuses: Vec<_> = ctx
        .sessions
        .list_for_job(job_id)
        .await
        .expect("list")
        .into_iter()
        .map(|session| session.status)
        .collect();
    assert_eq!(statuses, vec![SessionStatus::Failed, SessionStatus::Cancelled]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn artifacts_filter_by_iteration(#[future] harness: Harness) {
    let ctx = harness.await;
    let job_id = ctx.job.id();
    for (iteration, kind) in [
        (0, ArtifactKind::Plan),
        (1, ArtifactKind::Diff),
        (1, ArtifactKind::TestReport),
    ] {
        ctx
            .sessions
            .record_artifact(
                &NewArtifact {
                    job_id,
                    iteration,
                    kind,
                    content: format!("{kind} for {iteration}"),
                },
                ctx.clock.utc(),
            )
            .await
            .expect("artifact");
        ctx.clock.advance(TimeDelta::seconds(1));
    }

    let all = ctx.sessions.list_artifacts(job_id, None).await.expect("list");
    let second = ctx.sessions.list_artifacts(job_id, Some(1)).await.expect("list");

    assert_eq!(all.len(), 3);
    let kinds: Vec<_> = second.iter().map(|artifact| artifact.kind).collect();
    assert_eq!(kinds, vec![ArtifactKind::Diff, ArtifactKind::TestReport]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sessions_require_an_existing_job(#[future] harness: Harness) {
    let ctx = harness.await;
    let missing = JobId::new();

    let result = ctx
        .sessions
        .start(&new_session(missing, 0, SessionStage::Planning), ctx.clock.utc())
        .await;

    assert!(matches!(result, Err(SessionRepositoryError::JobNotFound(id)) if id == missing));
}
