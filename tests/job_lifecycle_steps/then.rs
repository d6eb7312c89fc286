//! Then steps for job lifecycle BDD scenarios.

use super::world::{JobLifecycleWorld, run_async};
use conveyor::job::domain::{JobDomainError, JobState};
use conveyor::job::ports::JobRepositoryError;
use conveyor::job::services::JobLifecycleError;
use conveyor::notification::domain::{EventStatus, EventType};
use conveyor::notification::ports::NotificationRepository;
use eyre::WrapErr;
use rstest_bdd_macros::then;

#[then(r#"the job state is "{expected}""#)]
fn job_state_is(world: &JobLifecycleWorld, expected: String) -> Result<(), eyre::Report> {
    let id = world.job()?.id();
    let stored = run_async(world.service.find_job(id))
        .wrap_err("reload job")?
        .ok_or_else(|| eyre::eyre!("job disappeared"))?;
    eyre::ensure!(
        stored.state().as_str() == expected,
        "expected state {expected}, found {}",
        stored.state()
    );
    Ok(())
}

#[then("the job has a start time")]
fn job_has_start_time(world: &JobLifecycleWorld) -> Result<(), eyre::Report> {
    eyre::ensure!(
        world.job()?.started_at().is_some(),
        "claimed job has no start time"
    );
    Ok(())
}

#[then("no job is claimed")]
fn no_job_claimed(world: &JobLifecycleWorld) -> Result<(), eyre::Report> {
    match &world.claimed {
        Some(None) => Ok(()),
        Some(Some(job)) => Err(eyre::eyre!("unexpectedly claimed job {}", job.id())),
        None => Err(eyre::eyre!("no claim was attempted")),
    }
}

#[then(r#"the outbox holds a pending "{event_type}" event for the job"#)]
fn outbox_holds_event(world: &JobLifecycleWorld, event_type: String) -> Result<(), eyre::Report> {
    let expected = EventType::try_from(event_type.as_str())
        .map_err(|err| eyre::eyre!("bad event type: {err}"))?;
    let id = world.job()?.id();
    let events = run_async(world.outbox.list_for_job(id)).wrap_err("list job events")?;
    eyre::ensure!(
        events
            .iter()
            .any(|event| event.event_type == expected && event.status == EventStatus::Pending),
        "no pending {expected} event among {events:?}"
    );
    Ok(())
}

#[then("the operation fails because the job is not cancellable")]
fn fails_not_cancellable(world: &JobLifecycleWorld) -> Result<(), eyre::Report> {
    match &world.last_result {
        Some(Err(JobLifecycleError::Domain(JobDomainError::NotCancellable {
            state: JobState::Ready,
            ..
        }))) => Ok(()),
        other => Err(eyre::eyre!("expected a not-cancellable error, got {other:?}")),
    }
}

#[then("the operation fails with a concurrent modification")]
fn fails_concurrent_modification(world: &JobLifecycleWorld) -> Result<(), eyre::Report> {
    match &world.last_result {
        Some(Err(JobLifecycleError::Repository(JobRepositoryError::ConcurrentModification {
            expected: JobState::Planning,
            actual: JobState::Queued,
            ..
        }))) => Ok(()),
        other => Err(eyre::eyre!("expected a concurrent modification, got {other:?}")),
    }
}

#[then(r#"the job workspace is "{path}""#)]
fn job_workspace_is(world: &JobLifecycleWorld, path: String) -> Result<(), eyre::Report> {
    let job = world.job()?;
    eyre::ensure!(
        job.workspace_path() == Some(path.as_str()),
        "expected workspace {path}, found {:?}",
        job.workspace_path()
    );
    Ok(())
}
