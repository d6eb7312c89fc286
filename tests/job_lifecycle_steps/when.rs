//! When steps for job lifecycle BDD scenarios.

use super::world::{JobLifecycleWorld, parse_states, run_async};
use conveyor::job::domain::JobState;
use eyre::WrapErr;
use rstest_bdd_macros::when;

#[when("a worker claims the next job")]
fn worker_claims(world: &mut JobLifecycleWorld) -> Result<(), eyre::Report> {
    let claimed = run_async(world.service.claim_job()).wrap_err("claim job")?;
    if let Some(job) = &claimed {
        world.last_job = Some(job.clone());
    }
    world.claimed = Some(claimed);
    Ok(())
}

#[when(r#"the job moves through "{path}""#)]
fn job_moves_through(world: &mut JobLifecycleWorld, path: String) -> Result<(), eyre::Report> {
    for target in parse_states(&path)? {
        let job = world.job()?;
        let (id, from) = (job.id(), job.state());
        let result = run_async(world.service.transition(id, from, target));
        let moved = result.clone().wrap_err_with(|| format!("move job to {target}"))?;
        world.last_job = Some(moved);
        world.last_result = Some(result);
    }
    Ok(())
}

#[when(r#"the job is moved from "{from}" to "{to}""#)]
fn job_moved_from_to(
    world: &mut JobLifecycleWorld,
    from: String,
    to: String,
) -> Result<(), eyre::Report> {
    let from_state =
        JobState::try_from(from.as_str()).map_err(|err| eyre::eyre!("bad state: {err}"))?;
    let to_state = JobState::try_from(to.as_str()).map_err(|err| eyre::eyre!("bad state: {err}"))?;
    let id = world.job()?.id();
    world.last_result = Some(run_async(world.service.transition(id, from_state, to_state)));
    Ok(())
}

#[when("the job is cancelled")]
fn job_cancelled(world: &mut JobLifecycleWorld) -> Result<(), eyre::Report> {
    let id = world.job()?.id();
    let result = run_async(world.service.cancel_job(id)).map(|outcome| outcome.job);
    world.last_result = Some(result);
    Ok(())
}

#[when(r#"the job is resumed with notes "{notes}""#)]
fn job_resumed(world: &mut JobLifecycleWorld, notes: String) -> Result<(), eyre::Report> {
    let id = world.job()?.id();
    let result = run_async(world.service.resume(id, &notes));
    if let Ok(job) = &result {
        world.last_job = Some(job.clone());
    }
    world.last_result = Some(result);
    Ok(())
}
