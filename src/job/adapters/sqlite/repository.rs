//! SQLite repository implementation for the job state machine.

use super::models::{
    IssueKey, IssueRow, JOB_COLUMNS, JobRow, StateCountRow, row_to_issue, row_to_job,
    to_column_count, to_new_issue_row, to_new_job_row,
};
use crate::job::{
    domain::{
        IssueRecord, IssueRef, Job, JobDetail, JobId, JobState, StateChange, entry_notification,
    },
    ports::{
        JobFilter, JobRepository, JobRepositoryError, JobRepositoryResult, RequeueMode,
        RequeueRequest,
    },
};
use crate::notification::adapters::sqlite::enqueue_in;
use crate::notification::domain::EventType;
use crate::store::schema::{issues, jobs};
use crate::store::{Store, StoreError, UnitOfWork, format_timestamp};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{BigInt, Bool, Text};
use diesel::sqlite::SqliteConnection;
use tracing::debug;

/// SQLite-backed job repository.
///
/// Every state change runs in one `BEGIN IMMEDIATE` transaction together
/// with the outbox row it produces.
#[derive(Debug, Clone)]
pub struct SqliteJobRepository {
    store: Store,
}

impl SqliteJobRepository {
    /// Creates a repository over an opened store.
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }
}

impl From<StoreError> for JobRepositoryError {
    fn from(err: StoreError) -> Self {
        Self::persistence(err)
    }
}

impl From<DieselError> for JobRepositoryError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn upsert_issue(&self, issue: &IssueRecord) -> JobRepositoryResult<()> {
        let key = IssueKey::from_ref(&issue.issue_ref)?;
        let project = issue.project.clone();
        let title = issue.title.clone();
        let eligible = issue.eligible;
        let updated_at = format_timestamp(issue.updated_at);

        self.store
            .write(move |uow: &mut UnitOfWork<'_>| {
                diesel::sql_query(concat!(
                    "INSERT INTO issues ",
                    "(provider, repository, issue_number, project, title, eligible, updated_at) ",
                    "VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) ",
                    "ON CONFLICT (provider, repository, issue_number) DO UPDATE SET ",
                    "project = excluded.project, title = excluded.title, ",
                    "eligible = excluded.eligible, updated_at = excluded.updated_at",
                ))
                .bind::<Text, _>(&key.provider)
                .bind::<Text, _>(&key.repository)
                .bind::<BigInt, _>(key.issue_number)
                .bind::<Text, _>(&project)
                .bind::<Text, _>(&title)
                .bind::<Bool, _>(eligible)
                .bind::<Text, _>(&updated_at)
                .execute(uow.connection())?;
                Ok(())
            })
            .await
    }

    async fn set_issue_eligibility(
        &self,
        issue_ref: &IssueRef,
        eligible: bool,
        at: DateTime<Utc>,
    ) -> JobRepositoryResult<bool> {
        let key = IssueKey::from_ref(issue_ref)?;
        self.store
            .write(move |uow: &mut UnitOfWork<'_>| {
                let updated = diesel::update(issue_filter(&key))
                    .set((
                        issues::eligible.eq(eligible),
                        issues::updated_at.eq(format_timestamp(at)),
                    ))
                    .execute(uow.connection())?;
                Ok(updated > 0)
            })
            .await
    }

    async fn find_issue(&self, issue_ref: &IssueRef) -> JobRepositoryResult<Option<IssueRecord>> {
        let key = IssueKey::from_ref(issue_ref)?;
        self.store
            .read(move |connection| {
                let row = issue_filter(&key)
                    .select(IssueRow::as_select())
                    .first::<IssueRow>(connection)
                    .optional()?;
                Ok(row.map(row_to_issue).transpose()?)
            })
            .await
    }

    async fn store(&self, job: &Job) -> JobRepositoryResult<()> {
        let issue_ref = job.issue_ref().clone();
        let new_issue = to_new_issue_row(job)?;
        let new_job = to_new_job_row(job)?;

        self.store
            .write(move |uow: &mut UnitOfWork<'_>| {
                let connection = uow.connection();
                // The pre-check names the conflict; the partial unique index
                // still guards the insert.
                if find_active_sibling(connection, &issue_ref, None)?.is_some() {
                    return Err(JobRepositoryError::DuplicateActiveJob(issue_ref.clone()));
                }

                diesel::insert_or_ignore_into(issues::table)
                    .values(&new_issue)
                    .execute(connection)?;
                diesel::insert_into(jobs::table)
                    .values(&new_job)
                    .execute(connection)
                    .map_err(|err| {
                        if is_active_job_unique_violation(&err) {
                            JobRepositoryError::DuplicateActiveJob(issue_ref.clone())
                        } else {
                            JobRepositoryError::persistence(err)
                        }
                    })?;
                Ok(())
            })
            .await
    }

    async fn find_by_id(&self, id: JobId) -> JobRepositoryResult<Option<Job>> {
        self.store
            .read(move |connection| Ok(load_job(connection, id)?))
            .await
    }

    async fn find_active_for_issue(
        &self,
        issue_ref: &IssueRef,
    ) -> JobRepositoryResult<Option<Job>> {
        let lookup = issue_ref.clone();
        self.store
            .read(move |connection| find_active_sibling(connection, &lookup, None))
            .await
    }

    async fn list(&self, filter: &JobFilter) -> JobRepositoryResult<Vec<Job>> {
        let states: Vec<String> = filter
            .states
            .iter()
            .map(|state| state.as_str().to_owned())
            .collect();
        let project = filter.project.clone();
        let limit = filter.limit.map(i64::from);

        self.store
            .read(move |connection| {
                let mut query = jobs::table.select(JobRow::as_select()).into_boxed();
                if !states.is_empty() {
                    query = query.filter(jobs::state.eq_any(states));
                }
                if let Some(name) = project {
                    query = query.filter(jobs::project.eq(name));
                }
                if let Some(max_rows) = limit {
                    query = query.limit(max_rows);
                }
                let rows = query
                    .order((jobs::created_at.desc(), jobs::id.desc()))
                    .load::<JobRow>(connection)?;
                Ok(rows
                    .into_iter()
                    .map(row_to_job)
                    .collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }

    async fn state_counts(&self) -> JobRepositoryResult<Vec<(JobState, u64)>> {
        self.store
            .read(|connection| {
                let rows = diesel::sql_query(
                    "SELECT state, COUNT(*) AS count FROM jobs GROUP BY state",
                )
                .load::<StateCountRow>(connection)?;
                let mut counts = Vec::with_capacity(rows.len());
                for row in rows {
                    let state = JobState::try_from(row.state.as_str())
                        .map_err(|err| StoreError::corrupt("jobs", err.to_string()))?;
                    let count = u64::try_from(row.count)
                        .map_err(|err| StoreError::corrupt("jobs", err.to_string()))?;
                    counts.push((state, count));
                }
                counts.sort_by_key(|(state, _)| {
                    JobState::ALL.iter().position(|candidate| candidate == state)
                });
                Ok(counts)
            })
            .await
    }

    async fn claim_next(&self, at: DateTime<Utc>) -> JobRepositoryResult<Option<Job>> {
        let timestamp = format_timestamp(at);
        let claimed = self
            .store
            .write(move |uow: &mut UnitOfWork<'_>| {
                let row = diesel::sql_query(format!(
                    concat!(
                        "UPDATE jobs SET state = 'planning', started_at = ?1, updated_at = ?1, ",
                        "completed_at = NULL ",
                        "WHERE id = (",
                        "SELECT j.id FROM jobs j JOIN issues i ",
                        "ON i.provider = j.provider AND i.repository = j.repository ",
                        "AND i.issue_number = j.issue_number ",
                        "WHERE j.state = 'queued' AND i.eligible = 1 ",
                        "ORDER BY j.created_at, j.rowid LIMIT 1",
                        ") AND state = 'queued' RETURNING {}",
                    ),
                    JOB_COLUMNS
                ))
                .bind::<Text, _>(&timestamp)
                .get_result::<JobRow>(uow.connection())
                .optional()?;
                Ok::<_, JobRepositoryError>(row.map(row_to_job).transpose()?)
            })
            .await?;

        if let Some(job) = &claimed {
            debug!(job_id = %job.id(), issue = %job.issue_ref(), "job claimed");
        }
        Ok(claimed)
    }

    async fn transition(&self, change: StateChange) -> JobRepositoryResult<Job> {
        self.store
            .write(move |uow: &mut UnitOfWork<'_>| apply_transition(uow, change))
            .await
    }

    async fn ensure_approved(&self, id: JobId, at: DateTime<Utc>) -> JobRepositoryResult<bool> {
        self.store
            .write(move |uow: &mut UnitOfWork<'_>| {
                let timestamp = format_timestamp(at);
                let row = diesel::sql_query(format!(
                    concat!(
                        "UPDATE jobs SET state = 'approved', updated_at = ?1, completed_at = ?1 ",
                        "WHERE id = ?2 AND state = 'ready' RETURNING {}",
                    ),
                    JOB_COLUMNS
                ))
                .bind::<Text, _>(&timestamp)
                .bind::<Text, _>(id.to_string())
                .get_result::<JobRow>(uow.connection())
                .optional()?;

                let Some(approved_row) = row else {
                    if load_job(uow.connection(), id)?.is_none() {
                        return Err(JobRepositoryError::NotFound(id));
                    }
                    return Ok(false);
                };
                let job = row_to_job(approved_row)?;
                let trigger =
                    entry_notification(JobState::Ready, JobState::Approved, job.pr_url().is_some());
                if let Some(event_type) = trigger {
                    enqueue_in(uow, id, event_type, at)?;
                }
                Ok(true)
            })
            .await
    }

    async fn cancel_all(&self, at: DateTime<Utc>) -> JobRepositoryResult<Vec<Job>> {
        self.store
            .write(move |uow: &mut UnitOfWork<'_>| {
                let rows = diesel::sql_query(format!(
                    concat!(
                        "UPDATE jobs SET state = 'cancelled', updated_at = ?1, completed_at = ?1 ",
                        "WHERE state IN ({}) RETURNING {}",
                    ),
                    state_list(&JobState::CANCELLABLE),
                    JOB_COLUMNS
                ))
                .bind::<Text, _>(format_timestamp(at))
                .load::<JobRow>(uow.connection())?;
                Ok(rows
                    .into_iter()
                    .map(row_to_job)
                    .collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }

    async fn requeue(&self, request: RequeueRequest) -> JobRepositoryResult<Job> {
        self.store
            .write(move |uow: &mut UnitOfWork<'_>| apply_requeue(uow, &request))
            .await
    }

    async fn mark_merged(&self, id: JobId, at: DateTime<Utc>) -> JobRepositoryResult<bool> {
        self.store
            .write(move |uow: &mut UnitOfWork<'_>| record_pr_outcome(uow, id, PrOutcome::Merged, at))
            .await
    }

    async fn mark_pr_closed(&self, id: JobId, at: DateTime<Utc>) -> JobRepositoryResult<bool> {
        self.store
            .write(move |uow: &mut UnitOfWork<'_>| record_pr_outcome(uow, id, PrOutcome::Closed, at))
            .await
    }

    async fn record_detail(
        &self,
        id: JobId,
        detail: JobDetail,
        at: DateTime<Utc>,
    ) -> JobRepositoryResult<Job> {
        self.store
            .write(move |uow: &mut UnitOfWork<'_>| apply_detail(uow, id, detail, at))
            .await
    }
}

/// Resets every in-flight job to `queued` inside `uow`.
///
/// Used by crash recovery: whatever a worker held in memory is gone, so the
/// job restarts from the top of the pipeline with its row and notes intact.
pub(crate) fn requeue_in_flight(
    uow: &mut UnitOfWork<'_>,
    at: DateTime<Utc>,
) -> Result<Vec<JobId>, StoreError> {
    let rows = diesel::sql_query(format!(
        concat!(
            "UPDATE jobs SET state = 'queued', updated_at = ?1, started_at = NULL, ",
            "completed_at = NULL WHERE state IN ({}) RETURNING {}",
        ),
        state_list(&JobState::IN_FLIGHT),
        JOB_COLUMNS
    ))
    .bind::<Text, _>(format_timestamp(at))
    .load::<JobRow>(uow.connection())?;
    rows.into_iter()
        .map(|row| row_to_job(row).map(|job| job.id()))
        .collect()
}

fn apply_transition(uow: &mut UnitOfWork<'_>, change: StateChange) -> JobRepositoryResult<Job> {
    let job_id = change.job_id();
    let from = change.from();
    let to = change.to();
    let timestamp = format_timestamp(change.at());

    let updated = diesel::sql_query(format!(
        concat!(
            "UPDATE jobs SET state = ?1, updated_at = ?2, ",
            "completed_at = CASE WHEN ?3 THEN ?2 WHEN ?4 THEN NULL ELSE completed_at END, ",
            "started_at = CASE WHEN ?4 THEN NULL WHEN ?5 THEN ?2 ELSE started_at END ",
            "WHERE id = ?6 AND state = ?7 RETURNING {}",
        ),
        JOB_COLUMNS
    ))
    .bind::<Text, _>(to.as_str())
    .bind::<Text, _>(&timestamp)
    .bind::<Bool, _>(to.ends_attempt())
    .bind::<Bool, _>(to == JobState::Queued)
    .bind::<Bool, _>(to == JobState::Planning)
    .bind::<Text, _>(job_id.to_string())
    .bind::<Text, _>(from.as_str())
    .get_result::<JobRow>(uow.connection())
    .optional();

    let row = match updated {
        Ok(Some(row)) => row,
        Ok(None) => return Err(guard_failure(uow.connection(), job_id, from)?),
        Err(err) if is_active_job_unique_violation(&err) => {
            return Err(sibling_conflict(uow.connection(), job_id)?);
        }
        Err(err) => return Err(err.into()),
    };

    let job = row_to_job(row)?;
    if let Some(event_type) = entry_notification(from, to, job.pr_url().is_some()) {
        enqueue_in(uow, job_id, event_type, change.at())?;
    }
    debug!(job_id = %job_id, %from, %to, "job transitioned");
    Ok(job)
}

fn apply_requeue(uow: &mut UnitOfWork<'_>, request: &RequeueRequest) -> JobRepositoryResult<Job> {
    let connection = uow.connection();
    let job = load_job(connection, request.job_id)?
        .ok_or(JobRepositoryError::NotFound(request.job_id))?;

    if !job.state().is_requeueable() {
        return Err(JobRepositoryError::NotRequeueable {
            job_id: job.id(),
            state: job.state(),
        });
    }
    if !issue_is_eligible(connection, job.issue_ref())? {
        return Err(JobRepositoryError::IneligibleIssue(job.issue_ref().clone()));
    }
    if let Some(sibling) = find_active_sibling(connection, job.issue_ref(), Some(job.id()))? {
        return Err(JobRepositoryError::ActiveSiblingExists {
            issue_ref: job.issue_ref().clone(),
            sibling_id: sibling.id(),
            sibling_state: sibling.state(),
        });
    }

    let timestamp = format_timestamp(request.at);
    let statement = match request.mode {
        RequeueMode::Reset => concat!(
            "UPDATE jobs SET state = 'queued', iteration = 0, workspace_path = NULL, ",
            "branch_name = NULL, base_commit = NULL, head_commit = NULL, ",
            "error_message = NULL, pr_url = NULL, pr_merged_at = NULL, pr_closed_at = NULL, ",
            "notes = ?1, updated_at = ?2, started_at = NULL, completed_at = NULL ",
            "WHERE id = ?3 AND state = ?4 RETURNING ",
        ),
        RequeueMode::Resume => {
            if job.iteration() >= job.max_iterations() {
                return Err(JobRepositoryError::IterationBudgetExhausted {
                    job_id: job.id(),
                    iteration: job.iteration(),
                    max_iterations: job.max_iterations(),
                });
            }
            concat!(
                "UPDATE jobs SET state = 'queued', error_message = NULL, ",
                "notes = ?1, updated_at = ?2, started_at = NULL, completed_at = NULL ",
                "WHERE id = ?3 AND state = ?4 RETURNING ",
            )
        }
    };
    let notes = match request.mode {
        RequeueMode::Reset => request.notes.clone(),
        RequeueMode::Resume => append_notes(job.notes(), &request.notes),
    };

    let row = diesel::sql_query(format!("{statement}{JOB_COLUMNS}"))
        .bind::<Text, _>(&notes)
        .bind::<Text, _>(&timestamp)
        .bind::<Text, _>(job.id().to_string())
        .bind::<Text, _>(job.state().as_str())
        .get_result::<JobRow>(connection)
        .optional()
        .map_err(|err| {
            if is_active_job_unique_violation(&err) {
                JobRepositoryError::DuplicateActiveJob(job.issue_ref().clone())
            } else {
                JobRepositoryError::persistence(err)
            }
        })?
        .ok_or(JobRepositoryError::ConcurrentModification {
            job_id: job.id(),
            expected: job.state(),
            actual: job.state(),
        })?;

    debug!(job_id = %job.id(), mode = ?request.mode, "job requeued");
    Ok(row_to_job(row)?)
}

#[derive(Debug, Clone, Copy)]
enum PrOutcome {
    Merged,
    Closed,
}

fn record_pr_outcome(
    uow: &mut UnitOfWork<'_>,
    id: JobId,
    outcome: PrOutcome,
    at: DateTime<Utc>,
) -> JobRepositoryResult<bool> {
    let job = load_job(uow.connection(), id)?.ok_or(JobRepositoryError::NotFound(id))?;
    if job.pr_merged_at().is_some() || job.pr_closed_at().is_some() {
        return Ok(false);
    }
    if job.state() != JobState::Approved {
        return Err(JobRepositoryError::InvalidPrTarget {
            job_id: id,
            state: job.state(),
        });
    }

    let (column, event_type) = match outcome {
        PrOutcome::Merged => ("pr_merged_at", EventType::PrMerged),
        PrOutcome::Closed => ("pr_closed_at", EventType::PrClosed),
    };
    let updated = diesel::sql_query(format!(
        "UPDATE jobs SET {column} = ?1, updated_at = ?1 WHERE id = ?2 AND {column} IS NULL"
    ))
    .bind::<Text, _>(format_timestamp(at))
    .bind::<Text, _>(id.to_string())
    .execute(uow.connection())?;
    if updated == 0 {
        return Ok(false);
    }

    enqueue_in(uow, id, event_type, at)?;
    debug!(job_id = %id, event = %event_type, "pull request outcome recorded");
    Ok(true)
}

fn apply_detail(
    uow: &mut UnitOfWork<'_>,
    id: JobId,
    detail: JobDetail,
    at: DateTime<Utc>,
) -> JobRepositoryResult<Job> {
    let connection = uow.connection();
    let job = load_job(connection, id)?.ok_or(JobRepositoryError::NotFound(id))?;
    let target = jobs::table.find(id.to_string());
    let updated_at = jobs::updated_at.eq(format_timestamp(at));

    match detail {
        JobDetail::Workspace {
            path,
            branch,
            base_commit,
        } => diesel::update(target)
            .set((
                jobs::workspace_path.eq(Some(path)),
                jobs::branch_name.eq(Some(branch)),
                jobs::base_commit.eq(Some(base_commit)),
                updated_at,
            ))
            .execute(connection)?,
        JobDetail::HeadCommit(commit) => diesel::update(target)
            .set((jobs::head_commit.eq(Some(commit)), updated_at))
            .execute(connection)?,
        JobDetail::PrUrl(url) => diesel::update(target)
            .set((jobs::pr_url.eq(Some(url)), updated_at))
            .execute(connection)?,
        JobDetail::Error(message) => diesel::update(target)
            .set((jobs::error_message.eq(Some(message)), updated_at))
            .execute(connection)?,
        JobDetail::Notes(notes) => diesel::update(target)
            .set((jobs::notes.eq(notes), updated_at))
            .execute(connection)?,
        JobDetail::AdvanceIteration => {
            if job.iteration() >= job.max_iterations() {
                return Err(JobRepositoryError::IterationBudgetExhausted {
                    job_id: id,
                    iteration: job.iteration(),
                    max_iterations: job.max_iterations(),
                });
            }
            let next = to_column_count(job.iteration().saturating_add(1))?;
            diesel::update(target)
                .set((jobs::iteration.eq(next), updated_at))
                .execute(connection)?
        }
    };

    load_job(connection, id)?.ok_or(JobRepositoryError::NotFound(id))
}

fn load_job(connection: &mut SqliteConnection, id: JobId) -> Result<Option<Job>, StoreError> {
    let row = jobs::table
        .find(id.to_string())
        .select(JobRow::as_select())
        .first::<JobRow>(connection)
        .optional()?;
    row.map(row_to_job).transpose()
}

fn issue_filter(
    key: &IssueKey,
) -> diesel::dsl::Filter<
    diesel::dsl::Filter<
        diesel::dsl::Filter<issues::table, diesel::dsl::Eq<issues::provider, String>>,
        diesel::dsl::Eq<issues::repository, String>,
    >,
    diesel::dsl::Eq<issues::issue_number, i64>,
> {
    issues::table
        .filter(issues::provider.eq(key.provider.clone()))
        .filter(issues::repository.eq(key.repository.clone()))
        .filter(issues::issue_number.eq(key.issue_number))
}

fn issue_is_eligible(
    connection: &mut SqliteConnection,
    issue_ref: &IssueRef,
) -> JobRepositoryResult<bool> {
    let key = IssueKey::from_ref(issue_ref)?;
    let eligible = issue_filter(&key)
        .select(issues::eligible)
        .first::<bool>(connection)
        .optional()?;
    Ok(eligible.unwrap_or(false))
}

/// Finds the active job for `issue_ref`, ignoring `exclude`.
///
/// Mirrors the predicate of `idx_jobs_one_active_per_issue`.
fn find_active_sibling(
    connection: &mut SqliteConnection,
    issue_ref: &IssueRef,
    exclude: Option<JobId>,
) -> JobRepositoryResult<Option<Job>> {
    let key = IssueKey::from_ref(issue_ref)?;
    let excluded_id = exclude.map(|id| id.to_string()).unwrap_or_default();
    let row = diesel::sql_query(format!(
        concat!(
            "SELECT {} FROM jobs ",
            "WHERE provider = ?1 AND repository = ?2 AND issue_number = ?3 AND id <> ?4 ",
            "AND state NOT IN ('rejected', 'failed', 'cancelled') ",
            "AND NOT (state = 'approved' AND ",
            "(pr_merged_at IS NOT NULL OR pr_closed_at IS NOT NULL)) ",
            "ORDER BY created_at DESC LIMIT 1",
        ),
        JOB_COLUMNS
    ))
    .bind::<Text, _>(&key.provider)
    .bind::<Text, _>(&key.repository)
    .bind::<BigInt, _>(key.issue_number)
    .bind::<Text, _>(&excluded_id)
    .get_result::<JobRow>(connection)
    .optional()?;
    Ok(row.map(row_to_job).transpose()?)
}

fn guard_failure(
    connection: &mut SqliteConnection,
    job_id: JobId,
    expected: JobState,
) -> JobRepositoryResult<JobRepositoryError> {
    let current = load_job(connection, job_id)?;
    Ok(current.map_or(JobRepositoryError::NotFound(job_id), |job| {
        JobRepositoryError::ConcurrentModification {
            job_id,
            expected,
            actual: job.state(),
        }
    }))
}

fn sibling_conflict(
    connection: &mut SqliteConnection,
    job_id: JobId,
) -> JobRepositoryResult<JobRepositoryError> {
    let job = load_job(connection, job_id)?.ok_or(JobRepositoryError::NotFound(job_id))?;
    let sibling = find_active_sibling(connection, job.issue_ref(), Some(job_id))?;
    Ok(sibling.map_or_else(
        || JobRepositoryError::DuplicateActiveJob(job.issue_ref().clone()),
        |active| JobRepositoryError::ActiveSiblingExists {
            issue_ref: job.issue_ref().clone(),
            sibling_id: active.id(),
            sibling_state: active.state(),
        },
    ))
}

/// SQLite reports no constraint name, only the indexed columns.
fn is_active_job_unique_violation(err: &DieselError) -> bool {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            info.message().contains("jobs.provider")
        }
        _ => false,
    }
}

fn state_list(states: &[JobState]) -> String {
    states
        .iter()
        .map(|state| format!("'{}'", state.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn append_notes(existing: &str, addition: &str) -> String {
    match (existing.is_empty(), addition.is_empty()) {
        (_, true) => existing.to_owned(),
        (true, false) => addition.to_owned(),
        (false, false) => format!("{existing}\n{addition}"),
    }
}
