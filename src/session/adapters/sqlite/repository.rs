//! SQLite repository implementation for sessions and artifacts.

use super::models::{
    ArtifactRow, NewSessionRow, SessionRow, UsageRow, from_column_count, row_to_artifact,
    row_to_session, to_column_count, to_column_iteration,
};
use crate::job::domain::JobId;
use crate::session::{
    domain::{
        Artifact, ArtifactId, LlmSession, NewArtifact, NewSession, SessionId, SessionStatus,
        SessionUsage, UsageSummary,
    },
    ports::{SessionRepository, SessionRepositoryError, SessionRepositoryResult},
};
use crate::store::schema::{artifacts, llm_sessions};
use crate::store::{Store, StoreError, StoreResult, UnitOfWork, format_timestamp};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::Text;

/// SQLite-backed session repository.
#[derive(Debug, Clone)]
pub struct SqliteSessionRepository {
    store: Store,
}

impl SqliteSessionRepository {
    /// Creates a repository over an opened store.
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }
}

impl From<StoreError> for SessionRepositoryError {
    fn from(err: StoreError) -> Self {
        Self::persistence(err)
    }
}

impl From<DieselError> for SessionRepositoryError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

/// Fails every `running` session inside `uow`.
///
/// Counters that were never reported are set to zero so usage sums stay
/// defined. Returns how many sessions changed.
pub(crate) fn fail_running_in(
    uow: &mut UnitOfWork<'_>,
    message: &str,
    at: DateTime<Utc>,
) -> StoreResult<u64> {
    let updated = diesel::sql_query(concat!(
        "UPDATE llm_sessions SET status = 'failed', error_message = ?1, finished_at = ?2, ",
        "input_tokens = COALESCE(input_tokens, 0), ",
        "output_tokens = COALESCE(output_tokens, 0), ",
        "duration_ms = COALESCE(duration_ms, 0) ",
        "WHERE status = 'running'",
    ))
    .bind::<Text, _>(message)
    .bind::<Text, _>(format_timestamp(at))
    .execute(uow.connection())?;
    Ok(u64::try_from(updated).unwrap_or(u64::MAX))
}

fn map_missing_job(err: DieselError, job_id: JobId) -> SessionRepositoryError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
            SessionRepositoryError::JobNotFound(job_id)
        }
        other => SessionRepositoryError::from(other),
    }
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn start(
        &self,
        session: &NewSession,
        at: DateTime<Utc>,
    ) -> SessionRepositoryResult<LlmSession> {
        let job_id = session.job_id;
        let row = NewSessionRow {
            id: SessionId::new().to_string(),
            job_id: job_id.to_string(),
            iteration: to_column_iteration(session.iteration)?,
            stage: session.stage.as_str().to_owned(),
            model: session.model.clone(),
            status: SessionStatus::Running.as_str().to_owned(),
            started_at: format_timestamp(at),
        };

        self.store
            .write(move |uow: &mut UnitOfWork<'_>| {
                let stored = diesel::insert_into(llm_sessions::table)
                    .values(&row)
                    .returning(SessionRow::as_returning())
                    .get_result::<SessionRow>(uow.connection())
                    .map_err(|err| map_missing_job(err, job_id))?;
                Ok(row_to_session(stored)?)
            })
            .await
    }

    async fn complete(
        &self,
        id: SessionId,
        usage: SessionUsage,
        at: DateTime<Utc>,
    ) -> SessionRepositoryResult<bool> {
        let input_tokens = to_column_count(usage.input_tokens)?;
        let output_tokens = to_column_count(usage.output_tokens)?;
        let duration_ms = to_column_count(usage.duration_ms)?;
        self.store
            .write(move |uow: &mut UnitOfWork<'_>| {
                let updated = diesel::update(running_session(id))
                    .set((
                        llm_sessions::status.eq(SessionStatus::Completed.as_str()),
                        llm_sessions::input_tokens.eq(Some(input_tokens)),
                        llm_sessions::output_tokens.eq(Some(output_tokens)),
                        llm_sessions::duration_ms.eq(Some(duration_ms)),
                        llm_sessions::finished_at.eq(Some(format_timestamp(at))),
                    ))
                    .execute(uow.connection())?;
                Ok(updated > 0)
            })
            .await
    }

    async fn fail(
        &self,
        id: SessionId,
        message: &str,
        at: DateTime<Utc>,
    ) -> SessionRepositoryResult<bool> {
        let error_message = message.to_owned();
        self.store
            .write(move |uow: &mut UnitOfWork<'_>| {
                let updated = diesel::update(running_session(id))
                    .set((
                        llm_sessions::status.eq(SessionStatus::Failed.as_str()),
                        llm_sessions::error_message.eq(Some(error_message)),
                        llm_sessions::finished_at.eq(Some(format_timestamp(at))),
                    ))
                    .execute(uow.connection())?;
                Ok(updated > 0)
            })
            .await
    }

    async fn cancel_running_for_job(
        &self,
        job_id: JobId,
        at: DateTime<Utc>,
    ) -> SessionRepositoryResult<u64> {
        self.store
            .write(move |uow: &mut UnitOfWork<'_>| {
                let updated = diesel::update(
                    llm_sessions::table
                        .filter(llm_sessions::job_id.eq(job_id.to_string()))
                        .filter(llm_sessions::status.eq(SessionStatus::Running.as_str())),
                )
                .set((
                    llm_sessions::status.eq(SessionStatus::Cancelled.as_str()),
                    llm_sessions::finished_at.eq(Some(format_timestamp(at))),
                ))
                .execute(uow.connection())?;
                Ok(u64::try_from(updated).unwrap_or(u64::MAX))
            })
            .await
    }

    async fn list_for_job(&self, job_id: JobId) -> SessionRepositoryResult<Vec<LlmSession>> {
        self.store
            .read(move |connection| {
                let rows = llm_sessions::table
                    .filter(llm_sessions::job_id.eq(job_id.to_string()))
                    .order((llm_sessions::started_at.asc(), llm_sessions::id.asc()))
                    .select(SessionRow::as_select())
                    .load::<SessionRow>(connection)?;
                Ok(rows
                    .into_iter()
                    .map(row_to_session)
                    .collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }

    async fn usage_summary(&self, job_id: JobId) -> SessionRepositoryResult<UsageSummary> {
        self.store
            .read(move |connection| {
                let row = diesel::sql_query(concat!(
                    "SELECT COUNT(*) AS sessions, ",
                    "COALESCE(SUM(input_tokens), 0) AS input_tokens, ",
                    "COALESCE(SUM(output_tokens), 0) AS output_tokens, ",
                    "COALESCE(SUM(duration_ms), 0) AS duration_ms ",
                    "FROM llm_sessions WHERE job_id = ?1",
                ))
                .bind::<Text, _>(job_id.to_string())
                .get_result::<UsageRow>(connection)?;
                Ok(UsageSummary {
                    sessions: from_column_count(row.sessions)?,
                    input_tokens: from_column_count(row.input_tokens)?,
                    output_tokens: from_column_count(row.output_tokens)?,
                    duration_ms: from_column_count(row.duration_ms)?,
                })
            })
            .await
    }

    async fn record_artifact(
        &self,
        artifact: &NewArtifact,
        at: DateTime<Utc>,
    ) -> SessionRepositoryResult<Artifact> {
        let job_id = artifact.job_id;
        let row = ArtifactRow {
            id: ArtifactId::new().to_string(),
            job_id: job_id.to_string(),
            iteration: to_column_iteration(artifact.iteration)?,
            kind: artifact.kind.as_str().to_owned(),
            content: artifact.content.clone(),
            created_at: format_timestamp(at),
        };

        self.store
            .write(move |uow: &mut UnitOfWork<'_>| {
                diesel::insert_into(artifacts::table)
                    .values(&row)
                    .execute(uow.connection())
                    .map_err(|err| map_missing_job(err, job_id))?;
                Ok(row_to_artifact(row)?)
            })
            .await
    }

    async fn list_artifacts(
        &self,
        job_id: JobId,
        iteration: Option<u32>,
    ) -> SessionRepositoryResult<Vec<Artifact>> {
        let iteration_filter = iteration.map(to_column_iteration).transpose()?;
        self.store
            .read(move |connection| {
                let mut query = artifacts::table
                    .select(ArtifactRow::as_select())
                    .filter(artifacts::job_id.eq(job_id.to_string()))
                    .into_boxed();
                if let Some(value) = iteration_filter {
                    query = query.filter(artifacts::iteration.eq(value));
                }
                let rows = query
                    .order((artifacts::created_at.asc(), artifacts::id.asc()))
                    .load::<ArtifactRow>(connection)?;
                Ok(rows
                    .into_iter()
                    .map(row_to_artifact)
                    .collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }
}

fn running_session(
    id: SessionId,
) -> diesel::dsl::Filter<
    diesel::dsl::Filter<llm_sessions::table, diesel::dsl::Eq<llm_sessions::id, String>>,
    diesel::dsl::Eq<llm_sessions::status, &'static str>,
> {
    llm_sessions::table
        .filter(llm_sessions::id.eq(id.to_string()))
        .filter(llm_sessions::status.eq(SessionStatus::Running.as_str()))
}
