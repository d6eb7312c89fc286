//! Diesel row models for sessions and artifacts.

use crate::job::domain::JobId;
use crate::session::domain::{
    Artifact, ArtifactId, ArtifactKind, LlmSession, SessionId, SessionStage, SessionStatus,
};
use crate::store::schema::{artifacts, llm_sessions};
use crate::store::{StoreError, StoreResult, parse_timestamp};
use diesel::prelude::*;
use diesel::sql_types::BigInt;

/// Query result row for sessions.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = llm_sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(super) struct SessionRow {
    pub id: String,
    pub job_id: String,
    pub iteration: i32,
    pub stage: String,
    pub model: String,
    pub status: String,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

/// Insert model for sessions.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = llm_sessions)]
pub(super) struct NewSessionRow {
    pub id: String,
    pub job_id: String,
    pub iteration: i32,
    pub stage: String,
    pub model: String,
    pub status: String,
    pub started_at: String,
}

/// Query and insert model for artifacts.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = artifacts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(super) struct ArtifactRow {
    pub id: String,
    pub job_id: String,
    pub iteration: i32,
    pub kind: String,
    pub content: String,
    pub created_at: String,
}

/// Aggregate counters for one job.
#[derive(Debug, QueryableByName)]
pub(super) struct UsageRow {
    #[diesel(sql_type = BigInt)]
    pub sessions: i64,
    #[diesel(sql_type = BigInt)]
    pub input_tokens: i64,
    #[diesel(sql_type = BigInt)]
    pub output_tokens: i64,
    #[diesel(sql_type = BigInt)]
    pub duration_ms: i64,
}

pub(super) fn row_to_session(row: SessionRow) -> StoreResult<LlmSession> {
    Ok(LlmSession {
        id: row.id.parse::<SessionId>().map_err(corrupt_session)?,
        job_id: row.job_id.parse::<JobId>().map_err(corrupt_session)?,
        iteration: u32::try_from(row.iteration).map_err(corrupt_session)?,
        stage: SessionStage::try_from(row.stage.as_str()).map_err(corrupt_session)?,
        model: row.model,
        status: SessionStatus::try_from(row.status.as_str()).map_err(corrupt_session)?,
        input_tokens: counter(row.input_tokens)?,
        output_tokens: counter(row.output_tokens)?,
        duration_ms: counter(row.duration_ms)?,
        error_message: row.error_message,
        started_at: parse_timestamp(&row.started_at).map_err(corrupt_session)?,
        finished_at: row
            .finished_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(corrupt_session)?,
    })
}

pub(super) fn row_to_artifact(row: ArtifactRow) -> StoreResult<Artifact> {
    Ok(Artifact {
        id: row.id.parse::<ArtifactId>().map_err(corrupt_artifact)?,
        job_id: row.job_id.parse::<JobId>().map_err(corrupt_artifact)?,
        iteration: u32::try_from(row.iteration).map_err(corrupt_artifact)?,
        kind: ArtifactKind::try_from(row.kind.as_str()).map_err(corrupt_artifact)?,
        content: row.content,
        created_at: parse_timestamp(&row.created_at).map_err(corrupt_artifact)?,
    })
}

pub(super) fn to_column_count(value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(corrupt_session)
}

pub(super) fn to_column_iteration(value: u32) -> StoreResult<i32> {
    i32::try_from(value).map_err(corrupt_session)
}

pub(super) fn from_column_count(value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(corrupt_session)
}

fn counter(value: Option<i64>) -> StoreResult<Option<u64>> {
    value.map(from_column_count).transpose()
}

fn corrupt_session(err: impl std::fmt::Display) -> StoreError {
    StoreError::corrupt("llm_sessions", err.to_string())
}

fn corrupt_artifact(err: impl std::fmt::Display) -> StoreError {
    StoreError::corrupt("artifacts", err.to_string())
}
