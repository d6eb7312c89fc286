//! Diesel row models for job and issue persistence.

use crate::job::domain::{IssueRecord, IssueRef, Job, JobId, JobState, PersistedJobData};
use crate::store::schema::{issues, jobs};
use crate::store::{StoreError, StoreResult, format_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};

/// Column list returned by every raw job statement.
pub(super) const JOB_COLUMNS: &str = concat!(
    "id, provider, repository, issue_number, project, state, iteration, max_iterations, ",
    "workspace_path, branch_name, base_commit, notes, error_message, pr_url, pr_merged_at, ",
    "created_at, updated_at, started_at, completed_at, head_commit, pr_closed_at",
);

/// Query result row for job records.
#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(super) struct JobRow {
    pub id: String,
    pub provider: String,
    pub repository: String,
    pub issue_number: i64,
    pub project: String,
    pub state: String,
    pub iteration: i32,
    pub max_iterations: i32,
    pub workspace_path: Option<String>,
    pub branch_name: Option<String>,
    pub base_commit: Option<String>,
    pub notes: String,
    pub error_message: Option<String>,
    pub pr_url: Option<String>,
    pub pr_merged_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub head_commit: Option<String>,
    pub pr_closed_at: Option<String>,
}

/// Insert model for job records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = jobs)]
pub(super) struct NewJobRow {
    pub id: String,
    pub provider: String,
    pub repository: String,
    pub issue_number: i64,
    pub project: String,
    pub state: String,
    pub iteration: i32,
    pub max_iterations: i32,
    pub notes: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Query result row for tracked issues.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = issues)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(super) struct IssueRow {
    pub provider: String,
    pub repository: String,
    pub issue_number: i64,
    pub project: String,
    pub title: String,
    pub eligible: bool,
    pub updated_at: String,
}

/// Insert model for a tracked issue first seen through job creation.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = issues)]
pub(super) struct NewIssueRow {
    pub provider: String,
    pub repository: String,
    pub issue_number: i64,
    pub project: String,
    pub title: String,
    pub eligible: bool,
    pub updated_at: String,
}

#[derive(Debug, QueryableByName)]
pub(super) struct StateCountRow {
    #[diesel(sql_type = Text)]
    pub state: String,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

/// Columns identifying an issue, as bound into statements.
#[derive(Debug, Clone)]
pub(super) struct IssueKey {
    pub provider: String,
    pub repository: String,
    pub issue_number: i64,
}

impl IssueKey {
    pub(super) fn from_ref(issue_ref: &IssueRef) -> StoreResult<Self> {
        Ok(Self {
            provider: issue_ref.provider().as_str().to_owned(),
            repository: issue_ref.repository().as_str().to_owned(),
            issue_number: i64::try_from(issue_ref.issue_number().value())
                .map_err(|err| StoreError::corrupt("issues", err.to_string()))?,
        })
    }
}

pub(super) fn to_new_job_row(job: &Job) -> StoreResult<NewJobRow> {
    let key = IssueKey::from_ref(job.issue_ref())?;
    Ok(NewJobRow {
        id: job.id().to_string(),
        provider: key.provider,
        repository: key.repository,
        issue_number: key.issue_number,
        project: job.project().to_owned(),
        state: job.state().as_str().to_owned(),
        iteration: to_column_count(job.iteration())?,
        max_iterations: to_column_count(job.max_iterations())?,
        notes: job.notes().to_owned(),
        created_at: format_timestamp(job.created_at()),
        updated_at: format_timestamp(job.updated_at()),
    })
}

pub(super) fn to_new_issue_row(job: &Job) -> StoreResult<NewIssueRow> {
    let key = IssueKey::from_ref(job.issue_ref())?;
    Ok(NewIssueRow {
        provider: key.provider,
        repository: key.repository,
        issue_number: key.issue_number,
        project: job.project().to_owned(),
        title: String::new(),
        eligible: true,
        updated_at: format_timestamp(job.created_at()),
    })
}

pub(super) fn row_to_job(row: JobRow) -> StoreResult<Job> {
    let JobRow {
        id,
        provider,
        repository,
        issue_number,
        project,
        state,
        iteration,
        max_iterations,
        workspace_path,
        branch_name,
        base_commit,
        notes,
        error_message,
        pr_url,
        pr_merged_at,
        created_at,
        updated_at,
        started_at,
        completed_at,
        head_commit,
        pr_closed_at,
    } = row;

    let data = PersistedJobData {
        id: id.parse::<JobId>().map_err(corrupt_job)?,
        issue_ref: issue_ref_from_columns(&provider, &repository, issue_number)?,
        project,
        state: JobState::try_from(state.as_str()).map_err(corrupt_job)?,
        iteration: from_column_count(iteration)?,
        max_iterations: from_column_count(max_iterations)?,
        workspace_path,
        branch_name,
        base_commit,
        head_commit,
        notes,
        error_message,
        pr_url,
        pr_merged_at: optional_time(pr_merged_at.as_deref())?,
        pr_closed_at: optional_time(pr_closed_at.as_deref())?,
        created_at: required_time(&created_at)?,
        updated_at: required_time(&updated_at)?,
        started_at: optional_time(started_at.as_deref())?,
        completed_at: optional_time(completed_at.as_deref())?,
    };
    Ok(Job::from_persisted(data))
}

pub(super) fn row_to_issue(row: IssueRow) -> StoreResult<IssueRecord> {
    Ok(IssueRecord {
        issue_ref: issue_ref_from_columns(&row.provider, &row.repository, row.issue_number)?,
        project: row.project,
        title: row.title,
        eligible: row.eligible,
        updated_at: parse_timestamp(&row.updated_at)
            .map_err(|err| StoreError::corrupt("issues", err.to_string()))?,
    })
}

pub(super) fn to_column_count(value: u32) -> StoreResult<i32> {
    i32::try_from(value).map_err(|err| StoreError::corrupt("jobs", err.to_string()))
}

fn issue_ref_from_columns(
    provider: &str,
    repository: &str,
    issue_number: i64,
) -> StoreResult<IssueRef> {
    let number = u64::try_from(issue_number).map_err(corrupt_job)?;
    IssueRef::from_parts(provider, repository, number).map_err(corrupt_job)
}

fn from_column_count(value: i32) -> StoreResult<u32> {
    u32::try_from(value).map_err(corrupt_job)
}

fn required_time(value: &str) -> StoreResult<DateTime<Utc>> {
    parse_timestamp(value).map_err(corrupt_job)
}

fn optional_time(value: Option<&str>) -> StoreResult<Option<DateTime<Utc>>> {
    value.map(required_time).transpose()
}

fn corrupt_job(err: impl std::fmt::Display) -> StoreError {
    StoreError::corrupt("jobs", err.to_string())
}

