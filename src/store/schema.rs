//! Diesel schema for the embedded store.
//!
//! Timestamps are TEXT columns holding fixed-width RFC 3339 strings; see
//! [`super::format_timestamp`].

diesel::table! {
    /// Tracked issues and their eligibility.
    issues (provider, repository, issue_number) {
        /// Issue provider (`github` or `gitlab`).
        provider -> Text,
        /// Repository in `owner/repo` form.
        repository -> Text,
        /// Issue number within the repository.
        issue_number -> BigInt,
        /// Project the issue belongs to.
        project -> Text,
        /// Cached issue title; empty when unknown.
        title -> Text,
        /// Whether the issue currently passes inclusion rules.
        eligible -> Bool,
        /// Last time the sync collaborator touched the row.
        updated_at -> Text,
    }
}

diesel::table! {
    /// Pipeline jobs, one passage of an issue through the state machine.
    jobs (id) {
        /// Job identifier (UUID text).
        id -> Text,
        /// Issue provider.
        provider -> Text,
        /// Issue repository.
        repository -> Text,
        /// Issue number.
        issue_number -> BigInt,
        /// Project name.
        project -> Text,
        /// Lifecycle state.
        state -> Text,
        /// Current iteration.
        iteration -> Integer,
        /// Iteration budget.
        max_iterations -> Integer,
        /// Workspace directory owned by the pipeline.
        workspace_path -> Nullable<Text>,
        /// Working branch name.
        branch_name -> Nullable<Text>,
        /// Commit the branch was cut from.
        base_commit -> Nullable<Text>,
        /// Operator and pipeline notes.
        notes -> Text,
        /// Last error message.
        error_message -> Nullable<Text>,
        /// Pull or merge request URL.
        pr_url -> Nullable<Text>,
        /// When the PR was merged.
        pr_merged_at -> Nullable<Text>,
        /// Creation timestamp.
        created_at -> Text,
        /// Last update timestamp.
        updated_at -> Text,
        /// When a worker last claimed the job.
        started_at -> Nullable<Text>,
        /// When the last attempt ended.
        completed_at -> Nullable<Text>,
        /// Latest commit pushed by the pipeline.
        head_commit -> Nullable<Text>,
        /// When the PR was closed without merging.
        pr_closed_at -> Nullable<Text>,
    }
}

diesel::table! {
    /// Notification outbox.
    notification_events (id) {
        /// Event identifier.
        id -> BigInt,
        /// Job the event belongs to.
        job_id -> Text,
        /// Event type.
        event_type -> Text,
        /// Delivery status.
        status -> Text,
        /// Failed delivery attempts so far.
        attempts -> Integer,
        /// Last delivery error or skip reason.
        last_error -> Nullable<Text>,
        /// Creation timestamp.
        created_at -> Text,
        /// Last status change.
        updated_at -> Text,
    }
}

diesel::table! {
    /// LLM sessions recorded by the pipeline.
    llm_sessions (id) {
        /// Session identifier.
        id -> Text,
        /// Owning job.
        job_id -> Text,
        /// Job iteration the session ran in.
        iteration -> Integer,
        /// Pipeline stage.
        stage -> Text,
        /// Model name.
        model -> Text,
        /// Session status.
        status -> Text,
        /// Prompt tokens.
        input_tokens -> Nullable<BigInt>,
        /// Completion tokens.
        output_tokens -> Nullable<BigInt>,
        /// Wall-clock duration.
        duration_ms -> Nullable<BigInt>,
        /// Failure message.
        error_message -> Nullable<Text>,
        /// Start timestamp.
        started_at -> Text,
        /// Finish timestamp.
        finished_at -> Nullable<Text>,
    }
}

diesel::table! {
    /// Artifacts produced per job iteration.
    artifacts (id) {
        /// Artifact identifier.
        id -> Text,
        /// Owning job.
        job_id -> Text,
        /// Job iteration.
        iteration -> Integer,
        /// Artifact kind.
        kind -> Text,
        /// Artifact body.
        content -> Text,
        /// Creation timestamp.
        created_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(issues, jobs, notification_events, llm_sessions, artifacts);
