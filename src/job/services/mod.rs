//! Application services for job lifecycle orchestration.

mod lifecycle;

pub use lifecycle::{
    BulkCancellation, CancellationOutcome, CreateJobRequest, JobLifecycleError,
    JobLifecycleResult, JobLifecycleService, RegisterIssueRequest,
};
