//! Domain model for the job state machine.
//!
//! Everything here is infrastructure-free: validated identifiers, the issue
//! reference, the job snapshot, and the transition table expressed as total
//! functions over [`JobState`].

mod error;
mod ids;
mod issue;
mod job;
mod state;

pub use error::{JobDomainError, ParseJobStateError};
pub use ids::{IssueNumber, JobId, RepositoryFullName};
pub use issue::{IssueProvider, IssueRecord, IssueRef};
pub use job::{Job, JobDetail, PersistedJobData};
pub use state::{JobState, StateChange, entry_notification};
