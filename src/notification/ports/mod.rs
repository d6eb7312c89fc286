//! Port contracts for the notification outbox and its delivery channels.

pub mod issue_lookup;
pub mod repository;
pub mod sender;

pub use issue_lookup::{IssueLookup, IssueLookupError};
pub use repository::{
    NotificationRepository, NotificationRepositoryError, NotificationRepositoryResult,
};
pub use sender::{NotificationSender, SenderError, SenderSet};
