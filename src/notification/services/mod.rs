//! Outbox delivery services.

mod dispatcher;
mod sanitize;

pub use dispatcher::{CleanupReport, DispatchError, DispatchOutcome, NotificationDispatcher};
pub use sanitize::sanitize_error;
