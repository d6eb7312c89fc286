//! Embedded SQLite store shared by every component.
//!
//! The store is the single source of truth for jobs, tracked issues,
//! notification events, and LLM session bookkeeping. It owns:
//!
//! - the r2d2 connection pool and per-connection pragmas ([`Store`]),
//! - schema versioning and additive column migrations,
//! - the [`UnitOfWork`] handed to every write so that a job mutation and
//!   the notification it triggers commit or roll back together.

mod error;
mod handle;
mod migrations;
pub(crate) mod schema;
mod time;
mod unit_of_work;

pub use error::{StoreError, StoreResult};
pub use handle::{SqlitePool, Store};
pub use migrations::CURRENT_SCHEMA_VERSION;
pub use unit_of_work::UnitOfWork;

pub(crate) use time::{format_timestamp, parse_timestamp};
