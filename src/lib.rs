//! Conveyor: durable issue-to-PR job pipeline core.
//!
//! Each tracked issue becomes a job that moves through planning,
//! implementation, review, testing, and human approval. This crate keeps
//! that pipeline durable and race-free:
//!
//! - exactly one worker ever holds a job, through an atomic claim,
//! - every state change is validated against a fixed transition table and
//!   committed together with the notification it triggers,
//! - notifications are delivered at least once with bounded retries,
//! - a crash at any point leaves a state that startup recovery reconciles.
//!
//! # Architecture
//!
//! Conveyor follows hexagonal architecture principles, with one embedded
//! SQLite database as the single source of truth:
//!
//! - **Domain**: Pure state-machine and outbox rules
//! - **Ports**: Trait interfaces for persistence and delivery
//! - **Adapters**: SQLite repositories and a JSON webhook channel
//!
//! # Modules
//!
//! - [`store`]: Connection pool, pragmas, migrations, and unit of work
//! - [`job`]: Job state machine and lifecycle operations
//! - [`notification`]: Outbox and retrying dispatcher
//! - [`session`]: LLM session and artifact bookkeeping
//! - [`recovery`]: Startup crash recovery
//! - [`daemon`]: Worker pool, dispatcher task, and graceful shutdown
//! - [`config`] and [`telemetry`]: Ambient configuration and logging

pub mod config;
pub mod daemon;
pub mod job;
pub mod notification;
pub mod recovery;
pub mod session;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod test_support;
