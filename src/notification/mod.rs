//! Notification outbox and delivery.
//!
//! Job transitions enqueue events in the same transaction that changes the
//! job, so an event exists if and only if the transition committed. A single
//! dispatcher later claims pending and retryable events, fans each out to
//! every configured channel, and records the outcome with bounded
//! exponential backoff.
//!
//! - Event types, statuses, backoff, and payload in [`domain`]
//! - Outbox, channel, and issue-title ports in [`ports`]
//! - SQLite outbox and webhook channel in [`adapters`]
//! - The dispatcher in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
