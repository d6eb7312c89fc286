//! Job state machine for the issue-to-PR pipeline.
//!
//! A job is one issue's passage through planning, implementation, review,
//! testing, and approval. This module owns the closed state enum, the
//! transition table, and the operations that mutate a job under the
//! store's atomicity guarantees:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - SQLite adapter in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
