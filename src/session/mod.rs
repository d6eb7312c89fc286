//! Per-iteration LLM session and artifact bookkeeping.
//!
//! The pipeline records a session row for each model call and stores the
//! artifacts each iteration produces. The core only needs these rows so
//! that cancellation can stop running sessions, crash recovery can close
//! interrupted ones, and usage can be summed per job.

pub mod adapters;
pub mod domain;
pub mod ports;

#[cfg(test)]
mod tests;
