//! Adapter implementations for job ports.

pub mod sqlite;
