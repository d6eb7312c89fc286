//! Adapter implementations for session ports.

pub mod sqlite;
