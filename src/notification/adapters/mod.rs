//! Adapter implementations for notification ports.

pub mod sqlite;
pub mod webhook;
