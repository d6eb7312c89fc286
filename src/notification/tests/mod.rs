//! Unit tests for the notification outbox and dispatcher.

mod support;
