//! Unit tests for the job state machine.
