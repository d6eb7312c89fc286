//! Step definitions for job lifecycle behaviour tests.

pub mod then;
pub mod when;
pub mod world;
