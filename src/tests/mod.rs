//! Multi-module, scenario-level tests, mirroring the teacher's split
//! between small per-file unit tests and shared fixture-driven
//! integration tests.

pub(crate) mod fixtures;
