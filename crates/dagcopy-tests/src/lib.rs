//! dagcopy integration testing suite
//!
//! This crate hosts the end-to-end tests of the copy engine together with
//! the instrumented stores and graph builders they share.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Unified test utilities
///
/// Instrumented storage, hook recorders and graph builders used across the
/// integration tests.
pub mod test_utils;
