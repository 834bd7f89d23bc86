pub mod config;

/// Shared utilities for the takeout backend workspace
///
/// This crate holds the pieces every executable needs regardless of
/// which part of the system it runs:
///
/// - YAML configuration loading
/// - Shared test utilities for fixture identifiers

// Test helpers module - available for both development and test builds
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

#[cfg(any(test, feature = "test-helpers"))]
pub use test_helpers::{generate_unique_id, generate_unique_test_id};
