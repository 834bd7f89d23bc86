/// Shared test helpers for cross-crate use
///
/// Centralized fixture-identifier generators so parallel tests across
/// the workspace never collide on order numbers or user ids.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

// Global counter for truly unique test identifiers across parallel tests
static GLOBAL_TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate globally unique test identifiers that won't conflict across parallel tests
///
/// # Arguments
/// * `prefix` - A string prefix to identify the test type (e.g., "SUBMIT", "PAY")
///
/// # Returns
/// A unique string in the format: "{prefix}-{timestamp}-{counter}"
pub fn generate_unique_id(prefix: &str) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis();
    let counter = GLOBAL_TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", prefix, timestamp, counter)
}

/// Generate a unique numeric test ID suitable for ModelId fields.
pub fn generate_unique_test_id() -> u64 {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;

    let counter = GLOBAL_TEST_COUNTER.fetch_add(1, Ordering::SeqCst);

    (timestamp % 100_000) * 1_000_000 + counter
}
