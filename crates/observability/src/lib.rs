//! Process-wide tracing setup shared by mapper hosts and tests.

/// Initialize structured logging for the process.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize human-readable logging captured by the test harness.
pub fn init_for_tests() {
    tracing::init_for_tests();
}

/// Subscriber construction (filters, formats).
pub mod tracing;
