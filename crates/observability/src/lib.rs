//! Shared tracing setup for the duka binaries.

/// Tracing configuration (filters, output format).
pub mod tracing;

/// Initialize process-wide tracing.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}
