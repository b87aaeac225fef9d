//! Process-wide tracing setup shared by the binaries.

pub mod tracing;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init();
}
