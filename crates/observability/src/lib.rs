//! Process-wide tracing setup shared by binaries and integration tests.

pub mod subscriber;

pub use subscriber::{DEFAULT_DIRECTIVES, ObservabilityError, init_with};

/// Initialize process-wide tracing.
///
/// Safe to call multiple times; only the first call installs a subscriber.
pub fn init() {
    subscriber::init();
}
