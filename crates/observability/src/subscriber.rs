//! JSON tracing subscriber, filtered through `RUST_LOG`.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVES: &str = "info";

#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("invalid filter directives: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("a global subscriber is already installed")]
    AlreadyInstalled,
}

/// Install the JSON subscriber, ignoring an already installed one.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    if install(filter).is_err() {
        tracing::trace!("tracing subscriber already installed");
    }
}

/// Install the JSON subscriber with explicit filter directives (e.g.
/// `"contactstore_infra=debug"`).
pub fn init_with(directives: &str) -> Result<(), ObservabilityError> {
    let filter = EnvFilter::try_new(directives)?;
    install(filter)
}

fn install(filter: EnvFilter) -> Result<(), ObservabilityError> {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(true)
        .with_current_span(true)
        .try_init()
        .map_err(|_| ObservabilityError::AlreadyInstalled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
        assert!(matches!(init_with("debug"), Err(ObservabilityError::AlreadyInstalled)));
    }
}
