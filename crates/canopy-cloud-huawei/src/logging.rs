//! Subscriber setup for hosts embedding the provider

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Does nothing when a global subscriber is already set.
pub fn init_logging() {
    if let Err(e) = try_init_logging() {
        tracing::debug!("Logging already initialised: {}", e);
    }
}

pub fn try_init_logging() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        init_logging();
        assert!(try_init_logging().is_err());
        // and the infallible variant stays quiet
        init_logging();
    }
}
