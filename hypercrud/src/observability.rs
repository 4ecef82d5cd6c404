//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::config::CrudConfig;

/// Error returned when a global subscriber is already installed
pub type TracingInitError = tracing_subscriber::util::TryInitError;

/// Initialize tracing from the logging section of the configuration
///
/// Falls back to `info` when the configured level is not a valid filter.
pub fn init_tracing(config: &CrudConfig) -> Result<(), TracingInitError> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }

    tracing::info!(level = %config.logging.level, "Tracing initialized");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_does_not_panic() {
        let config = CrudConfig::default();
        let _ = init_tracing(&config);
        // A second global subscriber is refused, not a panic
        assert!(init_tracing(&config).is_err());
    }
}
