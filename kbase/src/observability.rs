//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::{config::LoggingConfig, error::Error, error::Result};

/// Install the global tracing subscriber
///
/// Invalid filter directives fall back to `info`. Fails instead of panicking
/// when a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {}", e)))?;

    tracing::info!(level = %config.level, json = config.json, "Tracing initialized");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_does_not_panic() {
        let config = LoggingConfig {
            level: "not a [valid filter".to_string(),
            json: false,
        };
        let _ = init_tracing(&config);
        // a subscriber is installed by now, so this one is refused
        assert!(init_tracing(&LoggingConfig::default()).is_err());
    }
}
