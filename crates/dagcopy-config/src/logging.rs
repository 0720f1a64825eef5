//! Tracing subscriber setup

use crate::{ConfigError, ConfigResult, LoggingConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// Install a global `tracing` subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over the configured level. Returns `Ok(false)`
/// when a global subscriber was already installed, which makes repeated calls
/// (e.g. from several tests) harmless.
pub fn init_logging(config: &LoggingConfig) -> ConfigResult<bool> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ConfigError::logging(e.to_string()))?;

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(config.colored_output);

    let installed = if config.json_format {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            ..LoggingConfig::default()
        };
        init_logging(&config).unwrap();
        assert!(!init_logging(&config).unwrap());
    }
}
