//! Configuration management system for dagcopy
//!
//! This crate loads the settings that drive a copy: the concurrency limit
//! and how logs are emitted. Values are layered from defaults, YAML/TOML/JSON
//! files and environment variables.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dagcopy_config::{Config, ConfigBuilder};
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("dagcopy.yaml")
//!     .add_env_prefix("DAGCOPY")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Concurrency: {}", config.copy.concurrency().get());
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use dagcopy_types::Concurrency;
use serde::{Deserialize, Serialize};

pub mod builder;
pub mod error;
pub mod loader;
pub mod logging;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use logging::init_logging;

/// Main configuration structure for dagcopy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Copy engine configuration
    #[serde(default)]
    pub copy: CopyConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Copy engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Maximum number of concurrent copy tasks; values <= 0 use the default
    #[serde(default = "default_concurrency")]
    pub concurrency: i64,
}

impl CopyConfig {
    /// Effective concurrency limit
    pub fn concurrency(&self) -> Concurrency {
        Concurrency::new(self.concurrency)
    }
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> i64 {
    Concurrency::DEFAULT as i64
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Enable JSON formatting
    pub json_format: bool,
    /// Enable colored output
    pub colored_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            colored_output: true,
        }
    }
}
