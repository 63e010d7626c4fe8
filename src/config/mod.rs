//! Settings for fetching, photo search and logging
//!
//! Later layers override earlier ones:
//! 1. Struct defaults
//! 2. TOML file
//! 3. `.env` and process environment
//!
//! # Usage
//!
//! ```no_run
//! use thumbfetch::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Image limit: {}", config.fetch.max_image_bytes);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `THUMBFETCH__<section>__<key>`
//!
//! Examples:
//! - `THUMBFETCH__FETCH__REQUEST_TIMEOUT_SECS=5`
//! - `THUMBFETCH__FETCH__MAX_IMAGE_BYTES=2MB`
//! - `THUMBFETCH__GALLERY__PAGE_SIZE=50`
//!
//! The Flickr API key is only read from `FLICKR_API_KEY`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/thumbfetch.toml`.
//! This can be overridden using the `THUMBFETCH_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{Config, FetchConfig, GalleryConfig, TelemetryConfig};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load from the default sources: `THUMBFETCH_CONFIG` or `config/thumbfetch.toml`,
    /// then `.env`, then `THUMBFETCH__*` variables, then secrets
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Same as [`Config::load`], reading the TOML file from `path` when given
    pub fn load_with(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::validated(sources::load(path)?)
    }

    fn validated(config: Config) -> Result<Self, ConfigError> {
        validation::validate(&config)?;
        Ok(config)
    }
}
