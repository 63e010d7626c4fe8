use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "THUMBFETCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/thumbfetch.toml";
const ENV_PREFIX: &str = "THUMBFETCH";
const ENV_SEPARATOR: &str = "__";
const API_KEY_ENV_VAR: &str = "FLICKR_API_KEY";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
///
/// `config_path` overrides `THUMBFETCH_CONFIG` and the default location.
pub fn load(config_path: Option<PathBuf>) -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = config_path
        .or_else(|| env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;

    load_secrets(&mut config);

    Ok(config)
}

/// Secrets are never stored in TOML files, only in environment
fn load_secrets(config: &mut Config) {
    if let Ok(api_key) = env::var(API_KEY_ENV_VAR) {
        if !api_key.trim().is_empty() {
            config.gallery.api_key = Some(api_key);
        }
    }
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::debug!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // THUMBFETCH__FETCH__MAX_IMAGE_BYTES -> fetch.max_image_bytes
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.fetch.connect_timeout_secs, 10);
        assert_eq!(config.gallery.page_size, 100);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[fetch]
user_agent = "gallery-bot/1.0"
request_timeout_secs = 5
max_image_bytes = "512KB"

[gallery]
endpoint = "http://localhost:9000/rest"
page_size = 20

[telemetry]
log_filter = "thumbfetch=debug"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.fetch.user_agent, "gallery-bot/1.0");
        assert_eq!(config.fetch.request_timeout_secs, 5);
        assert_eq!(config.fetch.max_image_bytes.as_u64(), 512 * 1024);
        assert_eq!(config.gallery.endpoint, "http://localhost:9000/rest");
        assert_eq!(config.gallery.page_size, 20);
        assert_eq!(config.telemetry.log_filter, "thumbfetch=debug");
        assert!(config.gallery.api_key.is_none());
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("broken.toml");

        fs::write(&config_path, "[fetch\nuser_agent = ").unwrap();

        assert!(load_from_sources(config_path).is_err());
    }
}
