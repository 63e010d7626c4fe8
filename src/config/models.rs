use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub gallery: GalleryConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Image fetch settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Largest image body accepted before the fetch is abandoned
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: ByteSize,
    /// Optional HTTP(S) proxy for every image request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_image_bytes: default_max_image_bytes(),
            proxy: None,
        }
    }
}

fn default_user_agent() -> String {
    format!("thumbfetch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_image_bytes() -> ByteSize {
    ByteSize(10 * 1024 * 1024) // 10 MB
}

/// Photo search settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GalleryConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Flickr API key (loaded from environment, not from config file)
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            page_size: default_page_size(),
            api_key: None,
        }
    }
}

fn default_endpoint() -> String {
    "https://api.flickr.com/services/rest".to_string()
}

fn default_page_size() -> u32 {
    100
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.fetch.connect_timeout_secs, 10);
        assert_eq!(config.fetch.request_timeout_secs, 30);
        assert_eq!(config.fetch.max_image_bytes.as_u64(), 10 * 1024 * 1024);
        assert!(config.fetch.user_agent.starts_with("thumbfetch/"));
        assert_eq!(config.gallery.endpoint, "https://api.flickr.com/services/rest");
        assert_eq!(config.gallery.page_size, 100);
        assert_eq!(config.telemetry.log_filter, "info");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[fetch]
max_image_bytes = "2MB"
            "#,
        )
        .unwrap();

        assert_eq!(config.fetch.max_image_bytes.as_u64(), 2 * 1024 * 1024);
        assert_eq!(config.fetch.request_timeout_secs, 30);
        assert_eq!(config.gallery.page_size, 100);
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut config = Config::default();
        config.gallery.api_key = Some("secret".to_string());

        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("api_key"));
    }
}
