//! HTTP client for downloading image bytes

use super::{FetchError, ImageFetcher, Result};
use crate::config::FetchConfig;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, Proxy};
use std::time::Duration;
use tracing::debug;

/// HTTP downloader settings
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_body_bytes: u64,
    pub user_agent: String,
    pub proxy: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 10 * 1024 * 1024,
            user_agent: "thumbfetch/0.1.0".to_string(),
            proxy: None,
        }
    }
}

impl From<&FetchConfig> for HttpConfig {
    fn from(config: &FetchConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_body_bytes: config.max_image_bytes.as_u64(),
            user_agent: config.user_agent.clone(),
            proxy: config.proxy.clone(),
        }
    }
}

/// Single-shot HTTP GET fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: HttpConfig,
}

impl HttpFetcher {
    /// Create a new HTTP fetcher
    pub fn new(config: HttpConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(url) = &config.proxy {
            let proxy = Proxy::all(url)
                .map_err(|e| FetchError::InvalidUrl(format!("Invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::RequestFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        Self::new(HttpConfig::from(config))
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    async fn download(&self, url: &str) -> Result<Bytes> {
        debug!(url, "Starting download");

        let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let mut response = self.client.get(parsed).send().await.map_err(map_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let limit = self.config.max_body_bytes;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(FetchError::TooLarge { limit });
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(map_reqwest)? {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        debug!(url, size = body.len(), "Download completed");

        Ok(body.freeze())
    }
}

fn map_reqwest(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_redirect() {
        FetchError::TooManyRedirects
    } else {
        FetchError::RequestFailed(e.to_string())
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes> {
        self.download(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::ByteSize;

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.user_agent, "thumbfetch/0.1.0");
        assert!(config.proxy.is_none());
    }

    #[test]
    fn test_http_config_from_fetch_config() {
        let fetch = FetchConfig {
            user_agent: "gallery-test".to_string(),
            connect_timeout_secs: 3,
            request_timeout_secs: 7,
            max_image_bytes: ByteSize(2048),
            proxy: None,
        };

        let config = HttpConfig::from(&fetch);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.request_timeout, Duration::from_secs(7));
        assert_eq!(config.max_body_bytes, 2048);
        assert_eq!(config.user_agent, "gallery-test");
    }

    #[test]
    fn test_invalid_proxy_rejected() {
        let config = HttpConfig {
            proxy: Some("not a proxy url".to_string()),
            ..HttpConfig::default()
        };

        assert!(matches!(HttpFetcher::new(config), Err(FetchError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_before_request() {
        let fetcher = HttpFetcher::new(HttpConfig::default()).unwrap();
        let err = fetcher.fetch_bytes("not-a-url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }
}
