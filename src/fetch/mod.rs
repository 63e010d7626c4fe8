//! Image byte fetching
//!
//! The worker only depends on the [`ImageFetcher`] capability; [`http::HttpFetcher`]
//! is the production implementation.

pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use http::HttpFetcher;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("HTTP {code}: {reason}")]
    Status { code: u16, reason: String },

    #[error("Response body exceeds limit of {limit} bytes")]
    TooLarge { limit: u64 },
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Fetches the raw bytes behind a URL.
///
/// Implementations must not retry on their own: a failed fetch is reported once and the
/// worker moves on.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes>;
}
