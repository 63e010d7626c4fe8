//! Photo search: turns a query into the list of thumbnails to show

pub mod flickr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use flickr::FlickrClient;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Missing API key (set FLICKR_API_KEY)")]
    MissingApiKey,

    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Unexpected search response: {0}")]
    InvalidResponse(String),

    #[error("Search API error {code}: {message}")]
    Api { code: i64, message: String },
}

pub type Result<T> = std::result::Result<T, SearchError>;

/// One photo in a result page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryItem {
    pub id: String,
    pub caption: String,
    /// Small thumbnail url
    pub url: String,
}

#[async_trait]
pub trait SearchService: Send + Sync {
    async fn fetch_recent(&self) -> Result<Vec<GalleryItem>>;

    async fn search(&self, query: &str) -> Result<Vec<GalleryItem>>;

    /// Blank query means "recent photos"
    async fn items_for(&self, query: Option<&str>) -> Result<Vec<GalleryItem>> {
        match query.map(str::trim) {
            Some(query) if !query.is_empty() => self.search(query).await,
            _ => self.fetch_recent().await,
        }
    }
}
