//! Flickr REST search client

use super::{GalleryItem, Result, SearchError, SearchService};
use crate::config::{FetchConfig, GalleryConfig};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const FETCH_RECENTS_METHOD: &str = "flickr.photos.getRecent";
const SEARCH_METHOD: &str = "flickr.photos.search";

#[derive(Debug, Deserialize)]
struct Envelope {
    stat: String,
    photos: Option<Photos>,
    code: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Photos {
    #[serde(default)]
    photo: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    id: String,
    #[serde(default)]
    title: String,
    url_s: Option<String>,
}

/// [`SearchService`] backed by the Flickr REST API
#[derive(Debug, Clone)]
pub struct FlickrClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    page_size: u32,
}

impl FlickrClient {
    pub fn new(gallery: &GalleryConfig, fetch: &FetchConfig) -> Result<Self> {
        let api_key = gallery.api_key.clone().ok_or(SearchError::MissingApiKey)?;

        let endpoint = Url::parse(&gallery.endpoint)
            .map_err(|e| SearchError::RequestFailed(format!("Invalid endpoint: {}", e)))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(fetch.connect_timeout_secs))
            .timeout(Duration::from_secs(fetch.request_timeout_secs))
            .user_agent(&fetch.user_agent)
            .build()
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            page_size: gallery.page_size,
        })
    }

    /// Request url for `method`; `text` is only sent for searches
    pub fn build_url(&self, method: &str, query: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("api_key", &self.api_key)
                .append_pair("format", "json")
                .append_pair("nojsoncallback", "1")
                .append_pair("extras", "url_s")
                .append_pair("per_page", &self.page_size.to_string())
                .append_pair("method", method);
            if method == SEARCH_METHOD {
                if let Some(query) = query {
                    pairs.append_pair("text", query);
                }
            }
        }
        url
    }

    async fn download_items(&self, method: &str, url: Url) -> Result<Vec<GalleryItem>> {
        debug!(method, "Requesting gallery items");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::RequestFailed(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SearchError::RequestFailed(format!("Failed to read body: {}", e)))?;

        let items = parse_items(&body)?;
        info!(method, count = items.len(), "Received gallery items");
        Ok(items)
    }
}

/// Parse a `photos` response, skipping photos that have no small thumbnail
pub fn parse_items(body: &str) -> Result<Vec<GalleryItem>> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

    if envelope.stat != "ok" {
        return Err(SearchError::Api {
            code: envelope.code.unwrap_or_default(),
            message: envelope.message.unwrap_or_else(|| envelope.stat.clone()),
        });
    }

    let photos = envelope
        .photos
        .ok_or_else(|| SearchError::InvalidResponse("missing 'photos'".to_string()))?;

    Ok(photos
        .photo
        .into_iter()
        .filter_map(|photo| {
            let url = photo.url_s.filter(|url| !url.is_empty())?;
            Some(GalleryItem {
                id: photo.id,
                caption: photo.title,
                url,
            })
        })
        .collect())
}

#[async_trait]
impl SearchService for FlickrClient {
    async fn fetch_recent(&self) -> Result<Vec<GalleryItem>> {
        let url = self.build_url(FETCH_RECENTS_METHOD, None);
        self.download_items(FETCH_RECENTS_METHOD, url).await
    }

    async fn search(&self, query: &str) -> Result<Vec<GalleryItem>> {
        let url = self.build_url(SEARCH_METHOD, Some(query));
        self.download_items(SEARCH_METHOD, url).await
    }
}
