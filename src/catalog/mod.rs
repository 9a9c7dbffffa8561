//! Upstream catalog client.
//!
//! The catalog service owns raw track metadata: display fields, an optional
//! preview-audio URL, and the named numeric attributes the feature builder
//! consumes. This process only ever reads from it.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// A track as described by the upstream catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackInfo {
    pub id: String,
    pub name: String,
    pub artist: String,
    /// URL of a short audio sample, when the catalog has one.
    pub preview_url: Option<String>,
    /// Named numeric attributes; any subset of the canonical keys may be
    /// present.
    #[serde(default)]
    pub attributes: HashMap<String, f64>,
}

/// Upstream failures are request-scoped: surfaced to the caller, not retried.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog lookup failed: {0}")]
    LookupFailed(#[from] reqwest::Error),

    #[error("catalog returned status {0}")]
    ServiceStatus(u16),
}

#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch a single track by its stable identifier. `Ok(None)` means the
    /// catalog does not know the id, which is distinct from a lookup failure.
    async fn get_track(&self, track_id: &str) -> Result<Option<TrackInfo>, CatalogError>;

    /// Free-text search returning up to `limit` candidate tracks.
    async fn search_tracks(&self, query: &str, limit: usize)
        -> Result<Vec<TrackInfo>, CatalogError>;
}

pub struct HttpCatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalogClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: Vec<TrackInfo>,
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn get_track(&self, track_id: &str) -> Result<Option<TrackInfo>, CatalogError> {
        let url = format!("{}/tracks/{}", self.base_url, track_id);
        let response = self.client.get(&url).send().await?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CatalogError::ServiceStatus(response.status().as_u16()));
        }

        Ok(Some(response.json().await?))
    }

    async fn search_tracks(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TrackInfo>, CatalogError> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", query), ("limit", &limit.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CatalogError::ServiceStatus(response.status().as_u16()));
        }

        let body: SearchResponse = response.json().await?;
        Ok(body.tracks)
    }
}
