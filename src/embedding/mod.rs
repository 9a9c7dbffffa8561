//! Audio embedding extraction boundary.
//!
//! The embedding itself is produced by an external analysis service that
//! listens to an audio sample and returns a fixed-length signal-level vector.
//! The engine only depends on the [`EmbeddingExtractor`] trait; any failure
//! along the way collapses into [`EmbeddingError`] and the caller substitutes
//! a zero vector of the same length (degraded mode).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Reasons an embedding could not be produced. They are all equivalent for
/// the engine: the request proceeds with a zero-vector substitute.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("track has no audio sample to analyze")]
    MissingSample,

    #[error("embedding service request failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("embedding service returned status {0}")]
    ServiceStatus(u16),

    #[error("embedding service returned {actual} values, expected {expected}")]
    WrongLength { expected: usize, actual: usize },

    #[error("no embedding service configured")]
    NotConfigured,
}

#[async_trait]
pub trait EmbeddingExtractor: Send + Sync {
    /// Produce a standardized, L2-normalized embedding of `dim` entries for
    /// the given audio sample reference (a fetchable URL).
    async fn extract(
        &self,
        sample_url: Option<&str>,
        dim: usize,
    ) -> Result<Vec<f32>, EmbeddingError>;
}

/// The defined substitute when extraction fails or no sample exists.
pub fn zero_embedding(dim: usize) -> Vec<f32> {
    vec![0.0; dim]
}

/// Standardize to zero mean / unit variance, then L2-normalize to unit norm.
/// Applied to every embedding before it enters the corpus or a query so that
/// the embedding half of the combined vector is scale-compatible with the
/// 0..=1 attribute half.
pub fn standardize_and_normalize(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    let std_dev = variance.sqrt();
    for v in values.iter_mut() {
        *v = (*v - mean) / (std_dev + 1e-9);
    }
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    for v in values.iter_mut() {
        *v /= norm + 1e-9;
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    sample_url: &'a str,
    dim: usize,
}

#[derive(Deserialize)]
struct EmbedResponse {
    vector: Vec<f32>,
}

/// Client for the external embedding service.
///
/// One POST per extraction, bounded by a client-wide timeout. The engine
/// never retries a failed extraction; one failure degrades that request.
pub struct HttpEmbeddingExtractor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEmbeddingExtractor {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingExtractor for HttpEmbeddingExtractor {
    async fn extract(
        &self,
        sample_url: Option<&str>,
        dim: usize,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let sample_url = sample_url.ok_or(EmbeddingError::MissingSample)?;

        let url = format!("{}/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest { sample_url, dim })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EmbeddingError::ServiceStatus(response.status().as_u16()));
        }

        let body: EmbedResponse = response.json().await?;
        if body.vector.len() != dim {
            return Err(EmbeddingError::WrongLength {
                expected: dim,
                actual: body.vector.len(),
            });
        }

        let mut vector = body.vector;
        standardize_and_normalize(&mut vector);
        Ok(vector)
    }
}

/// Extractor used when no embedding service is configured; every request
/// takes the degraded path.
pub struct UnavailableExtractor;

#[async_trait]
impl EmbeddingExtractor for UnavailableExtractor {
    async fn extract(
        &self,
        _sample_url: Option<&str>,
        _dim: usize,
    ) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::NotConfigured)
    }
}
