//! Risonanza Recommendation Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod catalog;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod explain;
pub mod features;
pub mod index;
pub mod server;
pub mod store;

// Re-export commonly used types for convenience
pub use catalog::{CatalogClient, HttpCatalogClient, TrackInfo};
pub use config::AppConfig;
pub use embedding::{EmbeddingExtractor, HttpEmbeddingExtractor};
pub use engine::{RecommendationService, Recommender};
pub use server::{run_server, ServerState};
pub use store::VectorStore;
