//! Recommendation engine: hybrid index selection and orchestration.
//!
//! The query path is a two-state policy. A track already in the corpus is
//! `Known`: its stored combined vector (attributes + embedding) queries the
//! combined index. Anything else is `Unknown`: an attribute vector is built
//! from whatever the catalog returned and queries the attribute-only index,
//! because no embedding exists for the query side either.
//!
//! Either way the query track itself is a zero-distance neighbor, so k is
//! requested-count + 1 and a post-filter drops any row with the query's id.

use crate::catalog::{CatalogClient, CatalogError, TrackInfo};
use crate::embedding::{zero_embedding, EmbeddingExtractor};
use crate::features::FeatureVectorBuilder;
use crate::index::{DualIndex, IndexError};
use crate::store::{StoreError, TrackMeta, VectorStore};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    /// The upstream catalog does not know the requested track id.
    #[error("track {0} not found in the upstream catalog")]
    TrackNotFound(String),

    #[error(transparent)]
    Upstream(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Which index served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendMode {
    /// Known track: full attributes + embedding vector.
    Combined,
    /// Unknown track: catalog attributes only.
    AttributesOnly,
}

/// One ranked result. `score` is the raw squared Euclidean distance; lower is
/// more similar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub score: f32,
}

/// Outcome of one recommendation request. An empty `results` is the normal
/// "no similar tracks" terminal state, not an error.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendOutcome {
    pub mode: RecommendMode,
    pub results: Vec<Recommendation>,
}

/// Outcome of ingesting one track into the corpus.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    /// False when the track was already in the corpus.
    pub added: bool,
    /// True when embedding extraction failed and a zero vector was stored.
    pub degraded: bool,
    pub track: TrackMeta,
}

/// The synchronous core: one store and its dual index, kept in lockstep.
/// Every mutation goes through [`Recommender::add_track`], which rebuilds the
/// index before returning, so a search can never observe a stale index.
#[derive(Debug)]
pub struct Recommender {
    store: VectorStore,
    index: DualIndex,
    builder: FeatureVectorBuilder,
    attribute_dim: usize,
    embedding_dim: usize,
}

impl Recommender {
    pub fn new(store: VectorStore, attribute_dim: usize, embedding_dim: usize) -> Self {
        let index = DualIndex::build(store.vectors(), attribute_dim, attribute_dim + embedding_dim);
        Self {
            store,
            index,
            builder: FeatureVectorBuilder::new(attribute_dim),
            attribute_dim,
            embedding_dim,
        }
    }

    pub fn corpus_len(&self) -> usize {
        self.store.len()
    }

    pub fn is_known(&self, track_id: &str) -> bool {
        self.store.position_of(track_id).is_some()
    }

    /// Rank the corpus against `info` and return at most `count` tracks,
    /// never including the query track itself.
    pub fn recommend_for(
        &self,
        info: &TrackInfo,
        count: usize,
    ) -> Result<RecommendOutcome, EngineError> {
        // +1 reserves a slot for the query track's own zero-distance match.
        // Saturating: `count` comes straight from the caller and may be huge.
        let k = count.saturating_add(1);

        let (mode, neighbors) = match self.store.position_of(&info.id) {
            Some(row) => {
                debug!("Track {} is in the corpus, using the combined index", info.id);
                let query = self.store.row(row).unwrap_or(&[]);
                (RecommendMode::Combined, self.index.search_combined(query, k)?)
            }
            None => {
                debug!(
                    "Track {} not in the corpus, using the attribute-only index",
                    info.id
                );
                let query = self.builder.build(&info.attributes);
                (
                    RecommendMode::AttributesOnly,
                    self.index.search_attributes_only(&query, k)?,
                )
            }
        };

        let results = neighbors
            .into_iter()
            .filter_map(|n| {
                self.store.meta_row(n.row).map(|meta| Recommendation {
                    id: meta.id.clone(),
                    name: meta.name.clone(),
                    artist: meta.artist.clone(),
                    score: n.distance,
                })
            })
            // Self-match can also surface when the query vector was re-derived
            // rather than looked up, so filter by id, not by row.
            .filter(|r| r.id != info.id)
            .take(count)
            .collect();

        Ok(RecommendOutcome { mode, results })
    }

    /// Append one track to the corpus and rebuild both index structures.
    /// `embedding` must already be standardized (or the zero substitute).
    pub fn add_track(&mut self, info: &TrackInfo, embedding: Vec<f32>) -> Result<(), EngineError> {
        if embedding.len() != self.embedding_dim {
            return Err(StoreError::DimensionMismatch {
                expected: self.embedding_dim,
                actual: embedding.len(),
            }
            .into());
        }

        let mut combined = self.builder.build(&info.attributes);
        combined.extend(embedding);
        self.store.add(
            combined,
            TrackMeta {
                id: info.id.clone(),
                name: info.name.clone(),
                artist: info.artist.clone(),
            },
        )?;

        self.index = DualIndex::build(
            self.store.vectors(),
            self.attribute_dim,
            self.attribute_dim + self.embedding_dim,
        );
        Ok(())
    }
}

/// Async facade owning the collaborators: the upstream catalog, the embedding
/// extractor, and the guarded recommender. Searches share the read lock;
/// ingest and reload take the write lock for append + persist + rebuild as
/// one unit.
pub struct RecommendationService {
    recommender: RwLock<Recommender>,
    catalog: Arc<dyn CatalogClient>,
    embedder: Arc<dyn EmbeddingExtractor>,
    data_dir: PathBuf,
    attribute_dim: usize,
    embedding_dim: usize,
}

impl RecommendationService {
    pub fn new(
        recommender: Recommender,
        catalog: Arc<dyn CatalogClient>,
        embedder: Arc<dyn EmbeddingExtractor>,
        data_dir: PathBuf,
    ) -> Self {
        let attribute_dim = recommender.attribute_dim;
        let embedding_dim = recommender.embedding_dim;
        Self {
            recommender: RwLock::new(recommender),
            catalog,
            embedder,
            data_dir,
            attribute_dim,
            embedding_dim,
        }
    }

    pub async fn corpus_len(&self) -> usize {
        self.recommender.read().await.corpus_len()
    }

    /// Look a track up in the catalog and rank the corpus against it.
    pub async fn recommend(
        &self,
        track_id: &str,
        count: usize,
    ) -> Result<(TrackInfo, RecommendOutcome), EngineError> {
        let info = self
            .catalog
            .get_track(track_id)
            .await?
            .ok_or_else(|| EngineError::TrackNotFound(track_id.to_string()))?;

        let outcome = self.recommender.read().await.recommend_for(&info, count)?;
        Ok((info, outcome))
    }

    /// Free-text candidate search against the upstream catalog.
    pub async fn search_candidates(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TrackInfo>, EngineError> {
        Ok(self.catalog.search_tracks(query, limit).await?)
    }

    /// Fetch a track from the catalog, extract (or zero-substitute) its
    /// embedding, and append it to the corpus.
    pub async fn ingest(&self, track_id: &str) -> Result<IngestOutcome, EngineError> {
        let info = self
            .catalog
            .get_track(track_id)
            .await?
            .ok_or_else(|| EngineError::TrackNotFound(track_id.to_string()))?;

        let track = TrackMeta {
            id: info.id.clone(),
            name: info.name.clone(),
            artist: info.artist.clone(),
        };

        if self.recommender.read().await.is_known(&info.id) {
            return Ok(IngestOutcome {
                added: false,
                degraded: false,
                track,
            });
        }

        // The extraction call is the one slow external dependency; keep it
        // outside the write lock. No retries: one failure degrades this
        // request immediately.
        let (embedding, degraded) = match self
            .embedder
            .extract(info.preview_url.as_deref(), self.embedding_dim)
            .await
        {
            Ok(vector) => (vector, false),
            Err(err) => {
                warn!(
                    "Embedding unavailable for track {} ({}), continuing in degraded mode",
                    info.id, err
                );
                (zero_embedding(self.embedding_dim), true)
            }
        };

        let mut recommender = self.recommender.write().await;
        // Re-check under the write lock; a concurrent ingest may have won.
        if recommender.is_known(&info.id) {
            return Ok(IngestOutcome {
                added: false,
                degraded: false,
                track,
            });
        }
        recommender.add_track(&info, embedding)?;
        info!(
            "Ingested track {} ({} - {}), corpus now has {} tracks",
            track.id,
            track.artist,
            track.name,
            recommender.corpus_len()
        );

        Ok(IngestOutcome {
            added: true,
            degraded,
            track,
        })
    }

    /// Operator entry point: re-read the paired artifacts from disk (seeding
    /// a demo corpus if they are gone) and swap in a freshly built index.
    pub async fn reload(&self) -> Result<usize, EngineError> {
        let store = VectorStore::load_or_seed(&self.data_dir, self.attribute_dim + self.embedding_dim)?;
        let mut recommender = self.recommender.write().await;
        *recommender = Recommender::new(store, self.attribute_dim, self.embedding_dim);
        info!("Reloaded corpus, {} tracks", recommender.corpus_len());
        Ok(recommender.corpus_len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    const A: usize = 2;
    const E: usize = 2;

    fn write_corpus(dir: &Path, rows: &[(&str, [f32; 4])]) {
        let mut bytes = Vec::new();
        let mut meta = Vec::new();
        for (id, vector) in rows {
            for value in vector {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
            meta.push(TrackMeta {
                id: id.to_string(),
                name: format!("name {}", id),
                artist: format!("artist {}", id),
            });
        }
        std::fs::write(dir.join(crate::store::VECTORS_FILENAME), bytes).unwrap();
        std::fs::write(
            dir.join(crate::store::META_FILENAME),
            serde_json::to_vec(&meta).unwrap(),
        )
        .unwrap();
    }

    fn recommender_with(dir: &Path, rows: &[(&str, [f32; 4])]) -> Recommender {
        write_corpus(dir, rows);
        let store = VectorStore::load(dir, A + E).unwrap();
        Recommender::new(store, A, E)
    }

    fn known_query(id: &str) -> TrackInfo {
        TrackInfo {
            id: id.to_string(),
            name: format!("name {}", id),
            artist: format!("artist {}", id),
            preview_url: None,
            attributes: HashMap::new(),
        }
    }

    #[test]
    fn test_known_track_uses_combined_index_and_excludes_itself() {
        let dir = TempDir::new().unwrap();
        // t1 and t2 are identical, t3 is far away.
        let rec = recommender_with(
            dir.path(),
            &[
                ("t1", [0.1, 0.2, 0.3, 0.4]),
                ("t2", [0.1, 0.2, 0.3, 0.4]),
                ("t3", [9.0, 9.0, 9.0, 9.0]),
            ],
        );

        let outcome = rec.recommend_for(&known_query("t1"), 2).unwrap();
        assert_eq!(outcome.mode, RecommendMode::Combined);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].id, "t2");
        assert_eq!(outcome.results[0].score, 0.0);
        assert_eq!(outcome.results[1].id, "t3");
        assert!(outcome.results.iter().all(|r| r.id != "t1"));
    }

    #[test]
    fn test_self_excluded_even_with_large_k() {
        let dir = TempDir::new().unwrap();
        let rec = recommender_with(
            dir.path(),
            &[("t1", [0.0, 0.0, 0.0, 0.0]), ("t2", [1.0, 1.0, 1.0, 1.0])],
        );

        let outcome = rec.recommend_for(&known_query("t1"), 50).unwrap();
        assert!(outcome.results.iter().all(|r| r.id != "t1"));
        assert_eq!(outcome.results.len(), 1);
    }

    #[test]
    fn test_maximum_count_returns_whole_corpus_without_self() {
        let dir = TempDir::new().unwrap();
        let rec = recommender_with(
            dir.path(),
            &[
                ("t1", [0.1, 0.2, 0.3, 0.4]),
                ("t2", [0.5, 0.5, 0.5, 0.5]),
                ("t3", [9.0, 9.0, 9.0, 9.0]),
            ],
        );

        let outcome = rec.recommend_for(&known_query("t1"), usize::MAX).unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results.iter().all(|r| r.id != "t1"));
    }

    #[test]
    fn test_unknown_track_uses_attribute_index() {
        let dir = TempDir::new().unwrap();
        let rec = recommender_with(
            dir.path(),
            &[
                // Attribute prefix close to the query, embedding tail far off.
                ("near", [0.8, 0.6, 50.0, -50.0]),
                ("far", [0.0, 0.0, 0.0, 0.0]),
            ],
        );

        let query = TrackInfo {
            id: "new_track".to_string(),
            name: "New".to_string(),
            artist: "Someone".to_string(),
            preview_url: None,
            attributes: HashMap::from([
                ("danceability".to_string(), 0.8),
                ("energy".to_string(), 0.6),
            ]),
        };

        let outcome = rec.recommend_for(&query, 2).unwrap();
        assert_eq!(outcome.mode, RecommendMode::AttributesOnly);
        assert_eq!(outcome.results[0].id, "near");
        assert_eq!(outcome.results[1].id, "far");
    }

    #[test]
    fn test_corpus_of_one_returns_no_similar_tracks() {
        let dir = TempDir::new().unwrap();
        let rec = recommender_with(dir.path(), &[("only", [0.1, 0.1, 0.1, 0.1])]);

        let outcome = rec.recommend_for(&known_query("only"), 5).unwrap();
        assert!(outcome.results.is_empty());
    }

    #[test]
    fn test_add_track_with_wrong_embedding_length() {
        let dir = TempDir::new().unwrap();
        let mut rec = recommender_with(dir.path(), &[("t1", [0.0; 4])]);

        let result = rec.add_track(&known_query("t9"), vec![0.0; E + 1]);
        assert!(matches!(
            result,
            Err(EngineError::Store(StoreError::DimensionMismatch { .. }))
        ));
        assert_eq!(rec.corpus_len(), 1);
    }

    #[test]
    fn test_add_track_makes_track_known_and_searchable() {
        let dir = TempDir::new().unwrap();
        let mut rec = recommender_with(dir.path(), &[("t1", [0.5, 0.5, 0.0, 0.0])]);

        let mut info = known_query("t2");
        info.attributes = HashMap::from([
            ("danceability".to_string(), 0.5),
            ("energy".to_string(), 0.5),
        ]);
        rec.add_track(&info, zero_embedding(E)).unwrap();

        assert!(rec.is_known("t2"));
        let outcome = rec.recommend_for(&known_query("t1"), 1).unwrap();
        assert_eq!(outcome.results[0].id, "t2");
    }

    #[test]
    fn test_degraded_zero_tail_matches_attribute_ordering() {
        let dir = TempDir::new().unwrap();
        // All corpus rows share a zero embedding tail, as after degraded
        // ingestion. Combined search with a zero-tailed query must rank them
        // exactly like attribute-only search.
        let rec = recommender_with(
            dir.path(),
            &[
                ("a", [0.2, 0.2, 0.0, 0.0]),
                ("b", [0.9, 0.9, 0.0, 0.0]),
                ("c", [0.4, 0.1, 0.0, 0.0]),
            ],
        );

        let combined = rec.index.search_combined(&[0.3, 0.3, 0.0, 0.0], 3).unwrap();
        let attrs_only = rec.index.search_attributes_only(&[0.3, 0.3], 3).unwrap();
        let combined_rows: Vec<usize> = combined.iter().map(|n| n.row).collect();
        let attr_rows: Vec<usize> = attrs_only.iter().map(|n| n.row).collect();
        assert_eq!(combined_rows, attr_rows);
    }
}
