//! Corpus storage: parallel vector and metadata tables.
//!
//! Two paired artifacts live in the data directory:
//!
//! - `track_vectors.f32` — the vector table, a dense row-major array of
//!   32-bit little-endian floats with shape `[N, combined_dim]`.
//! - `track_meta.json` — a JSON array of N `{id, name, artist}` records.
//!
//! Row `i` of one always describes row `i` of the other; the two files are
//! only ever read and written together, and alignment is re-checked on every
//! load.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const VECTORS_FILENAME: &str = "track_vectors.f32";
pub const META_FILENAME: &str = "track_meta.json";

/// Seed for the demo corpus created when no artifacts exist yet.
const DEMO_SEED: u64 = 0;

/// Display metadata for one corpus row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMeta {
    pub id: String,
    pub name: String,
    pub artist: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// At least one of the paired artifacts is absent. Callers may respond by
    /// seeding a demo corpus; the store never does so silently.
    #[error("corpus artifacts not found in {0}")]
    CorpusMissing(PathBuf),

    /// Row counts or dimensions do not line up. Fatal; requires operator
    /// intervention, never auto-repaired.
    #[error("corpus corrupt: {0}")]
    CorpusCorrupt(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata encoding error: {0}")]
    Meta(#[from] serde_json::Error),
}

/// In-memory corpus of combined vectors plus per-row metadata, backed by the
/// paired on-disk artifacts. Append-only: rows are never mutated or deleted.
#[derive(Debug)]
pub struct VectorStore {
    vectors_path: PathBuf,
    meta_path: PathBuf,
    dim: usize,
    vectors: Vec<Vec<f32>>,
    meta: Vec<TrackMeta>,
}

impl VectorStore {
    /// Load the paired artifacts from `data_dir`. Fails with `CorpusMissing`
    /// if either file is absent and `CorpusCorrupt` if they disagree with
    /// each other or with `dim`.
    pub fn load(data_dir: &Path, dim: usize) -> Result<Self, StoreError> {
        let vectors_path = data_dir.join(VECTORS_FILENAME);
        let meta_path = data_dir.join(META_FILENAME);

        if !vectors_path.is_file() || !meta_path.is_file() {
            return Err(StoreError::CorpusMissing(data_dir.to_owned()));
        }

        let vectors = read_vector_table(&vectors_path, dim)?;
        let meta: Vec<TrackMeta> = serde_json::from_str(&std::fs::read_to_string(&meta_path)?)
            .map_err(|err| {
                StoreError::CorpusCorrupt(format!("metadata table is not valid JSON: {}", err))
            })?;

        if vectors.len() != meta.len() {
            return Err(StoreError::CorpusCorrupt(format!(
                "vector table has {} rows but metadata has {} records",
                vectors.len(),
                meta.len()
            )));
        }

        info!("Loaded corpus of {} tracks from {:?}", meta.len(), data_dir);
        Ok(Self {
            vectors_path,
            meta_path,
            dim,
            vectors,
            meta,
        })
    }

    /// Load, or seed a small deterministic demo corpus when the artifacts do
    /// not exist yet. Any other load failure still propagates.
    pub fn load_or_seed(data_dir: &Path, dim: usize) -> Result<Self, StoreError> {
        match Self::load(data_dir, dim) {
            Err(StoreError::CorpusMissing(dir)) => {
                if cfg!(feature = "no_seed") {
                    return Err(StoreError::CorpusMissing(dir));
                }
                warn!("No corpus artifacts in {:?}, seeding a demo corpus", dir);
                Self::seed_demo(data_dir, dim)
            }
            other => other,
        }
    }

    /// Create and immediately persist a three-track demo corpus with seeded
    /// vectors, matching what a fresh install ships with.
    pub fn seed_demo(data_dir: &Path, dim: usize) -> Result<Self, StoreError> {
        let meta = vec![
            TrackMeta {
                id: "demo_1".to_string(),
                name: "Track A".to_string(),
                artist: "Artist A".to_string(),
            },
            TrackMeta {
                id: "demo_2".to_string(),
                name: "Track B".to_string(),
                artist: "Artist B".to_string(),
            },
            TrackMeta {
                id: "demo_3".to_string(),
                name: "Track C".to_string(),
                artist: "Artist C".to_string(),
            },
        ];

        let mut rng = StdRng::seed_from_u64(DEMO_SEED);
        let vectors = (0..meta.len())
            .map(|_| (0..dim).map(|_| rng.random::<f32>()).collect())
            .collect();

        std::fs::create_dir_all(data_dir)?;
        let store = Self {
            vectors_path: data_dir.join(VECTORS_FILENAME),
            meta_path: data_dir.join(META_FILENAME),
            dim,
            vectors,
            meta,
        };
        store.save()?;
        info!("Seeded demo corpus of {} tracks", store.len());
        Ok(store)
    }

    /// Append one row and persist both artifacts. Validates the vector length
    /// before touching any state, so a failed `add` leaves the store exactly
    /// as it was.
    pub fn add(&mut self, vector: Vec<f32>, meta: TrackMeta) -> Result<(), StoreError> {
        if vector.len() != self.dim {
            return Err(StoreError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        self.vectors.push(vector);
        self.meta.push(meta);
        self.save()
    }

    /// Write both artifacts. Both temp files are fully written before either
    /// rename, so an IO error during the slow writes cannot leave a
    /// misaligned pair behind; only the renames (same-directory metadata
    /// operations) remain between the old state and the new one.
    fn save(&self) -> Result<(), StoreError> {
        let mut bytes = Vec::with_capacity(self.vectors.len() * self.dim * 4);
        for row in &self.vectors {
            for value in row {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        let meta_json = serde_json::to_vec_pretty(&self.meta)?;

        let vectors_tmp = self.vectors_path.with_extension("tmp");
        let meta_tmp = self.meta_path.with_extension("tmp");
        std::fs::write(&vectors_tmp, &bytes)?;
        std::fs::write(&meta_tmp, &meta_json)?;
        std::fs::rename(&vectors_tmp, &self.vectors_path)?;
        std::fs::rename(&meta_tmp, &self.meta_path)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn meta(&self) -> &[TrackMeta] {
        &self.meta
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        self.vectors.get(index).map(|v| v.as_slice())
    }

    pub fn meta_row(&self, index: usize) -> Option<&TrackMeta> {
        self.meta.get(index)
    }

    /// Row index of the track with the given id, if it is in the corpus.
    pub fn position_of(&self, track_id: &str) -> Option<usize> {
        self.meta.iter().position(|m| m.id == track_id)
    }
}

fn read_vector_table(path: &Path, dim: usize) -> Result<Vec<Vec<f32>>, StoreError> {
    let bytes = std::fs::read(path)?;
    let row_size = dim * 4;
    if row_size == 0 || bytes.len() % row_size != 0 {
        return Err(StoreError::CorpusCorrupt(format!(
            "vector table size {} is not a multiple of row size {} (dim {})",
            bytes.len(),
            row_size,
            dim
        )));
    }

    let vectors = bytes
        .chunks_exact(row_size)
        .map(|row| {
            row.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        })
        .collect();
    Ok(vectors)
}
