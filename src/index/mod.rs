//! Dual nearest-neighbor index over the corpus vectors.
//!
//! Two structurally parallel search structures share one backing store: one
//! over the full combined vectors, one over only the leading attribute
//! sub-vectors. A single [`DualIndex::build`] entry point produces both, so
//! they cannot drift out of sync with each other or with the store.
//!
//! Search is an exhaustive squared-Euclidean scan. At tens to low thousands
//! of rows a brute-force pass beats maintaining an approximate structure,
//! and rebuilds after a store append stay O(rows).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// The query vector does not match the index dimension. A programmer or
    /// config error; never silently truncated or padded.
    #[error("dimension mismatch: index has dimension {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// One search hit: a corpus row index and its squared Euclidean distance to
/// the query. Lower distance means more similar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    pub distance: f32,
}

#[derive(Debug)]
pub struct DualIndex {
    combined: Vec<Vec<f32>>,
    attributes: Vec<Vec<f32>>,
    combined_dim: usize,
    attribute_dim: usize,
}

impl DualIndex {
    /// Build both structures from the store's combined vectors. The
    /// attribute-only structure is the first `attribute_dim` columns of every
    /// row. Callers guarantee each row has `combined_dim` entries (the store
    /// enforces this on load and append).
    pub fn build(vectors: &[Vec<f32>], attribute_dim: usize, combined_dim: usize) -> Self {
        let combined = vectors.to_vec();
        let attributes = vectors
            .iter()
            .map(|row| row[..attribute_dim.min(row.len())].to_vec())
            .collect();

        Self {
            combined,
            attributes,
            combined_dim,
            attribute_dim,
        }
    }

    pub fn len(&self) -> usize {
        self.combined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combined.is_empty()
    }

    /// K-nearest rows by the full combined vector.
    pub fn search_combined(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.combined_dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.combined_dim,
                actual: query.len(),
            });
        }
        Ok(knn(&self.combined, query, k))
    }

    /// K-nearest rows by the attribute sub-vector only. Used when the query
    /// side has no embedding; the stored embedding half is intentionally
    /// ignored rather than compared against zeros.
    pub fn search_attributes_only(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.attribute_dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.attribute_dim,
                actual: query.len(),
            });
        }
        Ok(knn(&self.attributes, query, k))
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Exhaustive top-k scan. Ties in distance resolve by ascending row index, so
/// identical inputs always produce identical output.
fn knn(rows: &[Vec<f32>], query: &[f32], k: usize) -> Vec<Neighbor> {
    let mut neighbors: Vec<Neighbor> = rows
        .iter()
        .enumerate()
        .map(|(row, vector)| Neighbor {
            row,
            distance: squared_distance(vector, query),
        })
        .collect();

    neighbors.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.row.cmp(&b.row))
    });
    neighbors.truncate(k);
    neighbors
}
