//! Attribute feature vectors derived from catalog track metadata.
//!
//! The upstream catalog exposes a handful of named numeric attributes per
//! track (danceability, energy, tempo, ...). This module turns that sparse
//! mapping into a fixed-length vector suitable for concatenation with the
//! audio embedding and for nearest-neighbor search.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Canonical attribute keys, in the order they occupy vector slots.
///
/// All of these are in the 0..=1 range in the catalog representation except
/// `tempo`, which arrives in BPM and is rescaled before inclusion.
pub const CANONICAL_ATTRIBUTE_KEYS: &[&str] = &[
    "danceability",
    "energy",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "tempo",
];

const TEMPO_KEY: &str = "tempo";

/// Empirical upper bound for tempo in BPM; divides tempo into the 0..=1 band.
const TEMPO_SCALE: f64 = 200.0;

/// Seed for the padding filler. Ingestion and query vectors share it, so the
/// padded tail of every vector in the system is identical.
const PAD_SEED: u64 = 0;

/// Padding values are scaled down to ~1% so they cannot dominate distances.
const PAD_MAGNITUDE: f32 = 0.01;

/// Builds fixed-length attribute vectors from whatever attribute keys the
/// catalog happened to return. Missing keys read as 0.0; the slots beyond the
/// canonical keys are filled with a deterministic low-magnitude sequence.
#[derive(Debug, Clone)]
pub struct FeatureVectorBuilder {
    dim: usize,
}

impl FeatureVectorBuilder {
    /// `dim` is the attribute dimension `A`; config validation guarantees it
    /// is non-zero before a builder is constructed.
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Build a vector of exactly `dim` entries. Never fails: absent keys
    /// default to 0.0 and short inputs are padded, so partial catalog data
    /// degrades gracefully instead of erroring.
    pub fn build(&self, attributes: &HashMap<String, f64>) -> Vec<f32> {
        let mut values: Vec<f32> = CANONICAL_ATTRIBUTE_KEYS
            .iter()
            .map(|key| {
                let raw = attributes.get(*key).copied().unwrap_or(0.0);
                let scaled = if *key == TEMPO_KEY {
                    raw / TEMPO_SCALE
                } else {
                    raw
                };
                scaled as f32
            })
            .collect();

        if values.len() >= self.dim {
            values.truncate(self.dim);
        } else {
            values.extend(pad_filler(self.dim - values.len()));
        }
        values
    }
}

/// Deterministic low-magnitude filler for unused vector slots.
///
/// Seeded so that two runs, and the ingestion and query paths within one run,
/// produce bit-identical padding.
fn pad_filler(len: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(PAD_SEED);
    (0..len)
        .map(|_| rng.random::<f32>() * PAD_MAGNITUDE)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    #[test]
    fn test_output_length_is_exact_for_any_key_count() {
        let builder = FeatureVectorBuilder::new(128);
        let mut attributes = HashMap::new();
        assert_eq!(builder.build(&attributes).len(), 128);

        for (i, key) in CANONICAL_ATTRIBUTE_KEYS.iter().enumerate() {
            attributes.insert(key.to_string(), 0.5);
            assert_eq!(
                builder.build(&attributes).len(),
                128,
                "wrong length with {} keys",
                i + 1
            );
        }
    }

    #[test]
    fn test_truncates_when_dim_smaller_than_canonical_keys() {
        let builder = FeatureVectorBuilder::new(3);
        let v = builder.build(&attrs(&[("danceability", 0.7), ("energy", 0.4)]));
        assert_eq!(v, vec![0.7, 0.4, 0.0]);
    }

    #[test]
    fn test_tempo_normalization() {
        let builder = FeatureVectorBuilder::new(8);
        let v = builder.build(&attrs(&[("tempo", 200.0)]));
        assert!((v[7] - 1.0).abs() < 1e-6);

        let v = builder.build(&attrs(&[("tempo", 0.0)]));
        assert_eq!(v[7], 0.0);

        let v = builder.build(&attrs(&[("tempo", 100.0)]));
        assert!((v[7] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_missing_keys_default_to_zero() {
        let builder = FeatureVectorBuilder::new(8);
        let v = builder.build(&attrs(&[("energy", 0.9)]));
        assert_eq!(v[0], 0.0);
        assert!((v[1] - 0.9).abs() < 1e-6);
        assert_eq!(v[2], 0.0);
    }

    #[test]
    fn test_padding_is_deterministic() {
        let builder = FeatureVectorBuilder::new(32);
        let attributes = attrs(&[("danceability", 0.3)]);
        let a = builder.build(&attributes);
        let b = builder.build(&attributes);
        assert_eq!(a, b);
    }

    #[test]
    fn test_padding_is_low_magnitude() {
        let builder = FeatureVectorBuilder::new(64);
        let v = builder.build(&HashMap::new());
        for value in &v[CANONICAL_ATTRIBUTE_KEYS.len()..] {
            assert!(*value >= 0.0 && *value <= PAD_MAGNITUDE);
        }
    }
}
