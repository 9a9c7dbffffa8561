//! Explanation text for a set of ranked recommendations.
//!
//! The production deployment can plug an LLM-backed generator in behind
//! [`ExplanationGenerator`]; the engine itself only needs the trait. The
//! shipped default is a deterministic template so responses keep their shape
//! without any external dependency.

use crate::catalog::TrackInfo;
use crate::engine::Recommendation;

pub trait ExplanationGenerator: Send + Sync {
    /// Produce a human-readable summary of why `results` follow from
    /// `source`. Pure: same inputs, same text.
    fn explain(&self, source: &TrackInfo, results: &[Recommendation]) -> String;
}

/// Deterministic template-based generator.
#[derive(Debug, Default)]
pub struct TemplateExplainer;

impl ExplanationGenerator for TemplateExplainer {
    fn explain(&self, source: &TrackInfo, results: &[Recommendation]) -> String {
        if results.is_empty() {
            return format!(
                "No similar tracks found for \"{}\" by {}.",
                source.name, source.artist
            );
        }

        let listing = results
            .iter()
            .map(|r| format!("\"{}\" by {}", r.name, r.artist))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "If you like \"{}\" by {}, try: {}. Ranked by audio similarity, closest first.",
            source.name, source.artist, listing
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source() -> TrackInfo {
        TrackInfo {
            id: "t1".to_string(),
            name: "Song One".to_string(),
            artist: "Band".to_string(),
            preview_url: None,
            attributes: HashMap::new(),
        }
    }

    #[test]
    fn test_empty_results_text() {
        let text = TemplateExplainer.explain(&source(), &[]);
        assert!(text.contains("No similar tracks"));
        assert!(text.contains("Song One"));
    }

    #[test]
    fn test_lists_every_result_in_order() {
        let results = vec![
            Recommendation {
                id: "t2".to_string(),
                name: "Second".to_string(),
                artist: "Other".to_string(),
                score: 0.1,
            },
            Recommendation {
                id: "t3".to_string(),
                name: "Third".to_string(),
                artist: "Another".to_string(),
                score: 0.5,
            },
        ];
        let text = TemplateExplainer.explain(&source(), &results);
        let second = text.find("Second").unwrap();
        let third = text.find("Third").unwrap();
        assert!(second < third);
    }

    #[test]
    fn test_deterministic() {
        let results = vec![Recommendation {
            id: "t2".to_string(),
            name: "Second".to_string(),
            artist: "Other".to_string(),
            score: 0.1,
        }];
        assert_eq!(
            TemplateExplainer.explain(&source(), &results),
            TemplateExplainer.explain(&source(), &results)
        );
    }
}
