//! Second-pass reranking.
//!
//! A [`Reranker`] reorders the candidates returned by vector search. The
//! bundled [`TermOverlapReranker`] boosts documents that contain the
//! query's terms: `score × (1 + 0.1 × matched / terms)`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::warn;

/// Reorders search candidates.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn is_available(&self) -> bool;

    /// Return `(original_index, new_score)` pairs, best first, at most
    /// `top_k` long.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        scores: &[f32],
        top_k: usize,
    ) -> Vec<(usize, f32)>;
}

/// Boosts scores by the fraction of query terms found in each document.
#[derive(Debug, Clone)]
pub struct TermOverlapReranker {
    pub enabled: bool,
}

impl TermOverlapReranker {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Default for TermOverlapReranker {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Indices sorted by score descending (stable), truncated to `top_k`.
fn pass_through(scores: &[f32], top_k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(top_k);
    ranked
}

#[async_trait]
impl Reranker for TermOverlapReranker {
    fn is_available(&self) -> bool {
        self.enabled
    }

    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        scores: &[f32],
        top_k: usize,
    ) -> Vec<(usize, f32)> {
        if !self.enabled || documents.is_empty() {
            return pass_through(scores, top_k);
        }
        if documents.len() != scores.len() {
            warn!(
                documents = documents.len(),
                scores = scores.len(),
                "reranker input length mismatch, keeping original order"
            );
            return pass_through(&scores[..scores.len().min(documents.len())], top_k);
        }
        if scores.iter().any(|s| !s.is_finite()) {
            warn!("non-finite score in reranker input, keeping original order");
            return pass_through(scores, top_k);
        }

        let terms: BTreeSet<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if terms.is_empty() {
            return pass_through(scores, top_k);
        }

        let mut boosted: Vec<(usize, f32)> = documents
            .iter()
            .zip(scores)
            .enumerate()
            .map(|(i, (doc, &score))| {
                let doc = doc.to_lowercase();
                let matched = terms.iter().filter(|t| doc.contains(t.as_str())).count();
                let ratio = matched as f32 / terms.len() as f32;
                (i, score * (1.0 + 0.1 * ratio))
            })
            .collect();
        boosted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        boosted.truncate(top_k);
        boosted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_overlap_boost_reorders() {
        let r = TermOverlapReranker::default();
        let documents = docs(&["unrelated text", "postgres connection pool"]);
        let out = r
            .rerank("postgres pool", &documents, &[0.80, 0.75], 2)
            .await;
        assert_eq!(out[0].0, 1);
        assert!((out[0].1 - 0.75 * 1.1).abs() < 1e-6);
        assert_eq!(out[1], (0, 0.80));
    }

    #[tokio::test]
    async fn test_disabled_passes_through_sorted() {
        let r = TermOverlapReranker::new(false);
        let documents = docs(&["a", "b", "c"]);
        let out = r.rerank("a", &documents, &[0.1, 0.9, 0.5], 2).await;
        assert_eq!(out, vec![(1, 0.9), (2, 0.5)]);
        assert!(!r.is_available());
    }

    #[tokio::test]
    async fn test_stable_on_ties() {
        let r = TermOverlapReranker::default();
        let documents = docs(&["x", "y", "z"]);
        let out = r.rerank("q", &documents, &[0.5, 0.5, 0.5], 3).await;
        assert_eq!(out.iter().map(|p| p.0).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_inconsistent_input_falls_back() {
        let r = TermOverlapReranker::default();
        let documents = docs(&["a", "b"]);
        let out = r.rerank("a", &documents, &[0.2, 0.4, 0.9], 5).await;
        assert_eq!(out, vec![(1, 0.4), (0, 0.2)]);

        let out = r.rerank("a", &documents, &[f32::NAN, 0.4], 5).await;
        assert_eq!(out.len(), 2);
    }
}
