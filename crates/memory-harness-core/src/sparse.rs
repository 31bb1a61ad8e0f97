//! BM25 sparse vectors.
//!
//! Sparse vectors complement dense embeddings with exact keyword matching,
//! which matters for identifiers and technical terms. Each term gets a
//! stable `u32` index the first time it is seen; values are BM25 weights.
//!
//! Corpus statistics (`doc_count`, `avg_doc_len`) describe the most recent
//! [`Bm25Embedder::embed_documents`] batch, while document frequencies
//! accumulate across batches.
//!
//! [`hybrid_scores`] is what search uses: it fits a fresh embedder on the
//! dense candidates and blends the keyword score into the dense one.

use std::collections::HashMap;

use serde::Serialize;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "will", "with",
];

/// Sparse vector with indices in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    fn from_pairs(mut pairs: Vec<(u32, f32)>) -> Self {
        pairs.sort_by_key(|(i, _)| *i);
        let (indices, values) = pairs.into_iter().unzip();
        Self { indices, values }
    }

    /// Weight at `index`, if present.
    pub fn get(&self, index: u32) -> Option<f32> {
        self.indices
            .binary_search(&index)
            .ok()
            .map(|pos| self.values[pos])
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Sum of products over shared indices.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j, mut sum) = (0, 0, 0.0);
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// BM25 sparse embedder.
#[derive(Debug, Clone)]
pub struct Bm25Embedder {
    pub k1: f32,
    pub b: f32,
    vocab: HashMap<String, u32>,
    df: HashMap<String, usize>,
    doc_count: usize,
    avg_doc_len: f32,
}

impl Default for Bm25Embedder {
    fn default() -> Self {
        Self::new(1.5, 0.75)
    }
}

/// Lowercased `\w+` runs, minus stop words of three or more characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .filter(|t| t.chars().count() < 3 || !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Term counts in first-seen order.
fn term_counts(tokens: &[String]) -> Vec<(&str, usize)> {
    let mut order: Vec<(&str, usize)> = Vec::new();
    let mut pos: HashMap<&str, usize> = HashMap::new();
    for t in tokens {
        match pos.get(t.as_str()) {
            Some(&i) => order[i].1 += 1,
            None => {
                pos.insert(t.as_str(), order.len());
                order.push((t.as_str(), 1));
            }
        }
    }
    order
}

impl Bm25Embedder {
    pub fn new(k1: f32, b: f32) -> Self {
        Self {
            k1,
            b,
            vocab: HashMap::new(),
            df: HashMap::new(),
            doc_count: 0,
            avg_doc_len: 0.0,
        }
    }

    /// True once any document has been embedded.
    pub fn is_available(&self) -> bool {
        !self.vocab.is_empty()
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    fn term_index(&mut self, term: &str) -> u32 {
        let next = self.vocab.len() as u32;
        *self.vocab.entry(term.to_string()).or_insert(next)
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.doc_count as f32;
        let df = self.df.get(term).copied().unwrap_or(1) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Embed a batch, updating corpus statistics first.
    pub fn embed_documents(&mut self, texts: &[String]) -> Vec<SparseVector> {
        let all_tokens: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t)).collect();
        self.doc_count = texts.len();
        let total: usize = all_tokens.iter().map(Vec::len).sum();
        self.avg_doc_len = total as f32 / texts.len().max(1) as f32;

        for tokens in &all_tokens {
            for (term, _) in term_counts(tokens) {
                *self.df.entry(term.to_string()).or_insert(0) += 1;
            }
        }

        all_tokens
            .iter()
            .map(|tokens| {
                let doc_len = tokens.len() as f32;
                let pairs = term_counts(tokens)
                    .into_iter()
                    .filter_map(|(term, tf)| {
                        let idx = self.term_index(term);
                        let weight = self.document_weight(term, tf as f32, doc_len);
                        (weight > 0.0).then_some((idx, weight))
                    })
                    .collect();
                SparseVector::from_pairs(pairs)
            })
            .collect()
    }

    fn document_weight(&self, term: &str, tf: f32, doc_len: f32) -> f32 {
        if self.avg_doc_len <= 0.0 {
            return 0.0;
        }
        let norm = 1.0 - self.b + self.b * (doc_len / self.avg_doc_len);
        self.idf(term) * (tf * (self.k1 + 1.0)) / (tf + self.k1 * norm)
    }

    /// Embed a query: `idf × tf` over known terms. Unknown terms are dropped.
    pub fn embed_query(&self, text: &str) -> SparseVector {
        let tokens = tokenize(text);
        let pairs = term_counts(&tokens)
            .into_iter()
            .filter_map(|(term, tf)| {
                let idx = *self.vocab.get(term)?;
                let weight = self.idf(term) * tf as f32;
                (weight > 0.0).then_some((idx, weight))
            })
            .collect();
        SparseVector::from_pairs(pairs)
    }
}

/// Blend BM25 keyword relevance into dense scores.
///
/// BM25 is fitted on `documents` alone, scored against `query`, and scaled
/// so the best keyword match is 1.0. Each result is
/// `(1 - weight) × dense + weight × keyword`. A weight of zero (or a query
/// with no known terms) returns the dense scores unchanged.
pub fn hybrid_scores(query: &str, documents: &[String], dense: &[f32], weight: f32) -> Vec<f32> {
    let weight = weight.clamp(0.0, 1.0);
    if weight == 0.0 || documents.is_empty() {
        return dense.to_vec();
    }
    let mut bm25 = Bm25Embedder::default();
    let doc_vectors = bm25.embed_documents(documents);
    let query_vector = bm25.embed_query(query);
    if query_vector.is_empty() {
        return dense.to_vec();
    }

    let keyword: Vec<f32> = doc_vectors.iter().map(|d| d.dot(&query_vector)).collect();
    let best = keyword.iter().copied().fold(0.0f32, f32::max);
    dense
        .iter()
        .zip(keyword)
        .map(|(d, k)| {
            let k = if best > 0.0 { k / best } else { 0.0 };
            (1.0 - weight) * d + weight * k
        })
        .collect()
}
