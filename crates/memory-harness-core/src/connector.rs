//! Storage connector: embed, upsert and search over a [`VectorStore`].
//!
//! The connector owns the pairing of a vector store with an embedder and
//! an optional reranker. It creates collections on first write (named
//! vector sized to the embedder, cosine distance, declared payload
//! indexes), stores entries as `{document, metadata}` payloads under fresh
//! UUIDs, and runs the search pipeline:
//!
//! 1. Embed the query.
//! 2. Over-fetch `min(limit × 5, 100)` candidates when a reranker or a
//!    sparse weight is configured.
//! 3. Blend BM25 keyword scores into the dense scores ([`hybrid_scores`]).
//! 4. Rerank down to `limit` when more than `limit` candidates came back.
//!
//! Errors from the store or embedder propagate unchanged; retry policy
//! belongs to the adapters.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::embedding::Embedder;
use crate::filter::Filter;
use crate::models::{Entry, Metadata, ScoredEntry, METADATA_KEY};
use crate::rerank::Reranker;
use crate::sparse::hybrid_scores;
use crate::store::{
    is_already_exists, Distance, PayloadSchemaType, Point, VectorParams, VectorStore,
};

/// Page size used when scrolling whole collections.
pub const SCROLL_BATCH: usize = 1000;
/// Upper bound on candidates fetched for reranking.
pub const MAX_RERANK_CANDIDATES: usize = 100;

/// A stored entry with its id and (optionally) its vector.
#[derive(Debug, Clone)]
pub struct MemoryRecord {
    pub id: String,
    pub entry: Entry,
    pub vector: Option<Vec<f32>>,
}

pub struct StorageConnector {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    default_collection: String,
    reranker: Option<Arc<dyn Reranker>>,
    sparse_weight: f32,
    indexes: BTreeMap<String, PayloadSchemaType>,
}

impl StorageConnector {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        default_collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            default_collection: default_collection.into(),
            reranker: None,
            sparse_weight: 0.0,
            indexes: BTreeMap::new(),
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Share of the BM25 keyword score in the final ranking, in `[0, 1]`.
    /// Zero (the default) ranks by dense similarity only.
    pub fn with_sparse_weight(mut self, weight: f32) -> Self {
        self.sparse_weight = weight.clamp(0.0, 1.0);
        self
    }

    /// Payload indexes created alongside new collections.
    pub fn with_indexes(mut self, indexes: BTreeMap<String, PayloadSchemaType>) -> Self {
        self.indexes = indexes;
        self
    }

    pub fn default_collection(&self) -> &str {
        &self.default_collection
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    fn resolve<'a>(&'a self, collection: Option<&'a str>) -> &'a str {
        collection.unwrap_or(&self.default_collection)
    }

    fn reranker(&self) -> Option<&Arc<dyn Reranker>> {
        self.reranker.as_ref().filter(|r| r.is_available())
    }

    pub async fn collection_exists(&self, collection: Option<&str>) -> Result<bool> {
        self.store.collection_exists(self.resolve(collection)).await
    }

    /// Create the collection if missing. A concurrent creation is fine as
    /// long as the collection exists afterwards.
    pub async fn ensure_collection(&self, collection: Option<&str>) -> Result<()> {
        let name = self.resolve(collection);
        if self.store.collection_exists(name).await? {
            return Ok(());
        }
        let params = VectorParams {
            name: self.embedder.vector_name(),
            size: self.embedder.dims(),
            distance: Distance::Cosine,
        };
        match self.store.create_collection(name, &params, &self.indexes).await {
            Ok(()) => {
                info!(
                    collection = name,
                    vector = %params.name,
                    dims = params.size,
                    indexes = self.indexes.len(),
                    "created collection"
                );
                Ok(())
            }
            Err(e) => {
                if is_already_exists(&e) && self.store.collection_exists(name).await? {
                    debug!(collection = name, "collection created concurrently");
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Store one entry; returns its new id.
    pub async fn store(&self, entry: &Entry, collection: Option<&str>) -> Result<String> {
        let mut ids = self
            .store_batch(std::slice::from_ref(entry), collection)
            .await?;
        ids.pop()
            .ok_or_else(|| anyhow::anyhow!("no id returned for stored entry"))
    }

    /// Store several entries with one embedding call and one upsert.
    pub async fn store_batch(
        &self,
        entries: &[Entry],
        collection: Option<&str>,
    ) -> Result<Vec<String>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let name = self.resolve(collection);
        self.ensure_collection(Some(name)).await?;

        let texts: Vec<String> = entries.iter().map(|e| e.content.clone()).collect();
        let vectors = self.embedder.embed_documents(&texts).await?;
        if vectors.len() != entries.len() {
            anyhow::bail!(
                "embedder returned {} vectors for {} entries",
                vectors.len(),
                entries.len()
            );
        }

        let vector_name = self.embedder.vector_name();
        let points: Vec<Point> = entries
            .iter()
            .zip(vectors)
            .map(|(entry, vector)| {
                Point::new(
                    Uuid::new_v4().to_string(),
                    &vector_name,
                    vector,
                    entry.to_payload(),
                )
            })
            .collect();
        let ids = points.iter().map(|p| p.id.clone()).collect();
        self.store.upsert(name, points).await?;
        Ok(ids)
    }

    /// Similarity search. A missing collection yields no results.
    pub async fn search(
        &self,
        query: &str,
        collection: Option<&str>,
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredEntry>> {
        let name = self.resolve(collection);
        if !self.store.collection_exists(name).await? {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed_query(query).await?;
        let reranker = self.reranker();
        let hybrid = self.sparse_weight > 0.0;
        let fetch = if reranker.is_some() || hybrid {
            limit
                .saturating_mul(5)
                .min(MAX_RERANK_CANDIDATES)
                .max(limit)
        } else {
            limit
        };

        let hits = self
            .store
            .query(name, &self.embedder.vector_name(), &vector, filter, fetch)
            .await?;
        let mut results: Vec<ScoredEntry> = hits
            .into_iter()
            .filter_map(|hit| {
                let entry = Entry::from_payload(&hit.payload);
                if entry.is_none() {
                    debug!(id = %hit.id, "skipping point without a document payload");
                }
                Some(ScoredEntry {
                    id: hit.id,
                    score: hit.score,
                    entry: entry?,
                })
            })
            .collect();

        if hybrid && results.len() > 1 {
            let documents: Vec<String> = results.iter().map(|r| r.entry.content.clone()).collect();
            let dense: Vec<f32> = results.iter().map(|r| r.score).collect();
            let blended = hybrid_scores(query, &documents, &dense, self.sparse_weight);
            for (r, score) in results.iter_mut().zip(blended) {
                r.score = score;
            }
            results.sort_by(|a, b| b.score.total_cmp(&a.score));
        }

        match reranker {
            Some(reranker) if results.len() > limit => {
                debug!(candidates = results.len(), limit, "reranking");
                let documents: Vec<String> =
                    results.iter().map(|r| r.entry.content.clone()).collect();
                let scores: Vec<f32> = results.iter().map(|r| r.score).collect();
                let ranked = reranker.rerank(query, &documents, &scores, limit).await;

                let mut slots: Vec<Option<ScoredEntry>> = results.into_iter().map(Some).collect();
                Ok(ranked
                    .into_iter()
                    .filter_map(|(i, score)| {
                        let mut r = slots.get_mut(i)?.take()?;
                        r.score = score;
                        Some(r)
                    })
                    .collect())
            }
            _ => {
                results.truncate(limit);
                Ok(results)
            }
        }
    }

    /// Every point matching `filter`, in pages of [`SCROLL_BATCH`].
    /// A missing collection yields no points.
    pub async fn scroll_all(
        &self,
        collection: Option<&str>,
        filter: Option<&Filter>,
        with_vectors: bool,
    ) -> Result<Vec<Point>> {
        let name = self.resolve(collection);
        if !self.store.collection_exists(name).await? {
            return Ok(Vec::new());
        }
        let mut points = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let page = self
                .store
                .scroll(name, filter, SCROLL_BATCH, offset.as_deref(), with_vectors)
                .await?;
            points.extend(page.points);
            match page.next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(points)
    }

    /// [`scroll_all`](Self::scroll_all) decoded into entries. Points without
    /// a document payload are skipped.
    pub async fn scroll_records(
        &self,
        collection: Option<&str>,
        filter: Option<&Filter>,
        with_vectors: bool,
    ) -> Result<Vec<MemoryRecord>> {
        let vector_name = self.embedder.vector_name();
        Ok(self
            .scroll_all(collection, filter, with_vectors)
            .await?
            .into_iter()
            .filter_map(|p| {
                let entry = Entry::from_payload(&p.payload)?;
                let vector = p.vector(&vector_name).map(<[f32]>::to_vec);
                Some(MemoryRecord {
                    id: p.id,
                    entry,
                    vector,
                })
            })
            .collect())
    }

    /// Merge `patch` into a point's metadata, keeping its id and vector.
    /// Returns `false` when the point does not exist.
    pub async fn update_metadata(
        &self,
        id: &str,
        patch: &Metadata,
        collection: Option<&str>,
    ) -> Result<bool> {
        let name = self.resolve(collection);
        let Some(mut point) = self
            .store
            .retrieve(name, &[id.to_string()], true)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(false);
        };

        let metadata = point
            .payload
            .entry(METADATA_KEY.to_string())
            .or_insert_with(|| Value::Object(Metadata::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Metadata::new());
        }
        if let Value::Object(map) = metadata {
            for (k, v) in patch {
                map.insert(k.clone(), v.clone());
            }
        }
        self.store.upsert(name, vec![point]).await?;
        Ok(true)
    }

    /// Replace points wholesale (same ids). Used by migrations.
    pub async fn upsert_points(&self, points: Vec<Point>, collection: Option<&str>) -> Result<()> {
        self.store.upsert(self.resolve(collection), points).await
    }

    pub async fn delete(&self, ids: &[String], collection: Option<&str>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.store.delete(self.resolve(collection), ids).await
    }

    /// Delete every point matching `filter`; returns how many were removed.
    pub async fn delete_where(&self, filter: &Filter, collection: Option<&str>) -> Result<usize> {
        let ids: Vec<String> = self
            .scroll_all(collection, Some(filter), false)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        self.delete(&ids, collection).await?;
        Ok(ids.len())
    }

    /// Count points matching `filter`. A missing collection counts zero.
    pub async fn count(&self, filter: Option<&Filter>, collection: Option<&str>) -> Result<usize> {
        let name = self.resolve(collection);
        if !self.store.collection_exists(name).await? {
            return Ok(0);
        }
        self.store.count(name, filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::filter::FieldCondition;
    use crate::models::{Category, MetadataExt, NewEntry};
    use crate::rerank::TermOverlapReranker;
    use crate::store::memory::InMemoryVectorStore;
    use serde_json::json;

    fn connector() -> StorageConnector {
        StorageConnector::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(HashEmbedder::new(128)),
            "memory",
        )
    }

    #[tokio::test]
    async fn test_search_missing_collection_is_empty() {
        let c = connector();
        assert!(c.search("anything", None, 5, None).await.unwrap().is_empty());
        assert!(c.scroll_all(None, None, false).await.unwrap().is_empty());
        assert_eq!(c.count(None, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_then_search() {
        let c = connector();
        let entry = NewEntry::new("Decision: use PostgreSQL for storage", Category::Decision)
            .into_entry();
        let id = c.store(&entry, None).await.unwrap();
        c.store(&NewEntry::new("sprite batching in the renderer", Category::Memory).into_entry(), None)
            .await
            .unwrap();

        let hits = c.search("PostgreSQL storage", None, 1, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        assert_eq!(hits[0].entry.metadata.get_str("decision"), Some("use PostgreSQL for storage"));
    }

    #[tokio::test]
    async fn test_search_with_filter() {
        let c = connector();
        c.store(&NewEntry::new("alpha decision", Category::Decision).into_entry(), None)
            .await
            .unwrap();
        c.store(&NewEntry::new("alpha pattern", Category::Pattern).into_entry(), None)
            .await
            .unwrap();
        let filter = Filter::new().with_must(FieldCondition::value("metadata.category", "pattern"));
        let hits = c.search("alpha", None, 10, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.content, "alpha pattern");
    }

    #[tokio::test]
    async fn test_rerank_truncates_to_limit() {
        let c = connector().with_reranker(Arc::new(TermOverlapReranker::default()));
        for i in 0..6 {
            c.store(&NewEntry::new(format!("cache entry {}", i), Category::Memory).into_entry(), None)
                .await
                .unwrap();
        }
        let hits = c.search("cache entry", None, 3, None).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_huge_limit_does_not_overflow() {
        let c = connector().with_reranker(Arc::new(TermOverlapReranker::default()));
        c.store(&NewEntry::new("only entry", Category::Memory).into_entry(), None)
            .await
            .unwrap();
        let hits = c.search("only entry", None, usize::MAX, None).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_sparse_weight_promotes_rare_keyword() {
        let c = connector().with_sparse_weight(0.9);
        for text in [
            "connection pool sizing for the database layer",
            "the retry_budget setting caps reconnect attempts",
            "pool of workers for the database",
        ] {
            c.store(&NewEntry::new(text, Category::Memory).into_entry(), None)
                .await
                .unwrap();
        }

        let hits = c
            .search("database pool retry_budget", None, 3, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits[0].entry.content.contains("retry_budget"));
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_update_metadata_preserves_vector() {
        let c = connector();
        let id = c
            .store(&NewEntry::new("keep my vector", Category::Memory).into_entry(), None)
            .await
            .unwrap();
        let before = c.scroll_records(None, None, true).await.unwrap();

        let mut patch = Metadata::new();
        patch.insert("health_score".into(), json!(42.0));
        assert!(c.update_metadata(&id, &patch, None).await.unwrap());
        assert!(!c.update_metadata("missing", &patch, None).await.unwrap());

        let after = c.scroll_records(None, None, true).await.unwrap();
        assert_eq!(after[0].id, id);
        assert_eq!(after[0].vector, before[0].vector);
        assert_eq!(after[0].entry.metadata.get_f64("health_score"), Some(42.0));
        assert_eq!(after[0].entry.metadata.get_str("category"), Some("memory"));
    }

    #[tokio::test]
    async fn test_delete_where_and_count() {
        let c = connector();
        for (text, cat) in [("a one", Category::Lesson), ("b two", Category::Lesson), ("c three", Category::Error)] {
            c.store(&NewEntry::new(text, cat).into_entry(), None).await.unwrap();
        }
        let lessons = Filter::new().with_must(FieldCondition::value("metadata.category", "lesson"));
        assert_eq!(c.count(Some(&lessons), None).await.unwrap(), 2);
        assert_eq!(c.delete_where(&lessons, None).await.unwrap(), 2);
        assert_eq!(c.count(None, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ensure_collection_idempotent() {
        let c = connector();
        c.ensure_collection(None).await.unwrap();
        c.ensure_collection(None).await.unwrap();
        assert!(c.collection_exists(None).await.unwrap());
        assert!(!c.collection_exists(Some("other")).await.unwrap());
    }
}
