//! In-memory [`VectorStore`] implementation.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. Points are
//! kept in a `BTreeMap` keyed by id so scrolling is ordered and resumable.
//! Queries are brute-force cosine similarity with full filter evaluation.
//!
//! Used by tests and, wrapped in a snapshot file, by the local store mode.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::cosine_similarity;
use crate::filter::Filter;

use super::{PayloadSchemaType, Point, ScoredPoint, ScrollPage, StoreError, VectorParams, VectorStore};

/// One collection's configuration and points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionData {
    pub params: VectorParams,
    #[serde(default)]
    pub indexes: BTreeMap<String, PayloadSchemaType>,
    #[serde(default)]
    pub points: BTreeMap<String, Point>,
}

/// In-memory vector store.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, CollectionData>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from previously exported collections.
    pub fn from_collections(collections: HashMap<String, CollectionData>) -> Self {
        Self {
            collections: RwLock::new(collections),
        }
    }

    /// Clone out every collection (for snapshotting).
    pub fn export(&self) -> Result<HashMap<String, CollectionData>> {
        Ok(self.read()?.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, CollectionData>>> {
        self.collections
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, CollectionData>>> {
        self.collections
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

fn strip(mut point: Point, with_vectors: bool) -> Point {
    if !with_vectors {
        point.vectors.clear();
    }
    point
}

fn not_found(collection: &str) -> anyhow::Error {
    StoreError::CollectionNotFound(collection.to_string()).into()
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.read()?.contains_key(collection))
    }

    async fn create_collection(
        &self,
        collection: &str,
        vectors: &VectorParams,
        indexes: &BTreeMap<String, PayloadSchemaType>,
    ) -> Result<()> {
        let mut collections = self.write()?;
        if collections.contains_key(collection) {
            return Err(StoreError::CollectionExists(collection.to_string()).into());
        }
        collections.insert(
            collection.to_string(),
            CollectionData {
                params: vectors.clone(),
                indexes: indexes.clone(),
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.write()?.remove(collection);
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        let mut collections = self.write()?;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection))?;
        for point in points {
            if let Some(v) = point.vector(&data.params.name) {
                if v.len() != data.params.size {
                    return Err(anyhow!(
                        "vector '{}' has {} dims, collection '{}' expects {}",
                        data.params.name,
                        v.len(),
                        collection,
                        data.params.size
                    ));
                }
            }
            data.points.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        limit: usize,
        offset: Option<&str>,
        with_vectors: bool,
    ) -> Result<ScrollPage> {
        let collections = self.read()?;
        let data = collections
            .get(collection)
            .ok_or_else(|| not_found(collection))?;

        let mut matching = data
            .points
            .range::<str, _>((
                offset.map_or(std::ops::Bound::Unbounded, std::ops::Bound::Included),
                std::ops::Bound::Unbounded,
            ))
            .map(|(_, p)| p)
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload)));

        let points: Vec<Point> = matching
            .by_ref()
            .take(limit)
            .map(|p| strip(p.clone(), with_vectors))
            .collect();
        let next_offset = matching.next().map(|p| p.id.clone());
        Ok(ScrollPage {
            points,
            next_offset,
        })
    }

    async fn query(
        &self,
        collection: &str,
        vector_name: &str,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.read()?;
        let data = collections
            .get(collection)
            .ok_or_else(|| not_found(collection))?;

        let mut hits: Vec<ScoredPoint> = data
            .points
            .values()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload)))
            .filter_map(|p| {
                let v = p.vector(vector_name)?;
                Some(ScoredPoint {
                    id: p.id.clone(),
                    score: cosine_similarity(vector, v),
                    payload: p.payload.clone(),
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let mut collections = self.write()?;
        if let Some(data) = collections.get_mut(collection) {
            for id in ids {
                data.points.remove(id);
            }
        }
        Ok(())
    }

    async fn retrieve(
        &self,
        collection: &str,
        ids: &[String],
        with_vectors: bool,
    ) -> Result<Vec<Point>> {
        let collections = self.read()?;
        let Some(data) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| data.points.get(id))
            .map(|p| strip(p.clone(), with_vectors))
            .collect())
    }

    async fn count(&self, collection: &str, filter: Option<&Filter>) -> Result<usize> {
        let collections = self.read()?;
        let Some(data) = collections.get(collection) else {
            return Ok(0);
        };
        Ok(data
            .points
            .values()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload)))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FieldCondition;
    use crate::store::{is_already_exists, Distance};
    use serde_json::json;

    fn params() -> VectorParams {
        VectorParams {
            name: "v".into(),
            size: 2,
            distance: Distance::Cosine,
        }
    }

    fn point(id: &str, v: [f32; 2], category: &str) -> Point {
        let mut payload = crate::models::Metadata::new();
        payload.insert("document".into(), json!(id));
        payload.insert("metadata".into(), json!({ "category": category }));
        Point::new(id, "v", v.to_vec(), payload)
    }

    async fn seeded() -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new();
        store
            .create_collection("c", &params(), &BTreeMap::new())
            .await
            .unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("a", [1.0, 0.0], "decision"),
                    point("b", [0.0, 1.0], "pattern"),
                    point("c", [0.7, 0.7], "decision"),
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_create_twice_is_already_exists() {
        let store = seeded().await;
        let err = store
            .create_collection("c", &params(), &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(is_already_exists(&err));
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity_with_filter() {
        let store = seeded().await;
        let hits = store.query("c", "v", &[1.0, 0.0], None, 10).await.unwrap();
        assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["a", "c", "b"]);

        let filter = Filter::new().with_must(FieldCondition::value("metadata.category", "pattern"));
        let hits = store
            .query("c", "v", &[1.0, 0.0], Some(&filter), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[tokio::test]
    async fn test_scroll_pages() {
        let store = seeded().await;
        let page = store.scroll("c", None, 2, None, false).await.unwrap();
        assert_eq!(page.points.len(), 2);
        assert!(page.points[0].vectors.is_empty());
        assert_eq!(page.next_offset.as_deref(), Some("c"));

        let page = store
            .scroll("c", None, 2, page.next_offset.as_deref(), true)
            .await
            .unwrap();
        assert_eq!(page.points.len(), 1);
        assert_eq!(page.points[0].vector("v"), Some(&[0.7f32, 0.7][..]));
        assert!(page.next_offset.is_none());
    }

    #[tokio::test]
    async fn test_retrieve_delete_count() {
        let store = seeded().await;
        let got = store
            .retrieve("c", &["a".into(), "zz".into()], true)
            .await
            .unwrap();
        assert_eq!(got.len(), 1);

        store.delete("c", &["a".into()]).await.unwrap();
        assert_eq!(store.count("c", None).await.unwrap(), 2);
        assert_eq!(store.count("missing", None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_dimension_mismatch() {
        let store = seeded().await;
        let bad = Point::new("x", "v", vec![1.0, 2.0, 3.0], Default::default());
        assert!(store.upsert("c", vec![bad]).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_collection_query_errors() {
        let store = InMemoryVectorStore::new();
        assert!(!store.collection_exists("nope").await.unwrap());
        assert!(store.query("nope", "v", &[1.0], None, 1).await.is_err());
    }
}
