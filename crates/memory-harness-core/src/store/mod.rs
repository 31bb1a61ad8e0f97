//! Vector store abstraction.
//!
//! The [`VectorStore`] trait covers everything the connector and janitor
//! need from a vector database: collection lifecycle, point upsert,
//! paginated scroll, filtered similarity query, retrieval, deletion and
//! counting. Filters are the native [`Filter`] type, which serializes to the
//! Qdrant JSON filter shape.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Implementation | Location |
//! |----------------|----------|
//! | [`memory::InMemoryVectorStore`] | This crate (tests, local snapshot mode) |
//! | `QdrantStore` | `memory-harness` app crate (REST) |

pub mod memory;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::filter::Filter;
use crate::models::Metadata;

/// A stored point: id, named vectors and payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: String,
    #[serde(default)]
    pub vectors: BTreeMap<String, Vec<f32>>,
    #[serde(default)]
    pub payload: Metadata,
}

impl Point {
    pub fn new(id: impl Into<String>, vector_name: &str, vector: Vec<f32>, payload: Metadata) -> Self {
        let mut vectors = BTreeMap::new();
        vectors.insert(vector_name.to_string(), vector);
        Self {
            id: id.into(),
            vectors,
            payload,
        }
    }

    pub fn vector(&self, name: &str) -> Option<&[f32]> {
        self.vectors.get(name).map(Vec::as_slice)
    }
}

/// A query hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Metadata,
}

/// One page of a scroll. `next_offset` is the id to resume from.
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub points: Vec<Point>,
    pub next_offset: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Distance {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

/// Named dense vector configuration of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorParams {
    pub name: String,
    pub size: usize,
    pub distance: Distance,
}

/// Payload index type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadSchemaType {
    Keyword,
    Integer,
    Float,
    Bool,
}

impl PayloadSchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadSchemaType::Keyword => "keyword",
            PayloadSchemaType::Integer => "integer",
            PayloadSchemaType::Float => "float",
            PayloadSchemaType::Bool => "bool",
        }
    }
}

/// Backend-level failures callers may want to match on. Carried inside
/// `anyhow::Error`; use `downcast_ref::<StoreError>()`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("collection '{0}' already exists")]
    CollectionExists(String),
    #[error("collection '{0}' not found")]
    CollectionNotFound(String),
    #[error("vector store returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Whether `err` is a "collection already exists" failure.
pub fn is_already_exists(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<StoreError>() {
        Some(StoreError::CollectionExists(_)) => true,
        Some(StoreError::Api { status, body }) => {
            *status == 409 || body.to_lowercase().contains("already exists")
        }
        _ => err.to_string().to_lowercase().contains("already exists"),
    }
}

/// Abstract vector database.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`collection_exists`](VectorStore::collection_exists) | Existence check |
/// | [`create_collection`](VectorStore::create_collection) | Create with vector params and payload indexes |
/// | [`upsert`](VectorStore::upsert) | Insert or replace points by id |
/// | [`scroll`](VectorStore::scroll) | Page through points in id order |
/// | [`query`](VectorStore::query) | Filtered nearest-neighbour search |
/// | [`retrieve`](VectorStore::retrieve) | Fetch points by id |
/// | [`delete`](VectorStore::delete) | Delete points by id |
/// | [`count`](VectorStore::count) | Count matching points |
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Fails with [`StoreError::CollectionExists`] when the name is taken.
    async fn create_collection(
        &self,
        collection: &str,
        vectors: &VectorParams,
        indexes: &BTreeMap<String, PayloadSchemaType>,
    ) -> Result<()>;

    async fn delete_collection(&self, collection: &str) -> Result<()>;

    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()>;

    /// Up to `limit` points starting at `offset` (inclusive).
    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        limit: usize,
        offset: Option<&str>,
        with_vectors: bool,
    ) -> Result<ScrollPage>;

    /// Best `limit` matches of `vector` against the named vector.
    async fn query(
        &self,
        collection: &str,
        vector_name: &str,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()>;

    /// Missing ids are skipped.
    async fn retrieve(
        &self,
        collection: &str,
        ids: &[String],
        with_vectors: bool,
    ) -> Result<Vec<Point>>;

    async fn count(&self, collection: &str, filter: Option<&Filter>) -> Result<usize>;
}
