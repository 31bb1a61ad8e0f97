//! File-backed local store.
//!
//! Used when `[store].local_path` is set. Points live in an
//! [`InMemoryVectorStore`]; after every mutation the whole store is written
//! to a JSON snapshot next to `local_path` and atomically renamed into
//! place. Vectors are stored as base64 little-endian `f32` blobs to keep
//! the file compact.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use memory_harness_core::embedding::{blob_to_vec, vec_to_blob};
use memory_harness_core::filter::Filter;
use memory_harness_core::models::Metadata;
use memory_harness_core::store::memory::{CollectionData, InMemoryVectorStore};
use memory_harness_core::store::{
    PayloadSchemaType, Point, ScoredPoint, ScrollPage, VectorParams, VectorStore,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    collections: BTreeMap<String, SnapshotCollection>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotCollection {
    params: VectorParams,
    #[serde(default)]
    indexes: BTreeMap<String, PayloadSchemaType>,
    #[serde(default)]
    points: Vec<SnapshotPoint>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotPoint {
    id: String,
    /// Vector name → base64 of little-endian `f32`s.
    #[serde(default)]
    vectors: BTreeMap<String, String>,
    #[serde(default)]
    payload: Metadata,
}

impl Snapshot {
    fn from_collections(collections: HashMap<String, CollectionData>) -> Self {
        let collections = collections
            .into_iter()
            .map(|(name, data)| {
                let points = data
                    .points
                    .into_values()
                    .map(|p| SnapshotPoint {
                        id: p.id,
                        vectors: p
                            .vectors
                            .iter()
                            .map(|(k, v)| (k.clone(), STANDARD.encode(vec_to_blob(v))))
                            .collect(),
                        payload: p.payload,
                    })
                    .collect();
                (
                    name,
                    SnapshotCollection {
                        params: data.params,
                        indexes: data.indexes,
                        points,
                    },
                )
            })
            .collect();
        Self {
            version: SNAPSHOT_VERSION,
            collections,
        }
    }

    fn into_collections(self) -> Result<HashMap<String, CollectionData>> {
        let mut out = HashMap::new();
        for (name, coll) in self.collections {
            let mut points = BTreeMap::new();
            for sp in coll.points {
                let mut vectors = BTreeMap::new();
                for (vname, encoded) in sp.vectors {
                    let blob = STANDARD
                        .decode(encoded.as_bytes())
                        .with_context(|| format!("corrupt vector for point {}", sp.id))?;
                    vectors.insert(vname, blob_to_vec(&blob));
                }
                points.insert(
                    sp.id.clone(),
                    Point {
                        id: sp.id,
                        vectors,
                        payload: sp.payload,
                    },
                );
            }
            out.insert(
                name,
                CollectionData {
                    params: coll.params,
                    indexes: coll.indexes,
                    points,
                },
            );
        }
        Ok(out)
    }
}

pub struct LocalStore {
    path: PathBuf,
    inner: InMemoryVectorStore,
    save_lock: Mutex<()>,
}

impl LocalStore {
    /// Open the snapshot at `path`, or start empty if it does not exist.
    pub fn open(path: &Path) -> Result<Self> {
        let inner = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read local store: {}", path.display()))?;
            let snapshot: Snapshot = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse local store: {}", path.display()))?;
            if snapshot.version != SNAPSHOT_VERSION {
                bail!(
                    "unsupported local store version {} in {}",
                    snapshot.version,
                    path.display()
                );
            }
            let collections = snapshot.into_collections()?;
            info!(path = %path.display(), collections = collections.len(), "opened local store");
            InMemoryVectorStore::from_collections(collections)
        } else {
            info!(path = %path.display(), "starting empty local store");
            InMemoryVectorStore::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            inner,
            save_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        let snapshot = Snapshot::from_collections(self.inner.export()?);
        let text = serde_json::to_string(&snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = text.len(), "saved local store");
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LocalStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        self.inner.collection_exists(collection).await
    }

    async fn create_collection(
        &self,
        collection: &str,
        vectors: &VectorParams,
        indexes: &BTreeMap<String, PayloadSchemaType>,
    ) -> Result<()> {
        self.inner
            .create_collection(collection, vectors, indexes)
            .await?;
        self.save().await
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.inner.delete_collection(collection).await?;
        self.save().await
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.inner.list_collections().await
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        self.inner.upsert(collection, points).await?;
        self.save().await
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        limit: usize,
        offset: Option<&str>,
        with_vectors: bool,
    ) -> Result<ScrollPage> {
        self.inner
            .scroll(collection, filter, limit, offset, with_vectors)
            .await
    }

    async fn query(
        &self,
        collection: &str,
        vector_name: &str,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        self.inner
            .query(collection, vector_name, vector, filter, limit)
            .await
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        self.inner.delete(collection, ids).await?;
        self.save().await
    }

    async fn retrieve(
        &self,
        collection: &str,
        ids: &[String],
        with_vectors: bool,
    ) -> Result<Vec<Point>> {
        self.inner.retrieve(collection, ids, with_vectors).await
    }

    async fn count(&self, collection: &str, filter: Option<&Filter>) -> Result<usize> {
        self.inner.count(collection, filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_harness_core::store::Distance;
    use serde_json::json;

    fn params() -> VectorParams {
        VectorParams {
            name: "fast-hash".into(),
            size: 3,
            distance: Distance::Cosine,
        }
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("memory.json");

        let store = LocalStore::open(&path).unwrap();
        store
            .create_collection("memory", &params(), &BTreeMap::new())
            .await
            .unwrap();
        let mut payload = Metadata::new();
        payload.insert("document".into(), json!("remember me"));
        store
            .upsert(
                "memory",
                vec![Point::new("p1", "fast-hash", vec![0.25, -1.5, 3.0], payload)],
            )
            .await
            .unwrap();
        assert!(path.exists());

        let reopened = LocalStore::open(&path).unwrap();
        let points = reopened
            .retrieve("memory", &["p1".to_string()], true)
            .await
            .unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].vector("fast-hash"), Some(&[0.25f32, -1.5, 3.0][..]));
        assert_eq!(points[0].payload["document"], json!("remember me"));

        reopened
            .delete("memory", &["p1".to_string()])
            .await
            .unwrap();
        let again = LocalStore::open(&path).unwrap();
        assert_eq!(again.count("memory", None).await.unwrap(), 0);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        std::fs::write(&path, r#"{"version": 99, "collections": {}}"#).unwrap();
        let err = LocalStore::open(&path).err().unwrap().to_string();
        assert!(err.contains("version"));
    }
}
