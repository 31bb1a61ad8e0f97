//! Qdrant REST adapter.
//!
//! Implements [`VectorStore`] against a Qdrant server over its HTTP API.
//! Filters are sent as-is: the core [`Filter`] type already serializes to
//! Qdrant's JSON filter shape.
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | exists | `GET /collections/{c}/exists` |
//! | create | `PUT /collections/{c}` + `PUT /collections/{c}/index` per field |
//! | upsert | `PUT /collections/{c}/points?wait=true` |
//! | scroll | `POST /collections/{c}/points/scroll` |
//! | query | `POST /collections/{c}/points/search` |
//! | retrieve | `POST /collections/{c}/points` |
//! | delete | `POST /collections/{c}/points/delete?wait=true` |
//! | count | `POST /collections/{c}/points/count` |
//!
//! Non-2xx responses become [`StoreError::Api`].

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use memory_harness_core::filter::Filter;
use memory_harness_core::models::Metadata;
use memory_harness_core::store::{
    Distance, PayloadSchemaType, Point, ScoredPoint, ScrollPage, StoreError, VectorParams,
    VectorStore,
};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

pub struct QdrantStore {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl QdrantStore {
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    /// Send a request and return the `result` member of the response.
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "qdrant request");
        let mut req = self.client.request(method, &url);
        if let Some(key) = &self.api_key {
            req = req.header("api-key", key);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        let mut json: Value = response.json().await?;
        Ok(json.get_mut("result").map(Value::take).unwrap_or(Value::Null))
    }
}

fn distance_name(distance: Distance) -> &'static str {
    match distance {
        Distance::Cosine => "Cosine",
        Distance::Dot => "Dot",
        Distance::Euclid => "Euclid",
    }
}

/// Numeric ids go over the wire as numbers, everything else as strings.
fn id_to_json(id: &str) -> Value {
    match id.parse::<u64>() {
        Ok(n) => json!(n),
        Err(_) => json!(id),
    }
}

fn id_from_json(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn point_to_json(point: &Point) -> Value {
    json!({
        "id": id_to_json(&point.id),
        "vector": point.vectors,
        "payload": point.payload,
    })
}

fn parse_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()
        .map(|items| items.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect())
}

/// A point record from scroll/retrieve. Unnamed vectors land under `""`.
fn point_from_json(value: &Value) -> Result<Point> {
    let id = value
        .get("id")
        .and_then(id_from_json)
        .ok_or_else(|| anyhow!("qdrant point without id"))?;
    let payload: Metadata = match value.get("payload") {
        Some(Value::Object(map)) => map.clone(),
        _ => Metadata::new(),
    };
    let mut vectors = BTreeMap::new();
    match value.get("vector") {
        Some(Value::Object(named)) => {
            for (name, v) in named {
                if let Some(vec) = parse_vector(v) {
                    vectors.insert(name.clone(), vec);
                }
            }
        }
        Some(v @ Value::Array(_)) => {
            if let Some(vec) = parse_vector(v) {
                vectors.insert(String::new(), vec);
            }
        }
        _ => {}
    }
    Ok(Point { id, vectors, payload })
}

fn scored_from_json(value: &Value) -> Result<ScoredPoint> {
    let point = point_from_json(value)?;
    let score = value.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
    Ok(ScoredPoint {
        id: point.id,
        score,
        payload: point.payload,
    })
}

fn with_filter(mut body: Value, filter: Option<&Filter>) -> Result<Value> {
    if let Some(f) = filter.filter(|f| !f.is_empty()) {
        body["filter"] = serde_json::to_value(f)?;
    }
    Ok(body)
}

fn points_array(result: &Value, key: Option<&str>) -> Result<Vec<Value>> {
    let list = match key {
        Some(k) => result.get(k),
        None => Some(result),
    };
    Ok(list
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| anyhow!("unexpected qdrant response shape"))?)
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let result = self
            .call(Method::GET, &format!("/collections/{}/exists", collection), None)
            .await?;
        Ok(result.get("exists").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn create_collection(
        &self,
        collection: &str,
        vectors: &VectorParams,
        indexes: &BTreeMap<String, PayloadSchemaType>,
    ) -> Result<()> {
        let body = json!({
            "vectors": {
                vectors.name.clone(): {
                    "size": vectors.size,
                    "distance": distance_name(vectors.distance),
                }
            }
        });
        let path = format!("/collections/{}", collection);
        if let Err(e) = self.call(Method::PUT, &path, Some(body)).await {
            if memory_harness_core::store::is_already_exists(&e) {
                return Err(StoreError::CollectionExists(collection.to_string()).into());
            }
            return Err(e);
        }

        for (field, schema) in indexes {
            self.call(
                Method::PUT,
                &format!("/collections/{}/index?wait=true", collection),
                Some(json!({ "field_name": field, "field_schema": schema.as_str() })),
            )
            .await?;
        }
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.call(Method::DELETE, &format!("/collections/{}", collection), None)
            .await?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let result = self.call(Method::GET, "/collections", None).await?;
        Ok(points_array(&result, Some("collections"))?
            .iter()
            .filter_map(|c| c.get("name").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let body = json!({ "points": points.iter().map(point_to_json).collect::<Vec<_>>() });
        self.call(
            Method::PUT,
            &format!("/collections/{}/points?wait=true", collection),
            Some(body),
        )
        .await?;
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
        let mut body = json!({
            "limit": limit,
            "with_payload": true,
            "with_vector": with_vectors,
        });
        if let Some(offset) = offset {
            body["offset"] = id_to_json(offset);
        }
        let body = with_filter(body, filter)?;
        let result = self
            .call(
                Method::POST,
                &format!("/collections/{}/points/scroll", collection),
                Some(body),
            )
            .await?;

        let points = points_array(&result, Some("points"))?
            .iter()
            .map(point_from_json)
            .collect::<Result<Vec<_>>>()?;
        let next_offset = result.get("next_page_offset").and_then(id_from_json);
        Ok(ScrollPage { points, next_offset })
    }

    async fn query(
        &self,
        collection: &str,
        vector_name: &str,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let body = with_filter(
            json!({
                "vector": { "name": vector_name, "vector": vector },
                "limit": limit,
                "with_payload": true,
            }),
            filter,
        )?;
        let result = self
            .call(
                Method::POST,
                &format!("/collections/{}/points/search", collection),
                Some(body),
            )
            .await?;
        points_array(&result, None)?
            .iter()
            .map(scored_from_json)
            .collect()
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = json!({ "points": ids.iter().map(|id| id_to_json(id)).collect::<Vec<_>>() });
        self.call(
            Method::POST,
            &format!("/collections/{}/points/delete?wait=true", collection),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn retrieve(
        &self,
        collection: &str,
        ids: &[String],
        with_vectors: bool,
    ) -> Result<Vec<Point>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({
            "ids": ids.iter().map(|id| id_to_json(id)).collect::<Vec<_>>(),
            "with_payload": true,
            "with_vector": with_vectors,
        });
        let result = self
            .call(
                Method::POST,
                &format!("/collections/{}/points", collection),
                Some(body),
            )
            .await?;
        points_array(&result, None)?
            .iter()
            .map(point_from_json)
            .collect()
    }

    async fn count(&self, collection: &str, filter: Option<&Filter>) -> Result<usize> {
        let body = with_filter(json!({ "exact": true }), filter)?;
        let result = self
            .call(
                Method::POST,
                &format!("/collections/{}/points/count", collection),
                Some(body),
            )
            .await?;
        Ok(result.get("count").and_then(Value::as_u64).unwrap_or(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_harness_core::filter::FieldCondition;

    #[test]
    fn test_id_conversion() {
        assert_eq!(id_to_json("42"), json!(42));
        assert_eq!(
            id_to_json("6f1c2d7e-0000-4000-8000-000000000000"),
            json!("6f1c2d7e-0000-4000-8000-000000000000")
        );
        assert_eq!(id_from_json(&json!(7)), Some("7".to_string()));
        assert_eq!(id_from_json(&json!(null)), None);
    }

    #[test]
    fn test_point_from_named_and_unnamed_vectors() {
        let named = point_from_json(&json!({
            "id": "a",
            "vector": {"fast-bge": [0.5, 0.5]},
            "payload": {"document": "x", "metadata": {}}
        }))
        .unwrap();
        assert_eq!(named.vector("fast-bge"), Some(&[0.5f32, 0.5][..]));
        assert_eq!(named.payload["document"], json!("x"));

        let unnamed = point_from_json(&json!({"id": 3, "vector": [1.0]})).unwrap();
        assert_eq!(unnamed.id, "3");
        assert_eq!(unnamed.vector(""), Some(&[1.0f32][..]));
        assert!(unnamed.payload.is_empty());
    }

    #[test]
    fn test_point_to_json_shape() {
        let mut payload = Metadata::new();
        payload.insert("document".into(), json!("hello"));
        let p = Point::new("11", "v", vec![1.0, 2.0], payload);
        assert_eq!(
            point_to_json(&p),
            json!({"id": 11, "vector": {"v": [1.0, 2.0]}, "payload": {"document": "hello"}})
        );
    }

    #[test]
    fn test_filter_is_attached_only_when_non_empty() {
        let body = with_filter(json!({"limit": 1}), Some(&Filter::default())).unwrap();
        assert!(body.get("filter").is_none());

        let f = Filter::default().with_must(FieldCondition::value("metadata.category", "decision"));
        let body = with_filter(json!({"limit": 1}), Some(&f)).unwrap();
        assert_eq!(
            body["filter"]["must"][0],
            json!({"key": "metadata.category", "match": {"value": "decision"}})
        );
    }
}
