//! Payload migration.
//!
//! Older writers stored the entry text under `content`. Search and the
//! janitor only read `document`, so such points are invisible until
//! rewritten. The migration renames the key in place, keeping the point
//! id and vector.

use anyhow::Result;
use memory_harness_core::connector::StorageConnector;
use memory_harness_core::models::{now_ts, DOCUMENT_KEY, LEGACY_CONTENT_KEY, METADATA_KEY};
use memory_harness_core::store::Point;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub scanned: usize,
    pub migrated: usize,
    /// Points already in the current shape (or with nothing to migrate).
    pub skipped: usize,
}

fn needs_migration(point: &Point) -> bool {
    point.payload.contains_key(LEGACY_CONTENT_KEY) && !point.payload.contains_key(DOCUMENT_KEY)
}

fn migrate_point(mut point: Point) -> Point {
    if let Some(content) = point.payload.remove(LEGACY_CONTENT_KEY) {
        point.payload.insert(DOCUMENT_KEY.to_string(), content);
    }
    let has_metadata = point
        .payload
        .get(METADATA_KEY)
        .is_some_and(Value::is_object);
    if !has_metadata {
        point
            .payload
            .insert(METADATA_KEY.to_string(), json!({ "timestamp": now_ts() }));
    }
    point
}

/// Rewrite `content` payloads to `document` in `collection` (default when
/// `None`). With `dry_run` nothing is written; the report shows what would
/// change.
pub async fn migrate_payloads(
    connector: &StorageConnector,
    collection: Option<&str>,
    dry_run: bool,
) -> Result<MigrationReport> {
    let points = connector.scroll_all(collection, None, true).await?;
    let mut report = MigrationReport {
        scanned: points.len(),
        ..Default::default()
    };

    let pending: Vec<Point> = points
        .into_iter()
        .filter(needs_migration)
        .map(migrate_point)
        .collect();
    report.migrated = pending.len();
    report.skipped = report.scanned - report.migrated;

    if !dry_run && !pending.is_empty() {
        connector.upsert_points(pending, collection).await?;
    }
    info!(
        collection = collection.unwrap_or(connector.default_collection()),
        scanned = report.scanned,
        migrated = report.migrated,
        dry_run,
        "payload migration finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn point(payload: Value) -> Point {
        let Value::Object(map) = payload else {
            panic!("payload must be an object")
        };
        Point::new("p", "fast-hash", vec![1.0, 0.0], map)
    }

    #[test]
    fn test_needs_migration_only_for_legacy_shape() {
        assert!(needs_migration(&point(json!({ "content": "x" }))));
        assert!(!needs_migration(&point(json!({ "document": "x" }))));
        assert!(!needs_migration(&point(
            json!({ "content": "x", "document": "y" })
        )));
        assert!(!needs_migration(&point(Value::Object(Map::new()))));
    }

    #[test]
    fn test_migrate_point_keeps_metadata() {
        let p = migrate_point(point(json!({
            "content": "hello",
            "metadata": { "category": "memory", "timestamp": 5.0 }
        })));
        assert_eq!(p.payload["document"], json!("hello"));
        assert!(!p.payload.contains_key("content"));
        assert_eq!(p.payload["metadata"]["category"], json!("memory"));
        assert_eq!(p.vector("fast-hash"), Some(&[1.0f32, 0.0][..]));
    }

    #[test]
    fn test_migrate_point_stamps_missing_metadata() {
        let p = migrate_point(point(json!({ "content": "hello" })));
        assert!(p.payload["metadata"]["timestamp"].as_f64().unwrap() > 0.0);
    }
}
