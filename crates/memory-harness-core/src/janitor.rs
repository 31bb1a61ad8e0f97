//! Memory maintenance.
//!
//! [`MemoryJanitor::run`] walks a collection through six phases, each of
//! which re-reads every entry (with vectors) before acting:
//!
//! | Phase | Action | Counter |
//! |-------|--------|---------|
//! | workspace | migrate `project` → `workspace_name`, normalize, infer | `workspace_fixed` |
//! | category | drop empty/short entries, repair unknown categories | `empty_deleted`, `short_deleted`, `category_fixed` |
//! | dedup | merge near-identical entries, newest wins | `duplicates_merged` |
//! | conflicts | same topic, written more than a day apart: newest wins | `conflicts_resolved` |
//! | staleness | delete old entries nobody reads | `stale_archived` |
//! | health | score age, recency and usage | `health_updated` |
//!
//! An error aborts the cycle. Changes made by earlier phases stay.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::connector::{MemoryRecord, StorageConnector};
use crate::embedding::cosine_similarity;
use crate::models::{normalize_workspace_name, now_ts, Category, Metadata, MetadataExt};
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};

const SECS_PER_DAY: f64 = 86_400.0;
const MIN_CONTENT_CHARS: usize = 10;

/// Janitor thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JanitorConfig {
    /// Cosine similarity at which two entries are duplicates.
    pub similarity_threshold: f32,
    /// Cosine similarity at which two entries cover the same topic.
    pub conflict_threshold: f32,
    /// Entries on the same topic closer together than this are not conflicts.
    pub conflict_min_gap_secs: f64,
    pub stale_days: u32,
    pub min_access_count: u64,
    /// Workspace ids recognised when inferring a missing workspace.
    pub known_projects: Vec<String>,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.90,
            conflict_threshold: 0.75,
            conflict_min_gap_secs: SECS_PER_DAY,
            stale_days: 365,
            min_access_count: 1,
            known_projects: Vec::new(),
        }
    }
}

/// Outcome of one maintenance cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub timestamp: String,
    pub workspace_fixed: usize,
    pub category_fixed: usize,
    pub empty_deleted: usize,
    pub short_deleted: usize,
    pub duplicates_merged: usize,
    pub conflicts_resolved: usize,
    pub stale_archived: usize,
    pub health_updated: usize,
}

impl MaintenanceReport {
    pub fn total_actions(&self) -> usize {
        self.workspace_fixed
            + self.category_fixed
            + self.empty_deleted
            + self.short_deleted
            + self.duplicates_merged
            + self.conflicts_resolved
            + self.stale_archived
            + self.health_updated
    }
}

pub struct MemoryJanitor {
    connector: Arc<StorageConnector>,
    config: JanitorConfig,
    progress: Arc<dyn ProgressReporter>,
}

impl MemoryJanitor {
    pub fn new(connector: Arc<StorageConnector>, config: JanitorConfig) -> Self {
        Self {
            connector,
            config,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &JanitorConfig {
        &self.config
    }

    /// Run every phase in order against `collection` (or the connector's
    /// default collection).
    pub async fn run(&self, collection: Option<&str>) -> Result<MaintenanceReport> {
        info!(
            collection = collection.unwrap_or(self.connector.default_collection()),
            "starting maintenance cycle"
        );
        match self.run_phases(collection).await {
            Ok(report) => {
                info!(
                    total_actions = report.total_actions(),
                    duplicates = report.duplicates_merged,
                    conflicts = report.conflicts_resolved,
                    stale = report.stale_archived,
                    "maintenance complete"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "maintenance failed");
                Err(e)
            }
        }
    }

    async fn run_phases(&self, collection: Option<&str>) -> Result<MaintenanceReport> {
        let mut report = MaintenanceReport::default();

        report.workspace_fixed = self.fix_workspaces(collection).await?;
        self.phase_done("workspace", report.workspace_fixed);

        let (fixed, empty, short) = self.fix_categories(collection).await?;
        report.category_fixed = fixed;
        report.empty_deleted = empty;
        report.short_deleted = short;
        self.phase_done("category", fixed + empty + short);

        report.duplicates_merged = self.deduplicate(collection).await?;
        self.phase_done("dedup", report.duplicates_merged);

        report.conflicts_resolved = self.resolve_conflicts(collection).await?;
        self.phase_done("conflicts", report.conflicts_resolved);

        report.stale_archived = self.archive_stale(collection).await?;
        self.phase_done("staleness", report.stale_archived);

        report.health_updated = self.update_health(collection).await?;
        self.phase_done("health", report.health_updated);

        report.timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        Ok(report)
    }

    fn phase_done(&self, phase: &str, actions: usize) {
        info!(phase, actions, "janitor phase finished");
        self.progress.report(ProgressEvent::JanitorPhase {
            phase: phase.to_string(),
            actions,
        });
    }

    async fn load(&self, collection: Option<&str>) -> Result<Vec<MemoryRecord>> {
        let records = self.connector.scroll_records(collection, None, true).await?;
        info!(count = records.len(), "loaded memories");
        Ok(records)
    }

    async fn patch(&self, id: &str, patch: Metadata, collection: Option<&str>) -> Result<()> {
        if !self.connector.update_metadata(id, &patch, collection).await? {
            warn!(id, "memory vanished before metadata update");
        }
        Ok(())
    }

    async fn remove(&self, id: &str, reason: &str, collection: Option<&str>) -> Result<()> {
        info!(id, reason, "deleting memory");
        self.connector.delete(&[id.to_string()], collection).await
    }

    async fn fix_workspaces(&self, collection: Option<&str>) -> Result<usize> {
        let mut fixed = 0;
        for record in self.load(collection).await? {
            let md = &record.entry.metadata;
            let workspace = match (md.get("workspace_name"), md.get_str("project")) {
                (None, Some(project)) => {
                    let ws = normalize_workspace_name(project);
                    info!(project, workspace = %ws, "migrating project to workspace_name");
                    Some(ws)
                }
                (Some(Value::String(current)), _) => {
                    let ws = normalize_workspace_name(current);
                    (ws != *current).then(|| {
                        info!(from = %current, to = %ws, "normalizing workspace_name");
                        ws
                    })
                }
                (None, None)
                    if matches!(md.get_str("category"), Some("decision" | "pattern")) =>
                {
                    self.infer_workspace(&record.entry.content, md)
                        .inspect(|ws| info!(workspace = %ws, "inferred workspace_name"))
                }
                _ => None,
            };
            if let Some(ws) = workspace {
                let mut patch = Metadata::new();
                patch.insert("workspace_name".into(), json!(ws));
                self.patch(&record.id, patch, collection).await?;
                fixed += 1;
            }
        }
        Ok(fixed)
    }

    /// First known project mentioned in the tags, else in the content.
    fn infer_workspace(&self, content: &str, md: &Metadata) -> Option<String> {
        let tags = match md.get("tags") {
            Some(Value::String(s)) => s.to_lowercase(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(",")
                .to_lowercase(),
            _ => String::new(),
        };
        let content = content.to_lowercase();
        let known = &self.config.known_projects;
        known
            .iter()
            .find(|p| tags.contains(p.as_str()))
            .or_else(|| known.iter().find(|p| content.contains(p.as_str())))
            .cloned()
    }

    async fn fix_categories(&self, collection: Option<&str>) -> Result<(usize, usize, usize)> {
        let (mut fixed, mut empty, mut short) = (0, 0, 0);
        for record in self.load(collection).await? {
            let trimmed = record.entry.content.trim();
            if trimmed.is_empty() {
                self.remove(&record.id, "empty content", collection).await?;
                empty += 1;
                continue;
            }
            if trimmed.chars().count() < MIN_CONTENT_CHARS {
                self.remove(&record.id, "suspiciously short content", collection)
                    .await?;
                short += 1;
                continue;
            }
            let valid = record
                .entry
                .metadata
                .get_str("category")
                .is_some_and(|c| Category::from_str(c).is_ok());
            if !valid {
                info!(
                    id = %record.id,
                    category = ?record.entry.metadata.get("category"),
                    "recategorizing as memory"
                );
                let mut patch = Metadata::new();
                patch.insert("category".into(), json!(Category::Memory.as_str()));
                self.patch(&record.id, patch, collection).await?;
                fixed += 1;
            }
        }
        Ok((fixed, empty, short))
    }

    async fn deduplicate(&self, collection: Option<&str>) -> Result<usize> {
        let mut groups: BTreeMap<(String, String), Vec<MemoryRecord>> = BTreeMap::new();
        for record in self.load(collection).await? {
            let md = &record.entry.metadata;
            let key = (
                md.get_str("category").unwrap_or("memory").to_string(),
                md.get_str("workspace_name").unwrap_or("").to_string(),
            );
            groups.entry(key).or_default().push(record);
        }

        let mut merged = 0;
        let mut deleted: HashSet<String> = HashSet::new();
        for ((category, workspace), mut records) in groups {
            if records.len() < 2 {
                continue;
            }
            info!(category = %category, workspace = %workspace, count = records.len(), "checking group for duplicates");
            for i in 0..records.len() {
                for j in (i + 1)..records.len() {
                    if deleted.contains(&records[i].id) {
                        break;
                    }
                    if deleted.contains(&records[j].id) {
                        continue;
                    }
                    let similarity = similarity(&records[i], &records[j]);
                    if similarity < self.config.similarity_threshold {
                        continue;
                    }
                    let (keep, drop) = if records[i].entry.metadata.timestamp()
                        >= records[j].entry.metadata.timestamp()
                    {
                        (i, j)
                    } else {
                        (j, i)
                    };
                    info!(
                        similarity,
                        keep = %records[keep].id,
                        drop = %records[drop].id,
                        "merging duplicate"
                    );

                    let md = &mut records[keep].entry.metadata;
                    let count = md.get_u64("merged_count").unwrap_or(0) + 1;
                    md.insert("merged_count".into(), json!(count));
                    md.insert("last_merge".into(), json!(now_ts()));
                    let mut patch = Metadata::new();
                    patch.insert("merged_count".into(), json!(count));
                    patch.insert("last_merge".into(), md["last_merge"].clone());

                    let keep_id = records[keep].id.clone();
                    let drop_id = records[drop].id.clone();
                    self.patch(&keep_id, patch, collection).await?;
                    self.remove(&drop_id, "duplicate", collection).await?;
                    deleted.insert(drop_id);
                    merged += 1;
                }
            }
        }
        Ok(merged)
    }

    async fn resolve_conflicts(&self, collection: Option<&str>) -> Result<usize> {
        let mut topics: BTreeMap<String, Vec<MemoryRecord>> = BTreeMap::new();
        for record in self.load(collection).await? {
            let md = &record.entry.metadata;
            let key = format!(
                "{}:{}",
                md.get_str("category").unwrap_or("memory"),
                md.get_str("workspace_name").unwrap_or("global")
            );
            topics.entry(key).or_default().push(record);
        }

        let mut resolved = 0;
        for (topic, records) in topics {
            for group in self.conflict_groups(&records) {
                // Stable sort: equal timestamps keep scan order.
                let mut ordered = group;
                ordered.sort_by(|&a, &b| {
                    let (ta, tb) = (
                        records[a].entry.metadata.timestamp(),
                        records[b].entry.metadata.timestamp(),
                    );
                    tb.partial_cmp(&ta).unwrap_or(std::cmp::Ordering::Equal)
                });
                info!(
                    topic = %topic,
                    keep = %records[ordered[0]].id,
                    superseded = ordered.len() - 1,
                    "conflict detected, keeping newest"
                );
                for &older in &ordered[1..] {
                    self.remove(&records[older].id, "superseded_by_newer", collection)
                        .await?;
                    resolved += 1;
                }
            }
        }
        Ok(resolved)
    }

    /// Index groups of same-topic entries written far enough apart to be
    /// revisions of each other. Each entry belongs to at most one group.
    fn conflict_groups(&self, records: &[MemoryRecord]) -> Vec<Vec<usize>> {
        let mut assigned = vec![false; records.len()];
        let mut groups = Vec::new();
        for i in 0..records.len() {
            if assigned[i] {
                continue;
            }
            let ts_i = records[i].entry.metadata.timestamp();
            let mut group = vec![i];
            for j in (i + 1)..records.len() {
                if assigned[j] {
                    continue;
                }
                let gap = (ts_i - records[j].entry.metadata.timestamp()).abs();
                if similarity(&records[i], &records[j]) >= self.config.conflict_threshold
                    && gap > self.config.conflict_min_gap_secs
                {
                    group.push(j);
                }
            }
            if group.len() > 1 {
                for &k in &group {
                    assigned[k] = true;
                }
                groups.push(group);
            }
        }
        groups
    }

    async fn archive_stale(&self, collection: Option<&str>) -> Result<usize> {
        let cutoff = now_ts() - f64::from(self.config.stale_days) * SECS_PER_DAY;
        let mut archived = 0;
        for record in self.load(collection).await? {
            let md = &record.entry.metadata;
            let reference = if md.contains_key("last_accessed") {
                md.get_f64("last_accessed").unwrap_or(0.0)
            } else {
                md.timestamp()
            };
            let access_count = md.get_u64("access_count").unwrap_or(0);
            if reference < cutoff && access_count < self.config.min_access_count {
                self.remove(&record.id, "stale", collection).await?;
                archived += 1;
            }
        }
        Ok(archived)
    }

    async fn update_health(&self, collection: Option<&str>) -> Result<usize> {
        let mut updated = 0;
        for record in self.load(collection).await? {
            let now = now_ts();
            let score = health_score(&record.entry.metadata, now);
            let mut patch = Metadata::new();
            patch.insert("health_score".into(), json!(score));
            patch.insert("health_updated_at".into(), json!(now));
            self.patch(&record.id, patch, collection).await?;
            updated += 1;
        }
        Ok(updated)
    }
}

fn similarity(a: &MemoryRecord, b: &MemoryRecord) -> f32 {
    match (&a.vector, &b.vector) {
        (Some(va), Some(vb)) => cosine_similarity(va, vb),
        _ => {
            warn!(a = %a.id, b = %b.id, "missing vector for similarity");
            0.0
        }
    }
}

/// Health in `[0, 100]`, rounded to two decimals.
///
/// Weighted 30% age (halves over a year), 40% recency of access (gone after
/// 180 days) and 30% usage (ten points per access, capped).
pub fn health_score(md: &Metadata, now: f64) -> f64 {
    let created = md.get_f64("timestamp").unwrap_or(now);
    let last_accessed = md.get_f64("last_accessed").unwrap_or(created);
    let access_count = md.get_u64("access_count").unwrap_or(0) as f64;

    let age_days = (now - created) / SECS_PER_DAY;
    let age = (100.0 - age_days / 365.0 * 50.0).max(0.0);
    let recency_days = (now - last_accessed) / SECS_PER_DAY;
    let recency = (100.0 - recency_days / 180.0 * 100.0).max(0.0);
    let usage = (access_count * 10.0).min(100.0);

    let health = 0.3 * age + 0.4 * recency + 0.3 * usage;
    (health * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::models::Entry;
    use crate::store::memory::InMemoryVectorStore;
    use crate::store::Point;
    use std::sync::Mutex;

    const DAY: f64 = SECS_PER_DAY;

    fn connector() -> Arc<StorageConnector> {
        Arc::new(StorageConnector::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(HashEmbedder::new(4)),
            "memory",
        ))
    }

    fn md(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => panic!("metadata must be an object"),
        }
    }

    async fn put(c: &StorageConnector, content: &str, metadata: Value) -> String {
        c.store(&Entry::new(content, md(metadata)), None).await.unwrap()
    }

    /// Store with an explicit vector so similarity is exact.
    async fn put_vec(c: &StorageConnector, id: &str, content: &str, vector: Vec<f32>, metadata: Value) {
        c.ensure_collection(None).await.unwrap();
        let entry = Entry::new(content, md(metadata));
        let point = Point::new(id, &c.embedder().vector_name(), vector, entry.to_payload());
        c.upsert_points(vec![point], None).await.unwrap();
    }

    async fn get(c: &StorageConnector, id: &str) -> Option<Metadata> {
        c.scroll_records(None, None, false)
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.id == id)
            .map(|r| r.entry.metadata)
    }

    fn janitor(c: &Arc<StorageConnector>) -> MemoryJanitor {
        MemoryJanitor::new(c.clone(), JanitorConfig::default())
    }

    #[test]
    fn test_health_score_fresh_unused() {
        let now = 1_000_000_000.0;
        let m = md(json!({"timestamp": now}));
        // 0.3·100 + 0.4·100 + 0
        assert_eq!(health_score(&m, now), 70.0);
    }

    #[test]
    fn test_health_score_old_and_used() {
        let now = 1_000_000_000.0;
        let m = md(json!({
            "timestamp": now - 365.0 * DAY,
            "last_accessed": now - 90.0 * DAY,
            "access_count": 20,
        }));
        // age 50, recency 50, usage 100
        assert_eq!(health_score(&m, now), 65.0);
    }

    #[test]
    fn test_report_total() {
        let r = MaintenanceReport {
            duplicates_merged: 2,
            stale_archived: 1,
            health_updated: 4,
            ..Default::default()
        };
        assert_eq!(r.total_actions(), 7);
    }

    #[tokio::test]
    async fn test_empty_collection() {
        let c = connector();
        let report = janitor(&c).run(None).await.unwrap();
        assert_eq!(report.total_actions(), 0);
        assert!(!report.timestamp.is_empty());
    }

    #[tokio::test]
    async fn test_workspace_migration_and_normalization() {
        let c = connector();
        let now = now_ts();
        let a = put(&c, "Decision: use tokio everywhere", json!({"category": "decision", "project": "My Project", "timestamp": now, "access_count": 1})).await;
        let b = put(&c, "Pattern: builder for configs", json!({"category": "pattern", "workspace_name": "Other_WS!!", "timestamp": now, "access_count": 1})).await;
        let d = put(&c, "Decision: adopt the acme-api layout", json!({"category": "decision", "tags": "infra", "timestamp": now, "access_count": 1})).await;

        let config = JanitorConfig {
            known_projects: vec!["acme-api".into()],
            ..JanitorConfig::default()
        };
        let report = MemoryJanitor::new(c.clone(), config).run(None).await.unwrap();
        assert_eq!(report.workspace_fixed, 3);
        assert_eq!(get(&c, &a).await.unwrap().get_str("workspace_name"), Some("my-project"));
        assert_eq!(get(&c, &b).await.unwrap().get_str("workspace_name"), Some("other_ws"));
        assert_eq!(get(&c, &d).await.unwrap().get_str("workspace_name"), Some("acme-api"));
    }

    #[tokio::test]
    async fn test_category_hygiene() {
        let c = connector();
        let now = now_ts();
        put(&c, "   ", json!({"category": "memory", "timestamp": now})).await;
        put(&c, "too short", json!({"category": "memory", "timestamp": now})).await;
        let bad = put(&c, "a perfectly reasonable note", json!({"category": "thoughts", "timestamp": now, "access_count": 1})).await;

        let report = janitor(&c).run(None).await.unwrap();
        assert_eq!(report.empty_deleted, 1);
        assert_eq!(report.short_deleted, 1);
        assert_eq!(report.category_fixed, 1);
        assert_eq!(get(&c, &bad).await.unwrap().get_str("category"), Some("memory"));
        assert_eq!(c.count(None, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dedup_keeps_newer() {
        let c = connector();
        let now = now_ts();
        let v = vec![1.0, 0.0, 0.0, 0.0];
        put_vec(&c, "00000000-0000-0000-0000-000000000001", "Decision: use PostgreSQL", v.clone(), json!({"category": "decision", "timestamp": now - 100.0, "access_count": 1})).await;
        put_vec(&c, "00000000-0000-0000-0000-000000000002", "Decision: use PostgreSQL!", v, json!({"category": "decision", "timestamp": now, "access_count": 1})).await;

        let report = janitor(&c).run(None).await.unwrap();
        assert_eq!(report.duplicates_merged, 1);
        assert!(get(&c, "00000000-0000-0000-0000-000000000001").await.is_none());
        let kept = get(&c, "00000000-0000-0000-0000-000000000002").await.unwrap();
        assert_eq!(kept.get_u64("merged_count"), Some(1));
        assert!(kept.get_f64("last_merge").is_some());
    }

    #[tokio::test]
    async fn test_conflicts_keep_newest_of_three() {
        let c = connector();
        let now = now_ts();
        // Similar enough to share a topic, not enough to be duplicates.
        put_vec(&c, "00000000-0000-0000-0000-00000000000a", "Cache TTL is 60 seconds", vec![1.0, 0.5, 0.0, 0.0], json!({"category": "memory", "timestamp": now - 10.0 * DAY, "access_count": 1})).await;
        put_vec(&c, "00000000-0000-0000-0000-00000000000b", "Cache TTL is 120 seconds", vec![1.0, 0.0, 0.5, 0.0], json!({"category": "memory", "timestamp": now - 5.0 * DAY, "access_count": 1})).await;
        put_vec(&c, "00000000-0000-0000-0000-00000000000c", "Cache TTL is 300 seconds", vec![1.0, 0.0, 0.0, 0.5], json!({"category": "memory", "timestamp": now, "access_count": 1})).await;

        let report = janitor(&c).run(None).await.unwrap();
        assert_eq!(report.duplicates_merged, 0);
        assert_eq!(report.conflicts_resolved, 2);
        assert!(get(&c, "00000000-0000-0000-0000-00000000000c").await.is_some());
        assert_eq!(c.count(None, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_conflicts_need_time_gap() {
        let c = connector();
        let now = now_ts();
        put_vec(&c, "00000000-0000-0000-0000-0000000000a1", "Queue depth alert at 100", vec![1.0, 0.5, 0.0, 0.0], json!({"category": "memory", "timestamp": now - 3600.0, "access_count": 1})).await;
        put_vec(&c, "00000000-0000-0000-0000-0000000000a2", "Queue depth alert at 500", vec![1.0, 0.0, 0.5, 0.0], json!({"category": "memory", "timestamp": now, "access_count": 1})).await;

        let report = janitor(&c).run(None).await.unwrap();
        assert_eq!(report.conflicts_resolved, 0);
        assert_eq!(c.count(None, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stale_removed_unless_used() {
        let c = connector();
        let old = now_ts() - 400.0 * DAY;
        let unused = put(&c, "ancient note about the build farm", json!({"category": "memory", "timestamp": old})).await;
        let used = put(&c, "ancient note about release trains", json!({"category": "lesson", "timestamp": old, "access_count": 3})).await;
        let accessed = put(&c, "ancient note recently looked at", json!({"category": "error", "timestamp": old, "last_accessed": now_ts()})).await;

        let report = janitor(&c).run(None).await.unwrap();
        assert_eq!(report.stale_archived, 1);
        assert!(get(&c, &unused).await.is_none());
        assert!(get(&c, &accessed).await.is_some());
        let kept = get(&c, &used).await.unwrap();
        assert!(kept.get_f64("health_score").is_some());
        assert!(kept.get_f64("health_updated_at").is_some());
        assert_eq!(report.health_updated, 2);
    }

    struct Recorder(Mutex<Vec<String>>);

    impl ProgressReporter for Recorder {
        fn report(&self, event: ProgressEvent) {
            if let ProgressEvent::JanitorPhase { phase, .. } = event {
                self.0.lock().unwrap().push(phase);
            }
        }
    }

    #[tokio::test]
    async fn test_phase_events_in_order() {
        let c = connector();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        janitor(&c)
            .with_progress(recorder.clone())
            .run(None)
            .await
            .unwrap();
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["workspace", "category", "dedup", "conflicts", "staleness", "health"]
        );
    }
}
