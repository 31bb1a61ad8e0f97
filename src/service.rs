//! Memory operations behind the tool surface.
//!
//! [`MemoryService`] ties the core components together: the storage
//! connector, the code chunker, the query enhancer, the filter builder,
//! and one change tracker and relationship map per workspace. Every operation returns the text
//! shown to the caller; the tool layer turns `Err` into `"Error: …"`.
//!
//! | Operation | Writes |
//! |-----------|--------|
//! | [`store`](MemoryService::store) | yes |
//! | [`search`](MemoryService::search) | no |
//! | [`index_codebase`](MemoryService::index_codebase) | yes |
//! | [`update_files`](MemoryService::update_files) | yes |
//! | [`index_status`](MemoryService::index_status) | no |
//! | [`list_workspaces`](MemoryService::list_workspaces) | no |
//! | [`remember_decision`](MemoryService::remember_decision) | yes |
//! | [`remember_pattern`](MemoryService::remember_pattern) | yes |
//! | [`find_similar_code`](MemoryService::find_similar_code) | no |
//! | [`search_by_time`](MemoryService::search_by_time) | no |
//! | [`search_patterns`](MemoryService::search_patterns) | no |
//! | [`get_smart_context`](MemoryService::get_smart_context) | no |
//! | [`find_usage`](MemoryService::find_usage) | no |
//! | [`index_file`](MemoryService::index_file) | yes |
//! | [`get_project_summary`](MemoryService::get_project_summary) | no |
//! | [`get_component_list`](MemoryService::get_component_list) | no |
//! | [`clear_workspace`](MemoryService::clear_workspace) | yes |
//! | [`get_current_context`](MemoryService::get_current_context) | no |
//! | [`run_janitor`](MemoryService::run_janitor) | yes |

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use memory_harness_core::chunk::{detect_language, CodeChunker};
use memory_harness_core::connector::StorageConnector;
use memory_harness_core::filter::{
    default_filterable_fields, merge_filters, Clause, FieldCondition, Filter, FilterBuilder, Range,
    SearchFilters,
};
use memory_harness_core::janitor::{MaintenanceReport, MemoryJanitor};
use memory_harness_core::models::{
    format_ts, normalize_workspace_name, now_ts, parse_iso_timestamp, parse_tags, Category,
    ChunkType, CodeChunk, Entry, Metadata, MetadataExt, NewEntry, ScoredEntry,
};
use memory_harness_core::progress::{NoProgress, ProgressEvent, ProgressReporter};
use memory_harness_core::query::{QueryEnhancer, SuggestedFilters};
use memory_harness_core::rerank::TermOverlapReranker;
use memory_harness_core::store::memory::InMemoryVectorStore;
use memory_harness_core::store::VectorStore;
use memory_harness_core::tracker::FileHashTracker;
use memory_harness_core::usage::{extract_relations, RelationshipMap, USAGE_CHUNK_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::local_store::LocalStore;
use crate::qdrant::QdrantStore;

/// Score multiplier added per matched query suggestion.
const SUGGESTION_BOOST: f32 = 0.05;
/// Scroll cap used for workspace statistics.
const STATS_SCAN_LIMIT: usize = 1000;
const PATTERN_SEARCH_LIMIT: usize = 20;
const SIMILAR_CODE_MAX_LINES: usize = 15;
const STALE_INDEX_SECS: f64 = 3600.0;
const USAGE_SEARCH_LIMIT: usize = 50;
const COMPONENT_LIST_LIMIT: usize = 50;

// ═══════════════════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreRequest {
    pub information: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    /// Extra metadata: an object, or a JSON string holding one.
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub workspace_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub until: Option<String>,
    /// Native filter ANDed with the generated conditions.
    #[serde(default)]
    pub filter: Option<Filter>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionRequest {
    pub decision: String,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub alternatives: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatternRequest {
    pub pattern: String,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub use_case: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeSearchRequest {
    pub query: String,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub until: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub workspace_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatternSearchRequest {
    pub query: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmartContextRequest {
    pub topic: String,
    #[serde(default)]
    pub workspace_name: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_true")]
    pub include_code: bool,
}

fn default_max_results() -> usize {
    15
}

fn default_true() -> bool {
    true
}

// ═══════════════════════════════════════════════════════════════════════
// Service
// ═══════════════════════════════════════════════════════════════════════

enum FileAnalysis {
    Unchanged,
    Changed(Vec<CodeChunk>),
}

pub struct MemoryService {
    connector: Arc<StorageConnector>,
    chunker: CodeChunker,
    enhancer: QueryEnhancer,
    filters: FilterBuilder,
    trackers: Mutex<HashMap<String, FileHashTracker>>,
    relations: Mutex<HashMap<String, RelationshipMap>>,
    config: Config,
    progress: Arc<dyn ProgressReporter>,
}

impl MemoryService {
    /// Wrap an existing connector.
    pub fn new(connector: Arc<StorageConnector>, config: Config) -> Result<Self> {
        Ok(Self {
            connector,
            chunker: CodeChunker::new(config.indexing.max_chunk_size),
            enhancer: QueryEnhancer::new()?,
            filters: FilterBuilder::new(default_filterable_fields())?,
            trackers: Mutex::new(HashMap::new()),
            relations: Mutex::new(HashMap::new()),
            config,
            progress: Arc::new(NoProgress),
        })
    }

    /// Build the store, embedder and reranker named by `config`.
    ///
    /// `local_path` selects the snapshot store, `url` selects Qdrant, and
    /// neither keeps everything in memory for the life of the process.
    pub fn from_config(config: Config) -> Result<Self> {
        let store: Arc<dyn VectorStore> = if let Some(path) = &config.store.local_path {
            Arc::new(LocalStore::open(path)?)
        } else if let Some(url) = &config.store.url {
            Arc::new(QdrantStore::new(url, config.store.api_key.clone())?)
        } else {
            warn!("no [store] url or local_path configured; memories will not persist");
            Arc::new(InMemoryVectorStore::new())
        };
        let embedder = create_embedder(&config.embedding)?;
        let filters = FilterBuilder::new(default_filterable_fields())?;

        let mut connector =
            StorageConnector::new(store, embedder, config.store.collection_name.clone())
                .with_indexes(filters.build_indexes());
        if config.reranker.enabled {
            connector = connector.with_reranker(Arc::new(TermOverlapReranker::new(true)));
        }
        if config.search.sparse_weight > 0.0 {
            connector = connector.with_sparse_weight(config.search.sparse_weight);
        }
        Self::new(Arc::new(connector), config)
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn connector(&self) -> &Arc<StorageConnector> {
        &self.connector
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn read_only(&self) -> bool {
        self.config.store.read_only
    }

    fn with_tracker<T>(&self, workspace: &str, f: impl FnOnce(&mut FileHashTracker) -> T) -> T {
        let mut trackers = self
            .trackers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(trackers.entry(workspace.to_string()).or_default())
    }

    fn with_relations<T>(&self, workspace: &str, f: impl FnOnce(&mut RelationshipMap) -> T) -> T {
        let mut maps = self
            .relations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(maps.entry(workspace.to_string()).or_default())
    }

    // ── store / remember ────────────────────────────────────────────────

    pub async fn store(&self, req: StoreRequest) -> Result<String> {
        let category: Category = req.category.as_deref().unwrap_or("memory").parse()?;
        let extra = match req.metadata {
            Some(Value::Object(map)) => map,
            Some(Value::String(s)) => serde_json::from_str::<Metadata>(&s)
                .context("metadata must be a JSON object")?,
            Some(_) => bail!("metadata must be a JSON object"),
            _ => Metadata::new(),
        };

        let entry = NewEntry::new(req.information.clone(), category)
            .tags(req.tags.clone())
            .language(req.language)
            .project(req.project)
            .extra(extra)
            .into_entry();
        let id = self.connector.store(&entry, None).await?;
        info!(id = %id, category = %category, "stored entry");

        let mut result = format!("Stored {}: {}", category, truncate(&req.information, 100));
        if let Some(tags) = req.tags.filter(|t| !t.trim().is_empty()) {
            result.push_str(&format!(" (tags: {})", tags));
        }
        Ok(result)
    }

    pub async fn remember_decision(&self, req: DecisionRequest) -> Result<String> {
        let mut lines = vec![format!("Decision: {}", req.decision)];
        if let Some(r) = &req.rationale {
            lines.push(format!("Rationale: {}", r));
        }
        if let Some(a) = &req.alternatives {
            lines.push(format!("Alternatives Considered: {}", a));
        }
        if let Some(t) = &req.tags {
            lines.push(format!("Tags: {}", t));
        }

        let mut extra = Metadata::new();
        extra.insert("decision".into(), json!(req.decision));
        if let Some(r) = &req.rationale {
            extra.insert("rationale".into(), json!(r));
        }
        if let Some(a) = &req.alternatives {
            extra.insert("alternatives".into(), json!(a));
        }

        let entry = NewEntry::new(lines.join("\n"), Category::Decision)
            .tags(req.tags.clone())
            .project(req.project)
            .workspace(Some("global".to_string()))
            .extra(extra)
            .into_entry();
        self.connector.store(&entry, None).await?;

        let mut result = format!("Remembered decision: {}", req.decision);
        if let Some(tags) = req.tags {
            result.push_str(&format!(" (tags: {})", tags));
        }
        Ok(result)
    }

    pub async fn remember_pattern(&self, req: PatternRequest) -> Result<String> {
        let mut lines = vec![format!("Pattern: {}", req.pattern)];
        if let Some(u) = &req.use_case {
            lines.push(format!("Use Case: {}", u));
        }
        if let Some(e) = &req.example {
            lines.push(format!("Example:\n{}", e));
        }
        if let Some(t) = &req.tags {
            lines.push(format!("Tags: {}", t));
        }

        let mut extra = Metadata::new();
        extra.insert("pattern".into(), json!(req.pattern));
        if let Some(e) = &req.example {
            extra.insert("example".into(), json!(e));
        }
        if let Some(u) = &req.use_case {
            extra.insert("use_case".into(), json!(u));
        }

        let entry = NewEntry::new(lines.join("\n"), Category::Pattern)
            .tags(req.tags.clone())
            .language(req.language.clone())
            .project(req.project)
            .workspace(Some("global".to_string()))
            .extra(extra)
            .into_entry();
        self.connector.store(&entry, None).await?;

        let mut result = format!("Remembered pattern: {}", req.pattern);
        if let Some(tags) = req.tags {
            result.push_str(&format!(" (tags: {})", tags));
        }
        if let Some(language) = req.language {
            result.push_str(&format!(" [{}]", language));
        }
        Ok(result)
    }

    // ── search ──────────────────────────────────────────────────────────

    pub async fn search(&self, req: SearchRequest) -> Result<String> {
        let category = req
            .category
            .as_deref()
            .map(str::parse::<Category>)
            .transpose()?;
        let workspace = req.workspace_name.as_deref().map(normalize_workspace_name);

        let mut filter = self.filters.build(
            &SearchFilters {
                category: category.map(|c| c.as_str().to_string()),
                workspace: workspace
                    .clone()
                    .filter(|_| category == Some(Category::Codebase)),
                language: req.language.clone(),
                ..Default::default()
            }
            .into_values(),
        )?;
        if let Some(tags) = &req.tags {
            for tag in parse_tags(tags).into_iter().filter(|t| !t.is_empty()) {
                filter = filter.with_must(FieldCondition::text("metadata.tags", tag));
            }
        }
        filter = add_time_range(filter, req.since.as_deref(), req.until.as_deref());
        let filter = merge_filters(Some(filter), req.filter).filter(|f| !f.is_empty());

        let enhanced = self
            .enhancer
            .enhance(&req.query, self.config.search.query_expansion);
        let mut results = self
            .connector
            .search(
                &enhanced,
                None,
                self.config.store.search_limit,
                filter.as_ref(),
            )
            .await?;

        if let (Some(ws), None) = (&workspace, category) {
            results.retain(|r| in_workspace_or_global(&r.entry, ws));
        }
        boost_suggested(&mut results, &self.enhancer.extract_filters(&req.query));

        if results.is_empty() {
            let mut desc = Vec::new();
            if let Some(c) = &req.category {
                desc.push(format!("category={}", c));
            }
            if let Some(w) = &req.workspace_name {
                desc.push(format!("workspace={}", w));
            }
            let suffix = if desc.is_empty() {
                String::new()
            } else {
                format!(" ({})", desc.join(", "))
            };
            return Ok(format!("No results found for '{}'{}", req.query, suffix));
        }

        let groups = Grouped::from_entries(results.iter().map(|r| &r.entry));
        let mut out = vec![format!("Found {} results for '{}':\n", results.len(), req.query)];
        if !groups.decisions.is_empty() {
            out.push(format!("\n📋 Decisions ({}):", groups.decisions.len()));
            for e in groups.decisions.iter().take(5) {
                out.push(format!("  • {}", labelled(e, "decision")));
            }
        }
        if !groups.patterns.is_empty() {
            out.push(format!("\n🎨 Patterns ({}):", groups.patterns.len()));
            for e in groups.patterns.iter().take(5) {
                out.push(format!("  • {}", labelled(e, "pattern")));
            }
        }
        if !groups.code.is_empty() {
            out.push(format!("\n💻 Code ({}):", groups.code.len()));
            for e in groups.code.iter().take(10) {
                out.push(format!("  • {}", code_ref(e, false)));
            }
        }
        if !groups.other.is_empty() {
            out.push(format!("\n📝 Other ({}):", groups.other.len()));
            for e in groups.other.iter().take(5) {
                out.push(format!("  • {}...", truncate(&e.content, 150)));
            }
        }
        Ok(out.join("\n"))
    }

    pub async fn search_by_time(&self, req: TimeSearchRequest) -> Result<String> {
        let category = req
            .category
            .as_deref()
            .map(str::parse::<Category>)
            .transpose()?;
        let workspace = req.workspace_name.as_deref().map(normalize_workspace_name);

        let mut filter = add_time_range(Filter::new(), req.since.as_deref(), req.until.as_deref());
        if let Some(c) = category {
            filter = filter.with_must(FieldCondition::value("metadata.category", c.as_str()));
            if let (Category::Codebase, Some(ws)) = (c, &workspace) {
                filter = filter.with_must(FieldCondition::value("metadata.workspace", ws.as_str()));
            }
        }
        let filter = Some(filter).filter(|f| !f.is_empty());

        let mut results = self
            .connector
            .search(
                &req.query,
                None,
                self.config.store.search_limit,
                filter.as_ref(),
            )
            .await?;
        if let (Some(ws), None) = (&workspace, category) {
            results.retain(|r| in_workspace_or_global(&r.entry, ws));
        }

        if results.is_empty() {
            let time_desc = match (&req.since, &req.until) {
                (Some(s), Some(u)) => format!(" between {} and {}", s, u),
                (Some(s), None) => format!(" since {}", s),
                (None, Some(u)) => format!(" until {}", u),
                (None, None) => String::new(),
            };
            return Ok(format!("No results found for '{}'{}", req.query, time_desc));
        }

        let mut header = format!("Results for '{}'", req.query);
        let mut desc = Vec::new();
        if let Some(s) = &req.since {
            desc.push(format!("since {}", s));
        }
        if let Some(u) = &req.until {
            desc.push(format!("until {}", u));
        }
        if let Some(c) = &req.category {
            desc.push(format!("category={}", c));
        }
        if !desc.is_empty() {
            header.push_str(&format!(" ({})", desc.join(", ")));
        }

        let mut out = vec![header];
        for r in &results {
            let when = r
                .entry
                .metadata
                .get_f64("timestamp")
                .map(format_ts)
                .unwrap_or_else(|| "unknown".to_string());
            out.push(format!("[{}] {}", when, format_entry(&r.entry)));
        }
        Ok(out.join("\n"))
    }

    pub async fn search_patterns(&self, req: PatternSearchRequest) -> Result<String> {
        let mut filter =
            Filter::new().with_must(FieldCondition::value("metadata.category", "pattern"));
        if let Some(lang) = &req.language {
            filter = filter.with_must(FieldCondition::value("metadata.language", lang.as_str()));
        }
        if let Some(tags) = &req.tags {
            for tag in parse_tags(tags).into_iter().filter(|t| !t.is_empty()) {
                filter = filter.with_must(FieldCondition::text("metadata.tags", tag));
            }
        }
        if let Some(project) = &req.project {
            filter = filter.with_must(FieldCondition::value("metadata.project", project.as_str()));
        }

        let results = self
            .connector
            .search(&req.query, None, PATTERN_SEARCH_LIMIT, Some(&filter))
            .await?;

        if results.is_empty() {
            let mut desc = Vec::new();
            if let Some(l) = &req.language {
                desc.push(format!("language={}", l));
            }
            if let Some(t) = &req.tags {
                desc.push(format!("tags={}", t));
            }
            if let Some(p) = &req.project {
                desc.push(format!("project={}", p));
            }
            let suffix = if desc.is_empty() {
                String::new()
            } else {
                format!(" ({})", desc.join(", "))
            };
            return Ok(format!("No patterns found for '{}'{}", req.query, suffix));
        }

        let mut out = vec![format!("Found {} patterns for '{}':\n", results.len(), req.query)];
        for r in &results {
            let md = &r.entry.metadata;
            let mut line = format!("\n• {}", md.get_str("pattern").unwrap_or("Unknown"));
            let mut details = Vec::new();
            if let Some(l) = md.get_str("language").filter(|s| !s.is_empty()) {
                details.push(format!("[{}]", l));
            }
            if let Some(t) = md.get_str("tags").filter(|s| !s.is_empty()) {
                details.push(format!("tags: {}", t));
            }
            if let Some(p) = md.get_str("project").filter(|s| !s.is_empty()) {
                details.push(format!("project: {}", p));
            }
            if !details.is_empty() {
                line.push_str(&format!(" ({})", details.join(", ")));
            }
            out.push(line);

            if let Some(u) = md.get_str("use_case").filter(|s| !s.is_empty()) {
                out.push(format!("  Use Case: {}", u));
            }
            if let Some(example) = md.get_str("example").filter(|s| !s.is_empty()) {
                let mut lines = example.split('\n').take(3);
                if let Some(first) = lines.next() {
                    out.push(format!("  Example: {}", first));
                }
                for l in lines {
                    out.push(format!("           {}", l));
                }
            }
            out.push(String::new());
        }
        Ok(out.join("\n"))
    }

    pub async fn get_smart_context(&self, req: SmartContextRequest) -> Result<String> {
        let mut code_filter = Filter::new()
            .with_must(FieldCondition::value("metadata.category", "codebase"))
            .with_must_not(FieldCondition::value("metadata.chunk_type", USAGE_CHUNK_TYPE));
        if let Some(ws) = req.workspace_name.as_deref().map(normalize_workspace_name) {
            code_filter = code_filter.with_must(FieldCondition::value("metadata.workspace", ws));
        }
        let code = if req.include_code {
            self.connector
                .search(&req.topic, None, req.max_results, Some(&code_filter))
                .await?
        } else {
            Vec::new()
        };

        let knowledge_filter = Filter::should([
            Clause::from(FieldCondition::value("metadata.category", "decision")),
            Clause::from(FieldCondition::value("metadata.category", "pattern")),
        ]);
        let knowledge = self
            .connector
            .search(&req.topic, None, req.max_results, Some(&knowledge_filter))
            .await?;

        if code.is_empty() && knowledge.is_empty() {
            return Ok(format!("No context found for: {}", req.topic));
        }

        let groups = Grouped::from_entries(knowledge.iter().map(|r| &r.entry));
        let mut out = vec![format!("Smart Context for: {}\n", req.topic)];
        if !groups.decisions.is_empty() {
            out.push(format!("\n📋 Related Decisions ({}):", groups.decisions.len()));
            for e in groups.decisions.iter().take(5) {
                out.push(match e.metadata.get_str("decision").filter(|s| !s.is_empty()) {
                    Some(d) => format!("- {}", d),
                    None => format!("- {}...", truncate(&e.content, 200)),
                });
            }
        }
        if !groups.patterns.is_empty() {
            out.push(format!("\n🎨 Related Patterns ({}):", groups.patterns.len()));
            for e in groups.patterns.iter().take(5) {
                out.push(match e.metadata.get_str("pattern").filter(|s| !s.is_empty()) {
                    Some(p) => format!("- {}", p),
                    None => format!("- {}...", truncate(&e.content, 200)),
                });
            }
        }
        if !code.is_empty() {
            out.push(format!("\n💻 Related Code ({}):", code.len()));
            for r in code.iter().take(10) {
                out.push(format!("- {}", code_ref(&r.entry, true)));
                if r.entry.metadata.get_str("name").is_some() {
                    let preview: Vec<&str> = r
                        .entry
                        .content
                        .lines()
                        .filter(|l| !l.trim().is_empty() && !l.starts_with('#'))
                        .take(3)
                        .collect();
                    if !preview.is_empty() {
                        out.push(format!("  ```\n  {}\n  ...```", preview.join("\n")));
                    }
                }
            }
        }
        if !groups.other.is_empty() {
            out.push(format!("\n📝 Other Context ({}):", groups.other.len()));
            for e in groups.other.iter().take(5) {
                out.push(format!("- {}...", truncate(&e.content, 200)));
            }
        }
        Ok(out.join("\n"))
    }

    pub async fn find_similar_code(&self, code_snippet: &str, workspace_name: &str) -> Result<String> {
        let workspace = require_workspace(workspace_name)?;
        let filter = code_chunk_filter(&workspace);
        let results = self
            .connector
            .search(
                code_snippet,
                None,
                self.config.store.search_limit,
                Some(&filter),
            )
            .await?;

        if results.is_empty() {
            let stats = self.with_tracker(&workspace, |t| t.stats());
            let guidance = if stats.total_files == 0 {
                Some("This workspace has 0 files indexed. Run index_codebase first to enable code search.")
            } else if stats.newest_check.map_or(true, |t| {
                (chrono::Utc::now() - t).num_seconds() as f64 > STALE_INDEX_SECS
            }) {
                Some("Index may be stale. Consider running update_files to refresh.")
            } else {
                None
            };
            let result = format!(
                "No similar code found for: {}... (workspace: {})",
                truncate(code_snippet, 50),
                workspace
            );
            return Ok(with_guidance(result, guidance));
        }

        let mut out = vec![format!(
            "Found {} similar code patterns in workspace '{}':\n",
            results.len(),
            workspace
        )];
        for r in &results {
            let md = &r.entry.metadata;
            let mut header = format!("\n{}", md.get_str("file_path").unwrap_or("unknown"));
            if let Some(line) = md.get_u64("start_line").filter(|l| *l > 0) {
                header.push_str(&format!(":{}", line));
            }
            if let Some(name) = md.get_str("name").filter(|s| !s.is_empty()) {
                let chunk_type = md.get_str("chunk_type").unwrap_or("code");
                header.push_str(&format!(" - {}: {}", chunk_type, name));
            }
            out.push(header);

            let lines: Vec<&str> = r.entry.content.split('\n').collect();
            if lines.len() > SIMILAR_CODE_MAX_LINES {
                out.push(lines[..SIMILAR_CODE_MAX_LINES].join("\n"));
                out.push(format!(
                    "... ({} more lines)",
                    lines.len() - SIMILAR_CODE_MAX_LINES
                ));
            } else {
                out.push(r.entry.content.clone());
            }
            out.push(String::new());
        }
        Ok(out.join("\n"))
    }

    /// Where a class or function is used across the indexed workspace.
    pub async fn find_usage(&self, component_name: &str, workspace_name: &str) -> Result<String> {
        let workspace = require_workspace(workspace_name)?;
        let name = component_name.trim();
        if name.is_empty() {
            bail!("component_name is empty. Provide a class or function name.");
        }
        let filter = Filter::new()
            .with_must(FieldCondition::value("metadata.chunk_type", USAGE_CHUNK_TYPE))
            .with_must(FieldCondition::value("metadata.target_name", name))
            .with_must(FieldCondition::value("metadata.workspace", workspace.as_str()));
        let mut results = self
            .connector
            .search(
                &format!("usage of {}", name),
                None,
                USAGE_SEARCH_LIMIT,
                Some(&filter),
            )
            .await?;
        info!(component = name, workspace = %workspace, found = results.len(), "usage lookup");

        if results.is_empty() {
            let guidance = if self.with_tracker(&workspace, |t| t.stats()).total_files == 0 {
                "This workspace has 0 files indexed. Run index_codebase first to enable usage tracking."
                    .to_string()
            } else {
                format!(
                    "'{}' may not exist or may not be imported anywhere. Try: 1) Check spelling, 2) Search for the definition with find_similar_code, 3) Re-index with index_codebase.",
                    name
                )
            };
            let result = format!("No usage found for {} (workspace: {})", name, workspace);
            return Ok(with_guidance(result, Some(&guidance)));
        }

        results.sort_by(|a, b| {
            let key = |r: &ScoredEntry| {
                (
                    r.entry.metadata.get_str("file_path").unwrap_or("").to_string(),
                    r.entry.metadata.get_u64("line_number").unwrap_or(0),
                )
            };
            key(a).cmp(&key(b))
        });
        let mut out = vec![format!(
            "Found {} usage examples for '{}' in workspace '{}':\n",
            results.len(),
            name,
            workspace
        )];
        for r in &results {
            let md = &r.entry.metadata;
            let line = md
                .get_u64("line_number")
                .map(|l| l.to_string())
                .unwrap_or_else(|| "?".to_string());
            out.push(format!(
                "- {}:{} ({})",
                md.get_str("file_path").unwrap_or("unknown"),
                line,
                md.get_str("context").unwrap_or("unknown context")
            ));
        }

        let (defined_in, used_from) =
            self.with_relations(&workspace, |m| (m.defined_in(name), m.component_usage(name)));
        if !defined_in.is_empty() {
            out.push(format!("\nDefined in: {}", defined_in.join(", ")));
        }
        if !used_from.is_empty() {
            out.push("\nAlso found in relationship map:".to_string());
            out.extend(used_from.iter().take(10).map(|f| format!("- {}", f)));
        }
        Ok(out.join("\n"))
    }

    /// Languages, entry points and key classes of an indexed workspace.
    pub async fn get_project_summary(&self, workspace_name: &str) -> Result<String> {
        let workspace = require_workspace(workspace_name)?;
        let records = self
            .connector
            .scroll_records(None, Some(&code_chunk_filter(&workspace)), false)
            .await?;
        if records.is_empty() {
            return Ok(format!(
                "No codebase indexed yet for workspace '{}'. Use index_codebase to scan your project first.",
                workspace
            ));
        }

        let inventory = Inventory::from_entries(records.iter().map(|r| &r.entry));
        let mut by_language: BTreeMap<&str, usize> = BTreeMap::new();
        for language in inventory.files.values() {
            *by_language.entry(language.as_str()).or_default() += 1;
        }
        let mut languages: Vec<(&str, usize)> = by_language.into_iter().collect();
        languages.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let mut out = vec![format!("📊 Project Summary: {}\n", workspace)];
        out.push(format!("Total Files: {}", inventory.files.len()));
        out.push(format!(
            "Languages: {}",
            languages
                .iter()
                .map(|(l, n)| format!("{} ({})", l, n))
                .collect::<Vec<_>>()
                .join(", ")
        ));
        out.push(format!("Classes: {}", inventory.classes.len()));
        out.push(format!("Functions/Methods: {}", inventory.functions.len()));

        let entry_points: Vec<&str> = inventory
            .files
            .keys()
            .map(String::as_str)
            .filter(|p| {
                let lower = p.to_lowercase();
                lower.contains("main") || lower.contains("index")
            })
            .take(5)
            .collect();
        if !entry_points.is_empty() {
            out.push(format!("Entry Points: {}", entry_points.join(", ")));
        }
        let imported = self.with_relations(&workspace, |m| m.most_imported(5));
        if !imported.is_empty() {
            out.push(format!(
                "Most Imported: {}",
                imported
                    .iter()
                    .map(|(m, n)| format!("{} ({})", m, n))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        if !inventory.classes.is_empty() {
            out.push(format!(
                "\nKey Classes ({}):",
                inventory.classes.len().min(10)
            ));
            out.extend(inventory.classes.iter().take(10).map(|c| format!("- {}", c)));
        }
        Ok(out.join("\n"))
    }

    /// Classes, functions or files of an indexed workspace.
    ///
    /// `component_type` is one of `classes`, `functions`, `files` or `all`.
    pub async fn get_component_list(
        &self,
        workspace_name: &str,
        component_type: &str,
    ) -> Result<String> {
        let workspace = require_workspace(workspace_name)?;
        let (classes, functions, files) = match component_type {
            "classes" => (true, false, false),
            "functions" => (false, true, false),
            "files" => (false, false, true),
            "all" => (true, true, true),
            other => bail!(
                "unknown component_type '{}'. Use classes, functions, files or all.",
                other
            ),
        };
        let records = self
            .connector
            .scroll_records(None, Some(&code_chunk_filter(&workspace)), false)
            .await?;
        if records.is_empty() {
            return Ok(format!(
                "No codebase indexed yet for workspace '{}'. Use index_codebase to scan your project first.",
                workspace
            ));
        }

        let inventory = Inventory::from_entries(records.iter().map(|r| &r.entry));
        let mut sections: Vec<(&str, Vec<&str>)> = Vec::new();
        if classes {
            sections.push(("Classes", inventory.classes.iter().map(String::as_str).collect()));
        }
        if functions {
            sections.push((
                "Functions/Methods",
                inventory.functions.iter().map(String::as_str).collect(),
            ));
        }
        if files {
            sections.push(("Files", inventory.files.keys().map(String::as_str).collect()));
        }
        if sections.iter().all(|(_, items)| items.is_empty()) {
            return Ok(format!("No components found in workspace '{}'", workspace));
        }

        let mut out = Vec::new();
        for (title, items) in sections {
            if !out.is_empty() {
                out.push(String::new());
            }
            out.push(format!("{} ({}):", title, items.len()));
            out.extend(
                items
                    .iter()
                    .take(COMPONENT_LIST_LIMIT)
                    .map(|i| format!("- {}", i)),
            );
        }
        Ok(out.join("\n"))
    }

    // ── indexing ────────────────────────────────────────────────────────

    /// The hash is only recorded once the chunks are stored, so a failed
    /// batch is picked up again by the next run.
    async fn analyze_file(&self, workspace: &str, path: &str, content: &str) -> FileAnalysis {
        let unchanged = self.with_tracker(workspace, |t| {
            if t.is_changed(path, content) {
                false
            } else {
                t.touch(path);
                true
            }
        });
        if unchanged {
            return FileAnalysis::Unchanged;
        }
        FileAnalysis::Changed(self.chunker.chunk(content, path, detect_language(path)))
    }

    /// Bulk-index `files` (path, content) into `workspace_name`.
    ///
    /// Files are analysed concurrently in batches; chunk storage for a batch
    /// happens afterwards, one file at a time, so the run-wide duplicate
    /// check sees every stored hash.
    pub async fn index_codebase(
        &self,
        files: Vec<(String, String)>,
        workspace_name: &str,
    ) -> Result<String> {
        if files.is_empty() {
            bail!("files is empty. Provide at least one {{path: content}} entry to index.");
        }
        let workspace = require_workspace(workspace_name)?;

        let mut languages: Vec<&'static str> = Vec::new();
        for (path, _) in &files {
            let lang = detect_language(path);
            if !languages.contains(&lang) {
                languages.push(lang);
            }
        }
        info!(
            workspace = %workspace,
            files = files.len(),
            languages = languages.len(),
            "indexing codebase"
        );

        let batch_size = self.config.indexing.batch_size.max(1);
        let total_batches = files.len().div_ceil(batch_size);
        let mut seen: HashSet<String> = HashSet::new();
        let mut indexed = 0usize;
        let mut unchanged = 0usize;
        let mut chunk_count = 0usize;

        for (batch_idx, batch) in files.chunks(batch_size).enumerate() {
            self.progress.report(ProgressEvent::IndexBatch {
                batch: batch_idx + 1,
                total_batches,
                files: batch.len(),
            });
            let analyses = futures::future::join_all(
                batch
                    .iter()
                    .map(|(path, content)| self.analyze_file(&workspace, path, content)),
            )
            .await;

            for ((path, content), analysis) in batch.iter().zip(analyses) {
                let chunks = match analysis {
                    FileAnalysis::Unchanged => {
                        self.progress
                            .report(ProgressEvent::FileSkipped { path: path.clone() });
                        unchanged += 1;
                        continue;
                    }
                    FileAnalysis::Changed(chunks) => chunks,
                };

                let fresh: Vec<CodeChunk> = chunks
                    .into_iter()
                    .filter(|c| seen.insert(c.hash.clone()))
                    .collect();
                let stored = self.store_chunks(&fresh, &workspace).await?;
                self.store_relations(&workspace, path, content).await?;
                chunk_count += stored;
                self.progress.report(ProgressEvent::ChunksStored {
                    path: path.clone(),
                    stored,
                });

                self.with_tracker(&workspace, |t| t.mark_indexed(path, content));
                indexed += 1;
            }
        }

        info!(
            workspace = %workspace,
            files = indexed,
            unchanged,
            chunks = chunk_count,
            "indexing complete"
        );
        let unchanged_note = if unchanged > 0 {
            format!(" ({} unchanged)", unchanged)
        } else {
            String::new()
        };
        Ok(format!(
            "Indexed {} files ({} code chunks) from {} total files{}. Languages: {}",
            indexed,
            chunk_count,
            files.len(),
            unchanged_note,
            languages.join(", ")
        ))
    }

    async fn store_chunks(&self, chunks: &[CodeChunk], workspace: &str) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let entries: Vec<Entry> = chunks
            .iter()
            .map(|c| Entry::new(c.searchable_content(), c.metadata(workspace)))
            .collect();
        Ok(self.connector.store_batch(&entries, None).await?.len())
    }

    /// Store usage examples of a file and refresh its relationship entry.
    async fn store_relations(&self, workspace: &str, path: &str, content: &str) -> Result<usize> {
        let relations = extract_relations(content, path, detect_language(path));
        let entries: Vec<Entry> = relations
            .usages
            .iter()
            .map(|u| Entry::new(u.searchable_content(), u.metadata(workspace)))
            .collect();
        let stored = self.connector.store_batch(&entries, None).await?.len();
        if stored > 0 {
            debug!(file = path, usages = stored, "stored usage examples");
        }
        self.with_relations(workspace, |m| m.add_file(path, &relations));
        Ok(stored)
    }

    /// Index one file regardless of whether it changed, replacing what was
    /// stored for it before.
    pub async fn index_file(
        &self,
        file_path: &str,
        content: &str,
        workspace_name: &str,
    ) -> Result<String> {
        let workspace = require_workspace(workspace_name)?;
        if file_path.trim().is_empty() {
            bail!("file_path is empty. Provide the path of the file to index.");
        }
        let language = detect_language(file_path);
        if language == "text" {
            bail!("Could not detect language for {}", file_path);
        }

        let replaced = self
            .connector
            .delete_where(
                &codebase_filter(&workspace)
                    .with_must(FieldCondition::value("metadata.file_path", file_path)),
                None,
            )
            .await?;
        if replaced > 0 {
            debug!(file = file_path, replaced, "replacing previous entries");
        }

        let chunks = self.chunker.chunk(content, file_path, language);
        let stored = self.store_chunks(&chunks, &workspace).await?;
        let usages = self.store_relations(&workspace, file_path, content).await?;
        self.with_tracker(&workspace, |t| t.mark_indexed(file_path, content));
        info!(workspace = %workspace, file = file_path, chunks = stored, usages, "indexed file");

        let functions = chunks
            .iter()
            .filter(|c| matches!(c.chunk_type, ChunkType::Function | ChunkType::Method))
            .count();
        let classes = chunks
            .iter()
            .filter(|c| c.chunk_type == ChunkType::Class)
            .count();
        let mut out = format!(
            "Indexed file: {} ({}, {} functions, {} classes, {} code chunks, {} usage examples)",
            file_path, language, functions, classes, stored, usages
        );
        let (dependencies, dependents) = self.with_relations(&workspace, |m| {
            (m.dependencies(file_path), m.dependents(file_path))
        });
        if !dependencies.is_empty() {
            out.push_str(&format!("\nDepends on: {}", dependencies.join(", ")));
        }
        if !dependents.is_empty() {
            out.push_str(&format!("\nUsed by: {}", dependents.join(", ")));
        }
        Ok(out)
    }

    /// Re-index only the files whose content changed since the last run.
    ///
    /// At most `max_update_files` are stored per call; the rest stay
    /// pending for the next call.
    pub async fn update_files(
        &self,
        files: Vec<(String, String)>,
        workspace_name: &str,
    ) -> Result<String> {
        let started = Instant::now();
        let workspace = require_workspace(workspace_name)?;

        let mut changed = self.with_tracker(&workspace, |t| {
            t.get_changed_files(files.iter().map(|(p, c)| (p.as_str(), c.as_str())))
        });
        info!(workspace = %workspace, changed = changed.len(), received = files.len(), "hash check");
        if changed.is_empty() {
            return Ok("No changes detected. Index is current.".to_string());
        }

        let max_files = self.config.indexing.max_update_files.max(1);
        let skipped = changed.len().saturating_sub(max_files);
        if skipped > 0 {
            warn!(max_files, received = changed.len(), "truncating incremental update");
            changed.truncate(max_files);
        }

        let contents: HashMap<&str, &str> = files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_str()))
            .collect();
        let mut indexed = 0usize;
        let mut chunk_count = 0usize;
        for path in &changed {
            let Some(content) = contents.get(path.as_str()) else {
                continue;
            };
            let language = detect_language(path);
            if language != "text" {
                let chunks = self.chunker.chunk(content, path, language);
                chunk_count += self.store_chunks(&chunks, &workspace).await?;
                self.store_relations(&workspace, path, content).await?;
                indexed += 1;
            }
            self.with_tracker(&workspace, |t| t.mark_indexed(path, content));
        }

        let mut result = format!(
            "Updated {} changed files ({} code chunks) in {}ms",
            indexed,
            chunk_count,
            started.elapsed().as_millis()
        );
        if skipped > 0 {
            result.push_str(&format!(
                "\n[Agent Guidance: {} additional changed files detected but not indexed to prevent slowdown. Call update_files again or run index_codebase for a full re-index.]",
                skipped
            ));
        }
        Ok(result)
    }

    // ── workspace status ────────────────────────────────────────────────

    pub async fn index_status(&self, workspace_name: &str) -> Result<String> {
        let workspace = require_workspace(workspace_name)?;
        let records = self
            .connector
            .scroll_records(None, Some(&codebase_filter(&workspace)), false)
            .await?;
        let summary = WorkspaceSummary::from_entries(records.iter().take(STATS_SCAN_LIMIT).map(|r| &r.entry));

        let mut lines = vec!["📊 Index Status\n".to_string()];
        lines.push(format!("Workspace: {}", workspace));
        lines.push(format!("Files Tracked: {}", summary.files.len()));
        let now = now_ts();
        if summary.latest > 0.0 {
            let minutes = ((now - summary.latest) / 60.0).max(0.0) as u64;
            let ago = if minutes < 1 {
                "just now".to_string()
            } else if minutes < 60 {
                format!("{} minutes ago", minutes)
            } else {
                format!("{} hours ago", minutes / 60)
            };
            lines.push(format!("Last Update: {}", ago));
        } else {
            lines.push("Last Update: Never".to_string());
        }

        if summary.files.is_empty() {
            lines.push("\n⚠️  Warning: No files indexed. Run index_codebase to get started.".into());
        } else if summary.latest <= 0.0 {
            lines.push("\n⚠️  Warning: Index may be stale. Consider running index_codebase.".into());
        } else if now - summary.latest > STALE_INDEX_SECS {
            lines.push(
                "\n💡 Tip: Index is over 1 hour old. Use update_files to refresh changed files."
                    .into(),
            );
        } else {
            lines.push("\n✅ Index is healthy and current".into());
        }
        Ok(lines.join("\n"))
    }

    pub async fn list_workspaces(&self) -> Result<String> {
        let filter = Filter::new().with_must(FieldCondition::value("metadata.category", "codebase"));
        let records = self.connector.scroll_records(None, Some(&filter), false).await?;
        if records.is_empty() {
            return Ok("No workspaces indexed yet. Use index_codebase to get started.".to_string());
        }

        let mut by_workspace: BTreeMap<String, Vec<&Entry>> = BTreeMap::new();
        for r in &records {
            let ws = r.entry.metadata.get_str("workspace").unwrap_or("unknown");
            by_workspace.entry(ws.to_string()).or_default().push(&r.entry);
        }

        let now = now_ts();
        let mut lines = vec![format!("📋 Indexed Workspaces ({})\n", by_workspace.len())];
        for (ws, entries) in &by_workspace {
            let summary = WorkspaceSummary::from_entries(entries.iter().copied());
            let ago = if summary.latest > 0.0 {
                let minutes = ((now - summary.latest) / 60.0).max(0.0) as u64;
                if minutes < 1 {
                    "just now".to_string()
                } else if minutes < 60 {
                    format!("{}m ago", minutes)
                } else {
                    format!("{}h ago", minutes / 60)
                }
            } else {
                "unknown".to_string()
            };
            lines.push(format!(
                "• {}: {} files, {} chunks (updated {})",
                ws,
                summary.files.len(),
                summary.chunks,
                ago
            ));
        }
        Ok(lines.join("\n"))
    }

    pub async fn clear_workspace(&self, workspace_name: &str, confirm: bool) -> Result<String> {
        let workspace = require_workspace(workspace_name)?;
        if !confirm {
            return Ok(format!(
                "⚠️  Workspace deletion requires confirmation. Call again with confirm=true to proceed.\n\nThis will remove all indexed data for workspace '{}'.",
                workspace
            ));
        }
        let usages = self
            .connector
            .delete_where(
                &codebase_filter(&workspace)
                    .with_must(FieldCondition::value("metadata.chunk_type", USAGE_CHUNK_TYPE)),
                None,
            )
            .await?;
        let removed = self
            .connector
            .delete_where(&codebase_filter(&workspace), None)
            .await?;
        self.trackers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&workspace);
        self.relations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&workspace);
        info!(workspace = %workspace, removed, usages, "cleared workspace");
        let extra = if usages > 0 {
            format!(" and {} usage examples", usages)
        } else {
            String::new()
        };
        Ok(format!(
            "Cleared workspace '{}': removed {} code chunks{}.",
            workspace, removed, extra
        ))
    }

    pub async fn get_current_context(&self, workspace_name: &str) -> Result<String> {
        let workspace = require_workspace(workspace_name)?;
        let mut lines = vec![format!("🎯 Workspace: {}", workspace)];
        match self
            .connector
            .count(Some(&code_chunk_filter(&workspace)), None)
            .await
        {
            Ok(0) => lines.push("📁 Indexed Code Chunks: 0 (not indexed yet)".to_string()),
            Ok(n) => lines.push(format!("📁 Indexed Code Chunks: {}", n)),
            Err(e) => {
                warn!(workspace = %workspace, error = %e, "failed to count workspace chunks");
                lines.push("📁 Indexed Code Chunks: unknown (query failed)".to_string());
            }
        }
        lines.push(format!(
            "\n💡 Use index_status(workspace_name='{}') for detailed status",
            workspace
        ));
        Ok(lines.join("\n"))
    }

    // ── maintenance ─────────────────────────────────────────────────────

    pub async fn janitor_report(&self) -> Result<MaintenanceReport> {
        MemoryJanitor::new(self.connector.clone(), self.config.janitor.to_janitor_config())
            .with_progress(self.progress.clone())
            .run(None)
            .await
    }

    pub async fn run_janitor(&self) -> Result<String> {
        let r = self.janitor_report().await?;
        Ok(format!(
            "🧹 Maintenance complete ({})\n\n\
             Workspaces fixed: {}\n\
             Categories fixed: {}\n\
             Empty deleted: {}\n\
             Short deleted: {}\n\
             Duplicates merged: {}\n\
             Conflicts resolved: {}\n\
             Stale archived: {}\n\
             Health updated: {}\n\n\
             Total actions: {}",
            r.timestamp,
            r.workspace_fixed,
            r.category_fixed,
            r.empty_deleted,
            r.short_deleted,
            r.duplicates_merged,
            r.conflicts_resolved,
            r.stale_archived,
            r.health_updated,
            r.total_actions()
        ))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════

fn require_workspace(name: &str) -> Result<String> {
    let ws = normalize_workspace_name(name);
    if ws.is_empty() {
        return Err(anyhow!(
            "workspace_name is required. Provide the root directory name of your workspace."
        ));
    }
    Ok(ws)
}

fn codebase_filter(workspace: &str) -> Filter {
    Filter::new()
        .with_must(FieldCondition::value("metadata.category", "codebase"))
        .with_must(FieldCondition::value("metadata.workspace", workspace))
}

/// Codebase entries of `workspace` minus usage examples.
fn code_chunk_filter(workspace: &str) -> Filter {
    codebase_filter(workspace)
        .with_must_not(FieldCondition::value("metadata.chunk_type", USAGE_CHUNK_TYPE))
}

/// Add `timestamp >= since` and `timestamp <= until`. Unparseable bounds
/// are skipped.
fn add_time_range(mut filter: Filter, since: Option<&str>, until: Option<&str>) -> Filter {
    if let Some(gte) = since.and_then(parse_iso_timestamp) {
        filter = filter.with_must(FieldCondition::range(
            "metadata.timestamp",
            Range {
                gte: Some(gte),
                ..Default::default()
            },
        ));
    }
    if let Some(lte) = until.and_then(parse_iso_timestamp) {
        filter = filter.with_must(FieldCondition::range(
            "metadata.timestamp",
            Range {
                lte: Some(lte),
                ..Default::default()
            },
        ));
    }
    filter
}

/// Codebase entries must belong to `workspace`; everything else is global.
fn in_workspace_or_global(entry: &Entry, workspace: &str) -> bool {
    entry.metadata.get_str("category") != Some("codebase")
        || entry.metadata.get_str("workspace") == Some(workspace)
}

/// Stable re-sort by `score × (1 + 0.05 × matched suggestions)`.
fn boost_suggested(results: &mut Vec<ScoredEntry>, suggested: &SuggestedFilters) {
    if suggested.is_empty() || results.is_empty() {
        return;
    }
    let mut scored: Vec<(f32, ScoredEntry)> = results
        .drain(..)
        .map(|r| {
            let md = &r.entry.metadata;
            let mut matches = 0u32;
            if let Some(lang) = &suggested.language {
                if md.get_str("language") == Some(lang.as_str()) {
                    matches += 1;
                }
            }
            if let Some(tag) = &suggested.tag {
                let in_list = md
                    .get("tag_list")
                    .and_then(Value::as_array)
                    .is_some_and(|l| l.iter().any(|t| t.as_str() == Some(tag.as_str())));
                if in_list || md.get_str("tags").is_some_and(|t| t.contains(tag.as_str())) {
                    matches += 1;
                }
            }
            (r.score * (1.0 + SUGGESTION_BOOST * matches as f32), r)
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    results.extend(scored.into_iter().map(|(_, r)| r));
}

struct Grouped<'a> {
    decisions: Vec<&'a Entry>,
    patterns: Vec<&'a Entry>,
    code: Vec<&'a Entry>,
    other: Vec<&'a Entry>,
}

impl<'a> Grouped<'a> {
    fn from_entries(entries: impl Iterator<Item = &'a Entry>) -> Self {
        let mut g = Grouped {
            decisions: Vec::new(),
            patterns: Vec::new(),
            code: Vec::new(),
            other: Vec::new(),
        };
        for e in entries {
            match e.metadata.get_str("category") {
                Some("decision") => g.decisions.push(e),
                Some("pattern") => g.patterns.push(e),
                Some("codebase") => g.code.push(e),
                _ => g.other.push(e),
            }
        }
        g
    }
}

/// `metadata[key]`, or the first 100 characters of the content.
fn labelled(entry: &Entry, key: &str) -> String {
    entry
        .metadata
        .get_str(key)
        .map(str::to_string)
        .unwrap_or_else(|| truncate(&entry.content, 100).to_string())
}

/// `path:line - name`, or `path:line - type: name` with `typed`.
fn code_ref(entry: &Entry, typed: bool) -> String {
    let md = &entry.metadata;
    let mut r = md.get_str("file_path").unwrap_or("unknown").to_string();
    if let Some(line) = md.get_u64("start_line").filter(|l| *l > 0) {
        r.push_str(&format!(":{}", line));
    }
    if let Some(name) = md.get_str("name").filter(|s| !s.is_empty()) {
        match md.get_str("chunk_type").filter(|_| typed) {
            Some(ct) if !ct.is_empty() => r.push_str(&format!(" - {}: {}", ct, name)),
            _ if typed => {}
            _ => r.push_str(&format!(" - {}", name)),
        }
    }
    r
}

fn format_entry(entry: &Entry) -> String {
    let metadata = if entry.metadata.is_empty() {
        String::new()
    } else {
        serde_json::to_string(&entry.metadata).unwrap_or_default()
    };
    format!(
        "<entry><content>{}</content><metadata>{}</metadata></entry>",
        entry.content, metadata
    )
}

fn with_guidance(result: String, guidance: Option<&str>) -> String {
    match guidance {
        Some(g) => format!("{}\n\n[Agent Guidance: {}]", result, g),
        None => result,
    }
}

/// First `max` characters of `s`.
fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// Files, classes and functions named by code chunk metadata.
struct Inventory {
    /// Path → language.
    files: BTreeMap<String, String>,
    /// `path::Class`, sorted.
    classes: BTreeSet<String>,
    /// `path::name` or `path::Class.name`, sorted.
    functions: BTreeSet<String>,
}

impl Inventory {
    fn from_entries<'a>(entries: impl Iterator<Item = &'a Entry>) -> Self {
        let mut inv = Inventory {
            files: BTreeMap::new(),
            classes: BTreeSet::new(),
            functions: BTreeSet::new(),
        };
        for e in entries {
            let md = &e.metadata;
            let Some(path) = md.get_str("file_path") else {
                continue;
            };
            inv.files
                .entry(path.to_string())
                .or_insert_with(|| md.get_str("language").unwrap_or("unknown").to_string());
            let Some(name) = md.get_str("name").filter(|n| !n.is_empty()) else {
                continue;
            };
            match md.get_str("chunk_type") {
                Some("class") => {
                    inv.classes.insert(format!("{}::{}", path, name));
                }
                Some("function") | Some("method") => {
                    let qualified = match md.get_str("parent_class").filter(|p| !p.is_empty()) {
                        Some(parent) => format!("{}::{}.{}", path, parent, name),
                        None => format!("{}::{}", path, name),
                    };
                    inv.functions.insert(qualified);
                }
                _ => {}
            }
        }
        inv
    }
}

struct WorkspaceSummary {
    files: HashSet<String>,
    chunks: usize,
    latest: f64,
}

impl WorkspaceSummary {
    fn from_entries<'a>(entries: impl Iterator<Item = &'a Entry>) -> Self {
        let mut s = WorkspaceSummary {
            files: HashSet::new(),
            chunks: 0,
            latest: 0.0,
        };
        for e in entries {
            if let Some(path) = e.metadata.get_str("file_path") {
                s.files.insert(path.to_string());
            }
            if e.metadata.get_str("chunk_type") != Some(USAGE_CHUNK_TYPE) {
                s.chunks += 1;
            }
            s.latest = s.latest.max(e.metadata.timestamp());
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_harness_core::embedding::HashEmbedder;

    fn service() -> MemoryService {
        let connector = StorageConnector::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(HashEmbedder::new(64)),
            "memory",
        );
        MemoryService::new(Arc::new(connector), Config::minimal()).unwrap()
    }

    const PY: &str = "import os\nimport sys\n\n\ndef alpha():\n    return 1\n\n\ndef beta():\n    return 2\n\n\ndef gamma():\n    return 3\n";

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[test]
    fn test_code_ref_formats() {
        let mut md = Metadata::new();
        md.insert("file_path".into(), json!("src/app.py"));
        md.insert("start_line".into(), json!(12));
        md.insert("name".into(), json!("run"));
        md.insert("chunk_type".into(), json!("function"));
        let e = Entry::new("x", md);
        assert_eq!(code_ref(&e, false), "src/app.py:12 - run");
        assert_eq!(code_ref(&e, true), "src/app.py:12 - function: run");
    }

    #[test]
    fn test_boost_reorders_matching_language() {
        let mk = |id: &str, score: f32, lang: &str| {
            let mut md = Metadata::new();
            md.insert("language".into(), json!(lang));
            ScoredEntry {
                id: id.into(),
                score,
                entry: Entry::new(id, md),
            }
        };
        let mut results = vec![mk("a", 0.80, "go"), mk("b", 0.78, "python")];
        boost_suggested(
            &mut results,
            &SuggestedFilters {
                language: Some("python".into()),
                tag: None,
            },
        );
        assert_eq!(results[0].id, "b");
        assert_eq!(results[1].id, "a");
    }

    #[tokio::test]
    async fn test_store_rejects_unknown_category() {
        let svc = service();
        let err = svc
            .store(StoreRequest {
                information: "x".into(),
                category: Some("bogus".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown category"));
    }

    #[tokio::test]
    async fn test_store_reports_category_and_tags() {
        let svc = service();
        let out = svc
            .store(StoreRequest {
                information: "Decision: use PostgreSQL\nRationale: JSONB".into(),
                category: Some("decision".into()),
                tags: Some("db,storage".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(out.starts_with("Stored decision: Decision: use PostgreSQL"));
        assert!(out.ends_with(" (tags: db,storage)"));
    }

    #[tokio::test]
    async fn test_index_then_status_and_workspaces() {
        let svc = service();
        let out = svc
            .index_codebase(
                vec![
                    ("app/main.py".to_string(), PY.to_string()),
                    ("config/app.toml".to_string(), "[app]\nname = \"demo\"\n".to_string()),
                ],
                "My Project",
            )
            .await
            .unwrap();
        assert!(out.starts_with("Indexed 2 files ("), "{}", out);
        assert!(out.ends_with("Languages: python, toml"), "{}", out);

        let status = svc.index_status("my-project").await.unwrap();
        assert!(status.contains("Workspace: my-project"));
        assert!(status.contains("Files Tracked: 2"));
        assert!(status.contains("Last Update: just now"));
        assert!(status.contains("Index is healthy and current"));

        let listing = svc.list_workspaces().await.unwrap();
        assert!(listing.contains("• my-project: 2 files, 5 chunks (updated just now)"), "{}", listing);

        let ctx = svc.get_current_context("my-project").await.unwrap();
        assert!(ctx.contains("📁 Indexed Code Chunks: 5"));
    }

    #[tokio::test]
    async fn test_update_files_detects_changes_only() {
        let svc = service();
        let files = vec![("lib/util.py".to_string(), PY.to_string())];
        svc.index_codebase(files.clone(), "ws").await.unwrap();

        let same = svc.update_files(files, "ws").await.unwrap();
        assert_eq!(same, "No changes detected. Index is current.");

        let edited = vec![(
            "lib/util.py".to_string(),
            PY.replace("return 3", "return 4"),
        )];
        let out = svc.update_files(edited, "ws").await.unwrap();
        assert!(out.starts_with("Updated 1 changed files (4 code chunks) in "), "{}", out);
    }

    #[tokio::test]
    async fn test_update_files_truncates_with_guidance() {
        let mut config = Config::minimal();
        config.indexing.max_update_files = 1;
        let connector = StorageConnector::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(HashEmbedder::new(64)),
            "memory",
        );
        let svc = MemoryService::new(Arc::new(connector), config).unwrap();
        let files = vec![
            ("a.py".to_string(), "x = 1\n".to_string()),
            ("b.py".to_string(), "y = 2\n".to_string()),
            ("c.py".to_string(), "z = 3\n".to_string()),
        ];
        let out = svc.update_files(files.clone(), "ws").await.unwrap();
        assert!(out.starts_with("Updated 1 changed files"));
        assert!(out.contains("[Agent Guidance: 2 additional changed files"));

        let second = svc.update_files(files.clone(), "ws").await.unwrap();
        assert!(second.starts_with("Updated 1 changed files"), "{}", second);
        assert!(second.contains("[Agent Guidance: 1 additional changed files"));

        let third = svc.update_files(files.clone(), "ws").await.unwrap();
        assert!(third.starts_with("Updated 1 changed files"), "{}", third);
        assert!(!third.contains("Agent Guidance"));

        let done = svc.update_files(files, "ws").await.unwrap();
        assert_eq!(done, "No changes detected. Index is current.");
        let status = svc.index_status("ws").await.unwrap();
        assert!(status.contains("Files Tracked: 3"), "{}", status);
    }

    /// Hash embedder that errors on any text containing `explode` while armed.
    struct FailingEmbedder {
        inner: HashEmbedder,
        armed: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl memory_harness_core::embedding::Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            self.inner.model_name()
        }

        fn dims(&self) -> usize {
            self.inner.dims()
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.armed.load(std::sync::atomic::Ordering::SeqCst)
                && texts.iter().any(|t| t.contains("explode"))
            {
                bail!("embedding backend unavailable");
            }
            self.inner.embed_documents(texts).await
        }
    }

    #[tokio::test]
    async fn test_index_retry_after_storage_error_indexes_whole_batch() {
        let embedder = Arc::new(FailingEmbedder {
            inner: HashEmbedder::new(64),
            armed: std::sync::atomic::AtomicBool::new(true),
        });
        let connector = StorageConnector::new(
            Arc::new(InMemoryVectorStore::new()),
            embedder.clone(),
            "memory",
        );
        let svc = MemoryService::new(Arc::new(connector), Config::minimal()).unwrap();
        let files = vec![
            ("a.py".to_string(), "def explode():\n    raise SystemExit\n".to_string()),
            ("b.py".to_string(), "def calm():\n    return 0\n".to_string()),
        ];

        let err = svc.index_codebase(files.clone(), "ws").await.unwrap_err();
        assert!(err.to_string().contains("embedding backend unavailable"));

        embedder
            .armed
            .store(false, std::sync::atomic::Ordering::SeqCst);
        let out = svc.index_codebase(files, "ws").await.unwrap();
        assert_eq!(
            out,
            "Indexed 2 files (2 code chunks) from 2 total files. Languages: python"
        );
    }

    #[tokio::test]
    async fn test_reindex_counts_unchanged_separately() {
        let svc = service();
        let files = vec![
            ("a.py".to_string(), PY.to_string()),
            ("b.py".to_string(), "def solo():\n    return 1\n".to_string()),
        ];
        svc.index_codebase(files.clone(), "ws").await.unwrap();

        let mut edited = files;
        edited[1].1 = "def solo():\n    return 2\n".to_string();
        let out = svc.index_codebase(edited, "ws").await.unwrap();
        assert_eq!(
            out,
            "Indexed 1 files (1 code chunks) from 2 total files (1 unchanged). Languages: python"
        );
    }

    #[tokio::test]
    async fn test_store_rejects_malformed_metadata() {
        let svc = service();
        let err = svc
            .store(StoreRequest {
                information: "x".into(),
                metadata: Some(json!("not json")),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("metadata must be a JSON object"));

        let err = svc
            .store(StoreRequest {
                information: "x".into(),
                metadata: Some(json!([1, 2])),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("metadata must be a JSON object"));

        let ok = svc
            .store(StoreRequest {
                information: "x".into(),
                metadata: Some(json!("{\"source\": \"chat\"}")),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(ok.starts_with("Stored memory: x"));
        let records = svc.connector().scroll_records(None, None, false).await.unwrap();
        assert_eq!(records[0].entry.metadata.get_str("source"), Some("chat"));
    }

    #[tokio::test]
    async fn test_clear_workspace_requires_confirm() {
        let svc = service();
        svc.index_codebase(vec![("m.py".into(), PY.into())], "ws")
            .await
            .unwrap();

        let warning = svc.clear_workspace("ws", false).await.unwrap();
        assert!(warning.contains("requires confirmation"));

        let done = svc.clear_workspace("ws", true).await.unwrap();
        assert_eq!(done, "Cleared workspace 'ws': removed 4 code chunks.");
        let ctx = svc.get_current_context("ws").await.unwrap();
        assert!(ctx.contains("0 (not indexed yet)"));
    }

    #[tokio::test]
    async fn test_search_empty_reports_filters() {
        let svc = service();
        let out = svc
            .search(SearchRequest {
                query: "anything".into(),
                category: Some("decision".into()),
                workspace_name: Some("ws".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(
            out,
            "No results found for 'anything' (category=decision, workspace=ws)"
        );
    }

    #[tokio::test]
    async fn test_search_groups_by_category() {
        let svc = service();
        svc.remember_decision(DecisionRequest {
            decision: "use PostgreSQL for storage".into(),
            rationale: Some("JSONB support".into()),
            ..Default::default()
        })
        .await
        .unwrap();
        svc.remember_pattern(PatternRequest {
            pattern: "wrap storage errors with context".into(),
            language: Some("rust".into()),
            ..Default::default()
        })
        .await
        .unwrap();

        let out = svc
            .search(SearchRequest {
                query: "storage".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(out.starts_with("Found 2 results for 'storage':"));
        assert!(out.contains("📋 Decisions (1):\n  • use PostgreSQL for storage"));
        assert!(out.contains("🎨 Patterns (1):\n  • wrap storage errors with context"));
    }

    #[tokio::test]
    async fn test_search_patterns_shows_details() {
        let svc = service();
        let out = svc
            .remember_pattern(PatternRequest {
                pattern: "retry with backoff".into(),
                example: Some("for attempt in 1..=5 {\n    sleep(backoff(attempt));\n}".into()),
                use_case: Some("flaky HTTP calls".into()),
                tags: Some("http,retry".into()),
                language: Some("rust".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(out, "Remembered pattern: retry with backoff (tags: http,retry) [rust]");

        let found = svc
            .search_patterns(PatternSearchRequest {
                query: "backoff".into(),
                language: Some("rust".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(found.contains("• retry with backoff ([rust], tags: http,retry)"));
        assert!(found.contains("  Use Case: flaky HTTP calls"));
        assert!(found.contains("  Example: for attempt in 1..=5 {"));
    }

    #[tokio::test]
    async fn test_find_similar_code_guidance_when_unindexed() {
        let svc = service();
        let out = svc.find_similar_code("def alpha():", "ws").await.unwrap();
        assert!(out.starts_with("No similar code found for: def alpha():... (workspace: ws)"));
        assert!(out.contains("[Agent Guidance: This workspace has 0 files indexed."));
    }

    #[tokio::test]
    async fn test_search_by_time_includes_timestamp() {
        let svc = service();
        svc.store(StoreRequest {
            information: "deploys happen on Tuesdays".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        let out = svc
            .search_by_time(TimeSearchRequest {
                query: "deploys".into(),
                since: Some("2000-01-01T00:00:00Z".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(out.starts_with("Results for 'deploys' (since 2000-01-01T00:00:00Z)"));
        assert!(out.contains("<entry><content>deploys happen on Tuesdays</content>"));

        let none = svc
            .search_by_time(TimeSearchRequest {
                query: "deploys".into(),
                until: Some("2000-01-01T00:00:00Z".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(none, "No results found for 'deploys' until 2000-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_run_janitor_on_empty_store() {
        let svc = service();
        let out = svc.run_janitor().await.unwrap();
        assert!(out.starts_with("🧹 Maintenance complete"));
        assert!(out.ends_with("Total actions: 0"));
    }
}
