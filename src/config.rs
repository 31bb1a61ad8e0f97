//! TOML configuration.
//!
//! Every section is optional; missing keys fall back to the defaults below.
//! A handful of environment variables override the `[store]` section after
//! parsing so container deployments can point at a different Qdrant
//! without editing the file:
//!
//! | Variable | Key |
//! |----------|-----|
//! | `QDRANT_URL` | `store.url` |
//! | `QDRANT_API_KEY` | `store.api_key` |
//! | `QDRANT_LOCAL_PATH` | `store.local_path` |
//! | `COLLECTION_NAME` | `store.collection_name` |
//! | `QDRANT_SEARCH_LIMIT` | `store.search_limit` |
//! | `QDRANT_READ_ONLY` | `store.read_only` |

use anyhow::{bail, Context, Result};
use memory_harness_core::janitor::JanitorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub janitor: JanitorSection,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub local_path: Option<PathBuf>,
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default)]
    pub read_only: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            local_path: None,
            collection_name: default_collection_name(),
            search_limit: default_search_limit(),
            read_only: false,
        }
    }
}

fn default_collection_name() -> String {
    "memory".to_string()
}
fn default_search_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Named vector override; derived from the model when absent.
    #[serde(default)]
    pub vector_name: Option<String>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            vector_name: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    /// Files analysed concurrently per batch.
    #[serde(default = "default_index_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_update_files")]
    pub max_update_files: usize,
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            batch_size: default_index_batch_size(),
            max_update_files: default_max_update_files(),
            exclude_globs: default_exclude_globs(),
        }
    }
}

fn default_max_chunk_size() -> usize {
    500
}
fn default_index_batch_size() -> usize {
    10
}
fn default_max_update_files() -> usize {
    50
}
fn default_exclude_globs() -> Vec<String> {
    vec![
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/.git/**".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_true")]
    pub query_expansion: bool,
    /// Share of BM25 keyword relevance in result ranking. `0.0` disables
    /// hybrid scoring.
    #[serde(default = "default_sparse_weight")]
    pub sparse_weight: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query_expansion: true,
            sparse_weight: default_sparse_weight(),
        }
    }
}

fn default_sparse_weight() -> f32 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct JanitorSection {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_conflict_threshold")]
    pub conflict_threshold: f32,
    #[serde(default = "default_stale_days")]
    pub stale_days: u32,
    #[serde(default = "default_min_access_count")]
    pub min_access_count: u64,
    #[serde(default)]
    pub known_projects: Vec<String>,
}

impl Default for JanitorSection {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            conflict_threshold: default_conflict_threshold(),
            stale_days: default_stale_days(),
            min_access_count: default_min_access_count(),
            known_projects: Vec::new(),
        }
    }
}

fn default_similarity_threshold() -> f32 {
    0.90
}
fn default_conflict_threshold() -> f32 {
    0.75
}
fn default_stale_days() -> u32 {
    365
}
fn default_min_access_count() -> u64 {
    1
}

impl JanitorSection {
    pub fn to_janitor_config(&self) -> JanitorConfig {
        JanitorConfig {
            similarity_threshold: self.similarity_threshold,
            conflict_threshold: self.conflict_threshold,
            stale_days: self.stale_days,
            min_access_count: self.min_access_count,
            known_projects: self.known_projects.clone(),
            ..JanitorConfig::default()
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// In-memory store with the hash embedder. Used by tests and by
    /// commands run without a config file.
    pub fn minimal() -> Self {
        Self {
            embedding: EmbeddingConfig {
                provider: "hash".to_string(),
                dims: Some(256),
                ..EmbeddingConfig::default()
            },
            ..Self::default()
        }
    }

    /// Override `[store]` keys from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(url) = get("QDRANT_URL") {
            self.store.url = Some(url);
        }
        if let Some(key) = get("QDRANT_API_KEY") {
            self.store.api_key = Some(key);
        }
        if let Some(path) = get("QDRANT_LOCAL_PATH") {
            self.store.local_path = Some(PathBuf::from(path));
        }
        if let Some(name) = get("COLLECTION_NAME") {
            self.store.collection_name = name;
        }
        if let Some(limit) = get("QDRANT_SEARCH_LIMIT").and_then(|v| v.parse().ok()) {
            self.store.search_limit = limit;
        }
        if let Some(flag) = get("QDRANT_READ_ONLY") {
            self.store.read_only = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.local_path.is_some()
            && (self.store.url.is_some() || self.store.api_key.is_some())
        {
            bail!("store.local_path cannot be combined with store.url or store.api_key");
        }
        if self.store.collection_name.trim().is_empty() {
            bail!("store.collection_name must not be empty");
        }
        if self.store.search_limit < 1 {
            bail!("store.search_limit must be >= 1");
        }
        if self.indexing.batch_size < 1 {
            bail!("indexing.batch_size must be >= 1");
        }
        if self.indexing.max_chunk_size < 1 {
            bail!("indexing.max_chunk_size must be >= 1");
        }
        if self.embedding.batch_size < 1 {
            bail!("embedding.batch_size must be >= 1");
        }

        if !(0.0..=1.0).contains(&self.search.sparse_weight) {
            bail!("search.sparse_weight must be in [0.0, 1.0]");
        }

        for (name, value) in [
            ("janitor.similarity_threshold", self.janitor.similarity_threshold),
            ("janitor.conflict_threshold", self.janitor.conflict_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                bail!("{} must be in (0.0, 1.0]", name);
            }
        }

        match self.embedding.provider.as_str() {
            "openai" | "ollama" => {
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            "local" | "hash" => {
                if self.embedding.dims == Some(0) {
                    bail!("embedding.dims must be > 0");
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be openai, ollama, local, or hash.",
                other
            ),
        }

        Ok(())
    }
}

/// Read, parse, apply environment overrides, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config = parse_config(&content)?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}

/// Parse without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.store.collection_name, "memory");
        assert_eq!(cfg.store.search_limit, 10);
        assert_eq!(cfg.indexing.max_update_files, 50);
        assert_eq!(cfg.indexing.batch_size, 10);
        assert_eq!(cfg.server.bind, "127.0.0.1:7341");
        assert!(cfg.reranker.enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_local_path_excludes_url() {
        let cfg = parse_config(
            r#"
            [store]
            url = "http://localhost:6333"
            local_path = "./data/memory.json"
            "#,
        )
        .unwrap();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("local_path"));
    }

    #[test]
    fn test_remote_provider_needs_dims_and_model() {
        let cfg = parse_config("[embedding]\nprovider = \"openai\"\nmodel = \"m\"").unwrap();
        assert!(cfg.validate().unwrap_err().to_string().contains("dims"));

        let cfg = parse_config("[embedding]\nprovider = \"bogus\"").unwrap();
        assert!(cfg.validate().unwrap_err().to_string().contains("Unknown"));
    }

    #[test]
    fn test_sparse_weight_bounds() {
        assert_eq!(parse_config("").unwrap().search.sparse_weight, 0.3);
        let cfg = parse_config("[search]\nsparse_weight = 0.0").unwrap();
        assert!(cfg.validate().is_ok());
        let cfg = parse_config("[search]\nsparse_weight = 1.2").unwrap();
        assert!(cfg.validate().unwrap_err().to_string().contains("sparse_weight"));
    }

    #[test]
    fn test_threshold_bounds() {
        let cfg = parse_config("[janitor]\nsimilarity_threshold = 1.5").unwrap();
        assert!(cfg.validate().is_err());
        let cfg = parse_config("[janitor]\nconflict_threshold = 0.0").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = Config::default();
        cfg.apply_env_from(|key| match key {
            "QDRANT_URL" => Some("http://qdrant:6333".into()),
            "COLLECTION_NAME" => Some("team".into()),
            "QDRANT_SEARCH_LIMIT" => Some("25".into()),
            "QDRANT_READ_ONLY" => Some("true".into()),
            _ => None,
        });
        assert_eq!(cfg.store.url.as_deref(), Some("http://qdrant:6333"));
        assert_eq!(cfg.store.collection_name, "team");
        assert_eq!(cfg.store.search_limit, 25);
        assert!(cfg.store.read_only);
    }

    #[test]
    fn test_janitor_section_maps_to_core_config() {
        let cfg = parse_config("[janitor]\nstale_days = 30\nknown_projects = [\"acme\"]").unwrap();
        let jc = cfg.janitor.to_janitor_config();
        assert_eq!(jc.stale_days, 30);
        assert_eq!(jc.known_projects, vec!["acme".to_string()]);
        assert_eq!(jc.similarity_threshold, 0.90);
    }

    #[test]
    fn test_minimal_is_valid() {
        let cfg = Config::minimal();
        assert_eq!(cfg.embedding.provider, "hash");
        assert!(cfg.validate().is_ok());
    }
}
