//! Core data models.
//!
//! - [`Entry`]: a stored memory (document text + metadata map).
//! - [`Category`]: the closed set of memory categories.
//! - [`NewEntry`]: a typed record that validates and serializes into the
//!   metadata map at write time.
//! - [`CodeChunk`]: a structural unit emitted by the chunker, pre-storage.
//!
//! The persisted payload shape is always `{document, metadata}`; the
//! metadata map is the only structured query surface and always carries a
//! numeric `timestamp` (unix seconds).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Payload key holding the document body.
pub const DOCUMENT_KEY: &str = "document";
/// Payload key holding the metadata map.
pub const METADATA_KEY: &str = "metadata";
/// Legacy payload key for the document body, rewritten by migration.
pub const LEGACY_CONTENT_KEY: &str = "content";

/// Arbitrary structured attributes attached to an entry.
pub type Metadata = Map<String, Value>;

/// Memory category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Decision,
    Pattern,
    #[default]
    Memory,
    Codebase,
    Architecture,
    Error,
    Lesson,
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Decision,
        Category::Pattern,
        Category::Memory,
        Category::Codebase,
        Category::Architecture,
        Category::Error,
        Category::Lesson,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Decision => "decision",
            Category::Pattern => "pattern",
            Category::Memory => "memory",
            Category::Codebase => "codebase",
            Category::Architecture => "architecture",
            Category::Error => "error",
            Category::Lesson => "lesson",
            Category::Other => "other",
        }
    }

    /// Value written to `metadata.type` for entries of this category.
    pub fn entry_type(&self) -> &'static str {
        match self {
            Category::Decision => "architectural_decision",
            Category::Pattern => "coding_pattern",
            _ => "memory",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the known categories.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category '{0}' (expected one of: decision, pattern, memory, codebase, architecture, error, lesson, other)")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// A stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Entry {
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// Build the `{document, metadata}` payload persisted with the point.
    pub fn to_payload(&self) -> Metadata {
        let mut payload = Map::new();
        payload.insert(DOCUMENT_KEY.to_string(), Value::String(self.content.clone()));
        payload.insert(
            METADATA_KEY.to_string(),
            Value::Object(self.metadata.clone()),
        );
        payload
    }

    /// Read an entry back from a point payload.
    ///
    /// Returns `None` when the payload has no `document` string; such points
    /// predate the current schema and must be migrated first.
    pub fn from_payload(payload: &Metadata) -> Option<Self> {
        let content = payload.get(DOCUMENT_KEY)?.as_str()?.to_string();
        let metadata = payload
            .get(METADATA_KEY)
            .and_then(|m| m.as_object())
            .cloned()
            .unwrap_or_default();
        Some(Self { content, metadata })
    }
}

/// An entry returned by search, with its point id and final score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEntry {
    pub id: String,
    pub score: f32,
    #[serde(flatten)]
    pub entry: Entry,
}

/// Typed accessors over a metadata map.
pub trait MetadataExt {
    fn get_str(&self, key: &str) -> Option<&str>;
    /// Numbers, or strings that parse as numbers.
    fn get_f64(&self, key: &str) -> Option<f64>;
    fn get_u64(&self, key: &str) -> Option<u64>;
    /// Creation timestamp, `0.0` when absent or unparseable.
    fn timestamp(&self) -> f64;
}

impl MetadataExt for Metadata {
    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
    }

    fn timestamp(&self) -> f64 {
        self.get_f64("timestamp").unwrap_or(0.0)
    }
}

/// Current time as fractional unix seconds.
pub fn now_ts() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Parse an ISO-8601 timestamp into unix seconds.
///
/// Accepts RFC 3339 (`2024-01-01T00:00:00Z`, offsets), naive date-times
/// (treated as UTC), and bare dates.
pub fn parse_iso_timestamp(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_micros() as f64 / 1_000_000.0);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_micros() as f64 / 1_000_000.0);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp() as f64)
}

/// Format unix seconds as RFC 3339 (UTC), or `"unknown"`.
pub fn format_ts(ts: f64) -> String {
    DateTime::from_timestamp_micros((ts * 1_000_000.0) as i64)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Normalize a workspace name: lowercase, every character other than a word
/// character or hyphen becomes `-`, hyphen runs collapse, edges are trimmed.
pub fn normalize_workspace_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        let c = if c.is_alphanumeric() || c == '_' || c == '-' {
            c
        } else {
            '-'
        };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('-').to_string()
}

/// Split a comma-separated tag string into trimmed tags.
pub fn parse_tags(tags: &str) -> Vec<String> {
    tags.split(',').map(|t| t.trim().to_string()).collect()
}

/// A typed record for a new memory, validated and flattened into metadata
/// at write time.
#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    pub content: String,
    pub category: Category,
    pub tags: Option<String>,
    pub language: Option<String>,
    pub project: Option<String>,
    pub workspace: Option<String>,
    /// Caller-supplied metadata. Typed fields above take precedence.
    pub extra: Metadata,
}

impl NewEntry {
    pub fn new(content: impl Into<String>, category: Category) -> Self {
        Self {
            content: content.into(),
            category,
            ..Default::default()
        }
    }

    pub fn tags(mut self, tags: Option<String>) -> Self {
        self.tags = tags.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    pub fn project(mut self, project: Option<String>) -> Self {
        self.project = project;
        self
    }

    pub fn workspace(mut self, workspace: Option<String>) -> Self {
        self.workspace = workspace;
        self
    }

    pub fn extra(mut self, extra: Metadata) -> Self {
        self.extra = extra;
        self
    }

    /// Flatten into an [`Entry`], stamping `timestamp` with the current time.
    pub fn into_entry(self) -> Entry {
        let mut md = self.extra;
        md.insert("category".into(), json!(self.category.as_str()));
        md.insert("type".into(), json!(self.category.entry_type()));

        if let Some(tags) = &self.tags {
            md.insert("tags".into(), json!(tags));
            md.insert("tag_list".into(), json!(parse_tags(tags)));
        }
        if let Some(language) = self.language {
            md.insert("language".into(), json!(language));
        }
        if let Some(project) = self.project {
            md.insert("project".into(), json!(project));
        }
        if let Some(workspace) = self.workspace {
            md.insert("workspace".into(), json!(workspace));
        }

        match self.category {
            Category::Decision => {
                if let Some(d) = labelled_line(&self.content, "decision:") {
                    md.insert("decision".into(), json!(d));
                }
            }
            Category::Pattern => {
                if let Some(p) = labelled_line(&self.content, "pattern:") {
                    md.insert("pattern".into(), json!(p));
                }
            }
            _ => {}
        }

        md.insert("timestamp".into(), json!(now_ts()));
        Entry::new(self.content, md)
    }
}

/// First line starting (case-insensitively) with `label`, minus the label.
fn labelled_line(content: &str, label: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let head = line.get(..label.len())?;
        if head.eq_ignore_ascii_case(label) {
            Some(line[label.len()..].trim().to_string())
        } else {
            None
        }
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Code chunks
// ═══════════════════════════════════════════════════════════════════════

/// Structural kind of a [`CodeChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    FileHeader,
    ImportBlock,
    Function,
    Method,
    Class,
    File,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::FileHeader => "file_header",
            ChunkType::ImportBlock => "import_block",
            ChunkType::Function => "function",
            ChunkType::Method => "method",
            ChunkType::Class => "class",
            ChunkType::File => "file",
        }
    }

    /// Title-cased label used in searchable content headers.
    pub fn title(&self) -> &'static str {
        match self {
            ChunkType::FileHeader => "File_Header",
            ChunkType::ImportBlock => "Import_Block",
            ChunkType::Function => "Function",
            ChunkType::Method => "Method",
            ChunkType::Class => "Class",
            ChunkType::File => "File",
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structural unit of a source file, prepared for separate embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeChunk {
    pub content: String,
    pub chunk_type: ChunkType,
    pub name: Option<String>,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub file_path: String,
    pub language: String,
    pub parent_class: Option<String>,
    pub docstring: Option<String>,
    /// Deterministic digest of `(file_path, start_line, content)`.
    pub hash: String,
}

impl CodeChunk {
    pub fn new(
        content: String,
        chunk_type: ChunkType,
        start_line: usize,
        end_line: usize,
        file_path: &str,
        language: &str,
    ) -> Self {
        let hash = chunk_hash(file_path, start_line, &content);
        Self {
            content,
            chunk_type,
            name: None,
            start_line,
            end_line,
            file_path: file_path.to_string(),
            language: language.to_string(),
            parent_class: None,
            docstring: None,
            hash,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_parent_class(mut self, parent: Option<String>) -> Self {
        self.parent_class = parent;
        self
    }

    pub fn with_docstring(mut self, docstring: Option<String>) -> Self {
        self.docstring = docstring;
        self
    }

    /// Display label: the name, or `{type}@{start_line}` for anonymous chunks.
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}@{}", self.chunk_type, self.start_line))
    }

    /// Content as embedded: a short context header followed by the code.
    pub fn searchable_content(&self) -> String {
        let mut parts = vec![format!("# File: {}", self.file_path)];
        if let Some(name) = &self.name {
            parts.push(format!("# {}: {}", self.chunk_type.title(), name));
        }
        if let Some(parent) = &self.parent_class {
            parts.push(format!("# Class: {}", parent));
        }
        if let Some(doc) = &self.docstring {
            parts.push(format!("\"\"\"{}\"\"\"", doc));
        }
        parts.push(String::new());
        parts.push(self.content.clone());
        parts.join("\n")
    }

    /// Metadata stored alongside the chunk for a given workspace.
    pub fn metadata(&self, workspace: &str) -> Metadata {
        let mut md = Map::new();
        md.insert("type".into(), json!(format!("code_{}", self.chunk_type)));
        md.insert("category".into(), json!(Category::Codebase.as_str()));
        md.insert("workspace".into(), json!(workspace));
        md.insert("file_path".into(), json!(self.file_path));
        md.insert("language".into(), json!(self.language));
        md.insert("chunk_type".into(), json!(self.chunk_type.as_str()));
        md.insert("start_line".into(), json!(self.start_line));
        md.insert("end_line".into(), json!(self.end_line));
        md.insert("content_hash".into(), json!(self.hash));
        if let Some(name) = &self.name {
            md.insert("name".into(), json!(name));
        }
        if let Some(parent) = &self.parent_class {
            md.insert("parent_class".into(), json!(parent));
        }
        if let Some(doc) = &self.docstring {
            md.insert("docstring".into(), json!(doc));
        }
        md.insert("timestamp".into(), json!(now_ts()));
        md
    }
}

/// SHA-256 hex digest of `"{file_path}:{start_line}:{content}"`.
pub fn chunk_hash(file_path: &str, start_line: usize, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", file_path, start_line, content).as_bytes());
    format!("{:x}", hasher.finalize())
}
