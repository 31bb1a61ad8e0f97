//! Content-hash change tracking for incremental indexing.
//!
//! A [`FileHashTracker`] remembers the SHA-256 of every indexable file it
//! has seen, so re-indexing a workspace only touches files whose content
//! actually changed. State is in-memory only; a fresh process treats every
//! file as changed.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Extensions (lowercase, without the dot) considered for indexing.
pub const INDEXABLE_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "jsx", "tsx", "go", "rs", "java", "c", "cpp", "h", "hpp", "cs", "rb", "php",
    "swift", "kt", "scala", "clj", "sh", "bash", "zsh", "lua", "r", "m", "mm", "sql", "yaml",
    "yml", "json", "toml",
];

/// Whether `path` has an indexable extension (case-insensitive).
pub fn is_indexable(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            INDEXABLE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// SHA-256 hex digest of `content`.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Summary returned by [`FileHashTracker::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerStats {
    pub total_files: usize,
    pub oldest_check: Option<DateTime<Utc>>,
    pub newest_check: Option<DateTime<Utc>>,
}

/// Per-workspace map of file path → content hash and last check time.
#[derive(Debug, Clone, Default)]
pub struct FileHashTracker {
    hashes: HashMap<String, String>,
    checked: HashMap<String, DateTime<Utc>>,
}

impl FileHashTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `path` is indexable and its content differs from the
    /// recorded hash (or none is recorded). Records the new hash when
    /// changed; always refreshes the check time for indexable files.
    ///
    /// Callers that store the file afterwards should use [`is_changed`]
    /// and [`mark_indexed`] instead, so a failed store is retried.
    ///
    /// [`is_changed`]: FileHashTracker::is_changed
    /// [`mark_indexed`]: FileHashTracker::mark_indexed
    pub fn has_changed(&mut self, path: &str, content: &str) -> bool {
        let changed = self.is_changed(path, content);
        if changed {
            self.mark_indexed(path, content);
        } else {
            self.touch(path);
        }
        changed
    }

    /// Same answer as [`has_changed`](FileHashTracker::has_changed) without
    /// recording anything.
    pub fn is_changed(&self, path: &str, content: &str) -> bool {
        is_indexable(path) && self.hashes.get(path) != Some(&compute_hash(content))
    }

    /// Refresh the check time of an indexable path.
    pub fn touch(&mut self, path: &str) {
        if is_indexable(path) {
            self.checked.insert(path.to_string(), Utc::now());
        }
    }

    /// Record `content` as indexed for `path`. No-op for non-indexable paths.
    pub fn mark_indexed(&mut self, path: &str, content: &str) {
        if !is_indexable(path) {
            return;
        }
        self.hashes.insert(path.to_string(), compute_hash(content));
        self.checked.insert(path.to_string(), Utc::now());
    }

    /// Paths whose content changed, in input order. Nothing is recorded;
    /// call [`mark_indexed`](FileHashTracker::mark_indexed) once a file is
    /// stored.
    pub fn get_changed_files<I, P, C>(&self, files: I) -> Vec<String>
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: AsRef<str>,
    {
        files
            .into_iter()
            .filter_map(|(path, content)| {
                let path = path.as_ref();
                self.is_changed(path, content.as_ref())
                    .then(|| path.to_string())
            })
            .collect()
    }

    pub fn remove_file(&mut self, path: &str) {
        self.hashes.remove(path);
        self.checked.remove(path);
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
        self.checked.clear();
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            total_files: self.hashes.len(),
            oldest_check: self.checked.values().min().copied(),
            newest_check: self.checked.values().max().copied(),
        }
    }
}
