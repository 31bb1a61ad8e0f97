//! Query enhancement.
//!
//! Search queries are rewritten before embedding to improve recall:
//!
//! - **Code-like queries** (`getUserData`, `parse_config`, `def run`) keep
//!   the original text and append a normalized, space-separated form so
//!   both the identifier and its words match.
//! - **Natural-language queries** get abbreviation expansion
//!   (`db` → `database`) and a few synonyms per recognized term.
//!
//! [`QueryEnhancer::extract_filters`] also suggests a language and tag
//! from the query text. Suggestions only bias ranking; they never filter.

use regex::Regex;
use serde::Serialize;
use tracing::debug;

const ABBREVIATIONS: &[(&str, &str)] = &[
    ("db", "database"),
    ("auth", "authentication"),
    ("repo", "repository"),
    ("config", "configuration"),
    ("util", "utility"),
    ("impl", "implementation"),
    ("mgr", "manager"),
    ("svc", "service"),
    ("msg", "message"),
    ("req", "request"),
    ("res", "response"),
    ("ctx", "context"),
    ("env", "environment"),
    ("init", "initialize"),
    ("conn", "connection"),
    ("async", "asynchronous"),
];

const SYNONYMS: &[(&str, &[&str])] = &[
    ("auth", &["authentication", "login", "authorize"]),
    ("database", &["db", "storage", "datastore"]),
    ("api", &["endpoint", "route", "handler"]),
    ("error", &["exception", "failure", "issue"]),
    ("config", &["configuration", "settings", "options"]),
    ("test", &["testing", "unittest", "spec"]),
    ("async", &["asynchronous", "concurrent", "parallel"]),
    ("cache", &["caching", "memoize", "store"]),
];

const LANGUAGES: &[&str] = &["python", "javascript", "typescript", "java", "rust", "go"];

const TAG_HINTS: &[(&[&str], &str)] = &[
    (&["test", "testing", "unittest"], "test"),
    (&["api", "endpoint", "route"], "api"),
    (&["database", "db", "query"], "database"),
    (&["auth", "authentication", "login"], "authentication"),
];

const CODE_PATTERNS: &[&str] = &[
    r"[a-z]+[A-Z]",
    r"[A-Z][a-z]+[A-Z]",
    r"\w+_\w+",
    r"def\s+\w+",
    r"class\s+\w+",
    r"\w+\(\)",
];

/// Filters suggested by the query text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuggestedFilters {
    pub language: Option<String>,
    pub tag: Option<String>,
}

impl SuggestedFilters {
    pub fn is_empty(&self) -> bool {
        self.language.is_none() && self.tag.is_none()
    }
}

/// Rewrites queries for better recall. Pure and deterministic.
#[derive(Debug, Clone)]
pub struct QueryEnhancer {
    code_patterns: Vec<Regex>,
    camel_split: Regex,
    whitespace: Regex,
    /// Synonyms appended per recognized term.
    pub max_synonyms: usize,
}

impl QueryEnhancer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            code_patterns: CODE_PATTERNS
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<_, _>>()?,
            camel_split: Regex::new(r"([a-z])([A-Z])")?,
            whitespace: Regex::new(r"\s+")?,
            max_synonyms: 2,
        })
    }

    /// Whether the query looks like code (identifiers, definitions, calls).
    pub fn is_code_query(&self, query: &str) -> bool {
        self.code_patterns.iter().any(|re| re.is_match(query))
    }

    /// `getUserData some_value` → `get user data some value`.
    pub fn normalize_identifiers(&self, query: &str) -> String {
        let split = self.camel_split.replace_all(query, "$1 $2");
        let spaced = split.replace('_', " ").to_lowercase();
        self.whitespace.replace_all(spaced.trim(), " ").into_owned()
    }

    /// Enhance a query. With `enable_expansion` off, natural-language
    /// queries pass through unchanged.
    pub fn enhance(&self, query: &str, enable_expansion: bool) -> String {
        let enhanced = if self.is_code_query(query) {
            let normalized = self.normalize_identifiers(query);
            if normalized != query.to_lowercase() {
                format!("{} {}", query, normalized)
            } else {
                query.to_string()
            }
        } else if enable_expansion {
            self.expand(query)
        } else {
            query.to_string()
        };
        debug!(query, enhanced = %enhanced, "query enhanced");
        enhanced
    }

    fn expand(&self, query: &str) -> String {
        let mut words: Vec<String> = Vec::new();

        for word in query.to_lowercase().split_whitespace() {
            push_unique(&mut words, word);
            if let Some(long) = lookup(ABBREVIATIONS, &clean_word(word)) {
                push_unique(&mut words, long);
            }
        }

        let expanded = words.clone();
        for word in &expanded {
            if let Some(synonyms) = lookup(SYNONYMS, &clean_word(word)) {
                let fresh: Vec<&str> = synonyms
                    .iter()
                    .copied()
                    .filter(|s| !words.iter().any(|w| w.as_str() == *s))
                    .take(self.max_synonyms)
                    .collect();
                for s in fresh {
                    push_unique(&mut words, s);
                }
            }
        }
        words.join(" ")
    }

    /// Suggest a language and tag from the query words.
    pub fn extract_filters(&self, query: &str) -> SuggestedFilters {
        let lower = query.to_lowercase();
        let words: Vec<String> = lower.split_whitespace().map(clean_word).collect();
        let has = |w: &str| words.iter().any(|x| x == w);

        SuggestedFilters {
            language: LANGUAGES
                .iter()
                .find(|l| has(l))
                .map(|l| l.to_string()),
            tag: TAG_HINTS
                .iter()
                .find(|(triggers, _)| triggers.iter().any(|t| has(t)))
                .map(|(_, tag)| tag.to_string()),
        }
    }
}

fn push_unique(words: &mut Vec<String>, word: &str) {
    if !words.iter().any(|w| w == word) {
        words.push(word.to_string());
    }
}

fn clean_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

fn lookup<T: Copy>(table: &[(&str, T)], key: &str) -> Option<T> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}
