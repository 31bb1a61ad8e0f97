//! # Memory Harness Core
//!
//! Storage-agnostic logic for Memory Harness: data models, code chunking,
//! change tracking, query enhancement, filter construction, the vector
//! store abstraction, reranking, sparse BM25 scoring, usage extraction and
//! the memory janitor.
//!
//! This crate performs no network or filesystem I/O. Concrete vector stores
//! and embedding providers live in the `memory-harness` app crate and plug in
//! through [`store::VectorStore`] and [`embedding::Embedder`].
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Entries, categories, code chunks, metadata helpers |
//! | [`chunk`] | Structural code chunker with whole-file fallback |
//! | [`tracker`] | Content-hash change tracker for incremental indexing |
//! | [`query`] | Query expansion and identifier normalization |
//! | [`filter`] | Declarative filter fields and the native filter type |
//! | [`store`] | Vector store trait and in-memory implementation |
//! | [`embedding`] | Embedder trait and vector utilities |
//! | [`rerank`] | Second-pass rerankers |
//! | [`sparse`] | BM25 sparse embedder and hybrid scoring |
//! | [`usage`] | Usage examples and the relationship map |
//! | [`connector`] | Embed + upsert + search over a vector store |
//! | [`janitor`] | Maintenance phases over the full memory set |
//! | [`progress`] | Progress observer trait |

pub mod chunk;
pub mod connector;
pub mod embedding;
pub mod filter;
pub mod janitor;
pub mod models;
pub mod progress;
pub mod query;
pub mod rerank;
pub mod sparse;
pub mod store;
pub mod tracker;
pub mod usage;
