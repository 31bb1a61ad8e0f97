//! # Memory Harness
//!
//! Semantic memory for AI coding assistants.
//!
//! Memory Harness keeps decisions, patterns, free-form notes and indexed
//! source code in a vector database, and answers natural-language queries
//! against them with workspace, category, language and time filters. The
//! same operations are exposed as tools over HTTP and MCP (stdio) and as
//! CLI subcommands.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────┐
//! │  CLI / MCP  │──▶│ MemoryService│──▶│StorageConnector│
//! │  HTTP tools │   │ chunk+filter │   │ embed+rerank   │
//! └─────────────┘   └──────────────┘   └───────┬───────┘
//!                                              │
//!                         ┌────────────────────┼──────────────┐
//!                         ▼                    ▼              ▼
//!                    ┌─────────┐        ┌────────────┐  ┌──────────┐
//!                    │ Qdrant  │        │ LocalStore │  │ InMemory │
//!                    │  (HTTP) │        │ (snapshot) │  │          │
//!                    └─────────┘        └────────────┘  └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! memory store "Use PostgreSQL for the billing service" --category decision
//! memory index . --workspace my-project
//! memory search "database choice" --workspace my-project
//! memory janitor
//! memory serve mcp              # stdio MCP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`embedding`] | OpenAI, Ollama, local and hash embedders |
//! | [`qdrant`] | Qdrant REST vector store |
//! | [`local_store`] | File-backed vector store |
//! | [`service`] | Memory operations shared by every surface |
//! | [`tools`] | Tool trait, registry and parameter validation |
//! | [`server`] | HTTP tool server |
//! | [`mcp`] | MCP stdio bridge |
//! | [`migrate`] | Legacy payload migration |
//! | [`progress`] | CLI progress reporters |

pub mod config;
pub mod embedding;
pub mod local_store;
pub mod mcp;
pub mod migrate;
pub mod progress;
pub mod qdrant;
pub mod server;
pub mod service;
pub mod tools;
