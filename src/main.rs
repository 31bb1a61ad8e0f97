//! # Memory Harness CLI (`memory`)
//!
//! Every command reads the TOML file given by `--config` (default
//! `./config/memory.toml`). When that file does not exist the CLI runs with
//! an in-memory store and the hash embedder, which is enough to try the
//! commands out but keeps nothing between runs.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `memory store "<text>"` | Store a memory, decision or pattern |
//! | `memory search "<query>"` | Semantic search with filters |
//! | `memory index <dir> --workspace <ws>` | Index a source tree |
//! | `memory update <dir> --workspace <ws>` | Re-index changed files only |
//! | `memory status --workspace <ws>` | Index health for a workspace |
//! | `memory workspaces` | List indexed workspaces |
//! | `memory janitor` | Run a maintenance cycle |
//! | `memory migrate` | Rewrite legacy `content` payloads |
//! | `memory serve http` / `memory serve mcp` | Start a tool server |
//! | `memory completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! memory store "Decision: use PostgreSQL" --category decision --tags db,infra
//! memory index ./ --workspace my-project --progress human
//! memory search "connection pooling" --workspace my-project --since 2024-01-01
//! memory serve mcp --config ./config/memory.toml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use globset::{Glob, GlobSet, GlobSetBuilder};
use memory_harness::config::{self, Config};
use memory_harness::migrate::migrate_payloads;
use memory_harness::progress::ProgressMode;
use memory_harness::service::{MemoryService, SearchRequest, StoreRequest};
use memory_harness::{mcp, server};
use memory_harness_core::tracker::is_indexable;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Memory Harness CLI: semantic memory for AI coding assistants.
#[derive(Parser)]
#[command(
    name = "memory",
    about = "Memory Harness: semantic memory for AI coding assistants",
    version,
    long_about = "Memory Harness stores decisions, patterns, notes and indexed source code in a \
    vector database and answers natural-language queries with workspace, category, language and \
    time filters. The same operations are served as tools over HTTP and MCP."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/memory.toml`. A missing file means an
    /// in-memory store with the hash embedder.
    #[arg(long, global = true, default_value = "./config/memory.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a piece of information.
    Store {
        /// The text to remember.
        information: String,

        /// One of: decision, pattern, memory, codebase, architecture, error,
        /// lesson, other. Defaults to memory.
        #[arg(long)]
        category: Option<String>,

        /// Comma-separated tags.
        #[arg(long)]
        tags: Option<String>,

        #[arg(long)]
        language: Option<String>,

        #[arg(long)]
        project: Option<String>,
    },

    /// Search stored memories and indexed code.
    Search {
        query: String,

        #[arg(long)]
        workspace: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        language: Option<String>,

        /// Comma-separated tags; every tag must match.
        #[arg(long)]
        tags: Option<String>,

        /// Only entries at or after this time (RFC 3339 or YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Only entries at or before this time (RFC 3339 or YYYY-MM-DD).
        #[arg(long)]
        until: Option<String>,
    },

    /// Index every source file under a directory.
    ///
    /// Files matching `[indexing].exclude_globs` are skipped, as are
    /// extensions the change tracker does not index.
    Index {
        dir: PathBuf,

        #[arg(long)]
        workspace: String,

        /// Progress output on stderr. Defaults to human on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Re-index files under a directory that changed since the last run.
    Update {
        dir: PathBuf,

        #[arg(long)]
        workspace: String,
    },

    /// Show index health for a workspace.
    Status {
        #[arg(long)]
        workspace: String,
    },

    /// List indexed workspaces.
    Workspaces,

    /// Run one maintenance cycle over the collection.
    Janitor {
        /// Progress output on stderr. Defaults to human on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Rewrite legacy `content` payloads to `document`.
    Migrate {
        /// Report what would change without writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Start a tool server.
    Serve {
        #[command(subcommand)]
        transport: ServeTransport,
    },

    /// Print shell completions to stdout.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum ServeTransport {
    /// JSON tool API on `[server].bind`.
    Http,
    /// MCP over stdin/stdout.
    Mcp,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load(path: &Path) -> Result<Config> {
    if path.exists() {
        return config::load_config(path);
    }
    warn!(path = %path.display(), "config file not found; using in-memory defaults");
    let mut cfg = Config::minimal();
    cfg.apply_env();
    cfg.validate()?;
    Ok(cfg)
}

fn build_excludes(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern).with_context(|| format!("invalid exclude glob: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}

/// Collect `(relative path, content)` pairs under `dir` in walk order.
fn collect_files(dir: &Path, excludes: &GlobSet) -> Result<Vec<(String, String)>> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let rel = rel.to_string_lossy().replace('\\', "/");
        if excludes.is_match(&rel) || excludes.is_match(entry.path()) || !is_indexable(&rel) {
            continue;
        }
        let bytes = std::fs::read(entry.path())
            .with_context(|| format!("Failed to read {}", entry.path().display()))?;
        files.push((rel, String::from_utf8_lossy(&bytes).into_owned()));
    }
    Ok(files)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "memory", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Store {
            information,
            category,
            tags,
            language,
            project,
        } => {
            let service = MemoryService::from_config(cfg)?;
            let out = service
                .store(StoreRequest {
                    information,
                    category,
                    tags,
                    language,
                    project,
                    metadata: None,
                })
                .await?;
            println!("{}", out);
        }
        Commands::Search {
            query,
            workspace,
            category,
            language,
            tags,
            since,
            until,
        } => {
            let service = MemoryService::from_config(cfg)?;
            let out = service
                .search(SearchRequest {
                    query,
                    workspace_name: workspace,
                    category,
                    language,
                    tags,
                    since,
                    until,
                    filter: None,
                })
                .await?;
            println!("{}", out);
        }
        Commands::Index {
            dir,
            workspace,
            progress,
        } => {
            let excludes = build_excludes(&cfg.indexing.exclude_globs)?;
            let files = collect_files(&dir, &excludes)?;
            info!(dir = %dir.display(), files = files.len(), "collected files");
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let service = MemoryService::from_config(cfg)?.with_progress(mode.reporter());
            println!("{}", service.index_codebase(files, &workspace).await?);
        }
        Commands::Update { dir, workspace } => {
            let excludes = build_excludes(&cfg.indexing.exclude_globs)?;
            let files = collect_files(&dir, &excludes)?;
            let service = MemoryService::from_config(cfg)?;
            println!("{}", service.update_files(files, &workspace).await?);
        }
        Commands::Status { workspace } => {
            let service = MemoryService::from_config(cfg)?;
            println!("{}", service.index_status(&workspace).await?);
        }
        Commands::Workspaces => {
            let service = MemoryService::from_config(cfg)?;
            println!("{}", service.list_workspaces().await?);
        }
        Commands::Janitor { progress } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let service = MemoryService::from_config(cfg)?.with_progress(mode.reporter());
            println!("{}", service.run_janitor().await?);
        }
        Commands::Migrate { dry_run } => {
            let service = MemoryService::from_config(cfg)?;
            let report = migrate_payloads(service.connector(), None, dry_run).await?;
            let verb = if dry_run { "Would migrate" } else { "Migrated" };
            println!(
                "{} {} of {} points ({} already current).",
                verb, report.migrated, report.scanned, report.skipped
            );
        }
        Commands::Serve { transport } => {
            let service = Arc::new(MemoryService::from_config(cfg)?);
            match transport {
                ServeTransport::Http => server::run_server(service).await?,
                ServeTransport::Mcp => mcp::serve_stdio(service).await?,
            }
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_collect_files_applies_excludes_and_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("target/debug")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "fn a() {}\n").unwrap();
        std::fs::write(dir.path().join("target/debug/gen.rs"), "fn b() {}\n").unwrap();
        std::fs::write(dir.path().join("notes.bin"), [0xffu8, 0xfe]).unwrap();

        let excludes = build_excludes(&["**/target/**".to_string()]).unwrap();
        let files = collect_files(dir.path(), &excludes).unwrap();
        let paths: Vec<&str> = files.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["src/lib.rs"]);
    }

    #[test]
    fn test_collect_files_reads_invalid_utf8_lossily() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), [b'x', b'=', 0xff, b'\n']).unwrap();
        let files = collect_files(dir.path(), &GlobSet::empty()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].1.starts_with("x="));
    }
}
