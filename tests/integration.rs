use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn memory_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_memory"))
}

/// Config with a file-backed store and the hash embedder, plus a small
/// source tree under `src/`.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let src_dir = root.join("src");
    fs::create_dir_all(src_dir.join("target")).unwrap();
    fs::write(
        src_dir.join("app.py"),
        "import os\n\n\ndef load_settings():\n    return os.environ\n\n\ndef connect_database(url):\n    return url\n",
    )
    .unwrap();
    fs::write(
        src_dir.join("target").join("generated.py"),
        "def generated():\n    pass\n",
    )
    .unwrap();
    fs::write(src_dir.join("README.md"), "# Notes\n\nNot indexed.\n").unwrap();

    let config_content = format!(
        r#"[store]
local_path = "{}/data/memory.json"
collection_name = "memory"

[embedding]
provider = "hash"
dims = 64

[indexing]
exclude_globs = ["**/target/**"]

[server]
bind = "127.0.0.1:7341"
"#,
        root.display()
    );

    let config_path = config_dir.join("memory.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_memory(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = memory_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("QDRANT_URL")
        .env_remove("QDRANT_LOCAL_PATH")
        .env_remove("COLLECTION_NAME")
        .env_remove("QDRANT_READ_ONLY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run memory binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_store_then_search_persists_across_runs() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_memory(
        &config_path,
        &[
            "store",
            "Decision: use PostgreSQL for billing",
            "--category",
            "decision",
            "--tags",
            "db,billing",
        ],
    );
    assert!(success, "store failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Stored decision: Decision: use PostgreSQL for billing"));
    assert!(stdout.contains("(tags: db,billing)"));

    let (stdout, stderr, success) =
        run_memory(&config_path, &["search", "PostgreSQL billing database"]);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Decisions (1)"), "stdout={}", stdout);
    assert!(stdout.contains("use PostgreSQL for billing"));
}

#[test]
fn test_store_unknown_category_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_memory(
        &config_path,
        &["store", "something", "--category", "nonsense"],
    );
    assert!(!success);
    assert!(stderr.contains("unknown category"), "stderr={}", stderr);
}

#[test]
fn test_index_skips_excluded_and_unindexable() {
    let (tmp, config_path) = setup_test_env();
    let src = tmp.path().join("src");

    let (stdout, stderr, success) = run_memory(
        &config_path,
        &["index", src.to_str().unwrap(), "--workspace", "My Project"],
    );
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("from 1 total files"), "stdout={}", stdout);
    assert!(stdout.contains("Languages: python"));

    let (stdout, _, success) = run_memory(&config_path, &["workspaces"]);
    assert!(success);
    assert!(stdout.contains("• my-project: 1 files"), "stdout={}", stdout);

    let (stdout, _, success) = run_memory(&config_path, &["status", "--workspace", "my-project"]);
    assert!(success);
    assert!(stdout.contains("Files Tracked: 1"));
    assert!(stdout.contains("Index is healthy and current"));
}

#[test]
fn test_workspaces_empty() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_memory(&config_path, &["workspaces"]);
    assert!(success);
    assert!(stdout.contains("No workspaces indexed yet"));
}

#[test]
fn test_janitor_runs_on_empty_store() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_memory(&config_path, &["janitor"]);
    assert!(success, "janitor failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Maintenance complete"));
    assert!(stdout.contains("Total actions: 0"));
}

#[test]
fn test_migrate_dry_run_on_empty_store() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_memory(&config_path, &["migrate", "--dry-run"]);
    assert!(success, "migrate failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Would migrate 0 of 0 points"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config").join("bad.toml");
    fs::write(&bad, "[embedding]\nprovider = \"carrier-pigeon\"\n").unwrap();
    let (_, stderr, success) = run_memory(&bad, &["workspaces"]);
    assert!(!success);
    assert!(stderr.contains("Unknown embedding provider"), "stderr={}", stderr);
}

#[test]
fn test_completions_need_no_config() {
    let (stdout, _, success) = run_memory(Path::new("/nonexistent/memory.toml"), &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("memory"));
}
