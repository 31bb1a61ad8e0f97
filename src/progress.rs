//! Progress rendering for long-running commands.
//!
//! Renders core [`ProgressEvent`]s from `memory index` and `memory janitor`
//! on **stderr** so stdout stays parseable (and free for the MCP stdio
//! transport). Human mode prints one line per event; JSON mode prints the
//! event itself as one JSON object per line.

use std::io::Write;
use std::sync::Arc;

use memory_harness_core::progress::{NoProgress, ProgressEvent, ProgressReporter};

/// Human-friendly progress: `index  batch 2 / 7  (10 files)`.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::IndexBatch {
                batch,
                total_batches,
                files,
            } => format!(
                "index  batch {} / {}  ({} files)\n",
                format_number(*batch as u64),
                format_number(*total_batches as u64),
                format_number(*files as u64)
            ),
            ProgressEvent::FileSkipped { path } => format!("index  unchanged  {}\n", path),
            ProgressEvent::ChunksStored { path, stored } => {
                format!("index  {}  {} chunks\n", path, format_number(*stored as u64))
            }
            ProgressEvent::JanitorPhase { phase, actions } => {
                format!("janitor  {}  {} actions\n", phase, format_number(*actions as u64))
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Arc<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn test_mode_parses_from_cli_values() {
        use clap::ValueEnum;
        assert_eq!(ProgressMode::from_str("json", true), Ok(ProgressMode::Json));
        assert_eq!(ProgressMode::from_str("off", true), Ok(ProgressMode::Off));
    }
}
