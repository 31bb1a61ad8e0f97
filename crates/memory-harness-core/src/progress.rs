//! Progress observer.
//!
//! Long-running operations (bulk indexing, janitor cycles) report what
//! they are doing through a [`ProgressReporter`] instead of printing.
//! Renderers for humans and machines live in the app crate.

use serde::Serialize;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A batch of files is being analysed.
    IndexBatch {
        batch: usize,
        total_batches: usize,
        files: usize,
    },
    /// A file was skipped because its content is unchanged.
    FileSkipped { path: String },
    /// New chunks of a file were stored.
    ChunksStored { path: String, stored: usize },
    /// A janitor phase finished.
    JanitorPhase { phase: String, actions: usize },
}

/// Receives progress events. Must not block.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards all events.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let v = serde_json::to_value(ProgressEvent::ChunksStored {
            path: "a.py".into(),
            stored: 3,
        })
        .unwrap();
        assert_eq!(
            v,
            serde_json::json!({"event": "chunks_stored", "path": "a.py", "stored": 3})
        );
    }
}
