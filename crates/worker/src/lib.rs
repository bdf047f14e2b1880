//! Tree worker for sizediff
//!
//! This crate provides:
//! - The request/reply protocol between a front end and the tree worker
//! - Debounced loads with periodic progress updates
//! - Record sources (in-memory snapshots, ndjson files, build history diffs)
//! - A client handle correlating replies with requests

pub mod client;
pub mod debounce;
pub mod protocol;
pub mod source;
pub mod worker;

use serde::{Deserialize, Serialize};
use std::time::Duration;

// Re-exports
pub use client::WorkerClient;
pub use protocol::{Action, LoadRequest, Request, TreeProgress, WorkerMessage};
pub use source::{BuildPair, DataSource, DiffSource, HistoryProvider, NdjsonSource, RecordStream, SnapshotFiles, StaticSource};
pub use worker::{spawn, TreeWorker, WorkerChannels};

fn default_progress_interval_ms() -> u64 {
    500
}

/// Worker tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Minimum time between progress updates of a load
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

impl WorkerConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}
