use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compression::Level;
use crate::encode::TargetKind;
use crate::types::JobResult;

/// How long a failed run waits for in-flight jobs before detaching workers.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Run-level knobs for a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Compression effort used by every compressor in the run.
    pub level: Level,
    /// Output format for staged entries.
    pub target: TargetKind,
    /// Skips the encoder's finalize step (no index or manifest is written).
    pub skip_finalize: bool,
    /// Worker thread count. Capped to the number of matched resources.
    pub workers: usize,
    /// Upper bound on waiting for workers to stop after a failure.
    pub drain_timeout: Duration,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            level: Level::default(),
            target: TargetKind::default(),
            skip_finalize: false,
            workers: num_cpus::get(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// What a successful build did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSummary {
    /// Per-resource results in completion order.
    pub results: Vec<JobResult>,
    /// Destination entry names, in the order they were committed.
    pub committed: Vec<String>,
    /// Whether the encoder's finalize step ran.
    pub finalized: bool,
    /// Worker threads used. Zero when nothing matched.
    pub workers: usize,
    pub elapsed: Duration,
}

impl BuildSummary {
    pub fn input_bytes_total(&self) -> u64 {
        self.results.iter().map(|result| result.size).sum()
    }

    pub fn compressed_bytes_total(&self) -> u64 {
        self.results.iter().map(|result| result.compressed_size).sum()
    }
}
