use serde::{Deserialize, Serialize};

use crate::error::ResgenError;

pub type Result<T> = std::result::Result<T, ResgenError>;

/// One unit of pipeline work: the name of a single source blob.
///
/// Jobs carry no other state. A job is handed to exactly one worker and
/// dropped once that worker has reported an outcome for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Job {
    pub name: String,
}

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Successful outcome of a [`Job`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub name: String,
    /// Bytes read from the source blob.
    pub size: u64,
    /// Bytes of compressed payload, or 0 when the encoder stored the blob as-is.
    pub compressed_size: u64,
}

impl JobResult {
    pub fn new(name: impl Into<String>, encoded: Encoded) -> Self {
        Self {
            name: name.into(),
            size: encoded.size,
            compressed_size: encoded.compressed_size,
        }
    }
}

/// Sizes reported by an encoder for one resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Encoded {
    pub size: u64,
    pub compressed_size: u64,
}

/// What a worker sends back for each job it pulled.
///
/// Failures are always [`ResgenError::Job`] so the orchestrator can name the
/// resource that stopped the run.
pub type Outcome = std::result::Result<JobResult, ResgenError>;
