//! Encoders turn one source blob into staged output.
//!
//! An encoder is prepared once per run from the staging filesystem and a
//! compressor factory. Workers call [`Encoder::encode`] concurrently, one
//! resource per call; the orchestrator calls [`Encoder::finalize`] once after
//! every job has succeeded.

use std::fmt;
use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compression::{CompressorFactory, CompressorPool};
use crate::error::ResgenError;
use crate::fs::Fs;
use crate::types::{Encoded, Result};

pub mod copy;
pub mod raw;
pub mod rust;

pub use copy::CopyEncoder;
pub use raw::RawEncoder;
pub use rust::RustEncoder;

pub trait Encoder: Send + Sync {
    /// Reads `input` to the end and writes the staged output for `name`.
    fn encode(&self, name: &str, input: &mut dyn Read) -> Result<Encoded>;

    /// Writes any cross-resource output, such as an index.
    fn finalize(&self) -> Result<()>;
}

/// Built-in output formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    /// One LZ4 frame per resource, stored under the resource's own name.
    #[default]
    Raw,
    /// Generated Rust modules with static byte arrays and a `mod.rs` index.
    Rust,
    /// Uncompressed copies.
    Copy,
}

impl TargetKind {
    pub const ALL: [TargetKind; 3] = [TargetKind::Raw, TargetKind::Rust, TargetKind::Copy];

    /// Builds the encoder for this target, writing into `target`.
    ///
    /// `workers` bounds how many compressors are kept for reuse; it should
    /// match the number of workers calling `encode` concurrently.
    pub fn prepare(
        self,
        target: Arc<dyn Fs>,
        factory: Arc<dyn CompressorFactory>,
        workers: usize,
    ) -> Arc<dyn Encoder> {
        let compressors = CompressorPool::new(factory, workers);
        match self {
            TargetKind::Raw => Arc::new(RawEncoder::new(target, compressors)),
            TargetKind::Rust => Arc::new(RustEncoder::new(target, compressors)),
            TargetKind::Copy => Arc::new(CopyEncoder::new(target)),
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetKind::Raw => "raw",
            TargetKind::Rust => "rust",
            TargetKind::Copy => "copy",
        };
        f.write_str(name)
    }
}

impl FromStr for TargetKind {
    type Err = ResgenError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "raw" | "lz4" => Ok(TargetKind::Raw),
            "rust" | "rs" => Ok(TargetKind::Rust),
            "copy" | "none" => Ok(TargetKind::Copy),
            other => Err(ResgenError::InvalidConfig(format!("unknown target '{other}'"))),
        }
    }
}
