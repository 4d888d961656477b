pub mod compression;
pub mod config;
pub mod core;
pub mod encode;
pub mod error;
pub mod fs;
pub mod matcher;
pub mod pipeline;
pub mod report;
pub mod telemetry;
pub mod types;

pub use compression::{
    Compressor, CompressorFactory, CompressorPool, Level, Lz4Compressor, Lz4Factory,
    PooledCompressor, factory_for,
};
pub use config::{BuildConfig, CliOverrides};
pub use crate::core::{DrainReport, PoolRuntimeSnapshot, WorkerPool, WorkerPoolHandle};
pub use encode::{CopyEncoder, Encoder, RawEncoder, RustEncoder, TargetKind};
pub use error::ResgenError;
pub use fs::{DiskFs, Entry, EntryKind, Fs, MemFs, move_entry};
pub use matcher::{GlobMatcher, MatchAll, Matcher};
pub use pipeline::{BuildOptions, BuildPipeline, BuildSummary};
pub use report::{describe, render_size, write_report};
pub use telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
pub use types::{Encoded, Job, JobResult, Outcome, Result};
