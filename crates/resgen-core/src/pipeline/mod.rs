use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;

use crate::compression::{self, CompressorFactory};
use crate::core::WorkerPool;
use crate::encode::Encoder;
use crate::error::ResgenError;
use crate::fs::{self, Entry, Fs, MemFs};
use crate::matcher::Matcher;
use crate::report;
use crate::telemetry::targets;
use crate::telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
use crate::types::{Job, JobResult, Result};

pub mod types;

pub use types::{BuildOptions, BuildSummary, DEFAULT_DRAIN_TIMEOUT};

type EncoderBuilder =
    dyn Fn(Arc<dyn Fs>, Arc<dyn CompressorFactory>) -> Arc<dyn Encoder> + Send + Sync;

/// Builds a resource bundle from `source` into `dest`.
///
/// A run lists the source, keeps the entries accepted by the matcher, encodes
/// them in parallel into a fresh in-memory staging area, finalizes the
/// encoder, and finally moves every staged entry into the destination.
///
/// Nothing reaches the destination unless every job and the finalize step
/// succeeded. The commit itself is a sequence of moves: if one fails, the
/// entries moved before it stay in the destination and the run returns the
/// error.
pub struct BuildPipeline {
    source: Arc<dyn Fs>,
    dest: Arc<dyn Fs>,
    matcher: Arc<dyn Matcher>,
    options: BuildOptions,
    encoder_builder: Option<Box<EncoderBuilder>>,
    telemetry: Arc<dyn WorkerTelemetry>,
}

impl BuildPipeline {
    pub fn new(
        source: Arc<dyn Fs>,
        dest: Arc<dyn Fs>,
        matcher: impl Matcher + 'static,
        options: BuildOptions,
    ) -> Self {
        Self {
            source,
            dest,
            matcher: Arc::new(matcher),
            options,
            encoder_builder: None,
            telemetry: Arc::new(DefaultWorkerTelemetry),
        }
    }

    /// Replaces the encoder chosen by [`BuildOptions::target`].
    ///
    /// `build` receives the run's staging filesystem and compressor factory.
    pub fn with_encoder<F>(mut self, build: F) -> Self
    where
        F: Fn(Arc<dyn Fs>, Arc<dyn CompressorFactory>) -> Arc<dyn Encoder> + Send + Sync + 'static,
    {
        self.encoder_builder = Some(Box::new(build));
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn WorkerTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Lists the source and returns the entries a run would process, in
    /// listing order.
    pub fn plan(&self) -> Result<Vec<Entry>> {
        let listed = self.source.list().map_err(|error| {
            ResgenError::from(error).with_context(format!("reading {}", self.source))
        })?;

        Ok(listed
            .into_iter()
            .filter(|entry| {
                if !self.matcher.matches(&entry.name) {
                    return false;
                }
                if entry.is_dir() {
                    tracing::debug!(
                        target: targets::PIPELINE,
                        name = %entry.name,
                        "skipping directory; nested resources are not bundled"
                    );
                    return false;
                }
                true
            })
            .collect())
    }

    /// Runs the build without printing a report.
    pub fn run(&self) -> Result<BuildSummary> {
        self.run_with_report(&mut io::sink())
    }

    /// Runs the build and writes the per-resource report to `out` once every
    /// job has succeeded. Nothing is written on failure.
    pub fn run_with_report<W>(&self, out: &mut W) -> Result<BuildSummary>
    where
        W: Write + ?Sized,
    {
        let started_at = Instant::now();
        let entries = self.plan()?;

        let staging = MemFs::new();
        let staging_fs: Arc<dyn Fs> = Arc::new(staging.clone());
        let factory = compression::factory_for(self.options.level);
        let encoder = match &self.encoder_builder {
            Some(build) => build(Arc::clone(&staging_fs), factory),
            None => self
                .options
                .target
                .prepare(Arc::clone(&staging_fs), factory, self.options.workers),
        };

        tracing::info!(
            target: targets::PIPELINE,
            source = %self.source,
            dest = %self.dest,
            matched = entries.len(),
            level = %self.options.level,
            target_kind = %self.options.target,
            "starting build"
        );

        let (results, workers) = self.encode_all(&entries, &encoder)?;

        report::write_report(&results, out)
            .map_err(|error| ResgenError::from(error).with_context("writing report"))?;

        let finalized = if self.options.skip_finalize {
            false
        } else {
            encoder
                .finalize()
                .map_err(|error| error.with_context("finalizing encoder"))?;
            true
        };

        let committed = commit(&staging, self.dest.as_ref())?;

        let summary = BuildSummary {
            results,
            committed,
            finalized,
            workers,
            elapsed: started_at.elapsed(),
        };
        tracing::info!(
            target: targets::PIPELINE,
            resources = summary.results.len(),
            committed = summary.committed.len(),
            input_bytes = summary.input_bytes_total(),
            compressed_bytes = summary.compressed_bytes_total(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "build complete"
        );
        Ok(summary)
    }

    /// Fans the entries out to the worker pool and collects one outcome per
    /// entry. Stops at the first failure, after the pool has drained.
    fn encode_all(
        &self,
        entries: &[Entry],
        encoder: &Arc<dyn Encoder>,
    ) -> Result<(Vec<JobResult>, usize)> {
        if entries.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let workers = self.options.workers.clamp(1, entries.len());
        let pool = WorkerPool::with_telemetry(workers, Arc::clone(&self.telemetry));
        let source = Arc::clone(&self.source);
        let job_encoder = Arc::clone(encoder);
        let mut handle = pool.spawn(move |_worker_id, job| {
            let mut input = source.open(&job.name)?;
            let encoded = job_encoder.encode(&job.name, &mut *input)?;
            Ok(JobResult::new(job.name.clone(), encoded))
        });

        let mut submitted = 0usize;
        for entry in entries {
            if handle.submit(Job::new(entry.name.as_str())).is_err() {
                break;
            }
            submitted += 1;
        }
        handle.close();

        let mut results = Vec::with_capacity(submitted);
        for _ in 0..submitted {
            match handle.recv() {
                Some(Ok(result)) => {
                    tracing::debug!(
                        target: targets::PIPELINE,
                        name = %result.name,
                        size = result.size,
                        compressed_size = result.compressed_size,
                        "resource encoded"
                    );
                    results.push(result);
                }
                Some(Err(error)) => {
                    let drained = handle.drain(self.options.drain_timeout);
                    tracing::debug!(
                        target: targets::PIPELINE,
                        failed = error.job_name().unwrap_or_default(),
                        discarded = drained.discarded,
                        joined = drained.joined,
                        detached = drained.detached,
                        "build cancelled"
                    );
                    return Err(error);
                }
                None => {
                    handle.drain(self.options.drain_timeout);
                    return Err(ResgenError::Worker(
                        "workers stopped before every job reported".to_string(),
                    ));
                }
            }
        }

        if submitted < entries.len() {
            handle.drain(self.options.drain_timeout);
            return Err(ResgenError::Worker(format!(
                "only {submitted} of {} jobs could be queued",
                entries.len()
            )));
        }

        handle.finish()?;
        Ok((results, workers))
    }
}

/// Moves every staged entry into `dest`, in staging listing order.
fn commit(staging: &dyn Fs, dest: &dyn Fs) -> Result<Vec<String>> {
    let staged = staging
        .list()
        .map_err(|error| ResgenError::from(error).with_context("reading staging area"))?;

    let mut committed = Vec::with_capacity(staged.len());
    for entry in staged {
        fs::move_entry(staging, dest, &entry.name, &entry.name).map_err(|error| {
            ResgenError::from(error).with_context(format!("committing {}", entry.name))
        })?;
        tracing::debug!(target: targets::COMMIT, name = %entry.name, "committed");
        committed.push(entry.name);
    }

    Ok(committed)
}
