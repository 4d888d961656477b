use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{
    Receiver, RecvTimeoutError, Sender, TryRecvError, bounded, select, unbounded,
};

use crate::ResgenError;
use crate::telemetry::targets;
use crate::telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
use crate::types::{Job, JobResult, Outcome, Result};

/// Fixed-size pool of worker threads sharing one job queue.
///
/// Jobs are pulled from a single multi-consumer queue; outcomes come back on
/// a single channel in completion order. Cancellation is advisory: it stops
/// workers from pulling new jobs but never interrupts a job in flight.
pub struct WorkerPool {
    num_workers: usize,
    telemetry: Arc<dyn WorkerTelemetry>,
}

impl WorkerPool {
    /// Creates a worker pool using the default worker telemetry implementation.
    pub fn new(num_workers: usize) -> Self {
        Self::with_telemetry(num_workers, Arc::new(DefaultWorkerTelemetry))
    }

    /// Creates a worker pool with a custom telemetry backend.
    pub fn with_telemetry(num_workers: usize, telemetry: Arc<dyn WorkerTelemetry>) -> Self {
        Self {
            num_workers: num_workers.max(1),
            telemetry,
        }
    }

    /// Number of workers configured in this pool.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Spawns worker threads and returns a handle for submission and collection.
    ///
    /// `processor` runs once per job on whichever worker pulled it. An error or
    /// a panic becomes a [`ResgenError::Job`] outcome and stops that worker.
    pub fn spawn<F>(&self, processor: F) -> WorkerPoolHandle
    where
        F: Fn(usize, &Job) -> Result<JobResult> + Send + Sync + 'static,
    {
        let (jobs_tx, jobs_rx) = unbounded();
        let (outcomes_tx, outcomes_rx) = unbounded();
        let (cancel_tx, cancel_rx) = bounded::<()>(0);
        let state = Arc::new(WorkerPoolState::new(
            Arc::clone(&self.telemetry),
            self.num_workers,
        ));
        let processor = Arc::new(processor);

        let mut worker_handles = Vec::with_capacity(self.num_workers);
        for worker_id in 0..self.num_workers {
            let channels = WorkerChannels {
                jobs: jobs_rx.clone(),
                cancel: cancel_rx.clone(),
                outcomes: outcomes_tx.clone(),
            };
            let worker_state = Arc::clone(&state);
            let worker_processor = Arc::clone(&processor);

            let handle = thread::Builder::new()
                .name(format!("resgen-worker-{worker_id}"))
                .spawn(move || {
                    run_worker_loop(worker_id, channels, worker_state, worker_processor);
                });
            match handle {
                Ok(handle) => worker_handles.push(handle),
                Err(error) => {
                    tracing::warn!(
                        target: targets::WORKER,
                        worker_id,
                        %error,
                        "failed to spawn worker thread"
                    );
                }
            }
        }

        drop(outcomes_tx);

        WorkerPoolHandle {
            state,
            jobs_tx: Some(jobs_tx),
            cancel_tx: Some(cancel_tx),
            outcomes_rx,
            worker_handles,
        }
    }
}

struct WorkerPoolState {
    telemetry: Arc<dyn WorkerTelemetry>,
    started_at: Instant,
    submitted: AtomicUsize,
    completed: AtomicUsize,
    in_flight: AtomicUsize,
    task_counts: Vec<AtomicUsize>,
    worker_busy_us: Vec<AtomicU64>,
}

impl WorkerPoolState {
    fn new(telemetry: Arc<dyn WorkerTelemetry>, num_workers: usize) -> Self {
        Self {
            telemetry,
            started_at: Instant::now(),
            submitted: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            task_counts: (0..num_workers).map(|_| AtomicUsize::new(0)).collect(),
            worker_busy_us: (0..num_workers).map(|_| AtomicU64::new(0)).collect(),
        }
    }
}

struct WorkerChannels {
    jobs: Receiver<Job>,
    cancel: Receiver<()>,
    outcomes: Sender<Outcome>,
}

/// Per-worker runtime metrics captured by the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerRuntimeSnapshot {
    pub worker_id: usize,
    pub tasks_completed: usize,
    pub busy: Duration,
}

/// Runtime metrics snapshot for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolRuntimeSnapshot {
    pub elapsed: Duration,
    pub submitted: usize,
    pub completed: usize,
    pub workers: Vec<WorkerRuntimeSnapshot>,
}

/// What happened while waiting for workers to stop after a cancellation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Outcomes that arrived after the pool was cancelled.
    pub discarded: usize,
    /// Workers that exited and were joined.
    pub joined: usize,
    /// Workers still running when the deadline passed.
    pub detached: usize,
}

/// Runtime handle for a spawned worker pool.
pub struct WorkerPoolHandle {
    state: Arc<WorkerPoolState>,
    jobs_tx: Option<Sender<Job>>,
    cancel_tx: Option<Sender<()>>,
    outcomes_rx: Receiver<Outcome>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    /// Queues a job for the next free worker.
    pub fn submit(&self, job: Job) -> Result<()> {
        let Some(jobs_tx) = &self.jobs_tx else {
            return Err(ResgenError::Worker(
                "job queue is closed; no new work accepted".to_string(),
            ));
        };

        jobs_tx
            .send(job)
            .map_err(|_| ResgenError::Worker("all workers have stopped".to_string()))?;
        self.state.submitted.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Signals end of input. Workers exit once the queue is drained.
    pub fn close(&mut self) {
        self.jobs_tx = None;
    }

    /// Asks every worker to stop pulling jobs.
    pub fn cancel(&mut self) {
        if self.cancel_tx.take().is_some() {
            tracing::debug!(target: targets::WORKER, "worker pool cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_tx.is_none()
    }

    /// Blocks for the next outcome. Returns `None` once every worker has exited
    /// and all outcomes have been received.
    pub fn recv(&self) -> Option<Outcome> {
        self.outcomes_rx.recv().ok()
    }

    /// Receives one outcome, waiting up to `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Outcome> {
        match self.outcomes_rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn submitted_count(&self) -> usize {
        self.state.submitted.load(Ordering::Acquire)
    }

    pub fn completed_count(&self) -> usize {
        self.state.completed.load(Ordering::Acquire)
    }

    /// Jobs currently being processed by some worker.
    pub fn in_flight_count(&self) -> usize {
        self.state.in_flight.load(Ordering::Acquire)
    }

    /// Per-worker processed task counts.
    pub fn worker_task_counts(&self) -> Vec<usize> {
        self.state
            .task_counts
            .iter()
            .map(|counter| counter.load(Ordering::Acquire))
            .collect()
    }

    /// Returns runtime metrics for the pool and each worker.
    pub fn runtime_snapshot(&self) -> PoolRuntimeSnapshot {
        let workers = (0..self.state.task_counts.len())
            .map(|worker_id| WorkerRuntimeSnapshot {
                worker_id,
                tasks_completed: self.state.task_counts[worker_id].load(Ordering::Acquire),
                busy: Duration::from_micros(
                    self.state.worker_busy_us[worker_id].load(Ordering::Acquire),
                ),
            })
            .collect();

        PoolRuntimeSnapshot {
            elapsed: self.state.started_at.elapsed(),
            submitted: self.submitted_count(),
            completed: self.completed_count(),
            workers,
        }
    }

    /// Closes the queue and joins every worker.
    ///
    /// Meant for the success path, after all outcomes have been received.
    pub fn finish(mut self) -> Result<PoolRuntimeSnapshot> {
        self.close();
        self.join_workers().map_err(ResgenError::Worker)?;
        Ok(self.runtime_snapshot())
    }

    /// Cancels the pool and waits, up to `timeout`, for every worker to exit.
    ///
    /// Outcomes arriving in the meantime are discarded. Workers still busy at
    /// the deadline are detached; they finish their current job, find the
    /// outcome channel closed, and exit on their own.
    pub fn drain(mut self, timeout: Duration) -> DrainReport {
        self.cancel();
        self.close();

        let deadline = Instant::now() + timeout;
        let mut report = DrainReport::default();
        let all_exited = loop {
            match self.outcomes_rx.recv_deadline(deadline) {
                Ok(_) => report.discarded += 1,
                Err(RecvTimeoutError::Disconnected) => break true,
                Err(RecvTimeoutError::Timeout) => break false,
            }
        };

        // A disconnected outcome channel means every worker has left its
        // loop, so joining cannot block on a job.
        for handle in self.worker_handles.drain(..) {
            if all_exited || handle.is_finished() {
                let _ = handle.join();
                report.joined += 1;
            } else {
                report.detached += 1;
            }
        }

        if report.detached > 0 {
            tracing::warn!(
                target: targets::WORKER,
                detached = report.detached,
                timeout_ms = timeout.as_millis() as u64,
                "workers still busy after cancellation; detaching"
            );
        }
        report
    }

    fn join_workers(&mut self) -> std::result::Result<(), String> {
        for handle in self.worker_handles.drain(..) {
            if let Err(payload) = handle.join() {
                return Err(format!("worker thread panicked: {}", panic_message(&*payload)));
            }
        }

        Ok(())
    }
}

impl Drop for WorkerPoolHandle {
    fn drop(&mut self) {
        self.cancel_tx = None;
        self.jobs_tx = None;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn is_cancelled(cancel: &Receiver<()>) -> bool {
    matches!(cancel.try_recv(), Err(TryRecvError::Disconnected))
}

fn run_worker_loop<F>(
    worker_id: usize,
    channels: WorkerChannels,
    state: Arc<WorkerPoolState>,
    processor: Arc<F>,
) where
    F: Fn(usize, &Job) -> Result<JobResult> + Send + Sync,
{
    let mut cancelled = false;

    loop {
        if is_cancelled(&channels.cancel) {
            cancelled = true;
            break;
        }

        let job = select! {
            recv(channels.cancel) -> _ => {
                cancelled = true;
                break;
            }
            recv(channels.jobs) -> job => match job {
                Ok(job) => job,
                Err(_) => break,
            },
        };

        state.in_flight.fetch_add(1, Ordering::AcqRel);
        state.telemetry.on_task_started(worker_id, &job.name);
        let started_at = Instant::now();

        let result = match catch_unwind(AssertUnwindSafe(|| processor(worker_id, &job))) {
            Ok(result) => result,
            Err(payload) => Err(ResgenError::Worker(format!(
                "worker panicked: {}",
                panic_message(&*payload)
            ))),
        };

        let elapsed = started_at.elapsed();
        let elapsed_us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        state.worker_busy_us[worker_id].fetch_add(elapsed_us, Ordering::AcqRel);
        let failed = result.is_err();
        if failed {
            state.telemetry.on_task_failed(worker_id, &job.name, elapsed);
        } else {
            state.telemetry.on_task_finished(worker_id, &job.name, elapsed);
        }

        state.completed.fetch_add(1, Ordering::AcqRel);
        state.task_counts[worker_id].fetch_add(1, Ordering::AcqRel);
        state.in_flight.fetch_sub(1, Ordering::AcqRel);

        let outcome = result.map_err(|error| error.for_job(job.name));
        if channels.outcomes.send(outcome).is_err() || failed {
            break;
        }
    }

    let tasks_completed = state.task_counts[worker_id].load(Ordering::Acquire);
    state
        .telemetry
        .on_worker_stopped(worker_id, tasks_completed, cancelled);
}
