use std::time::Duration;

use crate::telemetry::targets;

/// Telemetry contract for worker runtimes.
///
/// The worker pool calls these hooks around every job so callers can attach
/// their own instrumentation without depending on a specific backend.
pub trait WorkerTelemetry: Send + Sync {
    fn on_task_started(&self, worker_id: usize, job: &str);
    fn on_task_finished(&self, worker_id: usize, job: &str, elapsed: Duration);
    fn on_task_failed(&self, worker_id: usize, job: &str, elapsed: Duration);
    fn on_worker_stopped(&self, worker_id: usize, tasks_completed: usize, cancelled: bool);
}

/// Default implementation that reports through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultWorkerTelemetry;

impl WorkerTelemetry for DefaultWorkerTelemetry {
    fn on_task_started(&self, worker_id: usize, job: &str) {
        tracing::trace!(target: targets::WORKER, worker_id, job, "task started");
    }

    fn on_task_finished(&self, worker_id: usize, job: &str, elapsed: Duration) {
        let elapsed_us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        tracing::debug!(
            target: targets::WORKER,
            worker_id,
            job,
            result = "ok",
            elapsed_us,
            "task finished"
        );
    }

    fn on_task_failed(&self, worker_id: usize, job: &str, elapsed: Duration) {
        let elapsed_us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        tracing::debug!(
            target: targets::WORKER,
            worker_id,
            job,
            result = "error",
            elapsed_us,
            "task failed"
        );
    }

    fn on_worker_stopped(&self, worker_id: usize, tasks_completed: usize, cancelled: bool) {
        tracing::trace!(
            target: targets::WORKER,
            worker_id,
            tasks_completed,
            cancelled,
            "worker stopped"
        );
    }
}
