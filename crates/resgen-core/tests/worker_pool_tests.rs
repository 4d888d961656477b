use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use resgen_core::{Job, JobResult, ResgenError, WorkerPool, WorkerTelemetry};

fn echo(job: &Job) -> JobResult {
    JobResult {
        name: job.name.clone(),
        size: job.name.len() as u64,
        compressed_size: 0,
    }
}

#[test]
fn worker_pool_processes_all_jobs() -> Result<(), Box<dyn std::error::Error>> {
    let pool = WorkerPool::new(4);
    let mut handle = pool.spawn(|_worker_id, job| Ok(echo(job)));

    let mut expected = BTreeSet::new();
    for id in 0..64usize {
        let name = format!("res-{id:02}");
        expected.insert(name.clone());
        handle.submit(Job::new(name))?;
    }
    handle.close();

    let mut seen = BTreeSet::new();
    while let Some(outcome) = handle.recv() {
        let result = outcome?;
        assert_eq!(result.size, result.name.len() as u64);
        seen.insert(result.name);
    }
    assert_eq!(seen, expected);
    assert_eq!(handle.submitted_count(), 64);
    assert_eq!(handle.completed_count(), 64);
    assert_eq!(handle.in_flight_count(), 0);

    let snapshot = handle.finish()?;
    assert_eq!(snapshot.workers.len(), 4);
    let total: usize = snapshot.workers.iter().map(|w| w.tasks_completed).sum();
    assert_eq!(total, 64);
    Ok(())
}

#[test]
fn worker_pool_spreads_jobs_across_workers() -> Result<(), Box<dyn std::error::Error>> {
    let worker_count = 4usize;
    let pool = WorkerPool::new(worker_count);
    let seen_workers = Arc::new(Mutex::new(BTreeSet::new()));

    let seen_for_worker = Arc::clone(&seen_workers);
    let mut handle = pool.spawn(move |worker_id, job| {
        seen_for_worker
            .lock()
            .expect("seen set mutex poisoned")
            .insert(worker_id);
        thread::sleep(Duration::from_millis(2));
        Ok(echo(job))
    });

    for id in 0..80usize {
        handle.submit(Job::new(format!("{id}")))?;
    }
    handle.close();
    for _ in 0..80 {
        handle.recv().expect("outcome")?;
    }

    let counts = handle.worker_task_counts();
    assert_eq!(counts.iter().sum::<usize>(), 80);
    handle.finish()?;

    let seen = seen_workers.lock().expect("seen set mutex poisoned");
    assert!(seen.len() > 1, "only workers {seen:?} picked up jobs");
    Ok(())
}

#[test]
fn closed_pool_rejects_new_jobs() -> Result<(), Box<dyn std::error::Error>> {
    let pool = WorkerPool::new(2);
    let mut handle = pool.spawn(|_worker_id, job| Ok(echo(job)));

    for id in 0..8usize {
        handle.submit(Job::new(format!("{id}")))?;
    }
    handle.close();
    assert!(matches!(
        handle.submit(Job::new("late")),
        Err(ResgenError::Worker(_))
    ));

    let mut received = 0;
    while let Some(outcome) = handle.recv() {
        outcome?;
        received += 1;
    }
    assert_eq!(received, 8);
    handle.finish()?;
    Ok(())
}

#[test]
fn failure_is_tagged_with_job_name() -> Result<(), Box<dyn std::error::Error>> {
    let pool = WorkerPool::new(1);
    let mut handle = pool.spawn(|_worker_id, job| {
        if job.name == "broken.png" {
            return Err(ResgenError::Encode("bad header".to_string()));
        }
        Ok(echo(job))
    });
    handle.submit(Job::new("broken.png"))?;
    handle.close();

    let err = handle.recv().expect("outcome").unwrap_err();
    assert_eq!(err.job_name(), Some("broken.png"));
    assert_eq!(err.to_string(), "processing broken.png: encode error: bad header");
    handle.drain(Duration::from_secs(5));
    Ok(())
}

#[test]
fn panicking_job_becomes_a_failure() -> Result<(), Box<dyn std::error::Error>> {
    let pool = WorkerPool::new(2);
    let mut handle = pool.spawn(|_worker_id, job| {
        if job.name == "boom" {
            panic!("decoder exploded");
        }
        Ok(echo(job))
    });
    handle.submit(Job::new("boom"))?;
    handle.close();

    let mut failures = Vec::new();
    while let Some(outcome) = handle.recv() {
        if let Err(err) = outcome {
            failures.push(err);
        }
    }
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].job_name(), Some("boom"));
    assert!(failures[0].to_string().contains("decoder exploded"));

    handle.finish()?;
    Ok(())
}

#[test]
fn failing_worker_stops_pulling_jobs() -> Result<(), Box<dyn std::error::Error>> {
    let pool = WorkerPool::new(1);
    let processed = Arc::new(AtomicUsize::new(0));
    let processed_for_worker = Arc::clone(&processed);
    let mut handle = pool.spawn(move |_worker_id, job| {
        processed_for_worker.fetch_add(1, Ordering::AcqRel);
        if job.name == "first" {
            return Err(ResgenError::Encode("stop".to_string()));
        }
        Ok(echo(job))
    });
    handle.submit(Job::new("first"))?;
    handle.submit(Job::new("second"))?;
    handle.close();

    assert!(handle.recv().expect("outcome").is_err());
    assert!(handle.recv().is_none());
    assert_eq!(processed.load(Ordering::Acquire), 1);
    Ok(())
}

#[test]
fn cancel_stops_workers_before_queued_jobs() -> Result<(), Box<dyn std::error::Error>> {
    let pool = WorkerPool::new(2);
    let processed = Arc::new(AtomicUsize::new(0));
    let processed_for_worker = Arc::clone(&processed);
    let mut handle = pool.spawn(move |_worker_id, job| {
        processed_for_worker.fetch_add(1, Ordering::AcqRel);
        thread::sleep(Duration::from_millis(20));
        Ok(echo(job))
    });

    for id in 0..200usize {
        handle.submit(Job::new(format!("{id}")))?;
    }
    handle.cancel();
    assert!(handle.is_cancelled());

    let report = handle.drain(Duration::from_secs(10));
    assert_eq!(report.joined, 2);
    assert_eq!(report.detached, 0);
    assert!(processed.load(Ordering::Acquire) < 200);
    Ok(())
}

#[test]
fn drain_waits_for_in_flight_jobs() -> Result<(), Box<dyn std::error::Error>> {
    let pool = WorkerPool::new(3);
    let running = Arc::new(AtomicUsize::new(0));
    let running_for_worker = Arc::clone(&running);
    let mut handle = pool.spawn(move |_worker_id, job| {
        running_for_worker.fetch_add(1, Ordering::AcqRel);
        thread::sleep(Duration::from_millis(50));
        running_for_worker.fetch_sub(1, Ordering::AcqRel);
        Ok(echo(job))
    });

    for id in 0..3usize {
        handle.submit(Job::new(format!("{id}")))?;
    }
    handle.close();
    while handle.in_flight_count() == 0 {
        thread::sleep(Duration::from_millis(1));
    }

    let report = handle.drain(Duration::from_secs(10));
    assert_eq!(report.joined + report.detached, 3);
    assert_eq!(report.detached, 0);
    assert_eq!(running.load(Ordering::Acquire), 0);
    Ok(())
}

#[test]
fn drain_detaches_workers_past_the_deadline() -> Result<(), Box<dyn std::error::Error>> {
    let pool = WorkerPool::new(1);
    let mut handle = pool.spawn(|_worker_id, job| {
        thread::sleep(Duration::from_millis(500));
        Ok(echo(job))
    });
    handle.submit(Job::new("slow"))?;
    handle.close();
    while handle.in_flight_count() == 0 {
        thread::sleep(Duration::from_millis(1));
    }

    let report = handle.drain(Duration::from_millis(10));
    assert_eq!(report.detached, 1);
    assert_eq!(report.joined, 0);
    Ok(())
}

#[derive(Default)]
struct CountingTelemetry {
    started: AtomicUsize,
    finished: AtomicUsize,
    failed: AtomicUsize,
    stopped: AtomicUsize,
}

impl WorkerTelemetry for CountingTelemetry {
    fn on_task_started(&self, _worker_id: usize, _job: &str) {
        self.started.fetch_add(1, Ordering::AcqRel);
    }

    fn on_task_finished(&self, _worker_id: usize, _job: &str, _elapsed: Duration) {
        self.finished.fetch_add(1, Ordering::AcqRel);
    }

    fn on_task_failed(&self, _worker_id: usize, _job: &str, _elapsed: Duration) {
        self.failed.fetch_add(1, Ordering::AcqRel);
    }

    fn on_worker_stopped(&self, _worker_id: usize, _tasks_completed: usize, _cancelled: bool) {
        self.stopped.fetch_add(1, Ordering::AcqRel);
    }
}

#[test]
fn telemetry_hooks_fire_per_job() -> Result<(), Box<dyn std::error::Error>> {
    let telemetry = Arc::new(CountingTelemetry::default());
    let pool = WorkerPool::with_telemetry(2, telemetry.clone());
    let mut handle = pool.spawn(|_worker_id, job| {
        if job.name == "bad" {
            return Err(ResgenError::Encode("nope".to_string()));
        }
        Ok(echo(job))
    });

    for name in ["a", "b", "c"] {
        handle.submit(Job::new(name))?;
    }
    handle.close();
    for _ in 0..3 {
        handle.recv().expect("outcome")?;
    }
    handle.finish()?;

    assert_eq!(telemetry.started.load(Ordering::Acquire), 3);
    assert_eq!(telemetry.finished.load(Ordering::Acquire), 3);
    assert_eq!(telemetry.failed.load(Ordering::Acquire), 0);
    assert_eq!(telemetry.stopped.load(Ordering::Acquire), 2);
    Ok(())
}
