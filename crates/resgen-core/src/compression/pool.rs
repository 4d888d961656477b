use std::io::{self, Write};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};

use crate::compression::{Compressor, CompressorFactory, Level};

/// A pool of reusable compressor instances.
///
/// Workers acquire an instance for the duration of one job. The guard
/// returns it to the pool on drop, so at most `max_idle` instances are kept
/// around between jobs. Every acquired instance is reset onto the caller's
/// sink before it is handed out.
pub struct CompressorPool {
    factory: Arc<dyn CompressorFactory>,
    recycler: Sender<Box<dyn Compressor>>,
    receiver: Receiver<Box<dyn Compressor>>,
    metrics: Arc<PoolMetricsInner>,
}

impl CompressorPool {
    pub fn new(factory: Arc<dyn CompressorFactory>, max_idle: usize) -> Self {
        let (tx, rx) = bounded(max_idle.max(1));
        Self {
            factory,
            recycler: tx,
            receiver: rx,
            metrics: Arc::new(PoolMetricsInner::default()),
        }
    }

    pub fn level(&self) -> Level {
        self.factory.level()
    }

    /// Acquires a compressor bound to `sink` with a zeroed counter.
    pub fn acquire(&self, sink: Box<dyn Write + Send>) -> PooledCompressor {
        let mut compressor = match self.receiver.try_recv() {
            Ok(compressor) => {
                self.metrics.recycled.fetch_add(1, Ordering::Relaxed);
                compressor
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                self.metrics.created.fetch_add(1, Ordering::Relaxed);
                self.factory.make()
            }
        };
        compressor.reset(sink);

        PooledCompressor {
            compressor: Some(compressor),
            recycler: self.recycler.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }

    pub fn metrics(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            created: self.metrics.created.load(Ordering::Relaxed),
            recycled: self.metrics.recycled.load(Ordering::Relaxed),
            dropped: self.metrics.dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
struct PoolMetricsInner {
    created: AtomicUsize,
    recycled: AtomicUsize,
    dropped: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolMetricsSnapshot {
    pub created: usize,
    pub recycled: usize,
    pub dropped: usize,
}

/// Exclusive handle on a pooled compressor.
pub struct PooledCompressor {
    compressor: Option<Box<dyn Compressor>>,
    recycler: Sender<Box<dyn Compressor>>,
    metrics: Arc<PoolMetricsInner>,
}

impl PooledCompressor {
    /// Closes the compressor instead of recycling it.
    pub fn discard(mut self) -> io::Result<()> {
        match self.compressor.take() {
            Some(mut compressor) => {
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                compressor.close()
            }
            None => Ok(()),
        }
    }
}

impl Deref for PooledCompressor {
    type Target = dyn Compressor;

    fn deref(&self) -> &Self::Target {
        self.compressor
            .as_deref()
            .expect("pooled compressor accessed after release")
    }
}

impl DerefMut for PooledCompressor {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.compressor
            .as_deref_mut()
            .expect("pooled compressor accessed after release")
    }
}

impl Drop for PooledCompressor {
    fn drop(&mut self) {
        let Some(mut compressor) = self.compressor.take() else {
            return;
        };

        // A closed instance ignores reset and would fail the next job.
        if compressor.is_closed() {
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        // Release the job's sink before the instance goes idle.
        compressor.reset(Box::new(io::sink()));
        match self.recycler.try_send(compressor) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
