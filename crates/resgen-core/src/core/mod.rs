pub mod worker_pool;

pub use worker_pool::{
    DrainReport, PoolRuntimeSnapshot, WorkerPool, WorkerPoolHandle, WorkerRuntimeSnapshot,
};
