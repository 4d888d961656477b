//! Logging hooks for the build runtime.
//!
//! Events go through `tracing`. Targets are listed in [`targets`] so a
//! subscriber filter such as `RUST_LOG=resgen.worker=debug` can isolate one
//! subsystem.

pub mod worker;

pub use worker::{DefaultWorkerTelemetry, WorkerTelemetry};

pub mod targets {
    pub const PIPELINE: &str = "resgen.pipeline";
    pub const WORKER: &str = "resgen.worker";
    pub const COMMIT: &str = "resgen.commit";
    pub const ENCODE: &str = "resgen.encode";
}
