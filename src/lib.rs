//! Photoscribe: multi-stage image pipelines that describe, enhance and geolocate photo collections

pub mod backend;
pub mod engine;
pub mod geocode;
pub mod metadata;
pub mod pipeline;
pub mod search;
pub mod stages;
pub mod task;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Result alias used by the public photoscribe API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub use pipeline::{PipelineDeps, RunSummary};

/// Run `kind` over `opts.input_dir` with the given services and wait for it to finish.
///
/// Pass the same `stop` flag to a signal handler to interrupt the run; in-flight items finish
/// and the summary reports `interrupted`.
pub fn run_pipeline(
    kind: PipelineKind,
    opts: &Opts,
    deps: &PipelineDeps,
    stop: Arc<AtomicBool>,
) -> Result<RunSummary> {
    pipeline::build_pipeline(kind, opts, deps, stop)?.run()
}
