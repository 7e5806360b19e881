//! Pipeline components: shared context, worker threads, orchestration and the pipeline table.

pub mod context;
pub mod orchestrator;
pub mod registry;
pub mod worker;

pub use context::{PipelineContext, PipelineTuning, StageStatus};
pub use orchestrator::{Pipeline, PipelineBuilder, RunSummary, StageChain, StageSummary};
pub use registry::{PipelineDeps, build_pipeline, list_pipelines, tuning_from_opts};
