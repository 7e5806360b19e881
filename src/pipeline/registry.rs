//! Static pipeline table: stage wiring for each [`PipelineKind`].

use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use super::context::PipelineTuning;
use super::orchestrator::{Pipeline, PipelineBuilder, StageChain};
use crate::backend::{InferenceBackend, SharedModel, get_backend};
use crate::engine::tools::{ArtifactLayout, canonicalize_dir};
use crate::geocode::{Backoff, Geocoder, NominatimGeocoder};
use crate::metadata::{ExifMetadata, MetadataCache, MetadataSource};
use crate::search::ContextWindowSearch;
use crate::stages::{
    ContextStage, DescribeStage, DiscoverStage, EnhanceStage, GeolocateStage, MetadataStage,
    SkipCheckStage, WriteStage,
};
use crate::types::{Opts, PipelineKind};
use crate::utils::config::{ArtifactSuffixes, DEFAULT_GEOCODE_OUTPUT_FORMAT, PipelineDefaults};

/// `(name, description)` for every registered pipeline.
pub fn list_pipelines() -> Vec<(&'static str, &'static str)> {
    PipelineKind::ALL
        .iter()
        .map(|k| (k.name(), describe_kind(*k)))
        .collect()
}

fn describe_kind(kind: PipelineKind) -> &'static str {
    match kind {
        PipelineKind::Describe => {
            "Discover -> SkipCheck -> Metadata -> LLM -> Write: describe each image with a vision model"
        }
        PipelineKind::Enhance => {
            "Discover -> SkipCheck -> Context -> Enhance -> Write: refine descriptions using temporally nearby photos"
        }
        PipelineKind::Geolocate => {
            "Discover -> SkipCheck -> Geolocate -> Write: reverse geocode GPS positions to addresses"
        }
    }
}

/// External services a pipeline talks to. Tests swap in stubs.
#[derive(Clone)]
pub struct PipelineDeps {
    pub backend: Arc<dyn InferenceBackend>,
    pub geocoder: Arc<dyn Geocoder>,
    pub metadata: Arc<dyn MetadataSource>,
}

impl PipelineDeps {
    /// Real services as configured in `opts`.
    pub fn from_opts(opts: &Opts) -> Result<Self> {
        Ok(Self {
            backend: get_backend(&opts.backend, &opts.backend_url)?,
            geocoder: Arc::new(NominatimGeocoder::new(&opts.geocode.url)),
            metadata: Arc::new(ExifMetadata::within(
                fs::canonicalize(&opts.input_dir).unwrap_or_else(|_| opts.input_dir.clone()),
            )),
        })
    }
}

/// Flow-control settings for `opts`; the status interval is floored.
pub fn tuning_from_opts(opts: &Opts) -> PipelineTuning {
    PipelineTuning {
        backpressure_multiplier: opts.backpressure,
        status_interval: opts.status_interval.max(PipelineDefaults::MIN_STATUS_INTERVAL),
        verbose: opts.verbose,
        ..PipelineTuning::default()
    }
}

fn artifact_suffixes(kind: PipelineKind) -> (&'static str, &'static str) {
    match kind {
        PipelineKind::Describe => (ArtifactSuffixes::DESCRIBE, ArtifactSuffixes::DESCRIBE_ERROR),
        PipelineKind::Enhance => (ArtifactSuffixes::ENHANCE, ArtifactSuffixes::ENHANCE_ERROR),
        PipelineKind::Geolocate => (ArtifactSuffixes::GEOCODE, ArtifactSuffixes::GEOCODE_ERROR),
    }
}

/// Canonical `(input, output)` roots. The output directory is created when missing and
/// defaults to the input directory.
fn resolve_roots(opts: &Opts) -> Result<(PathBuf, PathBuf)> {
    let input = canonicalize_dir(&opts.input_dir)?;
    if opts.output_dir.as_os_str().is_empty() {
        return Ok((input.clone(), input));
    }
    fs::create_dir_all(&opts.output_dir)
        .with_context(|| format!("create output dir {}", opts.output_dir.display()))?;
    let output = canonicalize_dir(&opts.output_dir)?;
    Ok((input, output))
}

/// Discover -> SkipCheck, seeded with the input root. Every pipeline starts this way.
fn front(
    opts: &Opts,
    root: &Path,
    layout: &ArtifactLayout,
    stop: Arc<AtomicBool>,
) -> StageChain<SkipCheckStage> {
    PipelineBuilder::new(tuning_from_opts(opts))
        .input_root(root)
        .stop_flag(stop)
        .start(
            "Discover",
            DiscoverStage::new(root, opts.extensions.clone(), opts.sort_order),
            opts.threads.discover,
        )
        .seed(root.to_path_buf())
        .then(
            "SkipCheck",
            SkipCheckStage::new(layout.clone(), opts.retry, opts.retry_failed),
            opts.threads.skip_check,
        )
}

/// Wire the stages for `kind` from `opts`. Nothing runs until [`Pipeline::run`].
pub fn build_pipeline(
    kind: PipelineKind,
    opts: &Opts,
    deps: &PipelineDeps,
    stop: Arc<AtomicBool>,
) -> Result<Pipeline> {
    let (input, output) = resolve_roots(opts)?;
    let (suffix, error_suffix) = artifact_suffixes(kind);
    let layout = ArtifactLayout::new(&input, &output, suffix, error_suffix);
    debug!(
        "{kind}: {} -> {} ({suffix}, {error_suffix})",
        input.display(),
        output.display()
    );
    let chain = front(opts, &input, &layout, stop);
    let threads = &opts.threads;

    let pipeline = match kind {
        PipelineKind::Describe => {
            let model = SharedModel::new(Arc::clone(&deps.backend), &opts.describe.model, None);
            chain
                .then(
                    "Metadata",
                    MetadataStage::new(Arc::clone(&deps.metadata)),
                    threads.metadata,
                )
                .then(
                    "LLM",
                    DescribeStage::new(model, &opts.describe.prompt, &input),
                    threads.llm,
                )
                .then(
                    "Write",
                    WriteStage::new(layout, &opts.describe.output_format),
                    threads.write,
                )
                .build()
        }
        PipelineKind::Enhance => {
            let window = opts.enhance.model_context_length;
            let model = SharedModel::new(
                Arc::clone(&deps.backend),
                &opts.enhance.model,
                (window > 0).then_some(window),
            );
            let described =
                layout.with_suffixes(ArtifactSuffixes::DESCRIBE, ArtifactSuffixes::DESCRIBE_ERROR);
            let search = ContextWindowSearch::new(
                &input,
                described,
                opts.extensions.clone(),
                opts.enhance.max_context_items,
                Arc::new(MetadataCache::new(Arc::clone(&deps.metadata))),
            );
            chain
                .then("Context", ContextStage::new(search), threads.context)
                .then(
                    "Enhance",
                    EnhanceStage::new(model, opts.enhance.clone(), &input),
                    threads.llm,
                )
                .then(
                    "Write",
                    WriteStage::new(layout, &opts.enhance.output_format),
                    threads.write,
                )
                .build()
        }
        PipelineKind::Geolocate => {
            let backoff = Backoff::new(opts.geocode.initial_wait, opts.geocode.max_retries);
            chain
                .then(
                    "Geolocate",
                    GeolocateStage::new(
                        Arc::clone(&deps.metadata),
                        Arc::clone(&deps.geocoder),
                        backoff,
                        &input,
                    ),
                    threads.geolocate,
                )
                .then(
                    "Write",
                    WriteStage::new(layout, DEFAULT_GEOCODE_OUTPUT_FORMAT),
                    threads.write,
                )
                .build()
        }
    };
    Ok(pipeline)
}
