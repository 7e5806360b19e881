//! Items flowing between stages, and the resolved run options.

use anyhow::bail;
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::engine::tools::{lexicographic_cmp, natural_cmp};
use crate::metadata::ImageMetadata;
use crate::task::WorkItem;
use crate::utils::config::{
    ContextDefaults, DEFAULT_BACKEND, DEFAULT_BACKEND_URL, DEFAULT_ENHANCE_MODEL_NAME,
    DEFAULT_ENHANCE_OUTPUT_FORMAT, DEFAULT_ENHANCE_PROMPT, DEFAULT_IMAGE_EXTENSIONS,
    DEFAULT_MODEL_CONTEXT_LENGTH, DEFAULT_MODEL_NAME, DEFAULT_OUTPUT_FORMAT, DEFAULT_PROMPT,
    GeocodeDefaults, PipelineDefaults, StageThreads,
};

// ---- Stage items ----

/// An image together with its extracted metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct MetadataItem {
    pub path: PathBuf,
    pub metadata: ImageMetadata,
}

impl WorkItem for MetadataItem {
    fn source(&self) -> &Path {
        &self.path
    }
}

/// An image's existing description plus the descriptions of its nearest neighbours.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextItem {
    pub path: PathBuf,
    pub original: String,
    /// Closest first.
    pub context: Vec<String>,
}

impl WorkItem for ContextItem {
    fn source(&self) -> &Path {
        &self.path
    }
}

/// Content (or the reason there is none) to persist for one image.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteItem {
    pub path: PathBuf,
    /// `Err` holds the message written to the error artifact.
    pub content: Result<String, String>,
    pub metadata: Option<ImageMetadata>,
}

impl WriteItem {
    pub fn success(path: PathBuf, content: String, metadata: Option<ImageMetadata>) -> Self {
        Self {
            path,
            content: Ok(content),
            metadata,
        }
    }
}

impl WorkItem for WriteItem {
    fn source(&self) -> &Path {
        &self.path
    }

    fn from_failure(source: &Path, error: &anyhow::Error) -> Option<Self> {
        Some(Self {
            path: source.to_path_buf(),
            content: Err(format!("{error:#}")),
            metadata: None,
        })
    }
}

// ---- Sort order ----

/// Order of files and subdirectories within one discovered directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    NaturalAsc,
    #[default]
    NaturalDesc,
    LexicographicAsc,
    LexicographicDesc,
}

impl SortOrder {
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self {
            SortOrder::NaturalAsc => natural_cmp(a, b),
            SortOrder::NaturalDesc => natural_cmp(b, a),
            SortOrder::LexicographicAsc => lexicographic_cmp(a, b),
            SortOrder::LexicographicDesc => lexicographic_cmp(b, a),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::NaturalAsc => "natural-asc",
            SortOrder::NaturalDesc => "natural-desc",
            SortOrder::LexicographicAsc => "lexicographic-asc",
            SortOrder::LexicographicDesc => "lexicographic-desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "natural-asc" | "name-asc" | "natural" => Ok(SortOrder::NaturalAsc),
            "natural-desc" | "name-desc" => Ok(SortOrder::NaturalDesc),
            "lexicographic-asc" | "lexicographic" => Ok(SortOrder::LexicographicAsc),
            "lexicographic-desc" => Ok(SortOrder::LexicographicDesc),
            other => bail!(
                "unknown sort order '{other}' (expected natural-asc, natural-desc, lexicographic-asc, lexicographic-desc)"
            ),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---- Pipelines ----

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineKind {
    Describe,
    Enhance,
    Geolocate,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 3] = [
        PipelineKind::Describe,
        PipelineKind::Enhance,
        PipelineKind::Geolocate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineKind::Describe => "describe",
            PipelineKind::Enhance => "enhance",
            PipelineKind::Geolocate => "geolocate",
        }
    }
}

impl FromStr for PipelineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "describe" => Ok(PipelineKind::Describe),
            "enhance" => Ok(PipelineKind::Enhance),
            "geolocate" | "geocode" => Ok(PipelineKind::Geolocate),
            other => bail!("unknown pipeline '{other}' (see --list)"),
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---- Options ----

/// Vision model settings for the describe pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct DescribeOpts {
    pub model: String,
    /// Placeholders: `{datetime}`, `{location}`, `{camera}`, `{filename}`.
    pub prompt: String,
    /// Placeholders: `{datetime}`, `{location}`, `{content}`, `{filename}`.
    pub output_format: String,
}

impl Default for DescribeOpts {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL_NAME.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
        }
    }
}

/// Text model and context settings for the enhance pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct EnhanceOpts {
    pub model: String,
    /// Placeholders: `{context_section}`, `{original_description}`.
    pub prompt: String,
    pub output_format: String,
    /// Placeholder: `{items}`.
    pub context_template: String,
    /// Placeholders: `{number}`, `{description}`.
    pub context_item_template: String,
    pub context_item_max_length: usize,
    pub max_context_in_prompt: usize,
    pub max_context_items: usize,
    /// Token window the text model is loaded with. 0 keeps whatever the server uses.
    pub model_context_length: usize,
}

impl Default for EnhanceOpts {
    fn default() -> Self {
        Self {
            model: DEFAULT_ENHANCE_MODEL_NAME.to_string(),
            prompt: DEFAULT_ENHANCE_PROMPT.to_string(),
            output_format: DEFAULT_ENHANCE_OUTPUT_FORMAT.to_string(),
            context_template: ContextDefaults::CONTEXT_TEMPLATE.to_string(),
            context_item_template: ContextDefaults::CONTEXT_ITEM_TEMPLATE.to_string(),
            context_item_max_length: ContextDefaults::CONTEXT_ITEM_MAX_LENGTH,
            max_context_in_prompt: ContextDefaults::MAX_CONTEXT_IN_PROMPT,
            max_context_items: ContextDefaults::MAX_CONTEXT_ITEMS,
            model_context_length: DEFAULT_MODEL_CONTEXT_LENGTH,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeocodeOpts {
    pub url: String,
    pub initial_wait: Duration,
    pub max_retries: u32,
}

impl Default for GeocodeOpts {
    fn default() -> Self {
        Self {
            url: GeocodeDefaults::NOMINATIM_URL.to_string(),
            initial_wait: GeocodeDefaults::INITIAL_WAIT,
            max_retries: GeocodeDefaults::MAX_RETRIES,
        }
    }
}

/// Fully resolved options (defaults, then config file, then environment, then CLI).
#[derive(Clone, Debug, PartialEq)]
pub struct Opts {
    pub input_dir: PathBuf,
    /// Empty means "same as `input_dir`".
    pub output_dir: PathBuf,
    pub sort_order: SortOrder,
    /// Lowercase, with leading dot.
    pub extensions: Vec<String>,
    pub backpressure: f64,
    pub status_interval: Duration,
    /// Reprocess everything, ignoring existing artifacts. Wins over `retry_failed`.
    pub retry: bool,
    /// Reprocess items whose last attempt left an error artifact.
    pub retry_failed: bool,
    pub verbose: bool,
    pub backend: String,
    pub backend_url: String,
    pub threads: StageThreads,
    pub describe: DescribeOpts,
    pub enhance: EnhanceOpts,
    pub geocode: GeocodeOpts,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::new(),
            sort_order: SortOrder::default(),
            extensions: DEFAULT_IMAGE_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            backpressure: PipelineDefaults::BACKPRESSURE_MULTIPLIER,
            status_interval: PipelineDefaults::STATUS_INTERVAL,
            retry: false,
            retry_failed: false,
            verbose: false,
            backend: DEFAULT_BACKEND.to_string(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            threads: StageThreads::current(),
            describe: DescribeOpts::default(),
            enhance: EnhanceOpts::default(),
            geocode: GeocodeOpts::default(),
        }
    }
}

impl Opts {
    /// Options for processing `input` into `output` (or in place when `None`).
    pub fn for_dirs(input: impl Into<PathBuf>, output: Option<PathBuf>) -> Self {
        let input_dir = input.into();
        Self {
            output_dir: output.unwrap_or_else(|| input_dir.clone()),
            input_dir,
            ..Default::default()
        }
    }
}
