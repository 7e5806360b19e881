//! Application configuration constants.
//! Tuning, templates and file-naming defaults in one place.

use anyhow::{Result, bail};
use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
    user_agent: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!("{pkg}.toml"),
                user_agent: format!("{pkg}/{}", env!("CARGO_PKG_VERSION")),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Config file looked up in the working directory when `--config` is not given.
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// User-Agent sent to HTTP services (Nominatim requires one).
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

// ---- Pipeline flow control ----

/// Worker loop and orchestrator timing.
pub struct PipelineDefaults;

impl PipelineDefaults {
    /// Downstream queue may grow to `maximum * multiplier` before upstream stops starting work.
    pub const BACKPRESSURE_MULTIPLIER: f64 = 2.0;
    pub const STATUS_INTERVAL: Duration = Duration::from_secs(5);
    /// Floor applied to user-supplied status intervals.
    pub const MIN_STATUS_INTERVAL: Duration = Duration::from_millis(100);
    pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
    pub const IDLE_CHECK_INTERVAL: Duration = Duration::from_millis(500);
    pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);
}

/// Backpressure multipliers must be finite and positive. At 0 an empty downstream queue already
/// counts as full, so no stage with a successor would ever start.
pub fn check_backpressure(multiplier: f64) -> Result<f64> {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        bail!("backpressure must be a positive number, got {multiplier}");
    }
    Ok(multiplier)
}

// ---- Worker threads ----

/// Per-stage thread counts. Each count is also the stage's `maximum`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageThreads {
    pub discover: usize,
    pub skip_check: usize,
    pub metadata: usize,
    pub llm: usize,
    pub context: usize,
    pub geolocate: usize,
    pub write: usize,
}

impl Default for StageThreads {
    fn default() -> Self {
        Self {
            discover: Self::DISCOVER,
            skip_check: Self::SKIP_CHECK,
            metadata: Self::METADATA,
            llm: Self::LLM,
            context: Self::CONTEXT,
            geolocate: Self::GEOLOCATE,
            write: Self::WRITE,
        }
    }
}

impl StageThreads {
    /// Discovery stays single-threaded so traversal order is deterministic.
    pub const DISCOVER: usize = 1;
    pub const SKIP_CHECK: usize = 16;
    pub const METADATA: usize = 4;
    pub const LLM: usize = 1;
    pub const CONTEXT: usize = 4;
    /// Network-bound and rate limited by the public geocoder.
    pub const GEOLOCATE: usize = 2;
    pub const WRITE: usize = 1;

    /// Metadata extraction is CPU-bound; cap it at what rayon sees.
    pub fn current() -> Self {
        Self {
            metadata: Self::METADATA.min(rayon::current_num_threads()).max(1),
            ..Self::default()
        }
    }
}

// ---- Discovery ----

/// Lowercase extensions (with dot) accepted by discovery.
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];

// ---- Artifact suffixes ----

/// Primary / error artifact suffixes per pipeline.
pub struct ArtifactSuffixes;

impl ArtifactSuffixes {
    pub const DESCRIBE: &'static str = ".txt";
    pub const DESCRIBE_ERROR: &'static str = ".error.txt";
    pub const ENHANCE: &'static str = ".enhanced.txt";
    pub const ENHANCE_ERROR: &'static str = ".enhanced.error.txt";
    pub const GEOCODE: &'static str = ".geocode.txt";
    pub const GEOCODE_ERROR: &'static str = ".geocode.error.txt";
}

// ---- Model / prompts ----

pub const DEFAULT_MODEL_NAME: &str = "qwen2.5-vl-7b-instruct";
pub const DEFAULT_ENHANCE_MODEL_NAME: &str = "qwen2.5-7b-instruct";
pub const DEFAULT_BACKEND: &str = "lmstudio";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:1234";
/// Context window requested for the text model (enhance prompts carry neighbour descriptions).
pub const DEFAULT_MODEL_CONTEXT_LENGTH: usize = 32768;

pub const DEFAULT_PROMPT: &str = "Describe this photo in a few sentences. \
It was taken on {datetime} at {location} with a {camera}. \
Mention people, places and activities you can see.";

pub const DEFAULT_OUTPUT_FORMAT: &str =
    "Date time: {datetime}\nLocation: {location}\nDescription:\n{content}";

pub const DEFAULT_ENHANCE_PROMPT: &str = "Improve the photo description below using what nearby \
photos from the same period show. Keep it factual and do not invent details.\n\n\
{context_section}\nOriginal description:\n{original_description}\n\nImproved description:";

pub const DEFAULT_ENHANCE_OUTPUT_FORMAT: &str = "{content}";
pub const DEFAULT_GEOCODE_OUTPUT_FORMAT: &str = "{content}";

// ---- Enhancement context ----

pub struct ContextDefaults;

impl ContextDefaults {
    /// Neighbours returned by the context search.
    pub const MAX_CONTEXT_ITEMS: usize = 20;
    /// Neighbours actually placed into the prompt.
    pub const MAX_CONTEXT_IN_PROMPT: usize = 10;
    /// Characters kept per neighbour before `...`.
    pub const CONTEXT_ITEM_MAX_LENGTH: usize = 500;
    /// Each search direction stops once it holds this many times `MAX_CONTEXT_ITEMS`.
    pub const SEARCH_SLACK_FACTOR: usize = 2;
    pub const CONTEXT_TEMPLATE: &'static str = "Descriptions of nearby photos:\n{items}";
    pub const CONTEXT_ITEM_TEMPLATE: &'static str = "{number}. {description}\n";
}

// ---- Geocoding ----

pub struct GeocodeDefaults;

impl GeocodeDefaults {
    pub const NOMINATIM_URL: &'static str = "https://nominatim.openstreetmap.org";
    pub const INITIAL_WAIT: Duration = Duration::from_secs(1);
    pub const MAX_RETRIES: u32 = 5;
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    /// Written instead of an address when the image carries no GPS position.
    pub const NO_LOCATION: &'static str = "N/A";
}

// ---- HTTP backend ----

/// Timeouts for the OpenAI-compatible inference server.
pub struct BackendTimeouts;

impl BackendTimeouts {
    pub const CONNECT: Duration = Duration::from_secs(5);
    /// Vision inference on a local GPU can take minutes for large images.
    pub const RESPONSE: Duration = Duration::from_secs(600);
}
