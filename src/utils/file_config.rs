//! Optional `photoscribe.toml`. Only keys present in the file override defaults; CLI flags
//! are applied afterwards and win.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Opts;
use crate::engine::tools::normalize_extensions;
use crate::utils::config::check_backpressure;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    settings: SettingsSection,
    #[serde(default)]
    threads: ThreadsSection,
    #[serde(default)]
    describe: DescribeSection,
    #[serde(default)]
    enhance: EnhanceSection,
    #[serde(default)]
    geolocate: GeolocateSection,
    #[serde(default)]
    backend: BackendSection,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    input_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    sort_order: Option<String>,
    extensions: Option<Vec<String>>,
    backpressure: Option<f64>,
    /// Seconds.
    status_interval: Option<f64>,
    retry: Option<bool>,
    retry_failed: Option<bool>,
    verbose: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ThreadsSection {
    discover: Option<usize>,
    skip_check: Option<usize>,
    metadata: Option<usize>,
    llm: Option<usize>,
    context: Option<usize>,
    geolocate: Option<usize>,
    write: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct DescribeSection {
    model: Option<String>,
    prompt: Option<String>,
    output_format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EnhanceSection {
    model: Option<String>,
    prompt: Option<String>,
    output_format: Option<String>,
    context_template: Option<String>,
    context_item_template: Option<String>,
    context_item_max_length: Option<usize>,
    max_context_in_prompt: Option<usize>,
    max_context_items: Option<usize>,
    model_context_length: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct GeolocateSection {
    url: Option<String>,
    /// Seconds.
    initial_wait: Option<f64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendSection {
    name: Option<String>,
    url: Option<String>,
}

pub fn parse_file_config(s: &str) -> Result<FileConfig> {
    toml::from_str(s).context("invalid config file")
}

/// Load the config at `path`. Missing file is `Ok(None)`; an unparsable one is an error.
pub fn load_file_config(path: &Path) -> Result<Option<FileConfig>> {
    if !path.is_file() {
        return Ok(None);
    }
    let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_file_config(&s)
        .with_context(|| path.display().to_string())
        .map(Some)
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $opts:expr, $sec_field:ident => $($opts_field:ident).+) => {
        if let Some(ref v) = $sec.$sec_field {
            $opts.$($opts_field).+ = v.clone();
        }
    };
}

fn secs(v: f64, key: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(v).with_context(|| format!("{key}: invalid duration {v}"))
}

/// Apply file config to opts (only keys present in the file). Call before applying CLI.
pub fn apply_file_to_opts(file: &FileConfig, opts: &mut Opts) -> Result<()> {
    let s = &file.settings;
    apply_file_opt!(s, opts, input_dir => input_dir);
    apply_file_opt!(s, opts, output_dir => output_dir);
    if let Some(ref order) = s.sort_order {
        opts.sort_order = order.parse()?;
    }
    if let Some(ref exts) = s.extensions {
        opts.extensions = normalize_extensions(exts);
    }
    if let Some(m) = s.backpressure {
        opts.backpressure = check_backpressure(m).context("settings.backpressure")?;
    }
    if let Some(v) = s.status_interval {
        opts.status_interval = secs(v, "settings.status_interval")?;
    }
    apply_file_opt!(s, opts, retry => retry);
    apply_file_opt!(s, opts, retry_failed => retry_failed);
    apply_file_opt!(s, opts, verbose => verbose);

    let t = &file.threads;
    apply_file_opt!(t, opts, discover => threads.discover);
    apply_file_opt!(t, opts, skip_check => threads.skip_check);
    apply_file_opt!(t, opts, metadata => threads.metadata);
    apply_file_opt!(t, opts, llm => threads.llm);
    apply_file_opt!(t, opts, context => threads.context);
    apply_file_opt!(t, opts, geolocate => threads.geolocate);
    apply_file_opt!(t, opts, write => threads.write);

    let d = &file.describe;
    apply_file_opt!(d, opts, model => describe.model);
    apply_file_opt!(d, opts, prompt => describe.prompt);
    apply_file_opt!(d, opts, output_format => describe.output_format);

    let e = &file.enhance;
    apply_file_opt!(e, opts, model => enhance.model);
    apply_file_opt!(e, opts, prompt => enhance.prompt);
    apply_file_opt!(e, opts, output_format => enhance.output_format);
    apply_file_opt!(e, opts, context_template => enhance.context_template);
    apply_file_opt!(e, opts, context_item_template => enhance.context_item_template);
    apply_file_opt!(e, opts, context_item_max_length => enhance.context_item_max_length);
    apply_file_opt!(e, opts, max_context_in_prompt => enhance.max_context_in_prompt);
    apply_file_opt!(e, opts, max_context_items => enhance.max_context_items);
    apply_file_opt!(e, opts, model_context_length => enhance.model_context_length);

    let g = &file.geolocate;
    apply_file_opt!(g, opts, url => geocode.url);
    if let Some(v) = g.initial_wait {
        opts.geocode.initial_wait = secs(v, "geolocate.initial_wait")?;
    }
    apply_file_opt!(g, opts, max_retries => geocode.max_retries);

    let b = &file.backend;
    apply_file_opt!(b, opts, name => backend);
    apply_file_opt!(b, opts, url => backend_url);
    Ok(())
}
