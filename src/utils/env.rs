//! Environment layer: `.env` (via dotenvy) and process variables, applied after the config file.

use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Opts;

pub const ENV_INPUT_DIR: &str = "INPUT_DIR";
pub const ENV_OUTPUT_DIR: &str = "OUTPUT_DIR";
pub const ENV_MODEL_NAME: &str = "MODEL_NAME";
pub const ENV_PROMPT: &str = "PROMPT";
pub const ENV_SORT_ORDER: &str = "SORT_ORDER";
pub const ENV_BACKEND: &str = "BACKEND";
pub const ENV_BACKEND_URL: &str = "BACKEND_URL";
pub const ENV_STATUS_INTERVAL: &str = "STATUS_INTERVAL";

/// Load `.env` from `dir` into the process environment if present. Existing variables win.
pub fn load_dotenv(dir: &Path) {
    let env_path = dir.join(".env");
    if env_path.is_file() {
        match dotenvy::from_path(&env_path) {
            Ok(()) => debug!("Loaded {}", env_path.display()),
            Err(e) => log::warn!("{}: {}", env_path.display(), e),
        }
    }
}

/// Apply variables returned by `lookup` to `opts`. Empty values are ignored.
pub fn apply_env_to_opts<F>(opts: &mut Opts, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    if let Some(v) = get(ENV_INPUT_DIR) {
        opts.input_dir = PathBuf::from(v);
    }
    if let Some(v) = get(ENV_OUTPUT_DIR) {
        opts.output_dir = PathBuf::from(v);
    }
    if let Some(v) = get(ENV_MODEL_NAME) {
        opts.describe.model = v;
    }
    if let Some(v) = get(ENV_PROMPT) {
        opts.describe.prompt = v;
    }
    if let Some(v) = get(ENV_SORT_ORDER) {
        opts.sort_order = v.parse().with_context(|| format!("{ENV_SORT_ORDER}={v}"))?;
    }
    if let Some(v) = get(ENV_BACKEND) {
        opts.backend = v;
    }
    if let Some(v) = get(ENV_BACKEND_URL) {
        opts.backend_url = v;
    }
    if let Some(v) = get(ENV_STATUS_INTERVAL) {
        let secs: f64 = v
            .parse()
            .with_context(|| format!("{ENV_STATUS_INTERVAL}={v}"))?;
        opts.status_interval = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("{ENV_STATUS_INTERVAL}={v}"))?;
    }
    Ok(())
}

/// [`apply_env_to_opts`] against the real process environment.
pub fn apply_process_env(opts: &mut Opts) -> Result<()> {
    apply_env_to_opts(opts, |key| std::env::var(key).ok())
}
