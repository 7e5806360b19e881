//! CLI command handler: resolve options layer by layer, run one pipeline, report.

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::engine::arg_parser::Cli;
use crate::engine::tools::display_relative;
use crate::pipeline::{PipelineDeps, RunSummary, build_pipeline, list_pipelines};
use crate::utils::config::{PackagePaths, check_backpressure};
use crate::utils::{
    apply_file_to_opts, apply_process_env, load_dotenv, load_file_config, set_verbose,
    setup_logging,
};
use crate::{Opts, PipelineKind};

/// `@path` reads the template from a file; anything else is the template itself.
pub fn read_prompt(value: &str) -> Result<String> {
    match value.strip_prefix('@') {
        Some(path) => read_prompt_file(Path::new(path)),
        None => Ok(value.to_string()),
    }
}

fn read_prompt_file(path: &Path) -> Result<String> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read prompt file {}", path.display()))?;
    Ok(s.trim_end().to_string())
}

fn config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(p) if !p.is_file() => bail!("config file not found: {}", p.display()),
        Some(p) => Ok(p.clone()),
        None => Ok(PathBuf::from(PackagePaths::get().config_filename())),
    }
}

/// Overwrite opts field from the command line when given.
macro_rules! apply_cli_opt {
    ($cli:expr, $opts:expr, $cli_field:ident => $($opts_field:ident).+) => {
        if let Some(ref v) = $cli.$cli_field {
            $opts.$($opts_field).+ = v.clone();
        }
    };
}

/// Apply CLI flags on top of `opts`. `--model` and `--prompt` target the selected pipeline.
pub fn apply_cli_to_opts(cli: &Cli, kind: PipelineKind, opts: &mut Opts) -> Result<()> {
    if let Some(dir) = cli.input_dir() {
        opts.input_dir = dir.clone();
    }
    if let Some(dir) = cli.output_dir() {
        opts.output_dir = dir.clone();
    }
    let prompt = match (&cli.prompt, &cli.prompt_file) {
        (Some(p), _) => Some(read_prompt(p)?),
        (None, Some(path)) => Some(read_prompt_file(path)?),
        (None, None) => None,
    };
    match kind {
        PipelineKind::Enhance => {
            apply_cli_opt!(cli, opts, model => enhance.model);
            if let Some(p) = prompt {
                opts.enhance.prompt = p;
            }
        }
        PipelineKind::Describe | PipelineKind::Geolocate => {
            apply_cli_opt!(cli, opts, model => describe.model);
            if let Some(p) = prompt {
                opts.describe.prompt = p;
            }
        }
    }
    if let Some(ref order) = cli.sort_order {
        opts.sort_order = order.parse()?;
    }
    if let Some(m) = cli.backpressure {
        opts.backpressure = check_backpressure(m).context("--backpressure")?;
    }
    if let Some(secs) = cli.status_interval {
        opts.status_interval = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("--status-interval {secs}"))?;
    }
    apply_cli_opt!(cli, opts, retry => retry);
    apply_cli_opt!(cli, opts, retry_failed => retry_failed);
    apply_cli_opt!(cli, opts, verbose => verbose);
    apply_cli_opt!(cli, opts, backend => backend);
    apply_cli_opt!(cli, opts, backend_url => backend_url);
    apply_cli_opt!(cli, opts, skip_threads => threads.skip_check);
    apply_cli_opt!(cli, opts, metadata_threads => threads.metadata);
    apply_cli_opt!(cli, opts, llm_threads => threads.llm);
    apply_cli_opt!(cli, opts, context_threads => threads.context);
    apply_cli_opt!(cli, opts, geolocate_threads => threads.geolocate);
    apply_cli_opt!(cli, opts, write_threads => threads.write);
    Ok(())
}

/// Defaults, then config file, then environment (after `.env`), then CLI.
pub fn resolve_opts(cli: &Cli, kind: PipelineKind) -> Result<Opts> {
    let mut opts = Opts::default();
    if let Some(file) = load_file_config(&config_path(cli)?)? {
        apply_file_to_opts(&file, &mut opts)?;
    }
    load_dotenv(Path::new("."));
    apply_process_env(&mut opts)?;
    apply_cli_to_opts(cli, kind, &mut opts)?;
    Ok(opts)
}

fn print_pipelines() {
    let width = list_pipelines()
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0);
    for (name, description) in list_pipelines() {
        println!("  {name:<width$}  {description}");
    }
}

fn report(kind: PipelineKind, summary: &RunSummary, output_root: &str) {
    let Some(write) = summary.stage("Write") else {
        return;
    };
    let failed: usize = summary.stages.iter().map(|s| s.total.failed).sum();
    let rejected = summary.stage("SkipCheck").map(|s| s.rejected).unwrap_or(0);
    info!(
        "{kind}: {} artifact(s) written to {output_root}, {rejected} skipped, {failed} failure(s)",
        write.done
    );
}

/// Run the pipeline named on the command line, or list pipelines with `--list`.
pub fn handle_run(cli: &Cli) -> Result<()> {
    // Before the config layers, which may log.
    setup_logging(cli.verbose.unwrap_or(false));
    if cli.list {
        print_pipelines();
        return Ok(());
    }
    let Some(name) = cli.pipeline.as_deref() else {
        bail!("no pipeline given (see --list)");
    };
    let kind: PipelineKind = name.parse()?;
    let opts = resolve_opts(cli, kind)?;
    set_verbose(opts.verbose);
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        opts
    );

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        if !stop_handler.swap(true, Ordering::SeqCst) {
            warn!("Stopping: waiting for in-flight items to finish...");
        }
    })
    .context("set Ctrl+C handler")?;

    let deps = PipelineDeps::from_opts(&opts)?;
    let pipeline = build_pipeline(kind, &opts, &deps, stop)?;
    let summary = pipeline.run()?;

    let output_root = if opts.output_dir.as_os_str().is_empty() {
        &opts.input_dir
    } else {
        &opts.output_dir
    };
    report(kind, &summary, &display_relative(output_root, None));
    Ok(())
}
