use clap::Parser;
use std::path::PathBuf;

/// Describe, enhance or geolocate a photo collection with local models.
#[derive(Clone, Debug, Default, Parser)]
#[command(name = "photoscribe", version)]
#[command(about = "Run an image pipeline over a directory tree, writing one text artifact per image.")]
pub struct Cli {
    /// Pipeline to run: describe, enhance or geolocate (see --list).
    #[arg(value_name = "PIPELINE", required_unless_present = "list")]
    pub pipeline: Option<String>,

    /// Directory to scan for images.
    #[arg(value_name = "INPUT_DIR")]
    pub input: Option<PathBuf>,

    /// Where artifacts are written. Default: alongside the images.
    #[arg(value_name = "OUTPUT_DIR")]
    pub output: Option<PathBuf>,

    /// Same as the INPUT_DIR positional.
    #[arg(long = "input-dir", short = 'i', conflicts_with = "input")]
    pub input_dir: Option<PathBuf>,

    /// Same as the OUTPUT_DIR positional.
    #[arg(long = "output-dir", short = 'o', conflicts_with = "output")]
    pub output_dir: Option<PathBuf>,

    /// Model name for the selected pipeline's inference stage.
    #[arg(long, short = 'm')]
    pub model: Option<String>,

    /// Prompt template, or `@path` to read it from a file.
    #[arg(long, short = 'p')]
    pub prompt: Option<String>,

    /// Read the prompt template from a file.
    #[arg(long, conflicts_with = "prompt")]
    pub prompt_file: Option<PathBuf>,

    /// natural-asc, natural-desc, lexicographic-asc or lexicographic-desc (aliases: name-asc, name-desc).
    #[arg(long, short = 's')]
    pub sort_order: Option<String>,

    /// Downstream queue may hold `threads * N` items before upstream pauses.
    #[arg(long, short = 'b')]
    pub backpressure: Option<f64>,

    /// Seconds between status lines.
    #[arg(long)]
    pub status_interval: Option<f64>,

    /// Reprocess every image, ignoring existing artifacts.
    #[arg(long, short = 'r', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub retry: Option<bool>,

    /// Reprocess images whose last attempt failed.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub retry_failed: Option<bool>,

    /// Verbose output: debug logging and a status line after every item.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    /// Config file. Default: `photoscribe.toml` in the working directory, if present.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Inference backend name.
    #[arg(long)]
    pub backend: Option<String>,

    /// Inference backend base URL.
    #[arg(long)]
    pub backend_url: Option<String>,

    #[arg(long, value_name = "N")]
    pub skip_threads: Option<usize>,

    #[arg(long, value_name = "N")]
    pub metadata_threads: Option<usize>,

    #[arg(long, value_name = "N")]
    pub llm_threads: Option<usize>,

    #[arg(long, value_name = "N")]
    pub context_threads: Option<usize>,

    #[arg(long, value_name = "N")]
    pub geolocate_threads: Option<usize>,

    #[arg(long, value_name = "N")]
    pub write_threads: Option<usize>,

    /// List available pipelines and exit.
    #[arg(long, short = 'l')]
    pub list: bool,
}

impl Cli {
    /// Input directory from either the positional or the flag.
    pub fn input_dir(&self) -> Option<&PathBuf> {
        self.input_dir.as_ref().or(self.input.as_ref())
    }

    pub fn output_dir(&self) -> Option<&PathBuf> {
        self.output_dir.as_ref().or(self.output.as_ref())
    }
}
