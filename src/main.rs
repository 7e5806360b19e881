//! Photoscribe CLI: run one image pipeline over a directory tree.

use anyhow::Result;
use clap::Parser;
use photoscribe::engine::arg_parser::Cli;
use photoscribe::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
