//! imgload CLI: load new media files into an image set; use --dry-run to list them only.

use anyhow::Result;
use clap::Parser;
use imgload::engine::arg_parser::Cli;
use imgload::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
