//! CLI command handler: load new files by default; --dry-run only lists them.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine::arg_parser::Cli;
use crate::engine::progress::BarReporter;
use crate::ingest::{ingest_dir_with_opts, list_new_files};
use crate::pipeline::{NoProgress, ProgressReporter};
use crate::utils::imgload_toml::{apply_file_to_opts, export_standard, load_imgload_toml};
use crate::utils::{Colors, setup_logging};
use crate::{IngestSummary, Opts};

/// Settings file first, then CLI flags on top.
fn setup_opts(cli: &Cli) -> Opts {
    let mut opts = Opts::default();
    if let Some(file) = load_imgload_toml(&cli.dir) {
        apply_file_to_opts(&file, &mut opts);
    }
    if cli.db.is_some() {
        opts.db_path = cli.db.clone();
    }
    if cli.tool.is_some() {
        opts.tool_path = cli.tool.clone();
    }
    for (tag, label) in &cli.tags {
        opts.load.metadata_fields.insert(tag.clone(), label.clone());
    }
    if let Some(camtrap) = cli.camtrap {
        opts.load.export_standard = export_standard(camtrap);
    }
    if cli.jobs.is_some() {
        opts.max_concurrency = cli.jobs;
    }
    if let Some(verbose) = cli.verbose {
        opts.verbose = verbose;
    }
    opts.dry_run = cli.dry_run;
    setup_logging(opts.verbose);
    opts
}

/// Load new files (default) or list them when --dry-run.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let opts = setup_opts(cli);
    if opts.dry_run {
        warn!("RUNNING IN DRY-RUN MODE. NOTHING WILL BE LOADED.");
        let new_files = list_new_files(&cli.dir, &opts)?;
        for c in &new_files {
            println!("{}", c.path.display());
        }
        println!("{} new file(s)", new_files.len());
        return Ok(());
    }

    let cancel_requested = Arc::new(AtomicBool::new(false));
    let cancel_requested_handler = Arc::clone(&cancel_requested);
    ctrlc::set_handler(move || {
        cancel_requested_handler.store(true, Ordering::SeqCst);
    })
    .context("set Ctrl+C handler")?;

    let bar = opts.verbose.then(|| Arc::new(BarReporter::new()));
    let reporter: Arc<dyn ProgressReporter> = match &bar {
        Some(bar) => Arc::clone(bar) as Arc<dyn ProgressReporter>,
        None => Arc::new(NoProgress),
    };

    debug!("Loading image set...");
    let summary = ingest_dir_with_opts(&cli.dir, &opts, cancel_requested, reporter)?;
    if let Some(bar) = bar {
        bar.finish();
    }
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &IngestSummary) {
    if summary.cancelled {
        println!(
            "{}",
            Colors::colorize(
                Colors::CANCELLED,
                &format!(
                    "Cancelled: loaded {} of {} file(s), nothing inserted",
                    summary.loaded, summary.to_load
                )
            )
        );
    } else {
        println!(
            "{}",
            Colors::colorize(
                Colors::LOADED,
                &format!(
                    "Inserted {} of {} new file(s)",
                    summary.inserted, summary.to_load
                )
            )
        );
    }
    if !summary.skipped_too_long.is_empty() {
        println!(
            "{}",
            Colors::colorize(
                Colors::SKIPPED,
                &format!(
                    "Skipped files in {} folder(s) with paths that are too long:",
                    summary.skipped_too_long.len()
                )
            )
        );
        for folder in &summary.skipped_too_long {
            println!("  {folder}");
        }
    }
}
