use crate::commands::{CommandReport, report_tool_availability};
use crate::rmwatch::config::{load_config, validate};
use crate::rmwatch::debounce::Debouncer;
use crate::rmwatch::engine::ConvertEngine;
use crate::rmwatch::index::{CacheIndex, SharedIndex};
use crate::rmwatch::report;
use crate::rmwatch::scan::find_pages;
use crate::rmwatch::watch::{register_interrupt_flag, run_watch};
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

pub const LOCK_FILE_NAME: &str = ".rmwatch.lock";

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub dirs: Vec<PathBuf>,
    pub output: PathBuf,
    pub delay: Option<f64>,
    pub no_recursive: bool,
    pub verify: bool,
    pub staging: Option<PathBuf>,
    pub blank_threshold: Option<u64>,
    pub scan_only: bool,
}

/// Load the index, convert everything new or changed, then watch the
/// directories live until interrupted.
pub fn run(opts: &WatchOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("watch");

    let mut cfg = load_config()?;
    if let Some(delay) = opts.delay {
        cfg.delay_secs = delay;
    }
    if opts.no_recursive {
        cfg.recursive = false;
    }
    if opts.verify {
        cfg.verify = true;
    }
    if opts.staging.is_some() {
        cfg.staging_dir = opts.staging.clone();
    }
    if let Some(bytes) = opts.blank_threshold {
        cfg.blank_threshold_bytes = bytes;
    }
    validate(&cfg)?;

    fs::create_dir_all(&opts.output)
        .with_context(|| format!("failed to create {}", opts.output.display()))?;

    // Two watchers sharing one output directory would race on the index.
    let lock_path = opts.output.join(LOCK_FILE_NAME);
    let lock_file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("failed to open {}", lock_path.display()))?;
    lock_file.try_lock_exclusive().with_context(|| {
        format!(
            "another rmwatch instance is already watching {}",
            opts.output.display()
        )
    })?;

    // Registered before any conversion starts so an interrupt during the
    // startup scan stops cleanly instead of killing the work mid-page.
    let interrupted = register_interrupt_flag()?;

    report_tool_availability(&mut report);
    for dir in &opts.dirs {
        let suffix = if cfg.recursive { " recursive" } else { "" };
        report.detail(format!("watching={}{suffix}", dir.display()));
    }
    report.detail(format!("output={}", opts.output.display()));
    if cfg.delay_secs > 0.0 {
        report.detail(format!("delay={}s", cfg.delay_secs));
    }

    let index = SharedIndex::new(CacheIndex::load(&opts.output));
    let engine = Arc::new(ConvertEngine::new(
        opts.output.clone(),
        cfg.staging_dir.clone(),
        cfg.blank_threshold_bytes,
        Some(index.clone()),
    ));

    // Convert new or changed pages before the live watch starts.
    let pages = find_pages(&opts.dirs, cfg.recursive)?;
    let mut pending = Vec::new();
    for page in &pages {
        match index.needs_conversion(page, cfg.verify) {
            Ok(true) => pending.push(page.clone()),
            Ok(false) => {}
            Err(err) => {
                report::failed(page, &format!("{err:#}"));
            }
        }
    }
    if pending.is_empty() {
        report.detail(format!("scan total={} up to date", pages.len()));
    } else {
        report.detail(format!(
            "scan total={} new/changed={}, converting",
            pages.len(),
            pending.len()
        ));
    }
    report.flush();

    for page in &pending {
        if interrupted.load(Ordering::SeqCst) {
            break;
        }
        let result = engine.convert(page);
        report::emit_outcome(page, &result);
    }

    if interrupted.load(Ordering::SeqCst) {
        report::interrupt_received();
        return Ok(report);
    }
    if opts.scan_only {
        return Ok(report);
    }

    let engine_for_events = Arc::clone(&engine);
    let debouncer = Debouncer::new(
        Duration::from_secs_f64(cfg.delay_secs),
        Box::new(move |path: &Path| {
            let result = engine_for_events.convert(path);
            report::emit_outcome(path, &result);
        }),
    );

    report.detail("watching for changes, Ctrl+C to stop");
    report.flush();

    run_watch(&opts.dirs, cfg.recursive, debouncer, &interrupted)?;

    drop(lock_file);
    Ok(report)
}
