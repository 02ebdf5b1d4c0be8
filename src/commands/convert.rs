use crate::commands::{CommandReport, report_tool_availability};
use crate::rmwatch::config::{load_config, validate};
use crate::rmwatch::engine::ConvertEngine;
use crate::rmwatch::report::{self, OutcomeClass};
use crate::rmwatch::scan::find_pages;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub paths: Vec<PathBuf>,
    pub output: PathBuf,
    pub no_recursive: bool,
    pub staging: Option<PathBuf>,
    pub blank_threshold: Option<u64>,
}

/// One-shot conversion of the given .rm files or directories. Converts
/// unconditionally: the cache index belongs to the watch command.
pub fn run(opts: &ConvertOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("convert");

    let mut cfg = load_config()?;
    if opts.no_recursive {
        cfg.recursive = false;
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

    let pages = find_pages(&opts.paths, cfg.recursive)?;
    if pages.is_empty() {
        report.detail("no .rm files found");
        return Ok(report);
    }

    report_tool_availability(&mut report);
    report.flush();

    let engine = ConvertEngine::new(
        opts.output.clone(),
        cfg.staging_dir.clone(),
        cfg.blank_threshold_bytes,
        None,
    );

    let mut converted = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    for page in &pages {
        let result = engine.convert(page);
        match report::emit_outcome(page, &result) {
            OutcomeClass::Converted => converted += 1,
            OutcomeClass::Skipped => skipped += 1,
            OutcomeClass::Failed => failed += 1,
        }
    }

    report.detail(format!(
        "pages={} converted={converted} skipped={skipped} failed={failed}",
        pages.len()
    ));
    Ok(report)
}
