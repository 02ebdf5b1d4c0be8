use crate::rmwatch::engine::ConvertOutcome;
use anyhow::Result;
use std::path::Path;

/// Tally bucket for a reported outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    Converted,
    Skipped,
    Failed,
}

fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_ascii_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if ch.is_ascii_graphic() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

fn page_name(path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    sanitize_value(name)
}

pub fn converted(page: &Path, version: u32, output: &Path) {
    println!(
        "convert status=ok page={} version={} output={}",
        page_name(page),
        version,
        page_name(output),
    );
}

pub fn blank(page: &Path, version: u32) {
    println!(
        "convert status=blank page={} version={}",
        page_name(page),
        version,
    );
}

pub fn skipped(page: &Path, reason: &str) {
    eprintln!(
        "convert status=skip page={} reason={}",
        page_name(page),
        sanitize_value(reason),
    );
}

pub fn failed(page: &Path, reason: &str) {
    eprintln!(
        "convert status=error page={} reason={}",
        page_name(page),
        sanitize_value(reason),
    );
}

pub fn interrupt_received() {
    eprintln!("interrupt received; finishing pending conversions");
}

pub fn index_discarded(file: &Path) {
    eprintln!(
        "warning: {} uses an incompatible format and will be rebuilt; all pages will be reprocessed",
        file.display(),
    );
}

/// Report one conversion attempt as a single structured line and classify it
/// for the caller's tally. Not-convertible pages are deliberately silent.
pub fn emit_outcome(page: &Path, result: &Result<ConvertOutcome>) -> OutcomeClass {
    match result {
        Ok(ConvertOutcome::Converted { version, output }) => {
            converted(page, *version, output);
            OutcomeClass::Converted
        }
        Ok(ConvertOutcome::SkippedBlank { version }) => {
            blank(page, *version);
            OutcomeClass::Skipped
        }
        Ok(ConvertOutcome::SkippedNotConvertible) => OutcomeClass::Skipped,
        Ok(ConvertOutcome::SkippedUnrecognized) => {
            skipped(page, "unrecognized header");
            OutcomeClass::Skipped
        }
        Ok(ConvertOutcome::Failed(err)) => {
            failed(page, &err.to_string());
            OutcomeClass::Failed
        }
        Err(err) => {
            failed(page, &format!("{err:#}"));
            OutcomeClass::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::sanitize_value;

    #[test]
    fn sanitize_value_rewrites_whitespace() {
        assert_eq!(sanitize_value("a b\tc"), "a_b_c");
    }

    #[test]
    fn sanitize_value_falls_back_for_empty() {
        assert_eq!(sanitize_value("   "), "na");
    }
}
