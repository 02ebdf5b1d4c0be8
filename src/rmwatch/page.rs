use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Header prefix common to all known .rm formats.
pub const HEADER_PREFIX: &[u8] = b"reMarkable .lines file, version=";

const HEADER_PROBE_BYTES: u64 = 64;

/// One convertible unit: a single .rm page file.
#[derive(Debug, Clone)]
pub struct Page {
    pub path: PathBuf,
    pub format_version: Option<u32>,
    pub is_convertible: bool,
}

impl Page {
    pub fn classify(path: &Path) -> Page {
        Page {
            path: path.to_path_buf(),
            format_version: page_version(path),
            is_convertible: is_convertible(path),
        }
    }
}

/// Read the .rm format version from the page's binary header.
///
/// Any read failure, prefix mismatch, or non-integer tail yields `None`; the
/// caller treats that as permanently non-convertible for this run, never as
/// an error.
pub fn page_version(path: &Path) -> Option<u32> {
    let file = File::open(path).ok()?;
    let mut header = Vec::with_capacity(HEADER_PROBE_BYTES as usize);
    file.take(HEADER_PROBE_BYTES)
        .read_to_end(&mut header)
        .ok()?;
    let rest = header.strip_prefix(HEADER_PREFIX)?;
    let text = String::from_utf8_lossy(rest);
    text.split_whitespace().next()?.parse().ok()
}

/// Result of probing the sibling `<uuid>.content` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorOutcome {
    /// Descriptor parsed and carries a `fileType` string.
    Typed(String),
    /// Descriptor file missing or unreadable.
    Absent,
    /// Descriptor present but not valid JSON, or `fileType` missing.
    Malformed,
}

/// Probe the descriptor for the page's parent collection.
///
/// Standard reMarkable sync layout:
///   <root>/<uuid>.content
///   <root>/<uuid>/<page>.rm
pub fn read_descriptor(page: &Path) -> DescriptorOutcome {
    let Some(dir) = page.parent() else {
        return DescriptorOutcome::Absent;
    };
    let Some(collection) = dir.file_name().and_then(|s| s.to_str()) else {
        return DescriptorOutcome::Absent;
    };
    let Some(root) = dir.parent() else {
        return DescriptorOutcome::Absent;
    };

    let descriptor = root.join(format!("{collection}.content"));
    let raw = match std::fs::read_to_string(&descriptor) {
        Ok(raw) => raw,
        Err(_) => return DescriptorOutcome::Absent,
    };
    let parsed: Value = match serde_json::from_str(&raw) {
        Ok(parsed) => parsed,
        Err(_) => return DescriptorOutcome::Malformed,
    };
    match parsed.get("fileType").and_then(Value::as_str) {
        Some(file_type) => DescriptorOutcome::Typed(file_type.to_string()),
        None => DescriptorOutcome::Malformed,
    }
}

/// Whether the page is a notebook page rather than a PDF/ePub annotation.
///
/// Fail-open: a missing or broken sidecar must never silently drop a page.
pub fn is_convertible(page: &Path) -> bool {
    match read_descriptor(page) {
        DescriptorOutcome::Typed(file_type) => !matches!(file_type.as_str(), "pdf" | "epub"),
        DescriptorOutcome::Absent | DescriptorOutcome::Malformed => true,
    }
}
