use crate::rmwatch::fingerprint::file_digest;
use crate::rmwatch::report;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub const INDEX_FILE_NAME: &str = ".rm_metadata.json";

pub const OUTPUT_EXTENSION: &str = "pdf";

/// Fingerprints of one page's last successful, non-blank conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub input: String,
    pub output: String,
}

/// Destination file for a page: `<output_dir>/<stem>.pdf`.
pub fn output_path_for(output_dir: &Path, page: &Path) -> PathBuf {
    let stem = page
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("page");
    output_dir.join(format!("{stem}.{OUTPUT_EXTENSION}"))
}

/// Persisted mapping from page path to last-known conversion fingerprints.
///
/// Loaded once at startup; the in-memory map is authoritative afterwards and
/// is flushed after every successful conversion.
#[derive(Debug)]
pub struct CacheIndex {
    output_dir: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
}

impl CacheIndex {
    pub fn empty(output_dir: &Path) -> CacheIndex {
        CacheIndex {
            output_dir: output_dir.to_path_buf(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the index from `<output_dir>/.rm_metadata.json`.
    ///
    /// A missing file yields an empty index. A document that is not valid
    /// JSON, or whose values are not all structured records, is an
    /// incompatible legacy format: it is discarded in full (the file removed)
    /// with one warning, forcing a full reconversion. Conversion is
    /// idempotent, so the rebuild produces the same outputs.
    pub fn load(output_dir: &Path) -> CacheIndex {
        let file = output_dir.join(INDEX_FILE_NAME);
        if !file.exists() {
            return CacheIndex::empty(output_dir);
        }

        let Ok(raw) = fs::read_to_string(&file) else {
            return CacheIndex::empty(output_dir);
        };
        let Ok(parsed) = serde_json::from_str::<Value>(&raw) else {
            report::index_discarded(&file);
            let _ = fs::remove_file(&file);
            return CacheIndex::empty(output_dir);
        };
        let structured = parsed
            .as_object()
            .is_some_and(|map| map.values().all(Value::is_object));
        if !structured {
            report::index_discarded(&file);
            let _ = fs::remove_file(&file);
            return CacheIndex::empty(output_dir);
        }

        match serde_json::from_value::<BTreeMap<String, CacheEntry>>(parsed) {
            Ok(entries) => CacheIndex {
                output_dir: output_dir.to_path_buf(),
                entries,
            },
            Err(_) => {
                report::index_discarded(&file);
                let _ = fs::remove_file(&file);
                CacheIndex::empty(output_dir)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, page: &Path) -> Option<&CacheEntry> {
        self.entries.get(&page.display().to_string())
    }

    /// Whether the page should be (re)converted.
    ///
    /// Always true when no entry exists or the input fingerprint changed.
    /// With `verify`, also true when the output file is missing or its
    /// fingerprint no longer matches (out-of-band tampering or deletion).
    pub fn needs_conversion(&self, page: &Path, verify: bool) -> Result<bool> {
        let Some(entry) = self.entry(page) else {
            return Ok(true);
        };
        if file_digest(page)? != entry.input {
            return Ok(true);
        }
        if verify {
            let output = output_path_for(&self.output_dir, page);
            if !output.exists() {
                return Ok(true);
            }
            if file_digest(&output)? != entry.output {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn record(&mut self, page: &Path, entry: CacheEntry) {
        self.entries.insert(page.display().to_string(), entry);
    }

    /// Atomically rewrite the backing document: write a sibling temporary
    /// file, then rename it into place so a crash mid-write never leaves a
    /// truncated index.
    pub fn persist(&self) -> Result<PathBuf> {
        let file = self.output_dir.join(INDEX_FILE_NAME);
        let tmp = self.output_dir.join(format!("{INDEX_FILE_NAME}.tmp"));
        let data = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&tmp, format!("{data}\n"))
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &file)
            .with_context(|| format!("failed to replace {}", file.display()))?;
        Ok(file)
    }
}

/// The index shared across the startup scan and concurrent live conversions.
///
/// Exposes only whole check-then-maybe-record operations; the backing map is
/// never handed out, so every read-modify-persist sequence runs under one
/// lock.
#[derive(Clone)]
pub struct SharedIndex {
    inner: Arc<Mutex<CacheIndex>>,
}

impl SharedIndex {
    pub fn new(index: CacheIndex) -> SharedIndex {
        SharedIndex {
            inner: Arc::new(Mutex::new(index)),
        }
    }

    pub fn needs_conversion(&self, page: &Path, verify: bool) -> Result<bool> {
        let index = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        index.needs_conversion(page, verify)
    }

    /// Fingerprint source and destination, record the entry, and flush the
    /// document, all under the index lock.
    pub fn record_conversion(&self, page: &Path, output: &Path) -> Result<()> {
        let mut index = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = CacheEntry {
            input: file_digest(page)?,
            output: file_digest(output)?,
        };
        index.record(page, entry);
        index.persist()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn seed(output_dir: &Path, page: &Path, body: &[u8], output_body: &[u8]) -> CacheIndex {
        fs::write(page, body).expect("write page");
        let output = output_path_for(output_dir, page);
        fs::write(&output, output_body).expect("write output");
        let mut index = CacheIndex::empty(output_dir);
        index.record(
            page,
            CacheEntry {
                input: file_digest(page).expect("input digest"),
                output: file_digest(&output).expect("output digest"),
            },
        );
        index
    }

    #[test]
    fn missing_file_loads_empty() {
        let tmp = tempdir().expect("tempdir");
        let index = CacheIndex::load(tmp.path());
        assert!(index.is_empty());
    }

    #[test]
    fn bare_string_values_discard_document_and_file() {
        let tmp = tempdir().expect("tempdir");
        let file = tmp.path().join(INDEX_FILE_NAME);
        fs::write(&file, r#"{"/a/page.rm": "abc123"}"#).expect("write index");

        let index = CacheIndex::load(tmp.path());
        assert!(index.is_empty());
        assert!(!file.exists());
    }

    #[test]
    fn invalid_json_discards_document() {
        let tmp = tempdir().expect("tempdir");
        let file = tmp.path().join(INDEX_FILE_NAME);
        fs::write(&file, "not json{{").expect("write index");

        let index = CacheIndex::load(tmp.path());
        assert!(index.is_empty());
    }

    #[test]
    fn persist_then_load_round_trips() {
        let tmp = tempdir().expect("tempdir");
        let page = tmp.path().join("page.rm");
        let mut index = CacheIndex::empty(tmp.path());
        index.record(
            &page,
            CacheEntry {
                input: "aa".to_string(),
                output: "bb".to_string(),
            },
        );
        index.persist().expect("persist");

        let reloaded = CacheIndex::load(tmp.path());
        assert_eq!(reloaded.len(), 1);
        assert_eq!(
            reloaded.entry(&page),
            Some(&CacheEntry {
                input: "aa".to_string(),
                output: "bb".to_string(),
            })
        );
    }

    #[test]
    fn persist_leaves_no_temporary_sibling() {
        let tmp = tempdir().expect("tempdir");
        let index = CacheIndex::empty(tmp.path());
        index.persist().expect("persist");
        assert!(!tmp.path().join(format!("{INDEX_FILE_NAME}.tmp")).exists());
        assert!(tmp.path().join(INDEX_FILE_NAME).exists());
    }

    #[test]
    fn unknown_page_needs_conversion() {
        let tmp = tempdir().expect("tempdir");
        let page = tmp.path().join("page.rm");
        fs::write(&page, b"body").expect("write page");
        let index = CacheIndex::empty(tmp.path());
        assert!(index.needs_conversion(&page, false).expect("check"));
    }

    #[test]
    fn unchanged_page_is_a_cache_hit() {
        let tmp = tempdir().expect("tempdir");
        let page = tmp.path().join("page.rm");
        let index = seed(tmp.path(), &page, b"body", b"pdf bytes");
        assert!(!index.needs_conversion(&page, false).expect("check"));
        assert!(!index.needs_conversion(&page, true).expect("check"));
    }

    #[test]
    fn changed_input_needs_conversion() {
        let tmp = tempdir().expect("tempdir");
        let page = tmp.path().join("page.rm");
        let index = seed(tmp.path(), &page, b"body", b"pdf bytes");
        fs::write(&page, b"edited body").expect("rewrite page");
        assert!(index.needs_conversion(&page, false).expect("check"));
    }

    #[test]
    fn missing_output_only_detected_with_verify() {
        let tmp = tempdir().expect("tempdir");
        let page = tmp.path().join("page.rm");
        let index = seed(tmp.path(), &page, b"body", b"pdf bytes");
        fs::remove_file(output_path_for(tmp.path(), &page)).expect("remove output");

        assert!(!index.needs_conversion(&page, false).expect("check"));
        assert!(index.needs_conversion(&page, true).expect("check"));
    }

    #[test]
    fn tampered_output_only_detected_with_verify() {
        let tmp = tempdir().expect("tempdir");
        let page = tmp.path().join("page.rm");
        let index = seed(tmp.path(), &page, b"body", b"pdf bytes");
        fs::write(output_path_for(tmp.path(), &page), b"tampered").expect("rewrite output");

        assert!(!index.needs_conversion(&page, false).expect("check"));
        assert!(index.needs_conversion(&page, true).expect("check"));
    }

    #[test]
    fn output_path_uses_page_stem() {
        let got = output_path_for(Path::new("/out"), Path::new("/sync/abc/my_note.rm"));
        assert_eq!(got, PathBuf::from("/out/my_note.pdf"));
    }
}
