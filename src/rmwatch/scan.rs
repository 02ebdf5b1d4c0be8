use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const PAGE_EXTENSION: &str = "rm";

pub fn is_page_file(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some(PAGE_EXTENSION)
}

fn collect_pages(root: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(root).with_context(|| format!("failed to read {}", root.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() {
            if is_page_file(&path) {
                out.push(path);
            }
            continue;
        }
        if recursive && path.is_dir() {
            collect_pages(&path, recursive, out)?;
        }
    }
    Ok(())
}

/// Enumerate .rm pages for the startup scan. Each input is either a page file
/// or a directory to scan; results are sorted for stable reporting.
pub fn find_pages(paths: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_file() {
            if is_page_file(path) {
                out.push(path.clone());
            }
            continue;
        }
        if path.is_dir() {
            collect_pages(path, recursive, &mut out)?;
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn finds_pages_recursively_and_sorted() {
        let tmp = tempdir().expect("tempdir");
        let nested = tmp.path().join("uuid-1");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(nested.join("b.rm"), b"").expect("write");
        fs::write(nested.join("a.rm"), b"").expect("write");
        fs::write(tmp.path().join("top.rm"), b"").expect("write");
        fs::write(tmp.path().join("note.txt"), b"").expect("write");

        let got = find_pages(&[tmp.path().to_path_buf()], true).expect("scan");
        assert_eq!(
            got,
            vec![
                tmp.path().join("top.rm"),
                nested.join("a.rm"),
                nested.join("b.rm"),
            ]
        );
    }

    #[test]
    fn non_recursive_scan_skips_subdirectories() {
        let tmp = tempdir().expect("tempdir");
        let nested = tmp.path().join("uuid-1");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(nested.join("deep.rm"), b"").expect("write");
        fs::write(tmp.path().join("top.rm"), b"").expect("write");

        let got = find_pages(&[tmp.path().to_path_buf()], false).expect("scan");
        assert_eq!(got, vec![tmp.path().join("top.rm")]);
    }

    #[test]
    fn direct_file_arguments_are_kept_as_is() {
        let tmp = tempdir().expect("tempdir");
        let rm = tmp.path().join("page.rm");
        let txt = tmp.path().join("note.txt");
        fs::write(&rm, b"").expect("write");
        fs::write(&txt, b"").expect("write");

        let got = find_pages(&[rm.clone(), txt], true).expect("scan");
        assert_eq!(got, vec![rm]);
    }
}
