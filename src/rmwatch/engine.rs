use crate::error::ConvertError;
use crate::rmwatch::index::{SharedIndex, output_path_for};
use crate::rmwatch::page::Page;
use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Pages at or above this format version dispatch to `rmc`; older versions
/// use `rm2pdf`. This threshold and the two tool identities are the only
/// version-specific policy in the system.
pub const VERSION_THRESHOLD: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Rmc,
    Rm2pdf,
}

impl Tool {
    pub fn name(self) -> &'static str {
        match self {
            Tool::Rmc => "rmc",
            Tool::Rm2pdf => "rm2pdf",
        }
    }

    fn command(self, source: &Path, scratch: &Path) -> Command {
        let mut cmd = Command::new(self.name());
        match self {
            Tool::Rmc => {
                cmd.arg(source).arg("-o").arg(scratch);
            }
            Tool::Rm2pdf => {
                cmd.arg(source).arg(scratch);
            }
        }
        cmd
    }
}

pub fn tool_for_version(version: u32) -> Tool {
    if version >= VERSION_THRESHOLD {
        Tool::Rmc
    } else {
        Tool::Rm2pdf
    }
}

/// Terminal state of one conversion attempt.
#[derive(Debug)]
pub enum ConvertOutcome {
    Converted { version: u32, output: PathBuf },
    SkippedBlank { version: u32 },
    SkippedNotConvertible,
    SkippedUnrecognized,
    Failed(ConvertError),
}

pub struct ConvertEngine {
    output_dir: PathBuf,
    staging_dir: Option<PathBuf>,
    blank_threshold_bytes: u64,
    index: Option<SharedIndex>,
}

fn discard_scratch(path: &Path) {
    // The tool may never have written it.
    let _ = fs::remove_file(path);
}

/// Same-filesystem rename, with a staged copy fallback when the scratch file
/// lives on another device.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if from == to {
        return Ok(());
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    match fs::rename(from, to) {
        Ok(_) => Ok(()),
        Err(err) if matches!(err.kind(), ErrorKind::CrossesDevices | ErrorKind::PermissionDenied) => {
            staged_copy(from, to)
        }
        Err(err) => Err(err)
            .with_context(|| format!("failed to move {} to {}", from.display(), to.display())),
    }
}

/// Cross-device move: copy into a temporary sibling of the destination, then
/// rename it into place and remove the source. The destination path only
/// ever appears through the rename, so a reader can never observe a
/// partially copied file there.
fn staged_copy(from: &Path, to: &Path) -> Result<()> {
    let dir = to.parent().unwrap_or_else(|| Path::new("."));
    let staged = tempfile::Builder::new()
        .prefix(".rmwatch-move-")
        .tempfile_in(dir)
        .with_context(|| format!("failed to stage copy in {}", dir.display()))?;
    fs::copy(from, staged.path())
        .with_context(|| format!("failed to copy {} to {}", from.display(), to.display()))?;
    staged
        .into_temp_path()
        .persist(to)
        .with_context(|| format!("failed to replace {}", to.display()))?;
    fs::remove_file(from)
        .with_context(|| format!("failed to remove {}", from.display()))?;
    Ok(())
}

impl ConvertEngine {
    pub fn new(
        output_dir: PathBuf,
        staging_dir: Option<PathBuf>,
        blank_threshold_bytes: u64,
        index: Option<SharedIndex>,
    ) -> ConvertEngine {
        ConvertEngine {
            output_dir,
            staging_dir,
            blank_threshold_bytes,
            index,
        }
    }

    /// Reserve a private scratch output path, distinct from the final
    /// destination, so a concurrent or aborted conversion can never expose a
    /// half-written file at the destination. The placeholder is removed
    /// because the converter tool must create the file itself.
    fn allocate_scratch(&self) -> Result<PathBuf> {
        let staging = self
            .staging_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        fs::create_dir_all(&staging)
            .with_context(|| format!("failed to create staging dir {}", staging.display()))?;
        let placeholder = tempfile::Builder::new()
            .prefix("rmwatch-")
            .suffix(".pdf")
            .tempfile_in(&staging)
            .context("failed to allocate scratch output")?;
        let scratch = placeholder.path().to_path_buf();
        placeholder
            .close()
            .context("failed to release scratch placeholder")?;
        Ok(scratch)
    }

    /// Convert one page. Every failure path removes the scratch file and
    /// leaves the cache index untouched; the index is updated only from the
    /// `Converted` terminal state. Nothing is retried here; an un-updated
    /// entry means the page is reconsidered on the next pass.
    pub fn convert(&self, page_path: &Path) -> Result<ConvertOutcome> {
        let page = Page::classify(page_path);
        if !page.is_convertible {
            return Ok(ConvertOutcome::SkippedNotConvertible);
        }
        let Some(version) = page.format_version else {
            return Ok(ConvertOutcome::SkippedUnrecognized);
        };

        let tool = tool_for_version(version);
        let scratch = self.allocate_scratch()?;
        let output = match tool.command(page_path, &scratch).output() {
            Ok(output) => output,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                discard_scratch(&scratch);
                return Ok(ConvertOutcome::Failed(ConvertError::ToolMissing {
                    tool: tool.name(),
                }));
            }
            Err(err) => {
                discard_scratch(&scratch);
                return Err(err).with_context(|| format!("failed to run {}", tool.name()));
            }
        };

        if !output.status.success() {
            discard_scratch(&scratch);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .map(|line| line.trim().to_string())
                .unwrap_or_else(|| format!("exited with {}", output.status));
            return Ok(ConvertOutcome::Failed(ConvertError::ToolExecutionFailed {
                tool: tool.name(),
                reason,
            }));
        }

        let size = match fs::metadata(&scratch) {
            Ok(meta) => meta.len(),
            Err(_) => {
                return Ok(ConvertOutcome::Failed(ConvertError::ToolExecutionFailed {
                    tool: tool.name(),
                    reason: "produced no output file".to_string(),
                }));
            }
        };
        if size <= self.blank_threshold_bytes {
            discard_scratch(&scratch);
            return Ok(ConvertOutcome::SkippedBlank { version });
        }

        let destination = output_path_for(&self.output_dir, page_path);
        if let Err(err) = move_file(&scratch, &destination) {
            discard_scratch(&scratch);
            return Err(err);
        }

        if let Some(index) = &self.index {
            index
                .record_conversion(page_path, &destination)
                .with_context(|| {
                    format!("failed to update conversion index for {}", page_path.display())
                })?;
        }

        Ok(ConvertOutcome::Converted {
            version,
            output: destination,
        })
    }
}
