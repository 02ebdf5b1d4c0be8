use thiserror::Error;

/// Tool-level failures for a single page conversion. A page-level failure is
/// reported and skipped; it never aborts sibling pages or the watch loop.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("'{tool}' not found; install it and try again")]
    ToolMissing { tool: &'static str },
    #[error("{tool} failed: {reason}")]
    ToolExecutionFailed { tool: &'static str, reason: String },
}
