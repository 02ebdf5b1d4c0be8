pub mod convert;
pub mod watch;

use crate::rmwatch::engine::Tool;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    /// Print and drain accumulated lines. Long-running commands flush before
    /// blocking so startup details are visible immediately; `cli::run` prints
    /// whatever remains on return.
    pub fn flush(&mut self) {
        for detail in self.details.drain(..) {
            println!("{}: {detail}", self.command);
        }
        for issue in self.issues.drain(..) {
            eprintln!("{}: issue: {issue}", self.command);
        }
    }
}

/// Report converter tool availability at startup. A missing tool is a
/// warning, not a failure: pages needing it are skipped with a reported
/// error when they come up.
pub fn report_tool_availability(report: &mut CommandReport) {
    for tool in [Tool::Rmc, Tool::Rm2pdf] {
        match which::which(tool.name()) {
            Ok(path) => report.detail(format!("tool.{}={}", tool.name(), path.display())),
            Err(_) => report.detail(format!(
                "tool.{}=missing (pages needing it will be skipped)",
                tool.name()
            )),
        }
    }
}
