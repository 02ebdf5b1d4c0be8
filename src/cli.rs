use crate::commands::convert::{self, ConvertOptions};
use crate::commands::watch::{self, WatchOptions};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "rmwatch",
    version,
    about = "Convert reMarkable .rm notebook pages to PDF, incrementally and on change."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert .rm pages once. Each PATH is a page file or a directory to
    /// scan; PDF and ePub annotations are silently skipped.
    Convert {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,

        /// Directory where PDFs are written.
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Do not scan directories recursively.
        #[arg(long)]
        no_recursive: bool,

        /// Directory for scratch files during conversion (default: system temp).
        #[arg(long, value_name = "DIR")]
        staging: Option<PathBuf>,

        /// Outputs at or below this many bytes are treated as blank pages.
        #[arg(long, value_name = "BYTES")]
        blank_threshold: Option<u64>,
    },
    /// Watch directories for .rm pages, converting new or changed pages.
    Watch {
        #[arg(required = true, value_name = "DIR")]
        dirs: Vec<PathBuf>,

        /// Directory where PDFs are written.
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Debounce delay in seconds before converting a changed page.
        #[arg(short, long, value_name = "SECS")]
        delay: Option<f64>,

        /// Do not watch directories recursively.
        #[arg(long)]
        no_recursive: bool,

        /// Also reconvert pages whose output PDF is missing or has changed.
        #[arg(long)]
        verify: bool,

        /// Directory for scratch files during conversion (default: system temp).
        #[arg(long, value_name = "DIR")]
        staging: Option<PathBuf>,

        /// Outputs at or below this many bytes are treated as blank pages.
        #[arg(long, value_name = "BYTES")]
        blank_threshold: Option<u64>,

        /// Run the startup scan, then exit instead of watching.
        #[arg(long)]
        scan_only: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut report = match cli.command {
        Commands::Convert {
            paths,
            output,
            no_recursive,
            staging,
            blank_threshold,
        } => convert::run(&ConvertOptions {
            paths,
            output,
            no_recursive,
            staging,
            blank_threshold,
        })?,
        Commands::Watch {
            dirs,
            output,
            delay,
            no_recursive,
            verify,
            staging,
            blank_threshold,
            scan_only,
        } => watch::run(&WatchOptions {
            dirs,
            output,
            delay,
            no_recursive,
            verify,
            staging,
            blank_threshold,
            scan_only,
        })?,
    };

    let command = report.command.clone();
    let ok = report.ok;
    report.flush();
    if !ok {
        anyhow::bail!("{command} completed with issues");
    }
    Ok(())
}
