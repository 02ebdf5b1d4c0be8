use crate::rmwatch::debounce::Debouncer;
use crate::rmwatch::report;
use crate::rmwatch::scan::is_page_file;
use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{RecvTimeoutError, channel};
use std::time::Duration;

const INTERRUPT_POLL: Duration = Duration::from_millis(100);

/// Arm SIGINT/SIGTERM to raise the returned flag. The first signal only sets
/// the flag; a second one exits immediately with the conventional code, so a
/// wedged converter can still be escaped.
pub fn register_interrupt_flag() -> Result<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        flag::register_conditional_shutdown(signal, 128 + signal, Arc::clone(&interrupted))
            .with_context(|| format!("failed to register handler for signal {signal}"))?;
        flag::register(signal, Arc::clone(&interrupted))
            .with_context(|| format!("failed to register handler for signal {signal}"))?;
    }
    Ok(interrupted)
}

/// Paths from one raw filesystem event that should reach the debounce
/// scheduler: non-directory `.rm` paths, with renames keyed by their
/// destination.
pub fn relevant_paths(event: &Event) -> Vec<PathBuf> {
    let candidates: Vec<&PathBuf> = match &event.kind {
        EventKind::Create(_) => event.paths.iter().collect(),
        // A completed rename carries [from, to]; only the destination counts.
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().into_iter().collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Vec::new(),
        EventKind::Modify(_) => event.paths.iter().collect(),
        _ => Vec::new(),
    };
    candidates
        .into_iter()
        .filter(|path| is_page_file(path) && !path.is_dir())
        .cloned()
        .collect()
}

/// Subscribe to OS-level change notifications for the watched directories and
/// feed relevant paths into the debouncer. Blocks until `interrupted` is
/// raised or the watcher backend tears the channel down, then stops
/// accepting notifications and lets pending timers and in-flight conversions
/// drain.
pub fn run_watch(
    dirs: &[PathBuf],
    recursive: bool,
    debouncer: Arc<Debouncer>,
    interrupted: &Arc<AtomicBool>,
) -> Result<()> {
    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        notify::Config::default(),
    )
    .context("failed to create filesystem watcher")?;

    let mode = if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    for dir in dirs {
        watcher
            .watch(dir, mode)
            .with_context(|| format!("failed to watch {}", dir.display()))?;
    }

    loop {
        if interrupted.load(Ordering::SeqCst) {
            report::interrupt_received();
            break;
        }
        match rx.recv_timeout(INTERRUPT_POLL) {
            Ok(Ok(event)) => {
                for path in relevant_paths(&event) {
                    debouncer.schedule(path);
                }
            }
            Ok(Err(_)) => {}
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // No further notifications are accepted past this point.
    drop(watcher);
    debouncer.drain();
    Ok(())
}
