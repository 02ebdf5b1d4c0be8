use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

type ConvertFn = dyn Fn(&Path) + Send + Sync;

struct PendingTimer {
    cancelled: Arc<AtomicBool>,
}

/// Coalesces bursts of change notifications for the same path into a single
/// conversion. Editors and the sync agent commonly emit several write events
/// per logical save.
///
/// At most one live timer exists per path; a new event cancels and replaces
/// the existing timer. Cancellation is advisory: a timer that has already
/// fired stays fired, which at worst runs one extra conversion.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<HashMap<PathBuf, PendingTimer>>,
    in_flight: AtomicUsize,
    callback: Box<ConvertFn>,
}

impl Debouncer {
    pub fn new(delay: Duration, callback: Box<ConvertFn>) -> Arc<Debouncer> {
        Arc::new(Debouncer {
            delay,
            pending: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            callback,
        })
    }

    fn invoke(&self, path: &Path) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        (self.callback)(path);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Schedule a conversion for `path` after the configured delay.
    ///
    /// A zero delay invokes the callback synchronously with no timer
    /// bookkeeping: the degenerate, always-consistent mode.
    pub fn schedule(self: &Arc<Self>, path: PathBuf) {
        if self.delay.is_zero() {
            self.invoke(&path);
            return;
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let mut pending = self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = pending.insert(
                path.clone(),
                PendingTimer {
                    cancelled: Arc::clone(&cancelled),
                },
            ) {
                previous.cancelled.store(true, Ordering::SeqCst);
            }
        }

        let this = Arc::clone(self);
        thread::spawn(move || {
            thread::sleep(this.delay);
            {
                // Cancellation is flagged under the same lock, so checking
                // here is race-free against replacement.
                let mut pending = this
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if cancelled.load(Ordering::SeqCst) {
                    return;
                }
                pending.remove(&path);
            }
            this.invoke(&path);
        });
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Block until every pending timer has fired or been cancelled and every
    /// in-flight conversion has returned.
    pub fn drain(&self) {
        loop {
            if self.pending_count() == 0 && self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            thread::sleep(Duration::from_millis(25));
        }
    }
}
