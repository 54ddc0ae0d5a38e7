//! Process-wide cancellation signal.
//!
//! A single flag shared between the control surface (which sets it), the
//! optional stop button (which also sets it) and the run thread (which only
//! reads it). Waits inside a run are sliced into poll intervals so a set flag
//! is observed within one interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Shared cancellation flag. Cloning yields another handle to the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
}

impl CancelSignal {
    /// Create a cleared signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the active run (if any).
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clear the flag.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Returns true if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking every `interval` to check the flag.
    ///
    /// Returns `true` if the full duration elapsed, `false` if cancelled.
    /// The flag is checked before the first slice, so an already-set signal
    /// returns immediately.
    pub fn wait(&self, duration: Duration, interval: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let slice = interval.min(deadline - now);
            thread::sleep(slice.max(Duration::from_millis(1)));
        }
    }
}
