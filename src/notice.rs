use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// One-shot failure gate shared by concurrent detectors.
///
/// Several tasks (accept loop, keep-alive monitor, peer-close watcher) can
/// observe the same underlying failure at once; the first to call [`first`]
/// wins and gets to emit the notice, everyone after is suppressed. A scope
/// that tears down intentionally calls [`suppress`] so the resulting errors
/// are not misreported.
///
/// [`first`]: FailureNotice::first
/// [`suppress`]: FailureNotice::suppress
#[derive(Debug, Clone, Default)]
pub struct FailureNotice {
    fired: Arc<AtomicBool>,
    reported: Arc<AtomicBool>,
}

impl FailureNotice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true for exactly one caller across all clones
    pub fn first(&self) -> bool {
        let first = !self.fired.swap(true, Ordering::SeqCst);
        if first {
            self.reported.store(true, Ordering::SeqCst);
        }
        first
    }

    /// Suppress all future reports without emitting one
    pub fn suppress(&self) {
        self.fired.store(true, Ordering::SeqCst);
    }

    /// Whether some detector actually reported (suppression does not count)
    pub fn was_reported(&self) -> bool {
        self.reported.load(Ordering::SeqCst)
    }
}
