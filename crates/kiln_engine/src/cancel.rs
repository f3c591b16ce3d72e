//! Cooperative cancellation for in-flight builds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag observed by the pipeline between stages.
///
/// Clones share one flag, so a caller can keep a clone and cancel from
/// another thread. Cancellation is cooperative: a stage that has already
/// started runs to completion, and the pipeline checks the token before
/// starting the next stage. A canceled build still finalizes its state.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    canceled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-canceled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the build observing this token.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called on any clone.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
    }
}
