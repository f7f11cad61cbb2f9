//! Cooperative cancellation for analysis runs

use chart_core::{AnalysisError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Clonable cancellation flag checked at stage boundaries.
///
/// Cancellation is cooperative: an in-flight stage call finishes (or times
/// out), and the orchestrator observes the flag before starting the next
/// stage.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` on the first call, `false` if
    /// the token was already cancelled.
    pub fn cancel(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Error out if cancellation has been requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }
}
