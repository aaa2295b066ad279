//! Cooperative cancellation shared between a job handle and its worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use montage_common::error::{EngineError, EngineResult};

/// A cancel request flag. Workers poll it between steps; nothing is ever
/// interrupted forcibly.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once a cancel has been requested.
    pub fn check(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
