use crate::error::RenderError;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Renderers call this between drawing stages so a superseded request
    /// unwinds as `RenderError::Cancelled` instead of a hard failure.
    pub fn check_cancelled(&self, stage: &'static str) -> Result<(), RenderError> {
        if self.is_cancelled() {
            tracing::trace!(stage, "render observed cancellation");
            return Err(RenderError::Cancelled);
        }
        Ok(())
    }
}

/// Monotonic session counter. Async work captures the value returned by
/// [`Generation::advance`] and compares it with [`Generation::is_current`]
/// before touching shared state; a mismatch means the work was superseded.
#[derive(Clone, Debug, Default)]
pub struct Generation {
    current: Arc<AtomicU64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.current() == token
    }
}
