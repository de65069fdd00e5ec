//! Cooperative cancellation primitive.
//!
//! Every long-running operation in Sheaf (installer subprocesses, KB I/O,
//! worker daemon requests, bubble materialization copies) accepts a
//! `CancellationToken` and is expected to check it between phases rather
//! than mid-phase, so a cancelled operation always finishes its smallest
//! atomic unit before returning (spec §5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheaply-cloneable flag that signals cooperative cancellation.
///
/// Cloning a token shares the same underlying flag; cancelling any clone
/// cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(())` if cancellation was requested, for use with `?`
    /// at phase boundaries.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Marker error returned by [`CancellationToken::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;
