//! Cancellation and deadline control for a run.
//!
//! A [`RunControl`] is cloned into every place that may block (completion
//! calls, retry pauses, courtesy pauses). Clones share the cancel flag, so
//! any holder can stop the run; the orchestrator observes it at the next
//! call boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Longest uninterrupted sleep slice inside [`RunControl::sleep`].
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Why a run stopped before finishing its task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("run cancelled")]
    Cancelled,
    #[error("run deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Request cancellation. Visible to every clone.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn check(&self) -> Result<(), Interrupted> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(Interrupted::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(Interrupted::DeadlineExceeded);
        }
        Ok(())
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Clamp a per-call timeout so it never outlives the deadline.
    pub fn cap(&self, timeout: Duration) -> Duration {
        match self.remaining() {
            Some(remaining) => timeout.min(remaining),
            None => timeout,
        }
    }

    /// Sleep for `duration`, waking early with an error on cancellation or
    /// deadline. Checks once before sleeping even when `duration` is zero.
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        self.check()?;
        let until = Instant::now() + duration;
        loop {
            let left = until.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(());
            }
            thread::sleep(left.min(SLEEP_SLICE));
            self.check()?;
        }
    }
}
