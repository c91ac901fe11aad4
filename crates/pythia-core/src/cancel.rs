// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Cooperative cancellation for long-running analyses.
//!
//! The parser, reconstructor, and resolver all run on externally supplied,
//! potentially pathological input (editor buffers mid-edit), so every
//! recursive entry point takes a [`CancelToken`] and checks it at bounded
//! intervals — once per node visited or token consumed. Cancellation is
//! advisory: in-flight work observes the flag at those check-points rather
//! than being preempted.
//!
//! Tokens are cheap to clone and may be shared across threads; cancelling
//! any clone cancels them all.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Error returned from a check-point once the token is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

#[derive(Debug)]
struct Inner {
    flag: AtomicBool,
    deadline: Option<Instant>,
}

/// A shared cancellation flag with an optional deadline.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// A token that is never cancelled and never expires.
    #[must_use]
    pub fn none() -> Self {
        Self::new(None)
    }

    /// A token that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Some(Instant::now() + timeout))
    }

    fn new(deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(Inner {
                flag: AtomicBool::new(false),
                deadline,
            }),
        }
    }

    /// Requests cancellation. All clones of this token observe it.
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::Relaxed);
    }

    /// Returns an error if the token has been cancelled or its deadline has
    /// passed. Called at every recursion check-point.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.inner.flag.load(Ordering::Relaxed) {
            return Err(Cancelled);
        }
        if let Some(deadline) = self.inner.deadline
            && Instant::now() > deadline
        {
            // Latch the flag so later checks skip the clock read.
            self.inner.flag.store(true, Ordering::Relaxed);
            return Err(Cancelled);
        }
        Ok(())
    }

    /// Returns true if a check would fail.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::none()
    }
}
