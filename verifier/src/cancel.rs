//! Cooperative cancellation for external invocations.
//!
//! A [`CancellationToken`] is threaded through every process and HTTP call a
//! verification makes. It combines a shared flag, which any clone can raise,
//! with an optional deadline imposed by the caller. Nothing in the pipeline
//! sets a deadline on its own.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Reason an operation was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Cancelled {
    /// [`CancellationToken::cancel`] was called.
    #[error("operation cancelled")]
    Requested,

    /// The caller's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Shared cancellation flag with an optional deadline.
///
/// Clones observe the same flag, so a token handed to a worker can be
/// cancelled from the thread that created it.
///
/// # Examples
///
/// ```
/// use provenance_verifier::cancel::{CancellationToken, Cancelled};
///
/// let token = CancellationToken::new();
/// let observer = token.clone();
/// assert!(observer.check().is_ok());
///
/// token.cancel();
/// assert_eq!(observer.check(), Err(Cancelled::Requested));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Create a token with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of this token that also expires at `deadline`.
    #[must_use]
    pub fn with_deadline(self, deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..self
        }
    }

    /// Return a copy of this token that expires `timeout` from now.
    ///
    /// Timeouts too large to represent leave the token without a deadline.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Request cancellation for this token and all of its clones.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Return the deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Return the time left before the deadline.
    ///
    /// `None` means the token has no deadline. A passed deadline yields
    /// [`Duration::ZERO`].
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Return `true` once the token is cancelled or its deadline has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    /// Fail with the interruption reason if work should stop.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled::Requested`] after [`Self::cancel`] and
    /// [`Cancelled::DeadlineExceeded`] once the deadline has passed.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.flag.load(Ordering::SeqCst) {
            return Err(Cancelled::Requested);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Cancelled::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}
