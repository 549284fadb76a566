//! Cancellation context
//!
//! Every store, coordinator and denormalizer operation takes a `&Context`.
//! Cancellation is cooperative: operations call [`Context::check`] at their
//! suspension points (transaction begin, before commit, between batches).
//! Clones share the same cancellation flag.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cancellation flag plus optional deadline
#[derive(Debug, Clone)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Derive a context that also expires after `timeout`
    ///
    /// The derived context shares this context's cancellation flag; the
    /// earlier of the two deadlines wins.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and every clone of it
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once cancelled or past the deadline
    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    /// `Err(Cancelled)` or `Err(DeadlineExceeded)` once the context is done
    pub fn check(&self) -> Result<()> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_background_is_never_done() {
        let ctx = Context::background();
        assert!(ctx.check().is_ok());
        assert!(!ctx.is_done());
    }

    #[test]
    fn test_cancel_propagates_to_clones() {
        let ctx = Context::background();
        let clone = ctx.clone();
        ctx.cancel();
        assert_eq!(clone.check().unwrap_err().kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_deadline_exceeded() {
        let ctx = Context::background().with_timeout(Duration::ZERO);
        assert_eq!(ctx.check().unwrap_err().kind(), ErrorKind::DeadlineExceeded);
    }

    #[test]
    fn test_earlier_deadline_wins() {
        let short = Context::background().with_timeout(Duration::from_millis(10));
        let derived = short.with_timeout(Duration::from_secs(60));
        assert_eq!(derived.deadline(), short.deadline());
    }

    #[test]
    fn test_derived_context_shares_cancellation() {
        let parent = Context::background();
        let child = parent.with_timeout(Duration::from_secs(60));
        parent.cancel();
        assert!(child.is_done());
    }
}
