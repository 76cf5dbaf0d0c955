//! Cancellation reason, kind, and token types.
//!
//! Cancellation is cooperative and advisory: a cancel request prevents
//! *future* effects (the fiber stops at its next scheduling point, its
//! undelivered scheduled sends are suppressed) but cannot retract anything
//! already dispatched. Canceling a process that already finished is a no-op.

use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// The kind of cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CancelKind {
    /// Explicit cancellation requested by user code.
    User,
    /// Cancellation because a timed guard fired.
    Timeout,
    /// Cancellation because another branch of a race completed first.
    RaceLost,
    /// Cancellation because the hosting unit stopped or failed.
    UnitStopped,
    /// Cancellation due to runtime shutdown.
    Shutdown,
}

impl fmt::Display for CancelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Timeout => write!(f, "timeout"),
            Self::RaceLost => write!(f, "race lost"),
            Self::UnitStopped => write!(f, "unit stopped"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// The reason for a cancellation, including kind and optional context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason {
    /// The kind of cancellation.
    pub kind: CancelKind,
    /// Optional human-readable message (static for determinism).
    pub message: Option<&'static str>,
}

impl CancelReason {
    /// Creates a new cancellation reason with the given kind.
    #[must_use]
    pub const fn new(kind: CancelKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates a user cancellation reason with a message.
    #[must_use]
    pub const fn user(message: &'static str) -> Self {
        Self {
            kind: CancelKind::User,
            message: Some(message),
        }
    }

    /// Creates a timeout cancellation reason.
    #[must_use]
    pub const fn timeout() -> Self {
        Self::new(CancelKind::Timeout)
    }

    /// Creates a race loser cancellation reason.
    #[must_use]
    pub const fn race_lost() -> Self {
        Self::new(CancelKind::RaceLost)
    }

    /// Creates a unit-stopped cancellation reason.
    #[must_use]
    pub const fn unit_stopped() -> Self {
        Self::new(CancelKind::UnitStopped)
    }

    /// Returns the kind of this cancellation reason.
    #[must_use]
    pub const fn kind(&self) -> CancelKind {
        self.kind
    }
}

impl Default for CancelReason {
    fn default() -> Self {
        Self::new(CancelKind::User)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

/// A shareable, idempotent cancellation token.
///
/// Every holder of a handle to a forked process may request cancellation;
/// the first request wins and records its reason, later requests are no-ops.
/// The interpreter observes the token at each scheduling point of the fiber
/// it belongs to, and at timer firing for scheduled sends the fiber issued.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    requested: AtomicBool,
    reason: Mutex<Option<CancelReason>>,
}

impl CancelToken {
    /// Creates a fresh, unrequested token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with the given reason.
    ///
    /// Returns `true` if this call was the first request.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let first = !self.inner.requested.swap(true, Ordering::AcqRel);
        if first {
            *self.inner.reason.lock() = Some(reason);
        }
        first
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }

    /// Returns the recorded reason, if cancellation was requested.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_idempotent() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        assert!(token.cancel(CancelReason::timeout()));
        assert!(token.is_cancelled());
        assert_eq!(token.reason().map(|r| r.kind()), Some(CancelKind::Timeout));

        // Second request does not overwrite the recorded reason.
        assert!(!token.cancel(CancelReason::user("again")));
        assert_eq!(token.reason().map(|r| r.kind()), Some(CancelKind::Timeout));
    }

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        token.cancel(CancelReason::race_lost());
        assert!(other.is_cancelled());
    }

    #[test]
    fn reason_display() {
        assert_eq!(CancelReason::timeout().to_string(), "timeout");
        assert_eq!(CancelReason::user("stop").to_string(), "user: stop");
    }
}
