//! Terminal states of a process and failure reasons.
//!
//! A process moves `Constructed -> Running -> terminal`, where the terminal
//! states are exactly the variants of [`Outcome`]. `Running` itself cycles
//! through suspension points (at `receive`, at gated state operations, at a
//! synchronous `call`) and resumption when the awaited input arrives.

use core::fmt;

/// The terminal state of a process.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The process ran to completion and produced a value.
    Completed(T),
    /// The process stopped cooperatively without a value.
    Halted,
    /// The process outlived its declared timeout. This is a hosting-unit
    /// failure, not a recoverable value, unless the caller raced the process
    /// explicitly (as `first_of` and `retry` do).
    TimedOut,
    /// The process failed fatally, taking its hosting unit with it.
    Failed(FailureReason),
}

impl<T> Outcome<T> {
    /// Returns true if the process completed with a value.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Returns true if the process halted cooperatively.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        matches!(self, Self::Halted)
    }

    /// Returns true if the process timed out.
    #[must_use]
    pub const fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }

    /// Returns true if the process failed fatally.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Extracts the completion value, if any.
    pub fn into_completed(self) -> Option<T> {
        match self {
            Self::Completed(v) => Some(v),
            _ => None,
        }
    }

    /// Maps the completion value.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Completed(v) => Outcome::Completed(f(v)),
            Self::Halted => Outcome::Halted,
            Self::TimedOut => Outcome::TimedOut,
            Self::Failed(reason) => Outcome::Failed(reason),
        }
    }
}

impl<T: fmt::Debug> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(v) => write!(f, "completed({v:?})"),
            Self::Halted => write!(f, "halted"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Why a process failed its hosting unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The process's declared timeout elapsed before it finished.
    Timeout,
    /// A bounded retry exhausted its budget without an answer.
    RetriesExceeded {
        /// Total attempts made (the initial attempt plus every retry).
        attempts: u32,
    },
    /// A fatal condition signaled by the process itself.
    Fatal(&'static str),
}

impl FailureReason {
    /// Creates a retries-exceeded failure.
    #[must_use]
    pub const fn retries_exceeded(attempts: u32) -> Self {
        Self::RetriesExceeded { attempts }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::RetriesExceeded { attempts } => {
                write!(f, "retries exceeded after {attempts} attempts")
            }
            Self::Fatal(msg) => write!(f, "fatal: {msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_predicates() {
        let done: Outcome<i32> = Outcome::Completed(7);
        assert!(done.is_completed());
        assert_eq!(done.into_completed(), Some(7));

        let halted: Outcome<i32> = Outcome::Halted;
        assert!(halted.is_halted());
        assert!(halted.into_completed().is_none());
    }

    #[test]
    fn outcome_map_preserves_shape() {
        let done: Outcome<i32> = Outcome::Completed(7);
        assert!(matches!(done.map(|v| v * 2), Outcome::Completed(14)));

        let failed: Outcome<i32> = Outcome::Failed(FailureReason::retries_exceeded(3));
        assert!(matches!(
            failed.map(|v| v * 2),
            Outcome::Failed(FailureReason::RetriesExceeded { attempts: 3 })
        ));
    }

    #[test]
    fn failure_display() {
        assert_eq!(
            FailureReason::retries_exceeded(4).to_string(),
            "retries exceeded after 4 attempts"
        );
        assert_eq!(FailureReason::Timeout.to_string(), "timeout");
    }
}
