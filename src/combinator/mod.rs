//! Derived control-flow combinators.
//!
//! Everything in this module is built purely from the primitive operations
//! and the choice builder — timeouts and cancellation policy are ordinary
//! compositions of `schedule`, `receive`, `fork`, and cancel handles, never
//! a separate preemptive mechanism.
//!
//! - [`delay`]: timed wait via a scheduled self-message
//! - [`fork_and_cancel`]: fork with a watchdog that cancels on timeout
//! - [`first_of`]: race of many processes, first delivery wins
//! - [`retry`]: bounded timed attempts, fatally failing on exhaustion

pub mod delay;
pub mod first_of;
pub mod fork_cancel;
pub mod retry;

pub use delay::delay;
pub use first_of::{first_of, Candidate, RaceReply};
pub use fork_cancel::fork_and_cancel;
pub use retry::{retry, RetryMsg};
