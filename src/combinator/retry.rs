//! Bounded timed attempts over a reusable process recipe.

use std::time::Duration;

use crate::combinator::delay::delay;
use crate::combinator::first_of::{first_of, Candidate, RaceReply};
use crate::effect::EffectSet;
use crate::op::{Op, Scope};
use crate::process::Process;
use crate::types::FailureReason;

/// The message type of a process running [`retry`]: index-tagged race
/// replies whose payload is the attempt's answer, or `None` for a timeout.
pub type RetryMsg<A> = RaceReply<Option<A>>;

/// Repeatedly races `process` against a `timeout` timer: an answer within
/// the window is returned; a timeout decrements the budget and tries again.
///
/// `retries` is the number of *re*-tries: the recipe is attempted at most
/// `retries + 1` times. Exhaustion is fatal by design — it fails the hosting
/// unit with [`FailureReason::RetriesExceeded`] rather than yielding a
/// recoverable value, since the caller asked for a bounded number of
/// attempts and accepted the consequence of running out.
pub fn retry<M, A>(
    scope: Scope<RetryMsg<A>>,
    timeout: Duration,
    retries: u32,
    process: Process<M, A>,
) -> Op<RetryMsg<A>, A>
where
    M: Send + 'static,
    A: Send + 'static,
{
    let effects = EffectSet::ENV | EffectSet::FORK | EffectSet::READ | EffectSet::FAIL;
    attempt(scope, timeout, retries, process, 1).with_effects(effects)
}

fn attempt<M, A>(
    scope: Scope<RetryMsg<A>>,
    timeout: Duration,
    remaining: u32,
    process: Process<M, A>,
    attempt_no: u32,
) -> Op<RetryMsg<A>, A>
where
    M: Send + 'static,
    A: Send + 'static,
{
    let candidates = vec![
        Candidate::new(process.clone().map(Some)),
        Candidate::new(timer_candidate::<A>(timeout)),
    ];
    first_of(scope, candidates).and_then(move |answer| match answer {
        Some(value) => {
            tracing::debug!(attempt = attempt_no, "retry answered");
            scope.pure(value)
        }
        None if remaining > 0 => {
            tracing::debug!(attempt = attempt_no, remaining, "attempt timed out, retrying");
            attempt(scope, timeout, remaining - 1, process, attempt_no + 1)
        }
        None => scope.fail(FailureReason::retries_exceeded(attempt_no)),
    })
}

/// The timeout entrant: yields `None` after the window elapses.
fn timer_candidate<A: Send + 'static>(timeout: Duration) -> Process<Option<A>, Option<A>> {
    Process::new("retry-timer", move |s| delay(s, timeout, None))
}
