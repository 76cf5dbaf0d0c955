//! Fork with a timeout-armed cancellation watchdog.

use std::time::Duration;

use crate::effect::EffectSet;
use crate::op::{Op, Scope};
use crate::process::Process;
use crate::types::{CancelReason, SubActor};

/// What the guard fiber waits for: the primary stopping on its own, or its
/// own timeout tick — whichever is delivered first.
enum GuardMsg {
    TimedOut,
    PrimaryStopped,
}

/// Forks `process` and arms a fire-and-forget guard that cancels it if it
/// has not stopped within `timeout`. Returns the primary's handle.
///
/// The guard is a second forked sibling: it watches the primary, schedules
/// itself a timeout tick, and reads whichever message arrives first. If the
/// tick wins, it cancels the primary (cooperatively); if the primary stopped
/// first, the guard simply ends and its stale tick is dropped on delivery.
pub fn fork_and_cancel<S, M, B>(
    scope: Scope<S>,
    timeout: Duration,
    process: Process<M, B>,
) -> Op<S, SubActor<M>>
where
    S: Send + 'static,
    M: Send + 'static,
    B: Send + 'static,
{
    scope
        .fork(&process)
        .and_then(move |primary| {
            let guard = guard_process(timeout, primary.clone());
            scope.fork(&guard).map(move |_guard| primary)
        })
        .with_effects(EffectSet::FORK)
}

fn guard_process<M: Send + 'static>(
    timeout: Duration,
    primary: SubActor<M>,
) -> Process<GuardMsg, ()> {
    Process::new("cancel-guard", move |s| {
        let primary = primary.clone();
        s.watch(&primary, GuardMsg::PrimaryStopped)
            .and_then(move |_watch| s.self_addr())
            .and_then(move |me| s.schedule(&me, GuardMsg::TimedOut, timeout))
            .and_then(move |()| s.receive())
            .and_then(move |msg| {
                if matches!(msg, GuardMsg::TimedOut) {
                    tracing::debug!(primary = %primary.addr().raw(), "guard timeout, canceling");
                    primary.cancel_with(CancelReason::timeout());
                }
                s.pure(())
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_effect_profile() {
        let p: Process<u8, u8> = Process::new("p", |s| s.receive());
        let op = fork_and_cancel(Scope::<u8>::describe(), Duration::from_millis(5), p);
        assert_eq!(op.effects(), EffectSet::FORK);
    }
}
