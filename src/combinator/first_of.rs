//! Race of many processes: the first delivered result wins.
//!
//! Every candidate is forked as a sibling, wrapped so that its result is
//! sent, index-tagged, to the racing process's own address. The racing
//! operation reads the first reply to arrive, cancels every forked sibling
//! (including the winner — canceling a finished process is a no-op), and
//! yields the first value. Ties go to whichever reply was delivered to the
//! mailbox first; there is no secondary tie-break.
//!
//! A loser that completed in the same instant as the winner may have
//! dispatched its reply before its cancel arrived; cancellation cannot
//! retract a dispatched send, so that reply stays in the mailbox. Processes
//! that race repeatedly (`retry`) simply observe it on their next read.

use std::collections::VecDeque;

use crate::effect::EffectSet;
use crate::op::{Op, Scope};
use crate::process::{Process, ProcessSpec};
use crate::types::addr::RawSubActor;
use crate::types::{Addr, CancelReason};

/// Reply delivered to the racing process by each forked candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceReply<A> {
    /// Position of the candidate among the declared candidates.
    pub index: usize,
    /// The candidate's result.
    pub value: A,
}

/// One entrant in a race.
///
/// The wrapper erases the candidate's message type, so processes with
/// heterogeneous message types can race as long as they agree on the result
/// type `A`. The candidate's declared mailbox capacity and timeout carry
/// over to the forked wrapper.
pub struct Candidate<A> {
    build: Box<dyn FnOnce(Addr<RaceReply<A>>, usize) -> ProcessSpec + Send>,
}

impl<A: Send + 'static> Candidate<A> {
    /// Wraps a process for racing.
    pub fn new<M: Send + 'static>(process: Process<M, A>) -> Self {
        Self {
            build: Box::new(move |coord, index| {
                let name = format!("{}#{index}", process.name());
                let capacity = process.mailbox_capacity();
                let timeout = process.timeout();
                let mut wrapped: Process<M, ()> = Process::new(name, move |ws| {
                    process
                        .instantiate()
                        .and_then(move |value| ws.send(&coord, RaceReply { index, value }))
                });
                if let Some(capacity) = capacity {
                    wrapped = wrapped.with_mailbox_capacity(capacity);
                }
                if let Some(timeout) = timeout {
                    wrapped = wrapped.with_timeout(timeout);
                }
                ProcessSpec::of(&wrapped)
            }),
        }
    }
}

/// Races `candidates`; yields the first-delivered result.
///
/// Runs inside a process whose message type is [`RaceReply<A>`] — the
/// candidates reply to the racing process's own address. At least one
/// candidate is required; with none, the read would wait forever.
pub fn first_of<A>(scope: Scope<RaceReply<A>>, candidates: Vec<Candidate<A>>) -> Op<RaceReply<A>, A>
where
    A: Send + 'static,
{
    debug_assert!(!candidates.is_empty(), "first_of needs at least one candidate");
    scope
        .self_addr()
        .and_then(move |coord| {
            let entrants: VecDeque<(usize, Candidate<A>)> =
                candidates.into_iter().enumerate().collect();
            fork_entrants(scope, coord, entrants, Vec::new())
        })
        .with_effects(EffectSet::ENV | EffectSet::FORK | EffectSet::READ)
}

fn fork_entrants<A>(
    scope: Scope<RaceReply<A>>,
    coord: Addr<RaceReply<A>>,
    mut rest: VecDeque<(usize, Candidate<A>)>,
    handles: Vec<RawSubActor>,
) -> Op<RaceReply<A>, A>
where
    A: Send + 'static,
{
    match rest.pop_front() {
        Some((index, candidate)) => {
            let spec = (candidate.build)(coord, index);
            scope.fork_spec(spec).and_then(move |handle| {
                let mut handles = handles;
                handles.push(handle);
                fork_entrants(scope, coord, rest, handles)
            })
        }
        None => scope.receive().and_then(move |reply| {
            // Cancel everyone, the already-finished winner included.
            for handle in &handles {
                handle.cancel(CancelReason::race_lost());
            }
            tracing::debug!(winner = reply.index, entrants = handles.len(), "race settled");
            scope.pure(reply.value)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_effect_profile() {
        let candidates = vec![Candidate::new(Process::<(), u8>::new("a", |s| s.pure(1)))];
        let op = first_of(Scope::describe(), candidates);
        assert_eq!(
            op.effects(),
            EffectSet::ENV | EffectSet::FORK | EffectSet::READ
        );
    }

    #[test]
    fn candidate_wrapper_keeps_recipe_settings() {
        use std::time::Duration;

        let p: Process<(), u8> = Process::new("sized", |s| s.pure(1))
            .with_mailbox_capacity(3)
            .with_timeout(Duration::from_millis(9));
        let candidate = Candidate::new(p);
        let spec = (candidate.build)(Addr::from_raw(crate::types::RawAddr::root_of(
            crate::types::ActorId::from_index(0),
        )), 4);
        assert_eq!(spec.name, "sized#4");
        assert_eq!(spec.mailbox_capacity, Some(3));
        assert_eq!(spec.timeout, Some(Duration::from_millis(9)));
    }
}
