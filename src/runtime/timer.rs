//! Ordered queue of scheduled effects.
//!
//! Timers are the only way time matters in this runtime: `schedule` places a
//! delayed send here, and a process's declared timeout places a unit-failure
//! sentinel. The queue is ordered by deadline with insertion order breaking
//! ties, so firing is fully deterministic.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::types::cancel::CancelToken;
use crate::types::{BoxAny, RawAddr, Time};

/// What happens when a timer fires.
pub(crate) enum TimerKind {
    /// Deliver a scheduled message. Suppressed if the issuing process was
    /// canceled before the deadline.
    Deliver {
        target: RawAddr,
        payload: BoxAny,
        issued_by: CancelToken,
    },
    /// Fail the hosting unit if the addressed process is still running
    /// (a declared process timeout elapsed).
    FailUnit { addr: RawAddr },
}

pub(crate) struct TimerEntry {
    pub(crate) deadline: Time,
    seq: u64,
    pub(crate) kind: TimerKind,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the earliest deadline, with the
        // earliest insertion winning ties.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Deadline-ordered timer queue.
#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, deadline: Time, kind: TimerKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimerEntry {
            deadline,
            seq,
            kind,
        });
    }

    pub(crate) fn pop(&mut self) -> Option<TimerEntry> {
        self.heap.pop()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActorId, FiberId};

    fn fail_at(unit: u32, fiber: u32) -> TimerKind {
        TimerKind::FailUnit {
            addr: RawAddr::new(ActorId::from_index(unit), FiberId::from_index(fiber)),
        }
    }

    #[test]
    fn pops_earliest_deadline_first() {
        let mut timers = TimerQueue::new();
        timers.insert(Time::from_millis(30), fail_at(0, 0));
        timers.insert(Time::from_millis(10), fail_at(1, 0));
        timers.insert(Time::from_millis(20), fail_at(2, 0));

        let order: Vec<Time> = std::iter::from_fn(|| timers.pop().map(|e| e.deadline)).collect();
        assert_eq!(
            order,
            vec![
                Time::from_millis(10),
                Time::from_millis(20),
                Time::from_millis(30)
            ]
        );
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut timers = TimerQueue::new();
        timers.insert(Time::from_millis(5), fail_at(7, 0));
        timers.insert(Time::from_millis(5), fail_at(8, 0));

        let first = timers.pop().expect("entry");
        match first.kind {
            TimerKind::FailUnit { addr } => assert_eq!(addr.unit.index(), 7),
            TimerKind::Deliver { .. } => panic!("unexpected kind"),
        }
        assert_eq!(timers.len(), 1);
        assert!(!timers.is_empty());
    }
}
