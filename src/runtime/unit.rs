//! Hosting units and their process fibers.
//!
//! A unit owns a table of fibers (the root process plus forked siblings),
//! one bounded mailbox per fiber, the unit's keyed state store, and the
//! terminal status. All fibers of one unit are interleaved by the runtime's
//! single step loop — there is no intra-unit parallelism, which is what
//! makes the state store contract race-free.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::error::{Error, ErrorKind};
use crate::runtime::fiber::AnyFiber;
use crate::state::{StateKeyId, StateStore};
use crate::types::cancel::CancelToken;
use crate::types::{ActorId, BoxAny, FailureReason, FiberId, Outcome};

/// A bounded, FIFO per-fiber mailbox.
pub(crate) struct Mailbox {
    queue: VecDeque<BoxAny>,
    capacity: usize,
}

impl Mailbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, payload: BoxAny) -> Result<(), Error> {
        if self.queue.len() >= self.capacity {
            return Err(Error::new(ErrorKind::MailboxFull));
        }
        self.queue.push_back(payload);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Option<BoxAny> {
        self.queue.pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// What a suspended fiber is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Wait {
    /// A message in its mailbox.
    Message,
    /// Its turn on a state key's gated FIFO (or the FIFO draining).
    StateTurn(StateKeyId),
}

/// How a fiber ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TerminalKind {
    Completed,
    Halted,
    Cancelled,
    Failed,
}

/// Scheduling phase of one fiber.
#[derive(Debug)]
pub(crate) enum FiberPhase {
    Runnable,
    Waiting(Wait),
    Terminal(TerminalKind),
}

/// One process fiber: its mailbox, trampoline state, and bookkeeping.
pub(crate) struct FiberSlot {
    pub(crate) id: FiberId,
    pub(crate) name: String,
    pub(crate) mailbox: Mailbox,
    pub(crate) fiber: Option<Box<dyn AnyFiber>>,
    pub(crate) phase: FiberPhase,
    pub(crate) cancel: CancelToken,
    pub(crate) cleanups: SmallVec<[Box<dyn FnOnce() + Send>; 2]>,
}

impl FiberSlot {
    pub(crate) fn new(
        id: FiberId,
        name: String,
        capacity: usize,
        fiber: Box<dyn AnyFiber>,
    ) -> Self {
        Self {
            id,
            name,
            mailbox: Mailbox::new(capacity),
            fiber: Some(fiber),
            phase: FiberPhase::Runnable,
            cancel: CancelToken::new(),
            cleanups: SmallVec::new(),
        }
    }

    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self.phase, FiberPhase::Terminal(_))
    }

    /// Runs registered cleanup actions in reverse registration order.
    pub(crate) fn run_cleanups(&mut self) {
        while let Some(action) = self.cleanups.pop() {
            action();
        }
    }
}

/// Terminal status of a hosting unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum UnitStatus {
    Running,
    Stopped,
    Failed(FailureReason),
}

/// The shared cell a unit's root outcome is published through.
pub(crate) type ResultCell = Arc<Mutex<Option<Outcome<BoxAny>>>>;

/// One hosting unit.
pub(crate) struct Unit {
    pub(crate) id: ActorId,
    pub(crate) name: String,
    pub(crate) parent: Option<ActorId>,
    pub(crate) fibers: Vec<FiberSlot>,
    pub(crate) store: StateStore,
    pub(crate) status: UnitStatus,
    pub(crate) result: ResultCell,
}

impl Unit {
    pub(crate) fn new(id: ActorId, name: String, parent: Option<ActorId>) -> Self {
        Self {
            id,
            name,
            parent,
            fibers: Vec::new(),
            store: StateStore::new(),
            status: UnitStatus::Running,
            result: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        matches!(self.status, UnitStatus::Running)
    }

    pub(crate) fn all_fibers_terminal(&self) -> bool {
        self.fibers.iter().all(FiberSlot::is_terminal)
    }

    pub(crate) fn fiber(&self, id: FiberId) -> Option<&FiberSlot> {
        self.fibers.get(id.index() as usize)
    }

    pub(crate) fn fiber_mut(&mut self, id: FiberId) -> Option<&mut FiberSlot> {
        self.fibers.get_mut(id.index() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fiber::{FiberCtx, StepEvent};

    struct Inert;

    impl AnyFiber for Inert {
        fn step(&mut self, _ctx: &mut FiberCtx<'_>) -> StepEvent {
            StepEvent::Halted
        }
    }

    #[test]
    fn mailbox_is_bounded_fifo() {
        let mut mailbox = Mailbox::new(2);
        assert!(mailbox.push(Box::new(1u8)).is_ok());
        assert!(mailbox.push(Box::new(2u8)).is_ok());
        let err = mailbox.push(Box::new(3u8)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MailboxFull);

        let first = mailbox.pop().expect("first message");
        assert_eq!(*first.downcast::<u8>().expect("payload type"), 1);
        assert!(!mailbox.is_empty());
    }

    #[test]
    fn cleanups_run_in_reverse_order() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static ORDER: AtomicU32 = AtomicU32::new(0);

        let mut slot = FiberSlot::new(FiberId::ROOT, "t".into(), 1, Box::new(Inert));
        slot.cleanups.push(Box::new(|| {
            // Registered first, must run last.
            assert_eq!(ORDER.fetch_add(1, Ordering::SeqCst), 1);
        }));
        slot.cleanups.push(Box::new(|| {
            assert_eq!(ORDER.fetch_add(1, Ordering::SeqCst), 0);
        }));
        slot.run_cleanups();
        assert_eq!(ORDER.load(Ordering::SeqCst), 2);
        assert!(slot.cleanups.is_empty());
    }

    #[test]
    fn unit_terminal_tracking() {
        let mut unit = Unit::new(ActorId::from_index(0), "u".into(), None);
        assert!(unit.is_running());
        assert!(unit.all_fibers_terminal());

        unit.fibers
            .push(FiberSlot::new(FiberId::ROOT, "root".into(), 1, Box::new(Inert)));
        assert!(!unit.all_fibers_terminal());

        unit.fiber_mut(FiberId::ROOT).expect("slot").phase =
            FiberPhase::Terminal(TerminalKind::Completed);
        assert!(unit.all_fibers_terminal());
    }
}
