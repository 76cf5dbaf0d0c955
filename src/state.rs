//! Per-unit keyed state store.
//!
//! Every hosting unit owns one [`StateStore`]: a mapping from [`StateKey`]
//! identity to a slot holding the current folded value and a per-key FIFO of
//! gated updaters. The store guarantees, per key:
//!
//! - all applied events form a single total order (the application order);
//! - no two updates' event application ever interleaves;
//! - gated (`after_updates = true`) updates from concurrent sibling fibers
//!   apply in strict arrival order;
//! - gated reads wait until the per-key FIFO is drained, then proceed
//!   without blocking each other.
//!
//! Operations on *different* keys are independent. A forgotten slot is
//! recreated from its baseline by the next operation that touches the key,
//! with no trace of previously applied events.
//!
//! State values are mutated only through events: an update's transform
//! inspects the current value and emits events, which the key's fold
//! function applies in order.

use core::fmt;
use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::BoxAny;
use crate::types::FiberId;

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// The identity of one slot in a hosting unit's state store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKeyId(u64);

impl fmt::Debug for StateKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateKeyId({})", self.0)
    }
}

impl fmt::Display for StateKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "K{}", self.0)
    }
}

/// A typed key into a hosting unit's state store.
///
/// A key couples a unique identity with the state type `T` it governs, the
/// event type `E` that mutates it, a baseline constructor, and the fold
/// function that applies one event. Keys are `Copy`: share them freely
/// between the processes of one unit; each unit's store keeps its own slot.
pub struct StateKey<T, E> {
    id: StateKeyId,
    name: &'static str,
    init: fn() -> T,
    apply: fn(&mut T, E),
    _marker: PhantomData<fn(E) -> T>,
}

impl<T, E> StateKey<T, E> {
    /// Creates a new key with a fresh identity.
    ///
    /// `init` builds the baseline value a slot starts from (and restarts
    /// from after `forget_state`); `apply` folds one event into the value.
    #[must_use]
    pub fn new(name: &'static str, init: fn() -> T, apply: fn(&mut T, E)) -> Self {
        Self {
            id: StateKeyId(NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed)),
            name,
            init,
            apply,
            _marker: PhantomData,
        }
    }

    /// Returns the key's identity.
    #[must_use]
    pub const fn id(&self) -> StateKeyId {
        self.id
    }

    /// Returns the key's diagnostic name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) const fn fold(&self) -> fn(&mut T, E) {
        self.apply
    }

    pub(crate) const fn baseline(&self) -> fn() -> T {
        self.init
    }
}

impl<T, E> Clone for StateKey<T, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, E> Copy for StateKey<T, E> {}

impl<T, E> fmt::Debug for StateKey<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateKey({} {:?})", self.name, self.id)
    }
}

/// Builds the slot baseline for a key, type-erased (internal use).
pub(crate) type SlotInit = Box<dyn FnOnce() -> BoxAny + Send>;
/// Reads a snapshot out of a slot, type-erased (internal use).
pub(crate) type SlotRead = Box<dyn FnOnce(&BoxAny) -> BoxAny + Send>;
/// Applies one update to a slot, type-erased (internal use).
pub(crate) type SlotUpdate = Box<dyn FnOnce(&mut BoxAny) -> BoxAny + Send>;

pub(crate) fn erased_init<T, E>(key: &StateKey<T, E>) -> SlotInit
where
    T: Send + 'static,
{
    let init = key.baseline();
    Box::new(move || Box::new(init()) as BoxAny)
}

pub(crate) fn erased_read<T, E>(_key: &StateKey<T, E>) -> SlotRead
where
    T: Clone + Send + 'static,
{
    Box::new(move |value| {
        let state = value
            .downcast_ref::<T>()
            .expect("state slot holds the key's state type");
        Box::new(state.clone()) as BoxAny
    })
}

pub(crate) fn erased_update<T, E, R>(
    key: &StateKey<T, E>,
    transform: impl FnOnce(&T) -> (Vec<E>, R) + Send + 'static,
) -> SlotUpdate
where
    T: Send + 'static,
    E: Send + 'static,
    R: Send + 'static,
{
    let fold = key.fold();
    Box::new(move |value| {
        let state = value
            .downcast_mut::<T>()
            .expect("state slot holds the key's state type");
        let (events, out) = transform(state);
        for event in events {
            fold(state, event);
        }
        Box::new(out) as BoxAny
    })
}

pub(crate) fn erased_update_and_get<T, E>(
    key: &StateKey<T, E>,
    transform: impl FnOnce(&T) -> Vec<E> + Send + 'static,
) -> SlotUpdate
where
    T: Clone + Send + 'static,
    E: Send + 'static,
{
    let fold = key.fold();
    Box::new(move |value| {
        let state = value
            .downcast_mut::<T>()
            .expect("state slot holds the key's state type");
        let events = transform(state);
        for event in events {
            fold(state, event);
        }
        Box::new(state.clone()) as BoxAny
    })
}

#[derive(Default)]
struct Slot {
    value: Option<BoxAny>,
    /// Gated updaters, in arrival order. The front fiber holds the turn.
    queue: VecDeque<FiberId>,
    /// Count of updates applied since the slot was (re)created.
    applied: u64,
}

/// One hosting unit's keyed state store.
#[derive(Default)]
pub struct StateStore {
    slots: HashMap<StateKeyId, Slot>,
}

impl StateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `fiber` in the key's gated-update FIFO (once) and returns
    /// true if it currently holds the turn.
    pub(crate) fn update_turn(&mut self, key: StateKeyId, fiber: FiberId) -> bool {
        let slot = self.slots.entry(key).or_default();
        if !slot.queue.contains(&fiber) {
            slot.queue.push_back(fiber);
        }
        slot.queue.front() == Some(&fiber)
    }

    /// Returns true if a gated read may proceed: no gated updates queued.
    pub(crate) fn read_clear(&self, key: StateKeyId) -> bool {
        self.slots.get(&key).map_or(true, |slot| slot.queue.is_empty())
    }

    /// Scheduler-side readiness check: a fiber suspended on this key can be
    /// stepped again once the FIFO is empty (gated read) or it holds the
    /// turn (gated update).
    pub(crate) fn may_proceed(&self, key: StateKeyId, fiber: FiberId) -> bool {
        self.slots.get(&key).map_or(true, |slot| {
            slot.queue.is_empty() || slot.queue.front() == Some(&fiber)
        })
    }

    /// Applies one update. For gated updates the caller must hold the turn
    /// (checked by [`Self::update_turn`]); the turn is released here.
    ///
    /// Returns the update's result and whether the key's FIFO changed (the
    /// interpreter wakes the key's waiters when it did).
    pub(crate) fn apply(
        &mut self,
        key: StateKeyId,
        gated: bool,
        fiber: FiberId,
        init: SlotInit,
        run: SlotUpdate,
    ) -> (BoxAny, bool) {
        let slot = self.slots.entry(key).or_default();
        if slot.value.is_none() {
            slot.value = Some(init());
        }
        let out = run(slot.value.as_mut().expect("slot initialized above"));
        slot.applied += 1;
        let mut queue_changed = false;
        if gated && slot.queue.front() == Some(&fiber) {
            slot.queue.pop_front();
            queue_changed = true;
        }
        tracing::trace!(key = %key, %fiber, gated, applied = slot.applied, "state update applied");
        (out, queue_changed)
    }

    /// Reads a snapshot of the key's current value, creating the baseline
    /// slot if the key has never been touched (or was forgotten).
    pub(crate) fn read(&mut self, key: StateKeyId, init: SlotInit, read: SlotRead) -> BoxAny {
        let slot = self.slots.entry(key).or_default();
        if slot.value.is_none() {
            slot.value = Some(init());
        }
        read(slot.value.as_ref().expect("slot initialized above"))
    }

    /// Removes the slot. Returns true if gated updaters were still queued;
    /// the interpreter then wakes them so they re-run against the recreated
    /// baseline.
    pub(crate) fn forget(&mut self, key: StateKeyId) -> bool {
        match self.slots.remove(&key) {
            Some(slot) => {
                tracing::debug!(key = %key, applied = slot.applied, "state slot forgotten");
                !slot.queue.is_empty()
            }
            None => false,
        }
    }

    /// Purges a terminated fiber from every gated FIFO. Returns the keys
    /// whose queue head changed (their waiters need waking).
    pub(crate) fn remove_fiber(&mut self, fiber: FiberId) -> Vec<StateKeyId> {
        let mut affected = Vec::new();
        for (key, slot) in &mut self.slots {
            if slot.queue.front() == Some(&fiber) {
                slot.queue.pop_front();
                affected.push(*key);
            } else {
                slot.queue.retain(|f| *f != fiber);
            }
        }
        affected
    }

    /// Number of updates applied to the key since its slot was (re)created.
    #[must_use]
    pub fn applied_count(&self, key: StateKeyId) -> u64 {
        self.slots.get(&key).map_or(0, |slot| slot.applied)
    }
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("slots", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum CounterEvent {
        Add(i64),
        Reset,
    }

    fn counter_key() -> StateKey<i64, CounterEvent> {
        StateKey::new("counter", || 0, |state, event| match event {
            CounterEvent::Add(n) => *state += n,
            CounterEvent::Reset => *state = 0,
        })
    }

    fn fiber(n: u32) -> FiberId {
        FiberId::from_index(n)
    }

    #[test]
    fn keys_have_distinct_identity() {
        let a = counter_key();
        let b = counter_key();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.name(), "counter");
    }

    #[test]
    fn update_folds_events_in_order() {
        let key = counter_key();
        let mut store = StateStore::new();

        let (out, _) = store.apply(
            key.id(),
            false,
            fiber(0),
            erased_init(&key),
            erased_update(&key, |state| {
                assert_eq!(*state, 0);
                (vec![CounterEvent::Add(5), CounterEvent::Add(2)], "done")
            }),
        );
        assert_eq!(*out.downcast::<&str>().expect("result type"), "done");

        let snapshot = store.read(key.id(), erased_init(&key), erased_read(&key));
        assert_eq!(*snapshot.downcast::<i64>().expect("state type"), 7);
        assert_eq!(store.applied_count(key.id()), 1);
    }

    #[test]
    fn update_and_get_returns_post_state() {
        let key = counter_key();
        let mut store = StateStore::new();

        let (out, _) = store.apply(
            key.id(),
            false,
            fiber(0),
            erased_init(&key),
            erased_update_and_get(&key, |_| vec![CounterEvent::Add(41), CounterEvent::Add(1)]),
        );
        assert_eq!(*out.downcast::<i64>().expect("state type"), 42);
    }

    #[test]
    fn gated_updates_take_turns_in_arrival_order() {
        let key = counter_key();
        let mut store = StateStore::new();

        assert!(store.update_turn(key.id(), fiber(1)));
        assert!(!store.update_turn(key.id(), fiber(2)));
        // Re-asking does not re-enqueue or change the order.
        assert!(!store.update_turn(key.id(), fiber(2)));
        assert!(!store.read_clear(key.id()));

        let (_, changed) = store.apply(
            key.id(),
            true,
            fiber(1),
            erased_init(&key),
            erased_update(&key, |_| (vec![CounterEvent::Add(1)], ())),
        );
        assert!(changed);
        // Fiber 2 now holds the turn.
        assert!(store.update_turn(key.id(), fiber(2)));

        let (_, changed) = store.apply(
            key.id(),
            true,
            fiber(2),
            erased_init(&key),
            erased_update(&key, |_| (vec![CounterEvent::Add(1)], ())),
        );
        assert!(changed);
        assert!(store.read_clear(key.id()));
    }

    #[test]
    fn forget_recreates_baseline() {
        let key = counter_key();
        let mut store = StateStore::new();

        store.apply(
            key.id(),
            false,
            fiber(0),
            erased_init(&key),
            erased_update(&key, |_| (vec![CounterEvent::Add(99)], ())),
        );
        assert!(!store.forget(key.id()));

        let snapshot = store.read(key.id(), erased_init(&key), erased_read(&key));
        assert_eq!(*snapshot.downcast::<i64>().expect("state type"), 0);
        assert_eq!(store.applied_count(key.id()), 0);
    }

    #[test]
    fn dead_fiber_is_purged_from_queues() {
        let key = counter_key();
        let mut store = StateStore::new();

        store.update_turn(key.id(), fiber(1));
        store.update_turn(key.id(), fiber(2));

        let affected = store.remove_fiber(fiber(1));
        assert_eq!(affected, vec![key.id()]);
        // Fiber 2 inherits the turn.
        assert!(store.update_turn(key.id(), fiber(2)));
    }
}
