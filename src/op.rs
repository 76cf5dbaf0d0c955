//! The operation algebra: suspended computations as composable values.
//!
//! An [`Op<S, A>`] is an immutable description of a suspended computation
//! inside a process whose input channel carries messages of type `S` and
//! which eventually yields `A`. An `Op` is pure data: building one performs
//! no effect; nothing happens until an interpreter walks it.
//!
//! # Encoding
//!
//! Every primitive leaf carries its payload plus a boxed continuation that
//! produces the *next* operation. Executing one primitive therefore invokes
//! exactly one closure, and an interpreter drives the whole tree with an
//! iterative loop — an infinite server loop written as recursion inside
//! continuations runs in bounded stack.
//!
//! # The description token
//!
//! All primitive constructors hang off [`Scope<S>`], a zero-sized token
//! representing "the process currently being described". The only way to get
//! one is the description closure passed to
//! [`Process::new`](crate::process::Process::new), which keeps operators
//! from being conjured outside a process description. The token is `Copy`,
//! so continuation closures capture it freely.
//!
//! # Effects
//!
//! Each `Op` carries an advisory [`EffectSet`] assembled at construction;
//! see the [`effect`](crate::effect) module for the accumulation rules.

use core::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use crate::effect::EffectSet;
use crate::process::{Process, ProcessSpec};
use crate::state::{self, SlotInit, SlotRead, SlotUpdate, StateKey, StateKeyId};
use crate::types::addr::RawSubActor;
use crate::types::BoxAny;
use crate::types::{
    ActorId, Addr, DeployConfig, FailureInfo, FailureReason, RawAddr, SubActor, WatchHandle,
    WatchTarget,
};

/// A boxed continuation from an intermediate value to the next operation.
pub(crate) type Cont<S, A, X> = Box<dyn FnOnce(X) -> Op<S, A> + Send>;

/// A watch's failure hook, type-erased (internal use).
pub(crate) type FailureHook = Box<dyn FnOnce(&FailureInfo) -> Option<BoxAny> + Send>;

/// An immutable description of a suspended computation.
///
/// `S` is the message type this operation (and thus the hosting process) is
/// able to receive; `A` is the result type. See the module docs for the
/// encoding and the effect-tracking rules.
pub struct Op<S, A> {
    pub(crate) kind: OpKind<S, A>,
    pub(crate) effects: EffectSet,
}

/// The primitive kinds an interpreter must execute, plus `Pure`.
pub(crate) enum OpKind<S, A> {
    /// Already completed.
    Pure(A),
    /// Read the next message from the process's input channel.
    Receive(Cont<S, A, S>),
    /// Obtain the process's own typed address.
    SelfAddr(Cont<S, A, Addr<S>>),
    /// Obtain the hosting unit's address.
    UnitAddr(Cont<S, A, ActorId>),
    /// Send a message to an address.
    SendMsg {
        target: RawAddr,
        payload: BoxAny,
        k: Cont<S, A, ()>,
    },
    /// Schedule a message to be sent after a delay.
    Schedule {
        target: RawAddr,
        payload: BoxAny,
        delay: Duration,
        k: Cont<S, A, ()>,
    },
    /// Start a sibling process in the same hosting unit.
    Fork {
        spec: ProcessSpec,
        k: Cont<S, A, RawSubActor>,
    },
    /// Start a child process in a brand-new hosting unit.
    Spawn {
        spec: ProcessSpec,
        deploy: DeployConfig,
        k: Cont<S, A, ActorId>,
    },
    /// Run a sub-process to completion inline, catching its halt.
    Call {
        inner: Box<Op<S, BoxAny>>,
        replacement: Option<BoxAny>,
        k: Cont<S, A, BoxAny>,
    },
    /// Read a snapshot of a state slot.
    StateRead {
        key: StateKeyId,
        gated: bool,
        init: SlotInit,
        read: SlotRead,
        k: Cont<S, A, BoxAny>,
    },
    /// Apply an event-folding update to a state slot.
    StateUpdate {
        key: StateKeyId,
        gated: bool,
        init: SlotInit,
        run: SlotUpdate,
        k: Cont<S, A, BoxAny>,
    },
    /// Remove a state slot.
    StateForget { key: StateKeyId, k: Cont<S, A, ()> },
    /// Register a cleanup action for process termination.
    OnStop {
        action: Box<dyn FnOnce() + Send>,
        k: Cont<S, A, ()>,
    },
    /// Register interest in another process's termination.
    Watch {
        target: WatchTarget,
        on_stopped: BoxAny,
        on_failure: Option<FailureHook>,
        k: Cont<S, A, WatchHandle>,
    },
    /// Stop here, producing no value.
    Halt,
    /// Terminate the hosting unit fatally.
    Fail(FailureReason),
}

impl<S, A> Op<S, A>
where
    S: Send + 'static,
    A: Send + 'static,
{
    pub(crate) fn pure_value(value: A) -> Self {
        Self {
            kind: OpKind::Pure(value),
            effects: EffectSet::empty(),
        }
    }

    /// Returns the advisory effect set tracked for this operation.
    #[must_use]
    pub fn effects(&self) -> EffectSet {
        self.effects
    }

    /// Asserts the operation's full effect profile, replacing the tracked
    /// set. A pure type-level cast: run-time behavior is unchanged. Helpers
    /// use this when their literal accumulated set (usually `OPAQUE`-marked)
    /// is less informative than their known profile.
    #[must_use]
    pub fn with_effects(mut self, effects: EffectSet) -> Self {
        self.effects = effects;
        self
    }

    /// Erases the tracked effect set. A pure type-level cast: run-time
    /// behavior is unchanged.
    #[must_use]
    pub fn ignore_effects(mut self) -> Self {
        self.effects = EffectSet::OPAQUE;
        self
    }

    /// Sequences `self` with a continuation ("bind").
    ///
    /// The continuation runs only when `self` produces a value: a halted or
    /// failed prefix short-circuits past it. Sequencing is lazy; chains of
    /// any length (including self-referential infinite loops) execute in
    /// bounded stack because the interpreter resolves one continuation per
    /// step.
    ///
    /// One exception: sequencing onto an already-completed operation
    /// (`pure`) builds the continuation immediately, since no effect stands
    /// between them. A recursive loop must therefore perform at least one
    /// primitive per iteration — which any real server loop does.
    pub fn and_then<B, F>(self, f: F) -> Op<S, B>
    where
        B: Send + 'static,
        F: FnOnce(A) -> Op<S, B> + Send + 'static,
    {
        let effects = self.effects;
        let opaque = effects | EffectSet::OPAQUE;
        match self.kind {
            OpKind::Pure(a) => {
                // The continuation runs now (still construction, no effects),
                // so its contribution is statically visible.
                let mut next = f(a);
                next.effects |= effects;
                next
            }
            OpKind::Receive(k) => Op {
                kind: OpKind::Receive(Box::new(move |s| k(s).and_then(f))),
                effects: opaque,
            },
            OpKind::SelfAddr(k) => Op {
                kind: OpKind::SelfAddr(Box::new(move |addr| k(addr).and_then(f))),
                effects: opaque,
            },
            OpKind::UnitAddr(k) => Op {
                kind: OpKind::UnitAddr(Box::new(move |unit| k(unit).and_then(f))),
                effects: opaque,
            },
            OpKind::SendMsg { target, payload, k } => Op {
                kind: OpKind::SendMsg {
                    target,
                    payload,
                    k: Box::new(move |()| k(()).and_then(f)),
                },
                effects: opaque,
            },
            OpKind::Schedule {
                target,
                payload,
                delay,
                k,
            } => Op {
                kind: OpKind::Schedule {
                    target,
                    payload,
                    delay,
                    k: Box::new(move |()| k(()).and_then(f)),
                },
                effects: opaque,
            },
            OpKind::Fork { spec, k } => Op {
                kind: OpKind::Fork {
                    spec,
                    k: Box::new(move |sub| k(sub).and_then(f)),
                },
                effects: opaque,
            },
            OpKind::Spawn { spec, deploy, k } => Op {
                kind: OpKind::Spawn {
                    spec,
                    deploy,
                    k: Box::new(move |unit| k(unit).and_then(f)),
                },
                effects: opaque,
            },
            OpKind::Call {
                inner,
                replacement,
                k,
            } => Op {
                kind: OpKind::Call {
                    inner,
                    replacement,
                    k: Box::new(move |v| k(v).and_then(f)),
                },
                effects: opaque,
            },
            OpKind::StateRead {
                key,
                gated,
                init,
                read,
                k,
            } => Op {
                kind: OpKind::StateRead {
                    key,
                    gated,
                    init,
                    read,
                    k: Box::new(move |v| k(v).and_then(f)),
                },
                effects: opaque,
            },
            OpKind::StateUpdate {
                key,
                gated,
                init,
                run,
                k,
            } => Op {
                kind: OpKind::StateUpdate {
                    key,
                    gated,
                    init,
                    run,
                    k: Box::new(move |v| k(v).and_then(f)),
                },
                effects: opaque,
            },
            OpKind::StateForget { key, k } => Op {
                kind: OpKind::StateForget {
                    key,
                    k: Box::new(move |()| k(()).and_then(f)),
                },
                effects: opaque,
            },
            OpKind::OnStop { action, k } => Op {
                kind: OpKind::OnStop {
                    action,
                    k: Box::new(move |()| k(()).and_then(f)),
                },
                effects: opaque,
            },
            OpKind::Watch {
                target,
                on_stopped,
                on_failure,
                k,
            } => Op {
                kind: OpKind::Watch {
                    target,
                    on_stopped,
                    on_failure,
                    k: Box::new(move |handle| k(handle).and_then(f)),
                },
                effects: opaque,
            },
            // The continuation is unreachable past a terminal node; the
            // result type still changes.
            OpKind::Halt => Op {
                kind: OpKind::Halt,
                effects,
            },
            OpKind::Fail(reason) => Op {
                kind: OpKind::Fail(reason),
                effects,
            },
        }
    }

    /// Transforms the result value. Unlike [`Op::and_then`], `map` cannot
    /// introduce effects, so the tracked set is unchanged.
    pub fn map<B, F>(self, f: F) -> Op<S, B>
    where
        B: Send + 'static,
        F: FnOnce(A) -> B + Send + 'static,
    {
        let effects = self.effects;
        let mut out = self.and_then(move |a| Op::pure_value(f(a)));
        out.effects = effects;
        out
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match &self.kind {
            OpKind::Pure(_) => "pure",
            OpKind::Receive(_) => "receive",
            OpKind::SelfAddr(_) => "self_addr",
            OpKind::UnitAddr(_) => "unit_addr",
            OpKind::SendMsg { .. } => "send",
            OpKind::Schedule { .. } => "schedule",
            OpKind::Fork { .. } => "fork",
            OpKind::Spawn { .. } => "spawn",
            OpKind::Call { .. } => "call",
            OpKind::StateRead { .. } => "read_state",
            OpKind::StateUpdate { .. } => "update_state",
            OpKind::StateForget { .. } => "forget_state",
            OpKind::OnStop { .. } => "on_stop",
            OpKind::Watch { .. } => "watch",
            OpKind::Halt => "halt",
            OpKind::Fail(_) => "fail",
        }
    }
}

impl<S, A> fmt::Debug for Op<S, A>
where
    S: Send + 'static,
    A: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Op")
            .field("kind", &self.kind_name())
            .field("effects", &self.effects)
            .finish()
    }
}

/// The typed token for "the process currently being described".
///
/// See the module docs. `Scope` is zero-sized and `Copy`; move it into
/// continuation closures at will.
pub struct Scope<S> {
    _marker: PhantomData<fn(S) -> S>,
}

impl<S> Clone for Scope<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Scope<S> {}

impl<S> fmt::Debug for Scope<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Scope")
    }
}

impl<S> Scope<S>
where
    S: Send + 'static,
{
    /// Mints a description token (internal use: `Process::new` is the public
    /// entry point).
    pub(crate) const fn describe() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// A completed operation. Zero effects.
    pub fn pure<A: Send + 'static>(self, value: A) -> Op<S, A> {
        Op::pure_value(value)
    }

    /// Reads the next message from the process's input channel, suspending
    /// until one arrives.
    pub fn receive(self) -> Op<S, S> {
        Op {
            kind: OpKind::Receive(Box::new(Op::pure_value)),
            effects: EffectSet::READ,
        }
    }

    /// Obtains the process's own typed address.
    pub fn self_addr(self) -> Op<S, Addr<S>> {
        Op {
            kind: OpKind::SelfAddr(Box::new(Op::pure_value)),
            effects: EffectSet::ENV,
        }
    }

    /// Obtains the hosting unit's address.
    pub fn unit_addr(self) -> Op<S, ActorId> {
        Op {
            kind: OpKind::UnitAddr(Box::new(Op::pure_value)),
            effects: EffectSet::ENV,
        }
    }

    /// Sends a message to any typed address. Delivery is asynchronous and
    /// per-address FIFO; sends to stopped processes are dropped.
    pub fn send<M2: Send + 'static>(self, to: &Addr<M2>, msg: M2) -> Op<S, ()> {
        Op {
            kind: OpKind::SendMsg {
                target: to.raw(),
                payload: Box::new(msg),
                k: Box::new(Op::pure_value),
            },
            effects: EffectSet::SEND,
        }
    }

    /// Schedules a message to be sent to `to` after `delay`. The timer is
    /// suppressed if this process is canceled before it fires.
    pub fn schedule<M2: Send + 'static>(
        self,
        to: &Addr<M2>,
        msg: M2,
        delay: Duration,
    ) -> Op<S, ()> {
        Op {
            kind: OpKind::Schedule {
                target: to.raw(),
                payload: Box::new(msg),
                delay,
                k: Box::new(Op::pure_value),
            },
            effects: EffectSet::SCHEDULE,
        }
    }

    /// Starts `process` as an independent sibling in the same hosting unit,
    /// returning its handle immediately. The sibling's result, if any, is
    /// unobservable directly; communicate back through messages.
    pub fn fork<M2, B>(self, process: &Process<M2, B>) -> Op<S, SubActor<M2>>
    where
        M2: Send + 'static,
        B: Send + 'static,
    {
        self.fork_spec(ProcessSpec::of(process))
            .map(SubActor::from_raw)
            .with_effects(EffectSet::FORK)
    }

    pub(crate) fn fork_spec(self, spec: ProcessSpec) -> Op<S, RawSubActor> {
        Op {
            kind: OpKind::Fork {
                spec,
                k: Box::new(Op::pure_value),
            },
            effects: EffectSet::FORK,
        }
    }

    /// Starts `process` as the root of a brand-new, independently addressed
    /// and independently failing hosting unit; returns the unit's address.
    pub fn spawn<M2, B>(self, process: &Process<M2, B>, deploy: DeployConfig) -> Op<S, Addr<M2>>
    where
        M2: Send + 'static,
        B: Send + 'static,
    {
        Op {
            kind: OpKind::Spawn {
                spec: ProcessSpec::of(process),
                deploy,
                k: Box::new(|unit| Op::pure_value(Addr::from_raw(RawAddr::root_of(unit)))),
            },
            effects: EffectSet::SPAWN,
        }
    }

    /// Runs `process` to completion within the current execution context —
    /// no new address, sharing this process's input channel (hence the same
    /// message type) — and yields its result.
    ///
    /// If the sub-process halts: with a `replacement` present the caller
    /// resumes with it; without one the caller halts too. The recipe's own
    /// timeout does not apply under `call`; wrap the call in a timed race
    /// for that.
    pub fn call<B>(self, process: &Process<S, B>, replacement: Option<B>) -> Op<S, B>
    where
        B: Send + 'static,
    {
        let inner = process.instantiate().map(|b| Box::new(b) as BoxAny);
        let effects = EffectSet::CALL | inner.effects();
        Op {
            kind: OpKind::Call {
                inner: Box::new(inner),
                replacement: replacement.map(|b| Box::new(b) as BoxAny),
                k: Box::new(|v| {
                    Op::pure_value(*v.downcast::<B>().expect("call yields the callee's result type"))
                }),
            },
            effects,
        }
    }

    /// Reads a snapshot of the key's current value. With `after_updates`
    /// set, suspends until no gated updates for this exact key are pending;
    /// readers do not block each other once the queue is drained.
    pub fn read_state<T, E>(self, key: &StateKey<T, E>, after_updates: bool) -> Op<S, T>
    where
        T: Clone + Send + 'static,
        E: Send + 'static,
    {
        Op {
            kind: OpKind::StateRead {
                key: key.id(),
                gated: after_updates,
                init: state::erased_init(key),
                read: state::erased_read(key),
                k: Box::new(|v| {
                    Op::pure_value(*v.downcast::<T>().expect("state read yields the key's state type"))
                }),
            },
            effects: EffectSet::STATE,
        }
    }

    /// Applies `transform` to the key's current value: the events it emits
    /// fold into the new state in order, and its extra result is returned.
    ///
    /// With `after_updates` set, this update first waits for every update
    /// already queued ahead of it on the same key, guaranteeing strict
    /// per-key update order even when sibling processes update concurrently.
    pub fn update_state<T, E, R>(
        self,
        key: &StateKey<T, E>,
        after_updates: bool,
        transform: impl FnOnce(&T) -> (Vec<E>, R) + Send + 'static,
    ) -> Op<S, R>
    where
        T: Send + 'static,
        E: Send + 'static,
        R: Send + 'static,
    {
        Op {
            kind: OpKind::StateUpdate {
                key: key.id(),
                gated: after_updates,
                init: state::erased_init(key),
                run: state::erased_update(key, transform),
                k: Box::new(|v| {
                    Op::pure_value(
                        *v.downcast::<R>().expect("state update yields the transform's result type"),
                    )
                }),
            },
            effects: EffectSet::STATE,
        }
    }

    /// Like [`Scope::update_state`], but returns the post-update state
    /// instead of a caller-chosen result.
    pub fn update_state_and_get<T, E>(
        self,
        key: &StateKey<T, E>,
        after_updates: bool,
        transform: impl FnOnce(&T) -> Vec<E> + Send + 'static,
    ) -> Op<S, T>
    where
        T: Clone + Send + 'static,
        E: Send + 'static,
    {
        Op {
            kind: OpKind::StateUpdate {
                key: key.id(),
                gated: after_updates,
                init: state::erased_init(key),
                run: state::erased_update_and_get(key, transform),
                k: Box::new(|v| {
                    Op::pure_value(*v.downcast::<T>().expect("state update yields the key's state type"))
                }),
            },
            effects: EffectSet::STATE,
        }
    }

    /// Removes the key's slot. The next operation on the key recreates it
    /// from the baseline with no trace of previously applied events. Gated
    /// updaters still queued on the slot are woken and re-run against the
    /// recreated baseline.
    pub fn forget_state<T, E>(self, key: &StateKey<T, E>) -> Op<S, ()>
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        Op {
            kind: OpKind::StateForget {
                key: key.id(),
                k: Box::new(Op::pure_value),
            },
            effects: EffectSet::STATE,
        }
    }

    /// Registers a cleanup action to run when this process terminates, in
    /// reverse registration order, whatever the terminal state.
    pub fn on_stop(self, action: impl FnOnce() + Send + 'static) -> Op<S, ()> {
        Op {
            kind: OpKind::OnStop {
                action: Box::new(action),
                k: Box::new(Op::pure_value),
            },
            effects: EffectSet::CLEANUP,
        }
    }

    /// Stops here, producing no value. Inside a `call` with a replacement
    /// supplied, the caller resumes with the replacement; otherwise the halt
    /// propagates to the caller. Never a hosting-unit failure by itself.
    pub fn halt<A: Send + 'static>(self) -> Op<S, A> {
        Op {
            kind: OpKind::Halt,
            effects: EffectSet::HALT,
        }
    }

    /// Terminates the hosting unit fatally with the given reason.
    pub fn fail<A: Send + 'static>(self, reason: FailureReason) -> Op<S, A> {
        Op {
            kind: OpKind::Fail(reason),
            effects: EffectSet::FAIL,
        }
    }

    /// Registers interest in `target`'s termination: when it stops, the
    /// given message is delivered to this process. Returns a cancel handle;
    /// canceling stops future delivery but cannot retract a notification
    /// already in flight.
    pub fn watch(self, target: impl Into<WatchTarget>, on_stopped: S) -> Op<S, WatchHandle> {
        self.watch_inner(target.into(), on_stopped, None)
    }

    /// Like [`Scope::watch`], with a failure hook: when the termination was
    /// a *failure* of a child unit of this process's unit, the hook picks
    /// the message instead (or suppresses delivery by yielding `None`).
    pub fn watch_with_failure(
        self,
        target: impl Into<WatchTarget>,
        on_stopped: S,
        on_failure: impl FnOnce(&FailureInfo) -> Option<S> + Send + 'static,
    ) -> Op<S, WatchHandle> {
        let hook: FailureHook =
            Box::new(move |info| on_failure(info).map(|m| Box::new(m) as BoxAny));
        self.watch_inner(target.into(), on_stopped, Some(hook))
    }

    fn watch_inner(
        self,
        target: WatchTarget,
        on_stopped: S,
        on_failure: Option<FailureHook>,
    ) -> Op<S, WatchHandle> {
        Op {
            kind: OpKind::Watch {
                target,
                on_stopped: Box::new(on_stopped),
                on_failure,
                k: Box::new(Op::pure_value),
            },
            effects: EffectSet::WATCH,
        }
    }
}
