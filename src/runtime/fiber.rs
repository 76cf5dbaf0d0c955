//! The trampoline: step-wise execution of one process fiber.
//!
//! [`OpFiber`] holds a fiber's current operation tree (result type erased)
//! and executes one primitive per iteration of an ordinary loop, so infinite
//! sequencing runs in bounded stack. `call` nesting is handled with an
//! explicit frame stack: entering a call pushes the continuation and the
//! optional halt replacement; a halt unwinds frames until one offers a
//! replacement, or terminates the fiber if none does.
//!
//! A fiber gives the scheduler back control when it suspends (empty mailbox,
//! gated state turn), terminates, or exhausts its per-turn primitive budget.

use std::time::Duration;

use crate::op::{Op, OpKind};
use crate::process::ProcessSpec;
use crate::state::{SlotInit, SlotRead, SlotUpdate, StateKeyId};
use crate::types::addr::RawSubActor;
use crate::types::{ActorId, Addr, BoxAny, DeployConfig, FailureReason, FiberId, RawAddr};

use super::World;

/// What a fiber reports back to the scheduler after a turn.
pub(crate) enum StepEvent {
    /// The fiber produced its final value.
    Completed(BoxAny),
    /// The fiber stopped cooperatively.
    Halted,
    /// The fiber failed; the hosting unit goes down with it.
    Failed(FailureReason),
    /// Suspended until a message arrives.
    AwaitMessage,
    /// Suspended until the key's gated FIFO admits this fiber.
    AwaitState(StateKeyId),
    /// Budget exhausted; still runnable.
    Yielded,
}

/// A type-erased, steppable fiber.
pub(crate) trait AnyFiber: Send {
    fn step(&mut self, ctx: &mut FiberCtx<'_>) -> StepEvent;
}

/// The effect surface a stepping fiber executes primitives against.
///
/// Borrows the whole world: the fiber's own box is taken out of its slot
/// while stepping, so the borrow is exclusive and safe.
pub(crate) struct FiberCtx<'a> {
    pub(crate) world: &'a mut World,
    pub(crate) unit: ActorId,
    pub(crate) fiber: FiberId,
    budget: u32,
    pub(crate) used: u32,
}

impl<'a> FiberCtx<'a> {
    pub(crate) fn new(world: &'a mut World, unit: ActorId, fiber: FiberId, budget: u32) -> Self {
        Self {
            world,
            unit,
            fiber,
            budget,
            used: 0,
        }
    }

    /// Consumes one unit of the turn budget; false when exhausted.
    fn consume(&mut self) -> bool {
        if self.budget == 0 {
            return false;
        }
        self.budget -= 1;
        self.used += 1;
        true
    }

    fn self_raw(&self) -> RawAddr {
        RawAddr::new(self.unit, self.fiber)
    }

    fn pop_message(&mut self) -> Option<BoxAny> {
        self.world
            .unit_mut(self.unit)
            .and_then(|u| u.fiber_mut(self.fiber))
            .and_then(|slot| slot.mailbox.pop())
    }

    fn send(&mut self, target: RawAddr, payload: BoxAny) {
        self.world.deliver(target, payload);
    }

    fn schedule(&mut self, target: RawAddr, payload: BoxAny, delay: Duration) {
        let token = self
            .world
            .unit_mut(self.unit)
            .and_then(|u| u.fiber_mut(self.fiber))
            .map(|slot| slot.cancel.clone())
            .unwrap_or_default();
        self.world.schedule(target, payload, delay, token);
    }

    fn fork(&mut self, spec: ProcessSpec) -> RawSubActor {
        self.world.fork(self.unit, spec)
    }

    fn spawn(&mut self, spec: ProcessSpec, deploy: DeployConfig) -> ActorId {
        self.world.spawn(Some(self.unit), spec, deploy)
    }

    fn state_read_clear(&mut self, key: StateKeyId) -> bool {
        self.world
            .unit_mut(self.unit)
            .map_or(true, |u| u.store.read_clear(key))
    }

    fn state_update_turn(&mut self, key: StateKeyId) -> bool {
        let fiber = self.fiber;
        self.world
            .unit_mut(self.unit)
            .map_or(true, |u| u.store.update_turn(key, fiber))
    }

    fn state_read(&mut self, key: StateKeyId, init: SlotInit, read: SlotRead) -> BoxAny {
        let unit = self
            .world
            .unit_mut(self.unit)
            .expect("stepping fiber belongs to a live unit");
        unit.store.read(key, init, read)
    }

    fn state_apply(
        &mut self,
        key: StateKeyId,
        gated: bool,
        init: SlotInit,
        run: SlotUpdate,
    ) -> BoxAny {
        let fiber = self.fiber;
        let unit = self
            .world
            .unit_mut(self.unit)
            .expect("stepping fiber belongs to a live unit");
        let (out, _queue_changed) = unit.store.apply(key, gated, fiber, init, run);
        out
    }

    fn state_forget(&mut self, key: StateKeyId) {
        if let Some(unit) = self.world.unit_mut(self.unit) {
            unit.store.forget(key);
        }
    }

    fn push_cleanup(&mut self, action: Box<dyn FnOnce() + Send>) {
        if let Some(slot) = self
            .world
            .unit_mut(self.unit)
            .and_then(|u| u.fiber_mut(self.fiber))
        {
            slot.cleanups.push(action);
        }
    }
}

struct CallFrame<S: Send + 'static> {
    k: Box<dyn FnOnce(BoxAny) -> Op<S, BoxAny> + Send>,
    replacement: Option<BoxAny>,
}

/// The generic trampoline over an operation tree with erased result type.
pub(crate) struct OpFiber<S: Send + 'static> {
    op: Option<Op<S, BoxAny>>,
    frames: Vec<CallFrame<S>>,
}

impl<S: Send + 'static> OpFiber<S> {
    pub(crate) fn new(op: Op<S, BoxAny>) -> Self {
        Self {
            op: Some(op),
            frames: Vec::new(),
        }
    }
}

impl<S: Send + 'static> AnyFiber for OpFiber<S> {
    fn step(&mut self, ctx: &mut FiberCtx<'_>) -> StepEvent {
        let mut op = self.op.take().expect("fiber stepped after terminal event");
        loop {
            if !ctx.consume() {
                self.op = Some(op);
                return StepEvent::Yielded;
            }
            let Op { kind, effects } = op;
            match kind {
                OpKind::Pure(value) => match self.frames.pop() {
                    Some(frame) => op = (frame.k)(value),
                    None => return StepEvent::Completed(value),
                },
                OpKind::Receive(k) => match ctx.pop_message() {
                    Some(msg) => match msg.downcast::<S>() {
                        Ok(m) => op = k(*m),
                        Err(_) => {
                            tracing::error!(
                                addr = %ctx.self_raw(),
                                "dropping message of unexpected type"
                            );
                            op = Op {
                                kind: OpKind::Receive(k),
                                effects,
                            };
                        }
                    },
                    None => {
                        self.op = Some(Op {
                            kind: OpKind::Receive(k),
                            effects,
                        });
                        return StepEvent::AwaitMessage;
                    }
                },
                OpKind::SelfAddr(k) => op = k(Addr::from_raw(ctx.self_raw())),
                OpKind::UnitAddr(k) => op = k(ctx.unit),
                OpKind::SendMsg { target, payload, k } => {
                    ctx.send(target, payload);
                    op = k(());
                }
                OpKind::Schedule {
                    target,
                    payload,
                    delay,
                    k,
                } => {
                    ctx.schedule(target, payload, delay);
                    op = k(());
                }
                OpKind::Fork { spec, k } => {
                    let sub = ctx.fork(spec);
                    op = k(sub);
                }
                OpKind::Spawn { spec, deploy, k } => {
                    let unit = ctx.spawn(spec, deploy);
                    op = k(unit);
                }
                OpKind::Call {
                    inner,
                    replacement,
                    k,
                } => {
                    self.frames.push(CallFrame { k, replacement });
                    op = *inner;
                }
                OpKind::StateRead {
                    key,
                    gated,
                    init,
                    read,
                    k,
                } => {
                    if gated && !ctx.state_read_clear(key) {
                        self.op = Some(Op {
                            kind: OpKind::StateRead {
                                key,
                                gated,
                                init,
                                read,
                                k,
                            },
                            effects,
                        });
                        return StepEvent::AwaitState(key);
                    }
                    let value = ctx.state_read(key, init, read);
                    op = k(value);
                }
                OpKind::StateUpdate {
                    key,
                    gated,
                    init,
                    run,
                    k,
                } => {
                    if gated && !ctx.state_update_turn(key) {
                        self.op = Some(Op {
                            kind: OpKind::StateUpdate {
                                key,
                                gated,
                                init,
                                run,
                                k,
                            },
                            effects,
                        });
                        return StepEvent::AwaitState(key);
                    }
                    let value = ctx.state_apply(key, gated, init, run);
                    op = k(value);
                }
                OpKind::StateForget { key, k } => {
                    ctx.state_forget(key);
                    op = k(());
                }
                OpKind::OnStop { action, k } => {
                    ctx.push_cleanup(action);
                    op = k(());
                }
                OpKind::Watch {
                    target,
                    on_stopped,
                    on_failure,
                    k,
                } => {
                    let watcher = ctx.self_raw();
                    let handle = ctx.world.register_watch(watcher, target, on_stopped, on_failure);
                    op = k(handle);
                }
                OpKind::Halt => {
                    let mut resumed = None;
                    while let Some(mut frame) = self.frames.pop() {
                        if let Some(replacement) = frame.replacement.take() {
                            resumed = Some((frame.k)(replacement));
                            break;
                        }
                    }
                    match resumed {
                        Some(next) => op = next,
                        None => return StepEvent::Halted,
                    }
                }
                OpKind::Fail(reason) => return StepEvent::Failed(reason),
            }
        }
    }
}
