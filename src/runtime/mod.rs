//! The deterministic reference interpreter.
//!
//! This runtime executes operation trees against live mailboxes. It is the
//! in-crate implementation of the interpreter contract: every primitive kind
//! has an execution action, continuations resume iteratively (unbounded
//! sequencing runs in bounded stack), and scheduling is cooperative and
//! fully deterministic.
//!
//! # Model
//!
//! - Each hosting unit's fibers are interleaved by a single step loop; only
//!   one primitive executes at a time per unit, so the state store and
//!   in-flight operation state are race-free by construction. Fibers run in
//!   creation order, each up to a per-turn primitive budget.
//! - Time is virtual: when no fiber can make progress, the clock jumps to
//!   the earliest scheduled timer and fires it. Timeouts are schedule+read
//!   races, never preemption.
//! - Quiescence: no fiber is runnable and no timer is pending. Fibers
//!   blocked forever on `receive` do not prevent quiescence.
//!
//! # Module layout
//!
//! - [`fiber`]: the per-fiber trampoline
//! - [`unit`]: hosting units, fiber slots, mailboxes
//! - [`timer`]: the deadline-ordered timer queue

pub(crate) mod fiber;
pub(crate) mod timer;
pub(crate) mod unit;

use core::fmt;
use std::marker::PhantomData;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RuntimeConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::op::FailureHook;
use crate::process::{Process, ProcessSpec};
use crate::types::addr::RawSubActor;
use crate::types::cancel::CancelToken;
use crate::types::{
    ActorId, Addr, BoxAny, DeployConfig, FailureInfo, FailureReason, FiberId, Outcome, RawAddr,
    Time, WatchHandle, WatchTarget,
};

use fiber::{FiberCtx, StepEvent};
use timer::{TimerKind, TimerQueue};
use unit::{FiberPhase, FiberSlot, ResultCell, TerminalKind, Unit, UnitStatus, Wait};

struct WatchEntry {
    target: WatchTarget,
    watcher: RawAddr,
    payload: Option<BoxAny>,
    on_failure: Option<FailureHook>,
    cancelled: Arc<AtomicBool>,
}

/// The mutable world the interpreter steps: units, timers, watches, clock.
pub(crate) struct World {
    units: Vec<Unit>,
    timers: TimerQueue,
    watches: Vec<WatchEntry>,
    now: Time,
    default_mailbox_capacity: usize,
}

impl World {
    fn new(default_mailbox_capacity: usize) -> Self {
        Self {
            units: Vec::new(),
            timers: TimerQueue::new(),
            watches: Vec::new(),
            now: Time::ZERO,
            default_mailbox_capacity,
        }
    }

    pub(crate) fn unit(&self, id: ActorId) -> Option<&Unit> {
        self.units.get(id.index() as usize)
    }

    pub(crate) fn unit_mut(&mut self, id: ActorId) -> Option<&mut Unit> {
        self.units.get_mut(id.index() as usize)
    }

    /// Delivers a message, logging instead of propagating the error: sends
    /// are fire-and-forget at the operation level.
    pub(crate) fn deliver(&mut self, target: RawAddr, payload: BoxAny) {
        match self.try_deliver(target, payload) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::MailboxFull => {
                tracing::warn!(%target, "mailbox full, dropping message");
            }
            Err(_) => {
                tracing::trace!(%target, "dropping message for stopped process");
            }
        }
    }

    pub(crate) fn try_deliver(&mut self, target: RawAddr, payload: BoxAny) -> Result<()> {
        let slot = self
            .unit_mut(target.unit)
            .and_then(|u| u.fiber_mut(target.fiber))
            .ok_or_else(|| Error::new(ErrorKind::UnknownAddress).at(target))?;
        if slot.is_terminal() {
            return Err(Error::new(ErrorKind::MailboxClosed).at(target));
        }
        slot.mailbox.push(payload).map_err(|e| e.at(target))
    }

    pub(crate) fn schedule(
        &mut self,
        target: RawAddr,
        payload: BoxAny,
        delay: Duration,
        issued_by: CancelToken,
    ) {
        let deadline = self.now + delay;
        tracing::trace!(%target, %deadline, "send scheduled");
        self.timers.insert(
            deadline,
            TimerKind::Deliver {
                target,
                payload,
                issued_by,
            },
        );
    }

    pub(crate) fn fork(&mut self, unit_id: ActorId, spec: ProcessSpec) -> RawSubActor {
        let default_capacity = self.default_mailbox_capacity;
        let ProcessSpec {
            name,
            mailbox_capacity,
            timeout,
            make,
        } = spec;
        let (addr, token) = {
            let unit = self
                .unit_mut(unit_id)
                .expect("forking fiber belongs to a live unit");
            let fid = FiberId::from_index(unit.fibers.len() as u32);
            let capacity = mailbox_capacity.unwrap_or(default_capacity);
            let slot = FiberSlot::new(fid, name.clone(), capacity, make());
            let token = slot.cancel.clone();
            unit.fibers.push(slot);
            (RawAddr::new(unit_id, fid), token)
        };
        if let Some(timeout) = timeout {
            let deadline = self.now + timeout;
            self.timers.insert(deadline, TimerKind::FailUnit { addr });
        }
        tracing::debug!(%addr, name = %name, "process forked");
        RawSubActor {
            addr,
            cancel: token,
        }
    }

    pub(crate) fn spawn(
        &mut self,
        parent: Option<ActorId>,
        spec: ProcessSpec,
        deploy: DeployConfig,
    ) -> ActorId {
        let ProcessSpec {
            name,
            mailbox_capacity,
            timeout,
            make,
        } = spec;
        let id = ActorId::from_index(self.units.len() as u32);
        let unit_name = deploy.name.unwrap_or_else(|| name.clone());
        let capacity = deploy
            .mailbox_capacity
            .or(mailbox_capacity)
            .unwrap_or(self.default_mailbox_capacity);
        let mut unit = Unit::new(id, unit_name, parent);
        unit.fibers
            .push(FiberSlot::new(FiberId::ROOT, name.clone(), capacity, make()));
        self.units.push(unit);
        if let Some(timeout) = timeout {
            let deadline = self.now + timeout;
            self.timers.insert(
                deadline,
                TimerKind::FailUnit {
                    addr: RawAddr::root_of(id),
                },
            );
        }
        tracing::debug!(unit = %id, name = %name, parent = ?parent, "unit spawned");
        id
    }

    pub(crate) fn register_watch(
        &mut self,
        watcher: RawAddr,
        target: WatchTarget,
        on_stopped: BoxAny,
        on_failure: Option<FailureHook>,
    ) -> WatchHandle {
        let flag = Arc::new(AtomicBool::new(false));
        let handle = WatchHandle::from_flag(Arc::clone(&flag));
        self.watches.push(WatchEntry {
            target,
            watcher,
            payload: Some(on_stopped),
            on_failure,
            cancelled: flag,
        });
        // A watch on an already-terminated target fires immediately.
        if let Some(failure) = self.termination_of(target) {
            self.fire_watches(target, failure.as_ref());
        }
        handle
    }

    /// `None` if the target is still live; `Some(None)` if it stopped
    /// normally; `Some(Some(info))` if its unit failed.
    fn termination_of(&self, target: WatchTarget) -> Option<Option<FailureInfo>> {
        let unit_id = match target {
            WatchTarget::Fiber(addr) => addr.unit,
            WatchTarget::Unit(id) => id,
        };
        let Some(unit) = self.unit(unit_id) else {
            return Some(None);
        };
        let failure = match &unit.status {
            UnitStatus::Failed(reason) => Some(FailureInfo {
                unit: unit_id,
                reason: reason.clone(),
            }),
            _ => None,
        };
        let terminated = match target {
            WatchTarget::Fiber(addr) => {
                unit.fiber(addr.fiber).map_or(true, FiberSlot::is_terminal)
            }
            WatchTarget::Unit(_) => !unit.is_running(),
        };
        terminated.then_some(failure)
    }

    fn fire_watches(&mut self, target: WatchTarget, failure: Option<&FailureInfo>) {
        // The failure hook only applies when the failed unit is a child of
        // the watcher's own unit.
        let failed_parent =
            failure.and_then(|info| self.unit(info.unit).and_then(|u| u.parent));
        let mut deliveries: Vec<(RawAddr, BoxAny)> = Vec::new();
        for entry in &mut self.watches {
            if entry.target != target || entry.payload.is_none() {
                continue;
            }
            if entry.cancelled.load(std::sync::atomic::Ordering::Acquire) {
                entry.payload = None;
                continue;
            }
            let payload = entry.payload.take().expect("payload checked above");
            let is_child_failure =
                failure.is_some() && failed_parent == Some(entry.watcher.unit);
            let message = match (failure, entry.on_failure.take(), is_child_failure) {
                (Some(info), Some(hook), true) => hook(info),
                _ => Some(payload),
            };
            if let Some(message) = message {
                deliveries.push((entry.watcher, message));
            }
        }
        self.watches.retain(|entry| entry.payload.is_some());
        for (watcher, message) in deliveries {
            tracing::trace!(%watcher, ?target, "watch notification delivered");
            self.deliver(watcher, message);
        }
    }

    fn finalize_fiber(
        &mut self,
        unit_id: ActorId,
        fiber_id: FiberId,
        kind: TerminalKind,
        value: Option<BoxAny>,
    ) {
        let (unit_done, fiber_name) = {
            let Some(unit) = self.unit_mut(unit_id) else {
                return;
            };
            let Some(slot) = unit.fiber_mut(fiber_id) else {
                return;
            };
            if slot.is_terminal() {
                return;
            }
            let fiber_name = slot.name.clone();
            slot.phase = FiberPhase::Terminal(kind);
            slot.fiber = None;
            slot.run_cleanups();
            let _ = unit.store.remove_fiber(fiber_id);
            if fiber_id.is_root() {
                let outcome = match kind {
                    TerminalKind::Completed => {
                        Outcome::Completed(value.expect("completed fibers carry a value"))
                    }
                    // A canceled process stopped cooperatively; fiber-level
                    // failure is routed through `fail_unit` instead.
                    TerminalKind::Halted | TerminalKind::Cancelled | TerminalKind::Failed => {
                        Outcome::Halted
                    }
                };
                let mut cell = unit.result.lock();
                if cell.is_none() {
                    *cell = Some(outcome);
                }
            }
            let done = unit.all_fibers_terminal();
            if done {
                unit.status = UnitStatus::Stopped;
            }
            (done, fiber_name)
        };
        let addr = RawAddr::new(unit_id, fiber_id);
        tracing::debug!(%addr, name = %fiber_name, ?kind, "process terminated");
        self.fire_watches(WatchTarget::Fiber(addr), None);
        if unit_done {
            tracing::debug!(unit = %unit_id, "unit stopped");
            self.fire_watches(WatchTarget::Unit(unit_id), None);
        }
    }

    pub(crate) fn fail_unit(&mut self, unit_id: ActorId, reason: FailureReason) {
        let (fiber_ids, unit_name) = {
            let Some(unit) = self.unit_mut(unit_id) else {
                return;
            };
            if !unit.is_running() {
                return;
            }
            debug_assert_eq!(unit.id, unit_id);
            let unit_name = unit.name.clone();
            unit.status = UnitStatus::Failed(reason.clone());
            let outcome = if reason == FailureReason::Timeout {
                Outcome::TimedOut
            } else {
                Outcome::Failed(reason.clone())
            };
            {
                let mut cell = unit.result.lock();
                if cell.is_none() {
                    *cell = Some(outcome);
                }
            }
            let mut stopped = Vec::new();
            for slot in &mut unit.fibers {
                if slot.is_terminal() {
                    continue;
                }
                slot.phase = FiberPhase::Terminal(TerminalKind::Failed);
                slot.fiber = None;
                slot.run_cleanups();
                stopped.push(slot.id);
            }
            for id in &stopped {
                let _ = unit.store.remove_fiber(*id);
            }
            (stopped, unit_name)
        };
        tracing::warn!(unit = %unit_id, name = %unit_name, %reason, "hosting unit failed");
        let info = FailureInfo {
            unit: unit_id,
            reason,
        };
        for fiber_id in fiber_ids {
            self.fire_watches(
                WatchTarget::Fiber(RawAddr::new(unit_id, fiber_id)),
                Some(&info),
            );
        }
        self.fire_watches(WatchTarget::Unit(unit_id), Some(&info));
    }

    /// Fires the earliest pending timer, advancing virtual time to its
    /// deadline. Returns false when no timer is pending.
    fn fire_next_timer(&mut self) -> bool {
        let Some(entry) = self.timers.pop() else {
            return false;
        };
        if entry.deadline > self.now {
            self.now = entry.deadline;
        }
        match entry.kind {
            TimerKind::Deliver {
                target,
                payload,
                issued_by,
            } => {
                if issued_by.is_cancelled() {
                    tracing::trace!(%target, "scheduled send suppressed by cancellation");
                } else {
                    self.deliver(target, payload);
                }
            }
            TimerKind::FailUnit { addr } => {
                let live = self
                    .unit(addr.unit)
                    .and_then(|u| u.fiber(addr.fiber))
                    .map_or(false, |slot| !slot.is_terminal());
                if live {
                    self.fail_unit(addr.unit, FailureReason::Timeout);
                }
            }
        }
        true
    }
}

/// The deterministic runtime: a world of hosting units plus the step loop.
///
/// ```
/// use choreo::process::Process;
/// use choreo::runtime::Runtime;
/// use choreo::types::DeployConfig;
///
/// let mut rt = Runtime::with_defaults();
/// let answer: Process<(), u32> = Process::new("answer", |s| s.pure(42));
/// let handle = rt.spawn_unit(&answer, DeployConfig::new());
/// rt.run_until_quiescent().expect("quiescence");
/// let outcome = handle.take_outcome().expect("terminal");
/// assert_eq!(outcome.into_completed(), Some(42));
/// ```
pub struct Runtime {
    world: World,
    config: RuntimeConfig,
    steps: u64,
}

impl Runtime {
    /// Creates a runtime with the given (normalized) configuration.
    #[must_use]
    pub fn new(mut config: RuntimeConfig) -> Self {
        config.normalize();
        Self {
            world: World::new(config.default_mailbox_capacity),
            config,
            steps: 0,
        }
    }

    /// Creates a runtime with the default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RuntimeConfig::default())
    }

    /// Returns the current virtual time.
    #[must_use]
    pub const fn now(&self) -> Time {
        self.world.now
    }

    /// Returns the number of scheduling turns executed so far.
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Spawns `process` as the root of a new hosting unit and returns a
    /// handle exposing the unit's address and, once terminal, its outcome.
    pub fn spawn_unit<M, A>(
        &mut self,
        process: &Process<M, A>,
        deploy: DeployConfig,
    ) -> UnitHandle<M, A>
    where
        M: Send + 'static,
        A: Send + 'static,
    {
        let spec = ProcessSpec::of(process);
        let id = self.world.spawn(None, spec, deploy);
        let result = self
            .world
            .unit(id)
            .expect("unit just spawned")
            .result
            .clone();
        UnitHandle {
            unit: id,
            addr: Addr::from_raw(RawAddr::root_of(id)),
            result,
            _marker: PhantomData,
        }
    }

    /// Injects a message from outside the system.
    pub fn send<M: Send + 'static>(&mut self, to: &Addr<M>, msg: M) -> Result<()> {
        self.world.try_deliver(to.raw(), Box::new(msg))
    }

    /// Runs until quiescent: no fiber can progress and no timer is pending.
    ///
    /// Returns the number of turns executed, or
    /// [`ErrorKind::StepLimitExceeded`] if the configured safety valve
    /// tripped first.
    pub fn run_until_quiescent(&mut self) -> Result<u64> {
        let start = self.steps;
        loop {
            if self.config.max_steps != 0 && self.steps - start >= self.config.max_steps {
                return Err(Error::new(ErrorKind::StepLimitExceeded));
            }
            if self.pass() {
                continue;
            }
            if self.world.fire_next_timer() {
                self.steps += 1;
                continue;
            }
            break;
        }
        Ok(self.steps - start)
    }

    /// Returns true if no fiber can progress and no timer is pending.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        !self.any_fiber_ready() && self.world.timers.is_empty()
    }

    /// One scheduling pass over every fiber of every unit, in creation
    /// order. Returns true if any fiber made progress.
    fn pass(&mut self) -> bool {
        let mut progressed = false;
        let unit_count = self.world.units.len();
        for ui in 0..unit_count {
            let unit_id = ActorId::from_index(ui as u32);
            let fiber_count = self
                .world
                .unit(unit_id)
                .map_or(0, |u| u.fibers.len());
            for fi in 0..fiber_count {
                if self.step_fiber(unit_id, FiberId::from_index(fi as u32)) {
                    progressed = true;
                    self.steps += 1;
                }
            }
        }
        progressed
    }

    fn fiber_ready(&self, unit: &Unit, slot: &FiberSlot) -> bool {
        if !unit.is_running() || slot.is_terminal() {
            return false;
        }
        if slot.cancel.is_cancelled() {
            return true;
        }
        match &slot.phase {
            FiberPhase::Runnable => true,
            FiberPhase::Waiting(Wait::Message) => !slot.mailbox.is_empty(),
            FiberPhase::Waiting(Wait::StateTurn(key)) => unit.store.may_proceed(*key, slot.id),
            FiberPhase::Terminal(_) => false,
        }
    }

    fn any_fiber_ready(&self) -> bool {
        self.world
            .units
            .iter()
            .any(|unit| unit.fibers.iter().any(|slot| self.fiber_ready(unit, slot)))
    }

    /// Steps one fiber if it is ready. Returns true if it made progress.
    fn step_fiber(&mut self, unit_id: ActorId, fiber_id: FiberId) -> bool {
        let ready = {
            let Some(unit) = self.world.unit(unit_id) else {
                return false;
            };
            let Some(slot) = unit.fiber(fiber_id) else {
                return false;
            };
            if !self.fiber_ready(unit, slot) {
                return false;
            }
            // Cancellation takes effect at the scheduling point, before any
            // further primitive runs.
            if slot.cancel.is_cancelled() {
                None
            } else {
                Some(())
            }
        };
        if ready.is_none() {
            self.world
                .finalize_fiber(unit_id, fiber_id, TerminalKind::Cancelled, None);
            return true;
        }

        let Some(mut fiber) = self
            .world
            .unit_mut(unit_id)
            .and_then(|u| u.fiber_mut(fiber_id))
            .and_then(|slot| slot.fiber.take())
        else {
            return false;
        };

        let mut ctx = FiberCtx::new(&mut self.world, unit_id, fiber_id, self.config.ops_budget);
        let event = fiber.step(&mut ctx);
        let used = ctx.used;

        match event {
            StepEvent::Yielded => {
                self.restore_fiber(unit_id, fiber_id, fiber, FiberPhase::Runnable);
                true
            }
            StepEvent::AwaitMessage => {
                self.restore_fiber(
                    unit_id,
                    fiber_id,
                    fiber,
                    FiberPhase::Waiting(Wait::Message),
                );
                used > 0
            }
            StepEvent::AwaitState(key) => {
                self.restore_fiber(
                    unit_id,
                    fiber_id,
                    fiber,
                    FiberPhase::Waiting(Wait::StateTurn(key)),
                );
                used > 0
            }
            StepEvent::Completed(value) => {
                drop(fiber);
                self.world
                    .finalize_fiber(unit_id, fiber_id, TerminalKind::Completed, Some(value));
                true
            }
            StepEvent::Halted => {
                drop(fiber);
                self.world
                    .finalize_fiber(unit_id, fiber_id, TerminalKind::Halted, None);
                true
            }
            StepEvent::Failed(reason) => {
                drop(fiber);
                self.world.fail_unit(unit_id, reason);
                true
            }
        }
    }

    fn restore_fiber(
        &mut self,
        unit_id: ActorId,
        fiber_id: FiberId,
        fiber: Box<dyn fiber::AnyFiber>,
        phase: FiberPhase,
    ) {
        if let Some(slot) = self
            .world
            .unit_mut(unit_id)
            .and_then(|u| u.fiber_mut(fiber_id))
        {
            slot.fiber = Some(fiber);
            slot.phase = phase;
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("units", &self.world.units.len())
            .field("timers", &self.world.timers.len())
            .field("now", &self.world.now)
            .field("steps", &self.steps)
            .finish()
    }
}

/// Handle to a spawned hosting unit: its typed root address plus the cell
/// its root outcome is published through.
pub struct UnitHandle<M, A> {
    unit: ActorId,
    addr: Addr<M>,
    result: ResultCell,
    _marker: PhantomData<fn() -> A>,
}

impl<M, A> UnitHandle<M, A>
where
    A: Send + 'static,
{
    /// The unit's address.
    #[must_use]
    pub const fn unit(&self) -> ActorId {
        self.unit
    }

    /// The typed address of the unit's root process.
    #[must_use]
    pub const fn addr(&self) -> Addr<M> {
        self.addr
    }

    /// Takes the root process's outcome, if it is terminal yet.
    #[must_use]
    pub fn take_outcome(&self) -> Option<Outcome<A>> {
        self.result.lock().take().map(|outcome| {
            outcome.map(|value| {
                *value
                    .downcast::<A>()
                    .expect("unit outcome carries the root result type")
            })
        })
    }
}

impl<M, A> fmt::Debug for UnitHandle<M, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitHandle").field("unit", &self.unit).finish()
    }
}
