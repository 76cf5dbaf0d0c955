//! Typed addresses and process handles.
//!
//! An [`Addr`] is a lightweight, clonable capability to send messages of one
//! type to one process. A [`SubActor`] is what `fork` returns: the sibling's
//! address plus a cancel capability. Both are freely shared and copied; the
//! underlying process's lifetime is independent of its handles.

use core::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::types::cancel::{CancelReason, CancelToken};
use crate::types::id::{ActorId, RawAddr};
use crate::types::outcome::FailureReason;

/// A typed address for a process able to receive messages of type `M`.
///
/// Addresses are routing capabilities only; holding one says nothing about
/// whether the process is still alive. Sends to a stopped process are
/// silently dropped (logged at trace level by the interpreter).
pub struct Addr<M> {
    raw: RawAddr,
    _marker: PhantomData<fn(M)>,
}

impl<M> Addr<M> {
    /// Wraps an untyped address (internal use: the interpreter guarantees
    /// the target's message type matches `M`).
    #[must_use]
    pub(crate) const fn from_raw(raw: RawAddr) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Returns the untyped routing address.
    #[must_use]
    pub const fn raw(&self) -> RawAddr {
        self.raw
    }

    /// Returns the hosting unit this address points into.
    #[must_use]
    pub const fn unit(&self) -> ActorId {
        self.raw.unit
    }
}

impl<M> Clone for Addr<M> {
    fn clone(&self) -> Self {
        Self::from_raw(self.raw)
    }
}

impl<M> Copy for Addr<M> {}

impl<M> PartialEq for Addr<M> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<M> Eq for Addr<M> {}

impl<M> fmt::Debug for Addr<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Addr({})", self.raw)
    }
}

/// The untyped core of a forked sibling's handle (internal use).
#[derive(Clone, Debug)]
pub(crate) struct RawSubActor {
    pub(crate) addr: RawAddr,
    pub(crate) cancel: CancelToken,
}

impl RawSubActor {
    pub(crate) fn cancel(&self, reason: CancelReason) {
        self.cancel.cancel(reason);
    }
}

/// Handle to a forked sibling process: an address plus a cancel capability.
///
/// The forking process owns the handle, but the sibling's lifetime is
/// independent once started. Cancellation is advisory and cooperative: it
/// takes effect at the sibling's next scheduling point and suppresses its
/// undelivered scheduled sends, but cannot retract a message already
/// dispatched. Canceling an already-finished process is harmless.
pub struct SubActor<M> {
    raw: RawSubActor,
    _marker: PhantomData<fn(M)>,
}

impl<M> SubActor<M> {
    pub(crate) fn from_raw(raw: RawSubActor) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Returns the sibling's typed address.
    #[must_use]
    pub fn addr(&self) -> Addr<M> {
        Addr::from_raw(self.raw.addr)
    }

    /// Requests cooperative cancellation of the sibling.
    pub fn cancel(&self) {
        self.raw.cancel(CancelReason::default());
    }

    /// Requests cooperative cancellation with an explicit reason.
    pub fn cancel_with(&self, reason: CancelReason) {
        self.raw.cancel(reason);
    }

    /// Returns true if cancellation has been requested (by any holder).
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.raw.cancel.is_cancelled()
    }
}

impl<M> Clone for SubActor<M> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _marker: PhantomData,
        }
    }
}

impl<M> fmt::Debug for SubActor<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubActor({})", self.raw.addr)
    }
}

/// What a `watch` operation observes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchTarget {
    /// One process fiber (forked sibling or any addressed process).
    Fiber(RawAddr),
    /// A whole hosting unit; fires when its last fiber terminates.
    Unit(ActorId),
}

impl<M> From<&SubActor<M>> for WatchTarget {
    fn from(sub: &SubActor<M>) -> Self {
        Self::Fiber(sub.raw.addr)
    }
}

impl<M> From<&Addr<M>> for WatchTarget {
    fn from(addr: &Addr<M>) -> Self {
        Self::Fiber(addr.raw())
    }
}

impl From<ActorId> for WatchTarget {
    fn from(unit: ActorId) -> Self {
        Self::Unit(unit)
    }
}

/// Cancel handle for a registered watch.
///
/// Canceling stops future delivery but does not retract a notification
/// already in flight.
#[derive(Clone, Debug, Default)]
pub struct WatchHandle {
    cancelled: Arc<AtomicBool>,
}

impl WatchHandle {
    /// Builds a handle sharing the runtime's cancellation flag.
    pub(crate) fn from_flag(cancelled: Arc<AtomicBool>) -> Self {
        Self { cancelled }
    }

    /// Stops future delivery of the watched notification.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns true if the watch was canceled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Details handed to a watch's failure hook.
#[derive(Clone, Debug)]
pub struct FailureInfo {
    /// The unit that failed.
    pub unit: ActorId,
    /// Why it failed.
    pub reason: FailureReason,
}

/// Deployment configuration for `spawn`.
///
/// Overrides the spawned unit's root-process defaults. All fields are
/// optional; the recipe's own values apply when unset.
#[derive(Clone, Debug, Default)]
pub struct DeployConfig {
    /// Override for the unit's diagnostic name.
    pub name: Option<String>,
    /// Override for the root process's mailbox capacity.
    pub mailbox_capacity: Option<usize>,
}

impl DeployConfig {
    /// Creates an empty configuration (all recipe defaults apply).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the unit's diagnostic name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the root mailbox capacity.
    #[must_use]
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = Some(capacity);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::id::FiberId;

    fn addr(unit: u32, fiber: u32) -> RawAddr {
        RawAddr::new(ActorId::from_index(unit), FiberId::from_index(fiber))
    }

    #[test]
    fn typed_addr_is_copy_and_comparable() {
        let a: Addr<u64> = Addr::from_raw(addr(1, 0));
        let b = a;
        assert_eq!(a, b);
        assert_eq!(a.unit(), ActorId::from_index(1));
    }

    #[test]
    fn subactor_cancel_is_shared() {
        let raw = RawSubActor {
            addr: addr(0, 1),
            cancel: CancelToken::new(),
        };
        let sub: SubActor<u64> = SubActor::from_raw(raw);
        let other = sub.clone();
        assert!(!other.is_cancel_requested());
        sub.cancel_with(CancelReason::race_lost());
        assert!(other.is_cancel_requested());
    }

    #[test]
    fn watch_handle_cancel() {
        let handle = WatchHandle::default();
        assert!(!handle.is_cancelled());
        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn deploy_config_builder() {
        let cfg = DeployConfig::new()
            .with_name("worker")
            .with_mailbox_capacity(8);
        assert_eq!(cfg.name.as_deref(), Some("worker"));
        assert_eq!(cfg.mailbox_capacity, Some(8));
    }
}
