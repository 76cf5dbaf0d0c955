//! Advisory effect tags carried by every operation.
//!
//! Every [`Op`](crate::op::Op) carries an [`EffectSet`] recording which
//! primitive kinds it may perform. The set is pure bookkeeping: it is
//! assembled at construction time, transformed by composition, and **never
//! inspected by the interpreter**. It exists so a process's declared profile
//! can be checked in tests and documented at the API boundary.
//!
//! # Accumulation rules
//!
//! - Each primitive constructor tags its own kind.
//! - Sequencing (`and_then`) keeps the statically-visible prefix and adds
//!   [`EffectSet::OPAQUE`], because a continuation closure's effects cannot
//!   be seen until it runs. `map` adds nothing: it transforms the value, not
//!   the effects.
//! - Choice unification unions every declared branch (selected or not) and
//!   adds [`EffectSet::CHOICE`]: one of these profiles will occur.
//! - [`Op::with_effects`](crate::op::Op::with_effects) replaces the tracked
//!   set with a caller-asserted profile, and
//!   [`Op::ignore_effects`](crate::op::Op::ignore_effects) erases it to
//!   `OPAQUE`. Both are no-ops at run time.

use bitflags::bitflags;

bitflags! {
    /// The closed set of effect tags an operation may carry.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    pub struct EffectSet: u16 {
        /// Reads the next message from the process's input channel.
        const READ = 1 << 0;
        /// Sends a message to an address.
        const SEND = 1 << 1;
        /// Schedules a delayed send.
        const SCHEDULE = 1 << 2;
        /// Forks a sibling process in the same hosting unit.
        const FORK = 1 << 3;
        /// Spawns a child process in a brand-new hosting unit.
        const SPAWN = 1 << 4;
        /// Calls a sub-process synchronously, inline.
        const CALL = 1 << 5;
        /// Reads or updates the per-unit keyed state store.
        const STATE = 1 << 6;
        /// Registers a cleanup action.
        const CLEANUP = 1 << 7;
        /// Obtains an environment handle (own address, host address).
        const ENV = 1 << 8;
        /// Registers interest in another process's termination.
        const WATCH = 1 << 9;
        /// Unifies mutually exclusive branches.
        const CHOICE = 1 << 10;
        /// May terminate cooperatively without a value.
        const HALT = 1 << 11;
        /// May terminate the hosting unit fatally.
        const FAIL = 1 << 12;
        /// Effects not statically visible at construction: a sequenced
        /// continuation that has not run yet, or an explicit erasure.
        const OPAQUE = 1 << 13;
    }
}

impl EffectSet {
    /// Returns true if no effect tag is recorded (a pure value).
    #[must_use]
    pub fn is_pure(self) -> bool {
        self.is_empty()
    }

    /// Returns true if the set contains effects that were not statically
    /// visible at construction time.
    #[must_use]
    pub fn is_opaque(self) -> bool {
        self.contains(Self::OPAQUE)
    }
}
