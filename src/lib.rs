//! Choreo: a combinator language for cooperative, message-driven processes.
//!
//! # Overview
//!
//! Choreo describes *processes* — sequential-looking, possibly infinite
//! programs that run concurrently inside a single message-handling unit
//! (an actor) and communicate by message passing, scheduling, forking
//! siblings, spawning child units, and reading/updating a per-unit keyed
//! state store. A process is a composable *value*: an [`op::Op`] tree
//! carrying a static record of which effect kinds it may perform, built
//! through the typed [`op::Scope`] token and executed only when handed to
//! an interpreter.
//!
//! # Core Guarantees
//!
//! - **Operations are data**: building an operation performs no effect;
//!   interpretation is a separate concern with an explicit contract.
//! - **Bounded stack**: sequencing resolves one continuation per step, so
//!   infinite server loops never grow the call stack.
//! - **Cooperative cancellation**: cancel requests suppress future effects
//!   (including undelivered scheduled sends) and are idempotent; nothing
//!   already dispatched is retracted.
//! - **Per-key state order**: all updates against one state key form a
//!   single total order; gated updates from sibling processes apply in
//!   strict arrival order.
//! - **Deterministic testing**: the reference interpreter runs on virtual
//!   time with deterministic scheduling; timeouts are schedule+read races,
//!   never preemption.
//! - **Unit-level failure domain**: halting is cooperative and local;
//!   every real failure (timeout, retries exhausted, fatal signal) stops
//!   the entire hosting unit. Only separately spawned units are isolated.
//!
//! # Module Structure
//!
//! - [`op`]: the operation algebra and the `Scope` description token
//! - [`choice`]: first-match-wins guarded branching
//! - [`process`]: named, sized, time-bounded process recipes
//! - [`state`]: the per-unit keyed state store and its ordering contract
//! - [`combinator`]: derived control flow (`delay`, `fork_and_cancel`,
//!   `first_of`, `retry`)
//! - [`runtime`]: the deterministic reference interpreter
//! - [`discovery`]: service lookup/registration helpers and a registry actor
//! - [`effect`]: advisory effect tags
//! - [`types`]: identifiers, addresses, cancellation, outcomes
//! - [`config`]: interpreter configuration
//! - [`error`]: interpreter-edge errors

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

pub mod choice;
pub mod combinator;
pub mod config;
pub mod discovery;
pub mod effect;
pub mod error;
pub mod op;
pub mod process;
pub mod runtime;
pub mod state;
pub mod test_utils;
pub mod types;

// Re-exports for convenient access to core types
pub use choice::OpChoice;
pub use combinator::{delay, first_of, fork_and_cancel, retry, Candidate, RaceReply, RetryMsg};
pub use config::{ConfigError, RuntimeConfig};
pub use effect::EffectSet;
pub use error::{Error, ErrorKind, Result};
pub use op::{Op, Scope};
pub use process::Process;
pub use runtime::{Runtime, UnitHandle};
pub use state::{StateKey, StateKeyId, StateStore};
pub use types::{
    ActorId, Addr, CancelKind, CancelReason, DeployConfig, FailureInfo, FailureReason, FiberId,
    Outcome, RawAddr, SubActor, Time, WatchHandle, WatchTarget,
};
