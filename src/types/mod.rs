//! Core types shared across the crate.
//!
//! This module is organized into focused submodules:
//!
//! - [`id`]: Identifiers for hosting units, fibers, and the virtual clock
//! - [`addr`]: Typed addresses, fork handles, watch handles
//! - [`cancel`]: Cancellation kinds, reasons, and tokens
//! - [`outcome`]: Terminal process states and failure reasons

pub mod addr;
pub mod cancel;
pub mod id;
pub mod outcome;

/// Type-erased message or state payload (internal use).
pub(crate) type BoxAny = Box<dyn std::any::Any + Send>;

pub use addr::{Addr, DeployConfig, FailureInfo, SubActor, WatchHandle, WatchTarget};
pub use cancel::{CancelKind, CancelReason, CancelToken};
pub use id::{ActorId, FiberId, RawAddr, Time};
pub use outcome::{FailureReason, Outcome};
