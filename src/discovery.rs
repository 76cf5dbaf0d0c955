//! Service discovery helpers.
//!
//! Thin conveniences built entirely from primitives: a query keyed by a
//! [`ServiceName`] yields zero-or-more candidate addresses; registering
//! one's own address under a name yields an acknowledgement. The lookup
//! helper retries on an empty result up to a fixed bound with doubling
//! backoff.
//!
//! The crate also ships [`registry_process`], a registry actor recipe built
//! on the state store, so "the well-known discovery address" is simply
//! wherever the caller spawns it.

use core::fmt;
use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::combinator::delay::delay;
use crate::op::{Op, Scope};
use crate::process::Process;
use crate::state::StateKey;
use crate::types::{Addr, RawAddr};

/// Identifier a service is registered and looked up under.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceName(String);

impl ServiceName {
    /// Creates a service name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Requests understood by the registry actor.
#[derive(Debug)]
pub enum RegistryMsg {
    /// Which addresses serve `service`?
    Lookup {
        /// The queried identifier.
        service: ServiceName,
        /// Where to send the [`LookupReply`].
        reply_to: Addr<LookupReply>,
    },
    /// Register `addr` under `service`.
    Register {
        /// The identifier to register under.
        service: ServiceName,
        /// The address being registered (normally the sender's own).
        addr: RawAddr,
        /// Where to send the [`RegisterAck`].
        reply_to: Addr<RegisterAck>,
    },
    /// Remove `addr` from `service`'s candidates. No reply.
    Deregister {
        /// The identifier to deregister from.
        service: ServiceName,
        /// The address being removed.
        addr: RawAddr,
    },
}

/// Reply to a lookup. `RetryTick` is the backoff timer's self-message and
/// never leaves the looking-up process.
#[derive(Debug)]
pub enum LookupReply {
    /// Zero or more candidate addresses, registration order preserved.
    Candidates(Vec<RawAddr>),
    /// Internal backoff tick.
    RetryTick,
}

/// Acknowledgement of a registration.
#[derive(Debug)]
pub struct RegisterAck {
    /// The identifier the registration was stored under.
    pub service: ServiceName,
}

/// Events the registry's state folds over.
#[derive(Clone, Debug)]
pub enum RegistryEvent {
    /// An address was registered under a service.
    Registered {
        /// The service identifier.
        service: ServiceName,
        /// The registered address.
        addr: RawAddr,
    },
    /// An address was removed from a service.
    Deregistered {
        /// The service identifier.
        service: ServiceName,
        /// The removed address.
        addr: RawAddr,
    },
}

type Table = HashMap<ServiceName, Vec<RawAddr>>;

fn apply_event(table: &mut Table, event: RegistryEvent) {
    match event {
        RegistryEvent::Registered { service, addr } => {
            let entry = table.entry(service).or_default();
            if !entry.contains(&addr) {
                entry.push(addr);
            }
        }
        RegistryEvent::Deregistered { service, addr } => {
            if let Some(entry) = table.get_mut(&service) {
                entry.retain(|candidate| *candidate != addr);
                if entry.is_empty() {
                    table.remove(&service);
                }
            }
        }
    }
}

/// The registry actor recipe: an infinite serve loop over a state-store
/// table of `service -> addresses`, with gated updates so registrations
/// from concurrent clients apply in arrival order.
#[must_use]
pub fn registry_process() -> Process<RegistryMsg, ()> {
    let key: StateKey<Table, RegistryEvent> =
        StateKey::new("service-table", HashMap::new, apply_event);
    Process::new("service-registry", move |s| serve(s, key))
}

fn serve(s: Scope<RegistryMsg>, key: StateKey<Table, RegistryEvent>) -> Op<RegistryMsg, ()> {
    s.receive()
        .and_then(move |msg| handle(s, key, msg).and_then(move |()| serve(s, key)))
}

fn handle(
    s: Scope<RegistryMsg>,
    key: StateKey<Table, RegistryEvent>,
    msg: RegistryMsg,
) -> Op<RegistryMsg, ()> {
    match msg {
        RegistryMsg::Lookup { service, reply_to } => {
            s.read_state(&key, true).and_then(move |table: Table| {
                let candidates = table.get(&service).cloned().unwrap_or_default();
                tracing::trace!(service = %service, found = candidates.len(), "lookup served");
                s.send(&reply_to, LookupReply::Candidates(candidates))
            })
        }
        RegistryMsg::Register {
            service,
            addr,
            reply_to,
        } => {
            let acked = service.clone();
            s.update_state(&key, true, move |_| {
                (vec![RegistryEvent::Registered { service, addr }], ())
            })
            .and_then(move |()| s.send(&reply_to, RegisterAck { service: acked }))
        }
        RegistryMsg::Deregister { service, addr } => s.update_state(&key, true, move |_| {
            (vec![RegistryEvent::Deregistered { service, addr }], ())
        }),
    }
}

/// Fixed retry bound for [`lookup_service`] (total attempts).
pub const LOOKUP_ATTEMPTS: u32 = 5;
/// Initial backoff between lookup attempts; doubles per retry.
pub const LOOKUP_BACKOFF: Duration = Duration::from_millis(50);

/// Looks up `service` at `registry`, retrying on an empty result up to
/// [`LOOKUP_ATTEMPTS`] total attempts with doubling backoff. Yields the
/// candidates from the first non-empty reply, or the final (possibly empty)
/// reply once the bound is spent.
pub fn lookup_service(
    scope: Scope<LookupReply>,
    registry: Addr<RegistryMsg>,
    service: ServiceName,
) -> Op<LookupReply, Vec<RawAddr>> {
    lookup_attempt(scope, registry, service, LOOKUP_ATTEMPTS - 1, LOOKUP_BACKOFF)
}

fn lookup_attempt(
    scope: Scope<LookupReply>,
    registry: Addr<RegistryMsg>,
    service: ServiceName,
    retries_left: u32,
    backoff: Duration,
) -> Op<LookupReply, Vec<RawAddr>> {
    scope.self_addr().and_then(move |me| {
        let query = RegistryMsg::Lookup {
            service: service.clone(),
            reply_to: me,
        };
        scope
            .send(&registry, query)
            .and_then(move |()| scope.receive())
            .and_then(move |reply| match reply {
                LookupReply::Candidates(addrs) if !addrs.is_empty() || retries_left == 0 => {
                    scope.pure(addrs)
                }
                LookupReply::Candidates(_) => {
                    tracing::debug!(service = %service, retries_left, "empty lookup, backing off");
                    delay(scope, backoff, LookupReply::RetryTick).and_then(move |_| {
                        lookup_attempt(
                            scope,
                            registry,
                            service,
                            retries_left - 1,
                            backoff.saturating_mul(2),
                        )
                    })
                }
                // A stale tick from an earlier backoff; ask again without
                // spending the budget.
                LookupReply::RetryTick => {
                    lookup_attempt(scope, registry, service, retries_left, backoff)
                }
            })
    })
}

/// Registers this process's own address under `service` at `registry` and
/// awaits the acknowledgement, yielding the acked name.
pub fn register_service(
    scope: Scope<RegisterAck>,
    registry: Addr<RegistryMsg>,
    service: ServiceName,
) -> Op<RegisterAck, ServiceName> {
    scope.self_addr().and_then(move |me| {
        scope
            .send(
                &registry,
                RegistryMsg::Register {
                    service,
                    addr: me.raw(),
                    reply_to: me,
                },
            )
            .and_then(move |()| scope.receive())
            .map(|ack| ack.service)
    })
}
