//! Process recipes.
//!
//! A [`Process`] is a named, sized, time-bounded unit of execution: a
//! diagnostic name, a mailbox capacity, an optional timeout, and a factory
//! for the root operation. A `Process` is *not* running — it is a reusable
//! recipe, handed to `call`, `fork`, or `spawn` and interpreted until it
//! yields a value, halts, or times out. `retry` relies on reusability: it
//! instantiates the same recipe once per attempt.

use core::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::op::{Op, Scope};
use crate::runtime::fiber::{AnyFiber, OpFiber};
use crate::types::BoxAny;

/// A reusable recipe for a process with message type `M` and result `A`.
pub struct Process<M, A> {
    name: String,
    mailbox_capacity: Option<usize>,
    timeout: Option<Duration>,
    root: Arc<dyn Fn(Scope<M>) -> Op<M, A> + Send + Sync>,
}

impl<M, A> Process<M, A>
where
    M: Send + 'static,
    A: Send + 'static,
{
    /// Creates a recipe from a description closure.
    ///
    /// The closure receives the [`Scope`] token for the process being
    /// described and returns its root operation. It runs once per
    /// instantiation (`call`/`fork`/`spawn`/each `retry` attempt), and must
    /// be effect-free: operations are data, nothing executes here.
    pub fn new(
        name: impl Into<String>,
        describe: impl Fn(Scope<M>) -> Op<M, A> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            mailbox_capacity: None,
            timeout: None,
            root: Arc::new(describe),
        }
    }

    /// Sets the mailbox capacity (otherwise the runtime default applies).
    #[must_use]
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = Some(capacity);
        self
    }

    /// Declares a timeout for the process.
    ///
    /// A process that outlives its timeout *fails its hosting unit* — the
    /// timeout is not a recoverable value unless the caller races the
    /// process explicitly, as `first_of`/`retry` do.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the diagnostic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared mailbox capacity, if any.
    #[must_use]
    pub const fn mailbox_capacity(&self) -> Option<usize> {
        self.mailbox_capacity
    }

    /// Returns the declared timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Post-composes a pure transformation on the result.
    pub fn map<B>(self, f: impl Fn(A) -> B + Send + Sync + 'static) -> Process<M, B>
    where
        B: Send + 'static,
    {
        let f = Arc::new(f);
        let root = self.root;
        Process {
            name: self.name,
            mailbox_capacity: self.mailbox_capacity,
            timeout: self.timeout,
            root: Arc::new(move |scope| {
                let f = Arc::clone(&f);
                root(scope).map(move |a| f(a))
            }),
        }
    }

    /// Builds a fresh root operation from the recipe (internal use).
    pub(crate) fn instantiate(&self) -> Op<M, A> {
        (self.root)(Scope::describe())
    }
}

impl<M, A> Clone for Process<M, A> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            mailbox_capacity: self.mailbox_capacity,
            timeout: self.timeout,
            root: Arc::clone(&self.root),
        }
    }
}

impl<M, A> fmt::Debug for Process<M, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("name", &self.name)
            .field("mailbox_capacity", &self.mailbox_capacity)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A type-erased, single-use instantiation of a recipe (internal use).
///
/// This is what `fork`/`spawn` nodes carry: enough to create the fiber
/// without the interpreter knowing the process's message or result types.
pub(crate) struct ProcessSpec {
    pub(crate) name: String,
    pub(crate) mailbox_capacity: Option<usize>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) make: Box<dyn FnOnce() -> Box<dyn AnyFiber> + Send>,
}

impl ProcessSpec {
    pub(crate) fn of<M, A>(process: &Process<M, A>) -> Self
    where
        M: Send + 'static,
        A: Send + 'static,
    {
        let recipe = process.clone();
        Self {
            name: process.name().to_string(),
            mailbox_capacity: process.mailbox_capacity(),
            timeout: process.timeout(),
            make: Box::new(move || {
                Box::new(OpFiber::new(
                    recipe.instantiate().map(|a| Box::new(a) as BoxAny),
                ))
            }),
        }
    }
}

impl fmt::Debug for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSpec")
            .field("name", &self.name)
            .field("mailbox_capacity", &self.mailbox_capacity)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let p: Process<u8, u8> = Process::new("echo", |s| s.receive());
        assert_eq!(p.name(), "echo");
        assert!(p.mailbox_capacity().is_none());
        assert!(p.timeout().is_none());
    }

    #[test]
    fn builder_overrides() {
        let p: Process<u8, u8> = Process::new("echo", |s| s.receive())
            .with_mailbox_capacity(8)
            .with_timeout(Duration::from_millis(250));
        assert_eq!(p.mailbox_capacity(), Some(8));
        assert_eq!(p.timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn recipe_is_reusable() {
        let p: Process<u8, u8> = Process::new("const", |s| s.pure(7));
        let first = p.instantiate();
        let second = p.instantiate();
        assert_eq!(first.kind_name(), "pure");
        assert_eq!(second.kind_name(), "pure");
    }

    #[test]
    fn map_preserves_recipe_metadata() {
        let p: Process<u8, u8> = Process::new("n", |s| s.pure(20)).with_mailbox_capacity(4);
        let doubled: Process<u8, u16> = p.map(|n| u16::from(n) * 2 + 2);
        assert_eq!(doubled.name(), "n");
        assert_eq!(doubled.mailbox_capacity(), Some(4));
    }

    #[test]
    fn spec_erases_the_recipe() {
        let p: Process<u8, u8> = Process::new("erased", |s| s.pure(1)).with_mailbox_capacity(2);
        let spec = ProcessSpec::of(&p);
        assert_eq!(spec.name, "erased");
        assert_eq!(spec.mailbox_capacity, Some(2));
        let _fiber = (spec.make)();
    }
}
