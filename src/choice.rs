//! Incremental builder for mutually exclusive guarded branches.
//!
//! A choice chain selects the operation attached to the first guard that was
//! true *at the moment the branch was declared*; the terminal
//! [`or_else`](OpChoice::or_else) operation applies when no guard matched.
//! Guards are plain booleans the caller has already evaluated, in
//! declaration order — they are values, not operations.
//!
//! Selection is first-match-wins with short-circuit: once a branch is
//! selected, later guards cannot change the selection, but every declared
//! branch still contributes its effect set to the unified result ("one of
//! these effect profiles will occur"). Unselected branches are dropped
//! without ever being interpreted, so branch *construction* must be free of
//! side effects; guard expressions are required to be pure.
//!
//! ```
//! # use choreo::process::Process;
//! let classify = |n: i32| -> Process<(), &'static str> {
//!     Process::new("classify", move |s| {
//!         s.choice(n < 0, s.pure("negative"))
//!             .or_if(n == 0, s.pure("zero"))
//!             .or_else(s.pure("positive"))
//!     })
//! };
//! # let _ = classify(3);
//! ```

use crate::effect::EffectSet;
use crate::op::{Op, Scope};

/// Builder state for a choice chain. See the module docs.
///
/// Holds at most one selected candidate (tagged by its position among all
/// declared branches), the running branch count, and the union of every
/// declared branch's effects.
#[must_use = "a choice chain does nothing until finalized with or_else"]
pub struct OpChoice<S, A> {
    selected: Option<(usize, Op<S, A>)>,
    branches: usize,
    effects: EffectSet,
}

impl<S> Scope<S>
where
    S: Send + 'static,
{
    /// Starts a choice chain with its first guarded branch.
    pub fn choice<A: Send + 'static>(self, guard: bool, op: Op<S, A>) -> OpChoice<S, A> {
        OpChoice {
            effects: op.effects(),
            selected: guard.then_some((0, op)),
            branches: 1,
        }
    }
}

impl<S, A> OpChoice<S, A>
where
    S: Send + 'static,
    A: Send + 'static,
{
    /// Appends another guarded branch.
    ///
    /// Kept only if no earlier branch matched and `guard` is true; either
    /// way the branch's effect set joins the union.
    pub fn or_if(mut self, guard: bool, op: Op<S, A>) -> Self {
        self.effects |= op.effects();
        let position = self.branches;
        self.branches += 1;
        if self.selected.is_none() && guard {
            self.selected = Some((position, op));
        }
        self
    }

    /// Finalizes the chain: the default branch applies when no guard
    /// matched. Returns the selected operation, carrying the branch-tagged
    /// union of every candidate's effects.
    pub fn or_else(mut self, op: Op<S, A>) -> Op<S, A> {
        self.effects |= op.effects();
        let default_position = self.branches;
        let (position, chosen) = self.selected.unwrap_or((default_position, op));
        tracing::debug!(
            branch = position,
            branches = self.branches + 1,
            "choice selected"
        );
        chosen.with_effects(self.effects | EffectSet::CHOICE)
    }

    /// The position of the branch selected so far, if any.
    #[must_use]
    pub fn selected_position(&self) -> Option<usize> {
        self.selected.as_ref().map(|(position, _)| *position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type S = u8;

    fn scope() -> Scope<S> {
        Scope::describe()
    }

    #[test]
    fn first_true_guard_wins() {
        let chain = scope()
            .choice(false, scope().pure(1))
            .or_if(true, scope().pure(2))
            .or_if(true, scope().pure(3));
        assert_eq!(chain.selected_position(), Some(1));
    }

    #[test]
    fn later_guards_cannot_steal_the_selection() {
        let chain = scope().choice(true, scope().pure(1));
        assert_eq!(chain.selected_position(), Some(0));

        // Flipping a later guard's truth value never affects selection.
        let chain = chain.or_if(true, scope().pure(2));
        assert_eq!(chain.selected_position(), Some(0));
    }

    #[test]
    fn or_else_applies_when_nothing_matched() {
        let chain = scope()
            .choice(false, scope().pure(1))
            .or_if(false, scope().pure(2));
        assert_eq!(chain.selected_position(), None);
        let op = chain.or_else(scope().pure(9));
        assert_eq!(op.kind_name(), "pure");
    }

    #[test]
    fn effects_union_covers_unselected_branches() {
        // The receive branch is not selected, but its READ tag survives.
        let op = scope()
            .choice(true, scope().pure(0))
            .or_else(scope().receive().map(|_| 0));
        assert!(op.effects().contains(EffectSet::READ));
        assert!(op.effects().contains(EffectSet::CHOICE));
    }

    #[test]
    fn selected_branch_is_the_returned_operation() {
        let op = scope()
            .choice(false, scope().pure(1))
            .or_if(true, scope().halt())
            .or_else(scope().pure(3));
        assert_eq!(op.kind_name(), "halt");
    }
}
