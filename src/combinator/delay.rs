//! Timed wait built from `self_addr` + `schedule` + `receive`.

use std::time::Duration;

use crate::effect::EffectSet;
use crate::op::{Op, Scope};

/// Yields `value` after `duration` has elapsed.
///
/// The process obtains its own address, schedules `value` to itself, and
/// reads the next message — which, by construction, is that scheduled value.
/// The operation therefore assumes no *other* message arrives at the process
/// in the window; use it where the process's mailbox is quiet (as `retry`'s
/// timer candidate does, in a fiber of its own).
pub fn delay<V>(scope: Scope<V>, duration: Duration, value: V) -> Op<V, V>
where
    V: Send + 'static,
{
    scope
        .self_addr()
        .and_then(move |me| scope.schedule(&me, value, duration))
        .and_then(move |()| scope.receive())
        .with_effects(EffectSet::ENV | EffectSet::SCHEDULE | EffectSet::READ)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_effect_profile() {
        let op = delay(Scope::<u8>::describe(), Duration::from_millis(5), 1);
        assert_eq!(
            op.effects(),
            EffectSet::ENV | EffectSet::SCHEDULE | EffectSet::READ
        );
    }
}
