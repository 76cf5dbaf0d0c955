//! End-to-end coverage for `delay` and `fork_and_cancel`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use choreo::test_utils::test_runtime;
use choreo::types::{DeployConfig, Time};
use choreo::{delay, fork_and_cancel, Process};

#[test]
fn delay_yields_exactly_the_value_no_earlier_than_the_duration() {
    let mut rt = test_runtime();
    choreo::test_phase!("delay_yields_exactly_the_value_no_earlier_than_the_duration");

    let p: Process<&'static str, &'static str> =
        Process::new("delayer", |s| delay(s, Duration::from_millis(30), "ready"));
    let handle = rt.spawn_unit(&p, DeployConfig::new());
    rt.run_until_quiescent().expect("quiescent");

    assert_eq!(
        handle.take_outcome().expect("terminal").into_completed(),
        Some("ready")
    );
    // Virtual time only advances to satisfy the scheduled self-message, so
    // completion at exactly the deadline shows the value was not observable
    // earlier.
    assert_eq!(rt.now(), Time::from_millis(30));
    choreo::test_complete!("delay_yields_exactly_the_value_no_earlier_than_the_duration");
}

#[test]
fn fork_and_cancel_cancels_a_primary_that_overruns() {
    let mut rt = test_runtime();
    choreo::test_phase!("fork_and_cancel_cancels_a_primary_that_overruns");

    let torn_down = Arc::new(AtomicBool::new(false));
    let acted = Arc::new(AtomicBool::new(false));

    let primary: Process<u32, u32> = {
        let torn_down = Arc::clone(&torn_down);
        let acted = Arc::clone(&acted);
        Process::new("overrunner", move |s| {
            let torn_down = Arc::clone(&torn_down);
            let acted = Arc::clone(&acted);
            s.on_stop(move || torn_down.store(true, Ordering::SeqCst))
                .and_then(move |()| s.receive())
                .map(move |n| {
                    acted.store(true, Ordering::SeqCst);
                    n
                })
        })
    };

    let p: Process<(), ()> = {
        let primary = primary.clone();
        Process::new("root", move |s| {
            fork_and_cancel(s, Duration::from_millis(15), primary.clone()).map(|_handle| ())
        })
    };

    let handle = rt.spawn_unit(&p, DeployConfig::new());
    rt.run_until_quiescent().expect("quiescent");

    assert!(handle.take_outcome().expect("terminal").is_completed());
    assert!(torn_down.load(Ordering::SeqCst), "primary torn down");
    assert!(!acted.load(Ordering::SeqCst), "primary never acted");
    assert_eq!(rt.now(), Time::from_millis(15));
    choreo::test_complete!("fork_and_cancel_cancels_a_primary_that_overruns");
}

#[test]
fn fork_and_cancel_leaves_a_prompt_primary_alone() {
    let mut rt = test_runtime();
    choreo::test_phase!("fork_and_cancel_leaves_a_prompt_primary_alone");

    let quick: Process<u32, u32> = Process::new("quick", |s| s.pure(1));

    // Wait out the guard window, then report whether anyone requested
    // cancellation of the primary.
    let p: Process<(), bool> = {
        let quick = quick.clone();
        Process::new("root", move |s| {
            fork_and_cancel(s, Duration::from_millis(15), quick.clone())
                .and_then(move |sub| delay(s, Duration::from_millis(40), ()).map(move |()| sub))
                .map(|sub| sub.is_cancel_requested())
        })
    };

    let handle = rt.spawn_unit(&p, DeployConfig::new());
    rt.run_until_quiescent().expect("quiescent");

    assert_eq!(
        handle.take_outcome().expect("terminal").into_completed(),
        Some(false)
    );
    choreo::test_complete!("fork_and_cancel_leaves_a_prompt_primary_alone");
}
