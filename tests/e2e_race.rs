//! End-to-end race and retry scenarios.
//!
//! Covers the headline behaviors of the racing combinators:
//! - the first delivered reply wins and every sibling is canceled
//! - retry returns the answer of the first attempt that beats the window
//! - retry exhaustion is a fatal, unit-terminating failure

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use choreo::combinator::{first_of, retry, Candidate, RaceReply, RetryMsg};
use choreo::test_utils::test_runtime;
use choreo::types::{DeployConfig, FailureReason, Outcome};
use choreo::{delay, Process, StateKey};

/// A worker that produces `value` after `wait`, recording whether it got to
/// produce at all and whether it was torn down before producing.
fn worker(
    name: &'static str,
    wait: Duration,
    value: i32,
    produced: Arc<AtomicBool>,
    cancelled_first: Arc<AtomicBool>,
) -> Process<i32, i32> {
    Process::new(name, move |s| {
        let produced = Arc::clone(&produced);
        let cancelled_first = Arc::clone(&cancelled_first);
        let produced_for_stop = Arc::clone(&produced);
        s.on_stop(move || {
            if !produced_for_stop.load(Ordering::SeqCst) {
                cancelled_first.store(true, Ordering::SeqCst);
            }
        })
        .and_then(move |()| delay(s, wait, value))
        .map(move |v| {
            produced.store(true, Ordering::SeqCst);
            v
        })
    })
}

#[test]
fn fastest_of_three_workers_wins_and_losers_see_cancel() {
    let mut rt = test_runtime();
    choreo::test_phase!("fastest_of_three_workers_wins_and_losers_see_cancel");

    let produced: Vec<Arc<AtomicBool>> = (0..3).map(|_| Arc::new(AtomicBool::new(false))).collect();
    let cancelled: Vec<Arc<AtomicBool>> =
        (0..3).map(|_| Arc::new(AtomicBool::new(false))).collect();

    let w1 = worker(
        "worker-1",
        Duration::from_millis(100),
        1,
        Arc::clone(&produced[0]),
        Arc::clone(&cancelled[0]),
    );
    let w2 = worker(
        "worker-2",
        Duration::from_millis(10),
        42,
        Arc::clone(&produced[1]),
        Arc::clone(&cancelled[1]),
    );
    let w3 = worker(
        "worker-3",
        Duration::from_millis(100),
        3,
        Arc::clone(&produced[2]),
        Arc::clone(&cancelled[2]),
    );

    let racer: Process<RaceReply<i32>, i32> = Process::new("racer", move |s| {
        first_of(
            s,
            vec![
                Candidate::new(w1.clone()),
                Candidate::new(w2.clone()),
                Candidate::new(w3.clone()),
            ],
        )
    });

    let handle = rt.spawn_unit(&racer, DeployConfig::new());
    rt.run_until_quiescent().expect("quiescent");

    assert_eq!(
        handle.take_outcome().expect("terminal").into_completed(),
        Some(42)
    );
    assert!(produced[1].load(Ordering::SeqCst), "worker 2 produced");
    for i in [0, 2] {
        assert!(
            !produced[i].load(Ordering::SeqCst),
            "worker {} must not produce a value",
            i + 1
        );
        assert!(
            cancelled[i].load(Ordering::SeqCst),
            "worker {} must observe cancel before producing",
            i + 1
        );
    }
    choreo::test_complete!("fastest_of_three_workers_wins_and_losers_see_cancel");
}

#[test]
fn retry_returns_answer_of_the_attempt_that_beats_the_window() {
    let mut rt = test_runtime();
    choreo::test_phase!("retry_returns_answer_of_the_attempt_that_beats_the_window");

    let observed_attempts = Arc::new(AtomicU32::new(0));

    // Attempts share the racing unit's state store, so the recipe can count
    // its own instantiations: the first two attempts stall forever, the
    // third answers immediately.
    let attempts_key: StateKey<u32, ()> = StateKey::new("attempts", || 0, |n, ()| *n += 1);
    let flaky: Process<u32, u32> = {
        let observed = Arc::clone(&observed_attempts);
        Process::new("flaky", move |s| {
            let observed = Arc::clone(&observed);
            s.update_state_and_get(&attempts_key, true, |_| vec![()])
                .and_then(move |attempt| {
                    observed.fetch_max(attempt, Ordering::SeqCst);
                    s.choice(attempt >= 3, s.pure(7)).or_else(s.receive())
                })
        })
    };

    let racer: Process<RetryMsg<u32>, u32> = {
        let flaky = flaky.clone();
        Process::new("retrier", move |s| {
            retry(s, Duration::from_millis(20), 5, flaky.clone())
        })
    };

    let handle = rt.spawn_unit(&racer, DeployConfig::new());
    rt.run_until_quiescent().expect("quiescent");

    assert_eq!(
        handle.take_outcome().expect("terminal").into_completed(),
        Some(7)
    );
    assert_eq!(
        observed_attempts.load(Ordering::SeqCst),
        3,
        "exactly three timer races"
    );
    choreo::test_complete!("retry_returns_answer_of_the_attempt_that_beats_the_window");
}

#[test]
fn retry_exhaustion_fails_the_hosting_unit() {
    let mut rt = test_runtime();
    choreo::test_phase!("retry_exhaustion_fails_the_hosting_unit");

    let silent: Process<u32, u32> = Process::new("silent", |s| s.receive());
    let racer: Process<RetryMsg<u32>, u32> = {
        let silent = silent.clone();
        Process::new("retrier", move |s| {
            retry(s, Duration::from_millis(10), 2, silent.clone())
        })
    };

    let handle = rt.spawn_unit(&racer, DeployConfig::new());
    rt.run_until_quiescent().expect("quiescent");

    match handle.take_outcome().expect("terminal") {
        Outcome::Failed(FailureReason::RetriesExceeded { attempts }) => {
            assert_eq!(attempts, 3, "initial attempt plus two retries");
        }
        other => panic!("expected retries-exceeded failure, got {other}"),
    }
    choreo::test_complete!("retry_exhaustion_fails_the_hosting_unit");
}
