//! Integration tests for the time budget tracker across invocations

use super::test_utils::manual_tracker;
use docpace::budget::StatusThresholds;
use docpace::{ManualClock, TimeBudgetTracker, TimeStatus};
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

#[test]
fn test_status_walks_down_as_time_passes() {
    let (mut tracker, clock) = manual_tracker(900, 0);
    let guard = tracker.begin_invocation();

    let mut seen = vec![guard.status()];
    for _ in 0..9 {
        clock.advance_secs(100);
        seen.push(guard.status());
    }

    assert_eq!(seen.first(), Some(&TimeStatus::Good));
    assert_eq!(seen.last(), Some(&TimeStatus::Critical));
    for pair in seen.windows(2) {
        assert!(pair[1] <= pair[0], "status improved: {:?}", pair);
    }
}

#[test]
fn test_host_charge_counts_before_start() {
    let (mut tracker, clock) = manual_tracker(900, 0);
    tracker.charge(Duration::from_secs(450));
    let guard = tracker.begin_invocation();

    assert_eq!(guard.remaining_budget(), Duration::from_secs(450));
    assert_eq!(guard.status(), TimeStatus::Caution);

    clock.advance_secs(50);
    let report = guard.budget_status();
    assert_eq!(report.remaining_seconds, 400);
    assert_eq!(report.status, TimeStatus::Caution);
    assert!(!report.recommendation_text.is_empty());
}

#[test]
fn test_guard_resets_when_invocation_unwinds() {
    let (mut tracker, clock) = manual_tracker(900, 0);

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _guard = tracker.begin_invocation();
        clock.advance_secs(300);
        panic!("host aborted the invocation");
    }));

    assert!(result.is_err());
    assert_eq!(tracker.elapsed(), Duration::ZERO);
    assert!(!tracker.context().is_running());
    assert_eq!(tracker.context().invocations(), 1);
}

#[test]
fn test_reset_is_idempotent() {
    let (mut tracker, clock) = manual_tracker(900, 120);
    tracker.start();
    clock.advance_secs(30);

    tracker.reset();
    let after_first = (tracker.elapsed(), tracker.status());
    tracker.reset();
    let after_second = (tracker.elapsed(), tracker.status());

    assert_eq!(after_first, (Duration::ZERO, TimeStatus::Good));
    assert_eq!(after_first, after_second);
}

#[test]
fn test_failing_clock_degrades_to_critical_until_reset() {
    let clock = ManualClock::new();
    let mut tracker = TimeBudgetTracker::with_clock(
        Box::new(clock.clone()),
        Duration::from_secs(900),
        StatusThresholds::default(),
    );
    {
        let guard = tracker.begin_invocation();
        clock.advance_secs(10);
        let before = guard.elapsed();
        clock.set_failing(true);

        assert_eq!(guard.status(), TimeStatus::Critical);
        assert_eq!(guard.remaining_budget(), Duration::ZERO);
        assert!(guard.elapsed() >= before);
        assert!(guard.context().clock_degraded());
    }

    clock.set_failing(false);
    let guard = tracker.begin_invocation();
    assert!(!guard.context().clock_degraded());
    assert_eq!(guard.status(), TimeStatus::Good);
}

#[test]
fn test_custom_thresholds_classify_boundaries() {
    let thresholds = StatusThresholds {
        good_above_secs: 200,
        caution_from_secs: 150,
        warning_from_secs: 100,
        urgent_from_secs: 50,
    };
    assert!(thresholds.validate().is_ok());
    assert_eq!(thresholds.classify(Duration::from_secs(201)), TimeStatus::Good);
    assert_eq!(thresholds.classify(Duration::from_secs(200)), TimeStatus::Caution);
    assert_eq!(thresholds.classify(Duration::from_secs(100)), TimeStatus::Warning);
    assert_eq!(thresholds.classify(Duration::from_secs(50)), TimeStatus::Urgent);
    assert_eq!(thresholds.classify(Duration::from_secs(49)), TimeStatus::Critical);
}
