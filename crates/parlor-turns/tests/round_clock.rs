//! Integration tests for the round deadline clock.
//!
//! Runs with paused, auto-advancing time so deadlines resolve instantly.

use std::time::Duration;

use parlor_turns::RoundClock;

#[test]
fn test_new_clock_is_disarmed() {
    let clock = RoundClock::new();
    assert_eq!(clock.armed_round(), None);
    assert_eq!(clock.remaining(), None);
}

#[tokio::test(start_paused = true)]
async fn test_expired_returns_armed_round() {
    let mut clock = RoundClock::new();
    clock.arm(3, Duration::from_secs(10));

    let start = tokio::time::Instant::now();
    let round = clock.expired().await;

    assert_eq!(round, 3);
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert_eq!(clock.armed_round(), None);
}

#[tokio::test(start_paused = true)]
async fn test_disarmed_clock_pends_forever() {
    let mut clock = RoundClock::new();

    let result =
        tokio::time::timeout(Duration::from_secs(60), clock.expired()).await;

    assert!(result.is_err(), "disarmed clock should never fire");
}

#[tokio::test(start_paused = true)]
async fn test_disarm_cancels_deadline() {
    let mut clock = RoundClock::new();
    clock.arm(1, Duration::from_secs(1));
    clock.disarm();

    let result =
        tokio::time::timeout(Duration::from_secs(5), clock.expired()).await;

    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_arm_replaces_previous_deadline() {
    let mut clock = RoundClock::new();
    clock.arm(1, Duration::from_secs(30));
    clock.arm(2, Duration::from_secs(5));

    let start = tokio::time::Instant::now();
    let round = clock.expired().await;

    assert_eq!(round, 2);
    assert!(start.elapsed() < Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_remaining_counts_down() {
    let mut clock = RoundClock::new();
    clock.arm(1, Duration::from_secs(10));

    tokio::time::advance(Duration::from_secs(4)).await;

    assert_eq!(clock.remaining(), Some(Duration::from_secs(6)));
}

#[tokio::test(start_paused = true)]
async fn test_expired_dropped_in_select_keeps_deadline() {
    let mut clock = RoundClock::new();
    clock.arm(7, Duration::from_secs(10));

    tokio::select! {
        _ = clock.expired() => panic!("deadline fired early"),
        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
    }

    assert_eq!(clock.armed_round(), Some(7));
    assert_eq!(clock.expired().await, 7);
}
