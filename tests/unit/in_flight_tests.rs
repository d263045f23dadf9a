//! Unit tests for the per-user single-flight guard.

use agent_turnstile::orchestrator::InFlight;

#[test]
fn second_acquire_for_same_user_fails() {
    let in_flight = InFlight::new();
    let guard = in_flight.try_acquire("U1").expect("first acquire");
    assert!(in_flight.try_acquire("U1").is_none());
    assert!(in_flight.is_busy("U1"));
    drop(guard);
}

#[test]
fn other_users_are_independent() {
    let in_flight = InFlight::new();
    let _a = in_flight.try_acquire("U1").expect("U1");
    let _b = in_flight.try_acquire("U2").expect("U2");
    assert!(in_flight.is_busy("U1"));
    assert!(in_flight.is_busy("U2"));
}

#[test]
fn dropping_guard_releases_slot() {
    let in_flight = InFlight::new();
    {
        let _guard = in_flight.try_acquire("U1").expect("acquire");
    }
    assert!(!in_flight.is_busy("U1"));
    assert!(in_flight.try_acquire("U1").is_some());
}

#[test]
fn clones_share_state() {
    let in_flight = InFlight::new();
    let clone = in_flight.clone();
    let _guard = in_flight.try_acquire("U1").expect("acquire");
    assert!(clone.is_busy("U1"));
    assert!(clone.try_acquire("U1").is_none());
}
