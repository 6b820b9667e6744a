use super::*;

#[test]
fn manual_clock_moves_only_when_advanced() {
    let clock = ManualClock::new(10.0);
    assert_eq!(clock.now_ms(), 10.0);
    assert_eq!(clock.advance(16.5), 26.5);
    assert_eq!(clock.now_ms(), 26.5);
    clock.set(0.0);
    assert_eq!(clock.now_ms(), 0.0);
}

#[test]
fn default_manual_clock_starts_at_zero() {
    assert_eq!(ManualClock::default().now_ms(), 0.0);
}

#[test]
fn system_clock_is_monotonic() {
    let clock = SystemClock::new();
    let a = clock.now_ms();
    let b = clock.now_ms();
    assert!(b >= a);
    assert!(a >= 0.0);
}
