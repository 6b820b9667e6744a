use super::*;
use crate::foundation::clock::ManualClock;
use std::cell::RefCell;

fn tracker() -> (Arc<ManualClock>, AnimationTracker) {
    let clock = Arc::new(ManualClock::new(1_000.0));
    let tracker = AnimationTracker::new(clock.clone());
    (clock, tracker)
}

const A: Coordinate = Coordinate::new(0.0, 0.0);
const B: Coordinate = Coordinate::new(0.0, 0.01);

#[test]
fn fps_is_instantaneous_from_consecutive_updates() {
    let (clock, tracker) = tracker();
    tracker.track("m1", A, B, 300.0);

    clock.advance(20.0);
    assert!(tracker.update_progress("m1", 0.1, A));
    assert_eq!(tracker.get("m1").unwrap().fps, 50.0);

    clock.advance(10.0);
    tracker.update_progress("m1", 0.2, A);
    let state = tracker.get("m1").unwrap();
    assert_eq!(state.fps, 100.0);
    assert_eq!(state.frame_count, 2);
    assert_eq!(state.last_frame_time, 1_030.0);
}

#[test]
fn zero_frame_delta_keeps_previous_fps() {
    let (clock, tracker) = tracker();
    tracker.track("m1", A, B, 300.0);
    clock.advance(25.0);
    tracker.update_progress("m1", 0.1, A);
    tracker.update_progress("m1", 0.1, A);
    assert_eq!(tracker.get("m1").unwrap().fps, 40.0);
}

#[test]
fn unknown_ids_are_ignored() {
    let (_clock, tracker) = tracker();
    assert!(!tracker.update_progress("ghost", 0.5, A));
    assert!(!tracker.complete("ghost"));
    assert!(!tracker.cancel("ghost"));
    assert!(tracker.is_empty());
}

#[test]
fn tracking_the_same_id_replaces_the_state() {
    let (_clock, tracker) = tracker();
    tracker.track("m1", A, B, 300.0);
    tracker.track("m1", B, A, 100.0);
    assert_eq!(tracker.len(), 1);
    let state = tracker.get("m1").unwrap();
    assert_eq!(state.start_coordinate, B);
    assert_eq!(state.duration, 100.0);
}

#[test]
fn subscribe_replays_then_receives_every_mutation() {
    let (_clock, tracker) = tracker();
    tracker.track("m1", A, B, 300.0);

    let seen: Rc<RefCell<Vec<usize>>> = Rc::default();
    let s = seen.clone();
    let sub = tracker.subscribe(move |snapshot| s.borrow_mut().push(snapshot.len()));
    assert_eq!(*seen.borrow(), vec![1]);

    tracker.track("m2", A, B, 300.0);
    tracker.update_progress("m1", 0.5, B);
    tracker.complete("m1");
    tracker.cancel("m2");
    assert_eq!(*seen.borrow(), vec![1, 2, 2, 1, 0]);

    assert!(sub.unsubscribe());
    tracker.track("m3", A, B, 300.0);
    assert_eq!(seen.borrow().len(), 5);
    assert_eq!(tracker.subscriber_count(), 0);
}

#[test]
fn subscribers_may_query_the_tracker() {
    let (_clock, tracker) = tracker();
    let tracker = Rc::new(tracker);
    let weak = Rc::downgrade(&tracker);
    let counts: Rc<RefCell<Vec<usize>>> = Rc::default();
    let c = counts.clone();
    let _sub = tracker.subscribe(move |_| {
        if let Some(t) = weak.upgrade() {
            c.borrow_mut().push(t.active_animations().len());
        }
    });
    tracker.track("m1", A, B, 300.0);
    assert_eq!(*counts.borrow(), vec![0, 1]);
}

#[test]
fn metrics_report_distance_speed_and_remaining_time() {
    let (clock, tracker) = tracker();
    tracker.track("m1", A, B, 300.0);
    clock.advance(100.0);
    let half = Coordinate::new(0.0, 0.005);
    tracker.update_progress("m1", 1.0 / 3.0, half);

    let m = tracker.metrics("m1").unwrap();
    assert_eq!(m.elapsed, 100.0);
    assert_eq!(m.remaining_time, 200.0);
    assert_eq!(m.frame_count, 1);
    let full = geo::distance_m(A, B);
    assert!((m.distance - full).abs() < 1e-9);
    let expected_kmh = geo::distance_m(A, half) / 0.1 * 3.6;
    assert!((m.average_speed - expected_kmh).abs() < 1e-6);
    assert!(tracker.metrics("ghost").is_none());
}

#[test]
fn progress_is_clamped_to_unit_range() {
    let (_clock, tracker) = tracker();
    tracker.track("m1", A, B, 300.0);
    tracker.update_progress("m1", 1.7, B);
    assert_eq!(tracker.get("m1").unwrap().progress, 1.0);
}
