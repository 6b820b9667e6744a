use super::*;
use crate::animation::tracker::AnimationState;
use crate::foundation::clock::ManualClock;
use crate::schedule::frame_loop::FrameLoop;
use crate::surface::memory::MemoryMarker;
use std::cell::Cell;

struct Rig {
    clock: Arc<ManualClock>,
    frames: Rc<FrameLoop>,
    tracker: Rc<AnimationTracker>,
    perf: Arc<PerformanceTracker>,
    motion: MotionController,
}

impl Rig {
    fn new(options: AnimationOptions) -> Self {
        let clock = Arc::new(ManualClock::new(0.0));
        let frames = Rc::new(FrameLoop::new(clock.clone()));
        let tracker = Rc::new(AnimationTracker::new(clock.clone()));
        let perf = Arc::new(PerformanceTracker::new(clock.clone()));
        let motion = MotionController::new(frames.clone(), tracker.clone(), perf.clone(), options);
        Self {
            clock,
            frames,
            tracker,
            perf,
            motion,
        }
    }

    fn step(&self, ms: f64) {
        self.clock.advance(ms);
        self.frames.tick();
    }
}

fn linear(duration_ms: f64) -> AnimationOptions {
    AnimationOptions {
        duration_ms,
        ease: Ease::Linear,
        ..AnimationOptions::default()
    }
}

const ORIGIN: Coordinate = Coordinate::new(0.0, 0.0);
const TARGET: Coordinate = Coordinate::new(10.0, 10.0);

#[test]
fn linear_animation_reaches_target_exactly() {
    let rig = Rig::new(linear(100.0));
    let marker = Rc::new(MemoryMarker::new(ORIGIN));
    let mut handle = rig.motion.animate("m1", marker.clone(), TARGET);
    assert!(rig.motion.is_animating("m1"));

    rig.step(50.0);
    let mid = marker.coordinate();
    assert!((mid.latitude - 5.0).abs() < 1e-9);
    assert!((mid.longitude - 5.0).abs() < 1e-9);
    assert_eq!(handle.try_outcome(), None);

    rig.step(50.0);
    assert_eq!(marker.coordinate(), TARGET);
    assert_eq!(handle.try_outcome(), Some(AnimationOutcome::Completed));
    assert_eq!(rig.motion.active_count(), 0);
    assert!(rig.tracker.is_empty());
    assert_eq!(rig.frames.pending_frames(), 0);

    let metric = rig.perf.metric("marker-animation:m1").unwrap();
    assert_eq!(metric.duration, Some(100.0));
    assert_eq!(metric.metadata["outcome"], "completed");
    assert_eq!(metric.metadata["duration"], 100.0);
}

#[test]
fn new_target_replaces_and_starts_from_rendered_position() {
    let rig = Rig::new(linear(100.0));
    let marker = Rc::new(MemoryMarker::new(ORIGIN));
    let mut first = rig.motion.animate("m1", marker.clone(), TARGET);
    rig.step(50.0);

    let mut second = rig.motion.animate("m1", marker.clone(), ORIGIN);
    assert_eq!(first.try_outcome(), Some(AnimationOutcome::Cancelled));
    assert_eq!(rig.motion.active_count(), 1);
    assert_eq!(rig.tracker.len(), 1);
    let state = rig.tracker.get("m1").unwrap();
    assert_eq!(state.start_coordinate, marker.coordinate());
    assert_eq!(state.target_coordinate, ORIGIN);

    rig.step(100.0);
    assert_eq!(second.try_outcome(), Some(AnimationOutcome::Completed));
    assert_eq!(marker.coordinate(), ORIGIN);
}

#[test]
fn failed_update_snaps_to_target() {
    let rig = Rig::new(AnimationOptions::default());
    let marker = Rc::new(MemoryMarker::new(ORIGIN));
    marker.fail_next_updates(1);
    let mut handle = rig.motion.animate("m1", marker.clone(), TARGET);

    rig.step(16.0);
    assert_eq!(handle.try_outcome(), Some(AnimationOutcome::Snapped));
    assert_eq!(marker.coordinate(), TARGET);
    assert!(rig.tracker.is_empty());
    assert_eq!(rig.motion.active_count(), 0);
    assert_eq!(
        rig.perf.metric("marker-animation:m1").unwrap().metadata["outcome"],
        "snapped"
    );
}

#[test]
fn cancel_on_idle_marker_is_a_noop() {
    let rig = Rig::new(AnimationOptions::default());
    assert!(!rig.motion.cancel("ghost"));
    assert_eq!(rig.motion.active_count(), 0);
}

#[test]
fn cancel_stops_frames_and_resolves_handle() {
    let rig = Rig::new(linear(100.0));
    let marker = Rc::new(MemoryMarker::new(ORIGIN));
    let mut handle = rig.motion.animate("m1", marker.clone(), TARGET);
    rig.step(10.0);
    let moved = marker.update_count();

    assert!(rig.motion.cancel("m1"));
    assert!(!rig.motion.cancel("m1"));
    assert_eq!(handle.try_outcome(), Some(AnimationOutcome::Cancelled));
    assert_eq!(rig.frames.pending_frames(), 0);
    assert!(rig.tracker.is_empty());

    rig.step(200.0);
    assert_eq!(marker.update_count(), moved);
}

#[test]
fn zero_duration_completes_on_first_frame() {
    let rig = Rig::new(linear(0.0));
    let marker = Rc::new(MemoryMarker::new(ORIGIN));
    let handle = rig.motion.animate("m1", marker.clone(), TARGET);
    rig.step(1.0);
    assert_eq!(futures::executor::block_on(handle), AnimationOutcome::Completed);
    assert_eq!(marker.coordinate(), TARGET);
}

#[test]
fn callbacks_see_every_frame_and_completion() {
    let steps: Rc<RefCell<Vec<f64>>> = Rc::default();
    let completed = Rc::new(Cell::new(0));
    let (s, c) = (steps.clone(), completed.clone());
    let rig = Rig::new(AnimationOptions {
        on_step: Some(Rc::new(move |_: &MarkerId, _: Coordinate, progress: f64| {
            s.borrow_mut().push(progress)
        })),
        on_complete: Some(Rc::new(move |_: &MarkerId| c.set(c.get() + 1))),
        ..linear(100.0)
    });
    let marker = Rc::new(MemoryMarker::new(ORIGIN));
    rig.motion.animate("m1", marker, TARGET);
    rig.step(50.0);
    rig.step(50.0);
    rig.step(50.0);

    assert_eq!(*steps.borrow(), vec![0.5, 1.0]);
    assert_eq!(completed.get(), 1);
}

#[test]
fn step_callback_may_cancel_its_own_animation() {
    let slot: Rc<RefCell<Weak<MotionController>>> = Rc::new(RefCell::new(Weak::new()));
    let s = slot.clone();
    let clock = Arc::new(ManualClock::new(0.0));
    let frames = Rc::new(FrameLoop::new(clock.clone()));
    let tracker = Rc::new(AnimationTracker::new(clock.clone()));
    let perf = Arc::new(PerformanceTracker::new(clock.clone()));
    let motion = Rc::new(MotionController::new(
        frames.clone(),
        tracker.clone(),
        perf,
        AnimationOptions {
            on_step: Some(Rc::new(move |id: &MarkerId, _: Coordinate, _: f64| {
                let controller = s.borrow().upgrade();
                if let Some(controller) = controller {
                    controller.cancel(id.as_str());
                }
            })),
            ..linear(100.0)
        },
    ));
    *slot.borrow_mut() = Rc::downgrade(&motion);

    let marker = Rc::new(MemoryMarker::new(ORIGIN));
    let mut handle = motion.animate("m1", marker, TARGET);
    clock.advance(100.0);
    frames.tick();

    assert_eq!(handle.try_outcome(), Some(AnimationOutcome::Cancelled));
    assert!(tracker.is_empty());
    assert!(frames.is_idle());
}

#[test]
fn dropping_the_controller_cancels_pending_handles() {
    let rig = Rig::new(linear(100.0));
    let marker = Rc::new(MemoryMarker::new(ORIGIN));
    let handle = rig.motion.animate("m1", marker, TARGET);
    let Rig {
        clock,
        frames,
        tracker,
        perf,
        motion,
    } = rig;
    drop(motion);
    assert_eq!(futures::executor::block_on(handle), AnimationOutcome::Cancelled);
    assert!(tracker.is_empty());
    let metric = perf.metric("marker-animation:m1").unwrap();
    assert!(metric.is_finished());
    assert_eq!(metric.metadata["outcome"], "cancelled");

    clock.advance(200.0);
    frames.tick();
    assert!(frames.is_idle());
    assert!(tracker.is_empty());
}

#[test]
fn each_marker_animates_independently() {
    let rig = Rig::new(linear(100.0));
    let a = Rc::new(MemoryMarker::new(ORIGIN));
    let b = Rc::new(MemoryMarker::new(TARGET));
    rig.motion.animate("a", a.clone(), TARGET);
    rig.step(50.0);
    rig.motion.animate("b", b.clone(), ORIGIN);
    assert_eq!(rig.motion.active_count(), 2);

    rig.step(50.0);
    assert_eq!(a.coordinate(), TARGET);
    assert!(rig.motion.is_animating("b"));
    assert!(!rig.motion.is_animating("a"));
}

#[test]
fn cancel_all_stops_every_marker() {
    let rig = Rig::new(linear(100.0));
    let mut a = rig.motion.animate("a", Rc::new(MemoryMarker::new(ORIGIN)), TARGET);
    let mut b = rig.motion.animate("b", Rc::new(MemoryMarker::new(ORIGIN)), TARGET);
    assert_eq!(rig.motion.cancel_all(), 2);
    assert_eq!(rig.motion.cancel_all(), 0);
    assert_eq!(a.try_outcome(), Some(AnimationOutcome::Cancelled));
    assert_eq!(b.try_outcome(), Some(AnimationOutcome::Cancelled));
    assert!(rig.frames.is_idle());
}

/// Controller behind an `Rc` so callbacks can reach it through `slot`.
fn shared_controller(
    slot: &Rc<RefCell<Weak<MotionController>>>,
    options: AnimationOptions,
) -> (Arc<ManualClock>, Rc<FrameLoop>, Rc<AnimationTracker>, Arc<PerformanceTracker>, Rc<MotionController>) {
    let clock = Arc::new(ManualClock::new(0.0));
    let frames = Rc::new(FrameLoop::new(clock.clone()));
    let tracker = Rc::new(AnimationTracker::new(clock.clone()));
    let perf = Arc::new(PerformanceTracker::new(clock.clone()));
    let motion = Rc::new(MotionController::new(
        frames.clone(),
        tracker.clone(),
        perf.clone(),
        options,
    ));
    *slot.borrow_mut() = Rc::downgrade(&motion);
    (clock, frames, tracker, perf, motion)
}

const FAR: Coordinate = Coordinate::new(20.0, 20.0);

#[test]
fn completion_callback_may_start_the_next_leg() {
    let slot: Rc<RefCell<Weak<MotionController>>> = Rc::new(RefCell::new(Weak::new()));
    let marker = Rc::new(MemoryMarker::new(ORIGIN));
    let legs = Rc::new(Cell::new(0));
    let (s, m, l) = (slot.clone(), marker.clone(), legs.clone());
    let (clock, frames, tracker, perf, motion) = shared_controller(
        &slot,
        AnimationOptions {
            on_complete: Some(Rc::new(move |id: &MarkerId| {
                l.set(l.get() + 1);
                if l.get() > 1 {
                    return;
                }
                let controller = s.borrow().upgrade();
                if let Some(controller) = controller {
                    controller.animate(id.clone(), m.clone() as Rc<dyn MarkerHandle>, FAR);
                }
            })),
            ..linear(100.0)
        },
    );

    let mut first = motion.animate("m1", marker.clone(), TARGET);
    clock.advance(100.0);
    frames.tick();
    assert_eq!(first.try_outcome(), Some(AnimationOutcome::Completed));
    assert!(motion.is_animating("m1"));
    assert_eq!(tracker.get("m1").unwrap().target_coordinate, FAR);

    let live = perf.metric("marker-animation:m1").unwrap();
    assert!(!live.is_finished());
    assert!(!live.metadata.contains_key("outcome"));

    clock.advance(100.0);
    frames.tick();
    assert_eq!(marker.coordinate(), FAR);
    assert_eq!(legs.get(), 2);
    let done = perf.metric("marker-animation:m1").unwrap();
    assert_eq!(done.duration, Some(100.0));
    assert_eq!(done.metadata["outcome"], "completed");
    assert!(frames.is_idle());
}

#[test]
fn subscriber_restarting_a_cancelled_marker_keeps_its_metric() {
    let slot: Rc<RefCell<Weak<MotionController>>> = Rc::new(RefCell::new(Weak::new()));
    let (clock, frames, tracker, perf, motion) = shared_controller(&slot, linear(100.0));
    let marker = Rc::new(MemoryMarker::new(ORIGIN));
    let armed = Rc::new(Cell::new(false));
    let (s, m, a) = (slot.clone(), marker.clone(), armed.clone());
    let _subscription = tracker.subscribe(move |states: &[AnimationState]| {
        if !a.get() || !states.is_empty() {
            return;
        }
        a.set(false);
        let controller = s.borrow().upgrade();
        if let Some(controller) = controller {
            controller.animate("m1", m.clone() as Rc<dyn MarkerHandle>, FAR);
        }
    });

    let mut first = motion.animate("m1", marker.clone(), TARGET);
    armed.set(true);
    assert!(motion.cancel("m1"));
    assert_eq!(first.try_outcome(), Some(AnimationOutcome::Cancelled));
    assert!(motion.is_animating("m1"));
    assert!(!perf.metric("marker-animation:m1").unwrap().is_finished());

    clock.advance(100.0);
    frames.tick();
    let done = perf.metric("marker-animation:m1").unwrap();
    assert_eq!(done.duration, Some(100.0));
    assert_eq!(done.metadata["outcome"], "completed");
    assert_eq!(marker.coordinate(), FAR);
}
