use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::foundation::clock::Clock;
use crate::foundation::core::{Coordinate, MarkerId};
use crate::foundation::geo;

/// Live state of one in-flight marker animation.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationState {
    pub marker_id: MarkerId,
    pub start_coordinate: Coordinate,
    pub target_coordinate: Coordinate,
    pub current_coordinate: Coordinate,
    pub start_time: f64,
    pub duration: f64,
    /// Raw (un-eased) time progress in [0, 1].
    pub progress: f64,
    pub frame_count: u64,
    /// Instantaneous rate from the last two progress reports.
    pub fps: f64,
    pub last_frame_time: f64,
}

/// Derived figures for one animation at the time of the query.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationMetrics {
    pub progress: f64,
    pub elapsed: f64,
    pub remaining_time: f64,
    pub fps: f64,
    pub frame_count: u64,
    /// Great-circle distance start -> target, meters.
    pub distance: f64,
    /// Speed start -> current over elapsed time, km/h.
    pub average_speed: f64,
}

type Subscriber = Rc<dyn Fn(&[AnimationState])>;

#[derive(Default)]
struct TrackerInner {
    animations: BTreeMap<MarkerId, AnimationState>,
    subscribers: Vec<(u64, Subscriber)>,
    next_subscriber: u64,
}

/// Registry of in-flight animations with synchronous publish/subscribe.
///
/// Every mutation pushes the full snapshot to every subscriber before returning.
pub struct AnimationTracker {
    clock: Arc<dyn Clock>,
    inner: Rc<RefCell<TrackerInner>>,
}

/// Handle returned by [`AnimationTracker::subscribe`].
pub struct Subscription {
    id: u64,
    inner: Weak<RefCell<TrackerInner>>,
}

impl Subscription {
    /// Stop receiving snapshots. Returns `false` if the tracker is gone or already detached.
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let mut inner = inner.borrow_mut();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(id, _)| *id != self.id);
        before != inner.subscribers.len()
    }
}

impl AnimationTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Rc::new(RefCell::new(TrackerInner::default())),
        }
    }

    pub fn track(
        &self,
        id: impl Into<MarkerId>,
        start: Coordinate,
        target: Coordinate,
        duration_ms: f64,
    ) {
        let id = id.into();
        let now = self.clock.now_ms();
        let state = AnimationState {
            marker_id: id.clone(),
            start_coordinate: start,
            target_coordinate: target,
            current_coordinate: start,
            start_time: now,
            duration: duration_ms,
            progress: 0.0,
            frame_count: 0,
            fps: 0.0,
            last_frame_time: now,
        };
        self.inner.borrow_mut().animations.insert(id, state);
        self.notify();
    }

    /// Record one frame. Unknown ids are ignored and return `false`.
    pub fn update_progress(&self, id: &str, progress: f64, current: Coordinate) -> bool {
        let now = self.clock.now_ms();
        {
            let mut inner = self.inner.borrow_mut();
            let Some(state) = inner.animations.get_mut(id) else {
                return false;
            };
            let delta = now - state.last_frame_time;
            if delta > 0.0 {
                state.fps = 1000.0 / delta;
            }
            state.progress = progress.clamp(0.0, 1.0);
            state.frame_count += 1;
            state.last_frame_time = now;
            state.current_coordinate = current;
        }
        self.notify();
        true
    }

    pub fn complete(&self, id: &str) -> bool {
        let removed = self.inner.borrow_mut().animations.remove(id);
        let Some(state) = removed else {
            return false;
        };
        let total_ms = self.clock.now_ms() - state.start_time;
        let avg_fps = if total_ms > 0.0 {
            state.frame_count as f64 / (total_ms / 1000.0)
        } else {
            0.0
        };
        tracing::debug!(
            marker = %state.marker_id,
            frames = state.frame_count,
            total_ms,
            avg_fps,
            "animation complete"
        );
        self.notify();
        true
    }

    pub fn cancel(&self, id: &str) -> bool {
        let removed = self.inner.borrow_mut().animations.remove(id);
        if removed.is_none() {
            return false;
        }
        self.notify();
        true
    }

    pub fn active_animations(&self) -> Vec<AnimationState> {
        self.inner.borrow().animations.values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<AnimationState> {
        self.inner.borrow().animations.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().animations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self, id: &str) -> Option<AnimationMetrics> {
        let state = self.get(id)?;
        let elapsed = self.clock.now_ms() - state.start_time;
        let covered = geo::distance_m(state.start_coordinate, state.current_coordinate);
        Some(AnimationMetrics {
            progress: state.progress,
            elapsed,
            remaining_time: (state.duration - elapsed).max(0.0),
            fps: state.fps,
            frame_count: state.frame_count,
            distance: geo::distance_m(state.start_coordinate, state.target_coordinate),
            average_speed: geo::speed_kmh(covered, elapsed / 1000.0),
        })
    }

    /// Register `callback` and immediately replay the current snapshot to it.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[AnimationState]) + 'static,
    {
        let callback: Subscriber = Rc::new(callback);
        let id = {
            let mut inner = self.inner.borrow_mut();
            inner.next_subscriber += 1;
            let id = inner.next_subscriber;
            inner.subscribers.push((id, callback.clone()));
            id
        };
        callback(&self.active_animations());
        Subscription {
            id,
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    fn notify(&self) {
        // Release the borrow first: subscribers are allowed to query the tracker.
        let (snapshot, subscribers): (Vec<AnimationState>, Vec<Subscriber>) = {
            let inner = self.inner.borrow();
            (
                inner.animations.values().cloned().collect(),
                inner.subscribers.iter().map(|(_, s)| s.clone()).collect(),
            )
        };
        for subscriber in subscribers {
            subscriber(&snapshot);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/animation/tracker.rs"]
mod tests;
