use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::channel::oneshot;

use crate::animation::ease::Ease;
use crate::animation::tracker::AnimationTracker;
use crate::foundation::core::{Coordinate, MarkerId, interpolate};
use crate::perf::tracker::{Metadata, PerformanceTracker};
use crate::schedule::frame_loop::{FrameClock, FrameControl, FrameTask, TaskToken};
use crate::surface::MarkerHandle;

pub const DEFAULT_DURATION_MS: f64 = 300.0;

/// How an animation ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AnimationOutcome {
    /// Reached the target on schedule.
    Completed,
    /// A coordinate update failed and the marker was placed on the target directly.
    Snapped,
    /// Cancelled, replaced by a newer target, or the controller went away.
    Cancelled,
}

impl AnimationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Snapped => "snapped",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Called after every applied frame with the marker id, the applied coordinate and raw progress.
pub type StepCallback = Rc<dyn Fn(&MarkerId, Coordinate, f64)>;
/// Called once when an animation reaches its target.
pub type CompleteCallback = Rc<dyn Fn(&MarkerId)>;

#[derive(Clone)]
pub struct AnimationOptions {
    pub duration_ms: f64,
    pub ease: Ease,
    pub on_step: Option<StepCallback>,
    pub on_complete: Option<CompleteCallback>,
}

impl Default for AnimationOptions {
    fn default() -> Self {
        Self {
            duration_ms: DEFAULT_DURATION_MS,
            ease: Ease::default(),
            on_step: None,
            on_complete: None,
        }
    }
}

impl fmt::Debug for AnimationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationOptions")
            .field("duration_ms", &self.duration_ms)
            .field("ease", &self.ease)
            .field("on_step", &self.on_step.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// Resolves with the [`AnimationOutcome`] once the animation settles.
///
/// Dropping the handle does not cancel the animation.
#[derive(Debug)]
pub struct AnimationHandle {
    rx: oneshot::Receiver<AnimationOutcome>,
    resolved: Option<AnimationOutcome>,
}

impl AnimationHandle {
    fn new(rx: oneshot::Receiver<AnimationOutcome>) -> Self {
        Self { rx, resolved: None }
    }

    /// Non-blocking check. `None` while the animation is still running.
    pub fn try_outcome(&mut self) -> Option<AnimationOutcome> {
        if self.resolved.is_none() {
            self.resolved = match self.rx.try_recv() {
                Ok(outcome) => outcome,
                Err(oneshot::Canceled) => Some(AnimationOutcome::Cancelled),
            };
        }
        self.resolved
    }
}

impl Future for AnimationHandle {
    type Output = AnimationOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.resolved {
            return Poll::Ready(outcome);
        }
        let outcome = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => outcome,
            Poll::Ready(Err(oneshot::Canceled)) => AnimationOutcome::Cancelled,
            Poll::Pending => return Poll::Pending,
        };
        self.resolved = Some(outcome);
        Poll::Ready(outcome)
    }
}

struct ActiveAnimation {
    generation: u64,
    token: Option<TaskToken>,
    done: Option<oneshot::Sender<AnimationOutcome>>,
    metric: String,
}

#[derive(Default)]
struct MotionInner {
    animations: HashMap<MarkerId, ActiveAnimation>,
    next_generation: u64,
}

impl MotionInner {
    /// Remove the entry for `id` only if it still belongs to `generation`.
    fn take_current(&mut self, id: &MarkerId, generation: u64) -> Option<ActiveAnimation> {
        match self.animations.get(id) {
            Some(active) if active.generation == generation => self.animations.remove(id),
            _ => None,
        }
    }

    fn is_current(&self, id: &MarkerId, generation: u64) -> bool {
        self.animations
            .get(id)
            .is_some_and(|active| active.generation == generation)
    }
}

/// Animates marker handles towards new targets, one animation per marker id.
///
/// A new target for a marker replaces its running animation; nothing is queued.
pub struct MotionController {
    frames: Rc<dyn FrameClock>,
    tracker: Rc<AnimationTracker>,
    performance: Arc<PerformanceTracker>,
    options: AnimationOptions,
    inner: Rc<RefCell<MotionInner>>,
}

impl MotionController {
    pub fn new(
        frames: Rc<dyn FrameClock>,
        tracker: Rc<AnimationTracker>,
        performance: Arc<PerformanceTracker>,
        options: AnimationOptions,
    ) -> Self {
        Self {
            frames,
            tracker,
            performance,
            options,
            inner: Rc::new(RefCell::new(MotionInner::default())),
        }
    }

    pub fn options(&self) -> &AnimationOptions {
        &self.options
    }

    pub fn tracker(&self) -> &Rc<AnimationTracker> {
        &self.tracker
    }

    /// Start moving `marker` from its rendered position to `target`.
    pub fn animate(
        &self,
        id: impl Into<MarkerId>,
        marker: Rc<dyn MarkerHandle>,
        target: Coordinate,
    ) -> AnimationHandle {
        let id = id.into();
        self.cancel(id.as_str());

        let start = marker.coordinate();
        let duration = sanitize_duration(self.options.duration_ms);
        let start_time = self.frames.now_ms();
        self.tracker.track(id.clone(), start, target, duration);

        let metric = format!("marker-animation:{id}");
        self.performance
            .start(&metric, Some(animation_metadata(start, target, duration)));

        let (tx, rx) = oneshot::channel();
        let generation = {
            let mut inner = self.inner.borrow_mut();
            inner.next_generation += 1;
            let generation = inner.next_generation;
            inner.animations.insert(
                id.clone(),
                ActiveAnimation {
                    generation,
                    token: None,
                    done: Some(tx),
                    metric,
                },
            );
            generation
        };

        let task = self.frame_task(
            id.clone(),
            generation,
            marker,
            Segment {
                start,
                target,
                start_time,
                duration,
            },
        );
        let token = self.frames.request_frames(task);
        if let Some(active) = self.inner.borrow_mut().animations.get_mut(&id)
            && active.generation == generation
        {
            active.token = Some(token);
        }

        tracing::debug!(
            marker_id = %id,
            from = ?start,
            to = ?target,
            duration_ms = duration,
            "animation started"
        );
        AnimationHandle::new(rx)
    }

    /// Stop the animation for `id`. Returns `false` when nothing was running.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn cancel(&self, id: &str) -> bool {
        let entry = self.inner.borrow_mut().animations.remove(id);
        let Some(entry) = entry else {
            return false;
        };
        if let Some(token) = entry.token {
            self.frames.cancel(token);
        }
        end_metric(&entry, AnimationOutcome::Cancelled, &self.performance);
        self.tracker.cancel(id);
        resolve(entry, AnimationOutcome::Cancelled);
        tracing::debug!("animation cancelled");
        true
    }

    /// Cancel every running animation. Returns how many were stopped.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<MarkerId> = self.inner.borrow().animations.keys().cloned().collect();
        ids.iter().filter(|id| self.cancel(id.as_str())).count()
    }

    pub fn active_count(&self) -> usize {
        self.inner.borrow().animations.len()
    }

    pub fn is_animating(&self, id: &str) -> bool {
        self.inner.borrow().animations.contains_key(id)
    }

    fn frame_task(
        &self,
        id: MarkerId,
        generation: u64,
        marker: Rc<dyn MarkerHandle>,
        segment: Segment,
    ) -> FrameTask {
        let inner: Weak<RefCell<MotionInner>> = Rc::downgrade(&self.inner);
        let tracker = Rc::clone(&self.tracker);
        let performance = Arc::clone(&self.performance);
        let ease = self.options.ease;
        let on_step = self.options.on_step.clone();
        let on_complete = self.options.on_complete.clone();

        Box::new(move |now| {
            let Some(inner) = inner.upgrade() else {
                return FrameControl::Finish;
            };
            if !inner.borrow().is_current(&id, generation) {
                return FrameControl::Finish;
            }

            let raw = segment.progress_at(now);
            let current = interpolate(segment.start, segment.target, ease.apply(raw));

            if let Err(err) = marker.set_coordinate(current) {
                tracing::warn!(marker_id = %id, error = %err, "marker update failed, snapping to target");
                let entry = inner.borrow_mut().take_current(&id, generation);
                if let Some(entry) = &entry {
                    end_metric(entry, AnimationOutcome::Snapped, &performance);
                }
                tracker.cancel(id.as_str());
                if let Err(err) = marker.set_coordinate(segment.target) {
                    tracing::error!(marker_id = %id, error = %err, "snap to target failed");
                }
                if let Some(entry) = entry {
                    resolve(entry, AnimationOutcome::Snapped);
                }
                return FrameControl::Finish;
            }

            tracker.update_progress(id.as_str(), raw, current);
            if let Some(step) = &on_step {
                step(&id, current, raw);
            }

            if raw < 1.0 {
                return FrameControl::Continue;
            }
            // The step callback may have cancelled or replaced this animation.
            let entry = inner.borrow_mut().take_current(&id, generation);
            let Some(entry) = entry else {
                return FrameControl::Finish;
            };
            // Callbacks below may start a new animation under the same metric name.
            end_metric(&entry, AnimationOutcome::Completed, &performance);
            tracker.complete(id.as_str());
            if let Some(complete) = &on_complete {
                complete(&id);
            }
            tracing::debug!(marker_id = %id, "animation completed");
            resolve(entry, AnimationOutcome::Completed);
            FrameControl::Finish
        })
    }
}

impl Drop for MotionController {
    fn drop(&mut self) {
        let cancelled = self.cancel_all();
        if cancelled > 0 {
            tracing::debug!(cancelled, "motion controller dropped");
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Segment {
    start: Coordinate,
    target: Coordinate,
    start_time: f64,
    duration: f64,
}

impl Segment {
    fn progress_at(&self, now: f64) -> f64 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        ((now - self.start_time) / self.duration).clamp(0.0, 1.0)
    }
}

fn sanitize_duration(ms: f64) -> f64 {
    if ms.is_finite() { ms.max(0.0) } else { 0.0 }
}

fn animation_metadata(from: Coordinate, to: Coordinate, duration: f64) -> Metadata {
    let mut md = Metadata::new();
    md.insert("from".to_owned(), coordinate_value(from));
    md.insert("to".to_owned(), coordinate_value(to));
    md.insert("duration".to_owned(), duration.into());
    md
}

fn coordinate_value(c: Coordinate) -> serde_json::Value {
    serde_json::json!({ "latitude": c.latitude, "longitude": c.longitude })
}

/// Close the animation's metric. Runs before any subscriber or callback sees the outcome.
fn end_metric(entry: &ActiveAnimation, outcome: AnimationOutcome, performance: &PerformanceTracker) {
    let mut md = Metadata::new();
    md.insert("outcome".to_owned(), outcome.as_str().into());
    performance.end(&entry.metric, Some(md));
}

fn resolve(entry: ActiveAnimation, outcome: AnimationOutcome) {
    if let Some(done) = entry.done {
        // The caller may have dropped the handle.
        let _ = done.send(outcome);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/animation/motion.rs"]
mod tests;
