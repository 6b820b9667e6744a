//! Marker motion: easing curves, the per-marker animation controller and the
//! progress tracker it reports to.

pub mod ease;
pub mod motion;
pub mod tracker;

pub use ease::Ease;
pub use motion::{
    AnimationHandle, AnimationOptions, AnimationOutcome, CompleteCallback, MotionController,
    StepCallback,
};
pub use tracker::{AnimationMetrics, AnimationState, AnimationTracker, Subscription};
