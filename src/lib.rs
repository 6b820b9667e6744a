#![forbid(unsafe_code)]

//! Marker motion and trail engine.
//!
//! Animates map markers between reported positions, draws fading trails behind them and
//! reports performance and health figures. Rendering is delegated to the host through the
//! [`MarkerHandle`] and [`MapSurface`] traits; time is driven through a [`FrameLoop`].

pub mod animation;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod foundation;
pub mod perf;
pub mod schedule;
pub mod surface;
pub mod trail;

pub use animation::{
    AnimationHandle, AnimationMetrics, AnimationOptions, AnimationOutcome, AnimationState,
    AnimationTracker, Ease, MotionController, Subscription,
};
pub use config::{AnimationConfig, EngineConfig, PerformanceConfig};
pub use diagnostics::{
    AnimationSummary, DebugStats, Diagnostics, DiagnosticsReport, MapHealth, MapState,
    MarkerStatus, PathDebugInfo, VisualizationState,
};
pub use engine::Engine;
pub use foundation::clock::{Clock, ManualClock, SystemClock};
pub use foundation::core::{Coordinate, Lerp, MarkerId, PathBounds, PositionUpdate, interpolate};
pub use foundation::error::{MarkerflowError, MarkerflowResult};
pub use perf::{BatchMeasure, BatchProgress, Metadata, Metric, PerformanceTracker};
pub use schedule::frame_loop::{FrameClock, FrameControl, FrameLoop, TaskToken, TimerControl};
pub use surface::memory::{MemoryMarker, MemorySurface};
pub use surface::{ArrowStyle, MapSurface, MarkerHandle, OverlayId, TrailStyle};
pub use trail::{PathBuffer, PathPoint, PathVisualizer, TimeRange, TrailOptions};
