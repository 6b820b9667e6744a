use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::animation::motion::{AnimationHandle, AnimationOptions, MotionController};
use crate::animation::tracker::AnimationTracker;
use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostics, DiagnosticsReport, MapState};
use crate::foundation::clock::Clock;
use crate::foundation::core::{MarkerId, PositionUpdate};
use crate::foundation::error::MarkerflowResult;
use crate::perf::tracker::{Metadata, PerformanceTracker};
use crate::schedule::frame_loop::FrameLoop;
use crate::surface::{MapSurface, MarkerHandle};
use crate::trail::visualizer::PathVisualizer;

/// Owns one instance of every service, wired to a shared clock and frame loop.
///
/// Position updates go in through [`Engine::ingest`]; the host drives time with
/// [`Engine::tick`] (or the underlying [`FrameLoop`]).
pub struct Engine {
    config: EngineConfig,
    frames: Rc<FrameLoop>,
    performance: Arc<PerformanceTracker>,
    tracker: Rc<AnimationTracker>,
    motion: MotionController,
    visualizer: PathVisualizer,
    surface: RefCell<Option<Rc<dyn MapSurface>>>,
    markers: RefCell<BTreeMap<MarkerId, Rc<dyn MarkerHandle>>>,
}

impl Engine {
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> MarkerflowResult<Self> {
        let options = config.animation_options();
        Self::with_animation_options(config, clock, options)
    }

    /// Like [`Engine::new`], with caller-supplied animation options (step and completion
    /// callbacks). Duration and easing still come from `config`.
    pub fn with_animation_options(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        options: AnimationOptions,
    ) -> MarkerflowResult<Self> {
        config.validate()?;

        let frames = Rc::new(FrameLoop::new(Arc::clone(&clock)));
        let performance = Arc::new(PerformanceTracker::with_thresholds(
            Arc::clone(&clock),
            config
                .performance
                .thresholds
                .iter()
                .map(|(name, ms)| (name.clone(), *ms)),
        ));
        let tracker = Rc::new(AnimationTracker::new(clock));
        let motion = MotionController::new(
            frames.clone(),
            Rc::clone(&tracker),
            Arc::clone(&performance),
            AnimationOptions {
                duration_ms: config.animation.duration,
                ease: config.animation.easing,
                ..options
            },
        );
        let visualizer = PathVisualizer::new(frames.clone(), config.trail.clone());

        tracing::debug!(
            duration_ms = config.animation.duration,
            easing = config.animation.easing.name(),
            max_points = config.trail.max_points,
            "engine ready"
        );
        Ok(Self {
            config,
            frames,
            performance,
            tracker,
            motion,
            visualizer,
            surface: RefCell::new(None),
            markers: RefCell::new(BTreeMap::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn frames(&self) -> &Rc<FrameLoop> {
        &self.frames
    }

    pub fn performance(&self) -> &Arc<PerformanceTracker> {
        &self.performance
    }

    pub fn tracker(&self) -> &Rc<AnimationTracker> {
        &self.tracker
    }

    pub fn motion(&self) -> &MotionController {
        &self.motion
    }

    pub fn visualizer(&self) -> &PathVisualizer {
        &self.visualizer
    }

    /// Run one frame of every animation and due timer.
    pub fn tick(&self) -> f64 {
        self.frames.tick()
    }

    /// Attach the map surface trails are drawn on, or detach with `None`.
    pub fn set_surface(&self, surface: Option<Rc<dyn MapSurface>>) {
        self.visualizer.set_surface(surface.clone());
        *self.surface.borrow_mut() = surface;
    }

    pub fn register_marker(&self, id: impl Into<MarkerId>, marker: Rc<dyn MarkerHandle>) {
        let id = id.into();
        tracing::debug!(marker_id = %id, "marker registered");
        self.markers.borrow_mut().insert(id, marker);
    }

    /// Forget a marker: stop its animation and drop its trail.
    pub fn remove_marker(&self, id: &str) -> bool {
        self.motion.cancel(id);
        self.visualizer.remove_path(id);
        self.markers.borrow_mut().remove(id).is_some()
    }

    pub fn marker(&self, id: &str) -> Option<Rc<dyn MarkerHandle>> {
        self.markers.borrow().get(id).cloned()
    }

    pub fn marker_count(&self) -> usize {
        self.markers.borrow().len()
    }

    /// Route one feed entry: animate the registered marker towards it and extend its trail.
    ///
    /// Returns the animation handle, or `None` when no marker is registered under the id
    /// (the trail is still extended).
    #[tracing::instrument(skip(self, update), fields(marker_id = %update.marker_id))]
    pub fn ingest(&self, update: &PositionUpdate) -> MarkerflowResult<Option<AnimationHandle>> {
        update.coordinate.validate()?;
        let mut md = Metadata::new();
        md.insert("markerId".to_owned(), update.marker_id.as_str().into());
        md.insert("timestamp".to_owned(), update.timestamp.into());

        self.performance.measure_sync(
            "position-update",
            || {
                let marker = self.marker(update.marker_id.as_str());
                let handle = match marker {
                    Some(marker) => {
                        Some(self.motion.animate(&update.marker_id, marker, update.coordinate))
                    }
                    None => {
                        tracing::debug!("no marker registered, trail only");
                        None
                    }
                };
                self.visualizer.add_point_at(
                    &update.marker_id,
                    update.coordinate,
                    update.timestamp,
                );
                Ok(handle)
            },
            Some(md),
        )
    }

    /// Stop all animations and drop all trails. Registered markers stay.
    pub fn clear(&self) {
        let cancelled = self.motion.cancel_all();
        let cleared = self.visualizer.clear_all_paths();
        tracing::debug!(cancelled, cleared, "engine cleared");
    }

    /// Snapshot of the host-side map state as the diagnostics see it.
    pub fn map_state(&self, is_loaded: bool, debug_mode: bool) -> MapState {
        MapState {
            surface: self.surface.borrow().clone(),
            markers: self.markers.borrow().clone(),
            is_loaded,
            debug_mode,
        }
    }

    pub fn diagnostics(&self) -> Diagnostics<'_> {
        Diagnostics::new(&self.visualizer, &self.tracker, &self.performance)
    }

    pub fn report(&self, debug_mode: bool) -> DiagnosticsReport {
        let map = self.map_state(self.surface.borrow().is_some(), debug_mode);
        self.diagnostics().report(&map)
    }
}

#[cfg(test)]
#[path = "../tests/unit/engine/engine.rs"]
mod tests;
