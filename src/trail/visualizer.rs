use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::foundation::core::{Coordinate, MarkerId, PathBounds, interpolate};
use crate::foundation::geo;
use crate::schedule::frame_loop::{FrameClock, TaskToken, TimerControl, TimerTask};
use crate::surface::{ArrowStyle, MapSurface, OverlayId, TrailStyle};
use crate::trail::buffer::{PathBuffer, PathPoint};

/// Upper bound on direction arrows drawn along one trail.
pub const MAX_ARROWS: usize = 5;
/// Opacity removed per fade step.
pub const FADE_STEP: f64 = 0.05;
pub const FADE_INTERVAL_MS: f64 = 50.0;

const TRAIL_WEIGHT: f64 = 2.0;
const ARROW_SCALE: f64 = 3.0;
const OPACITY_EPSILON: f64 = 1e-9;

/// Trail rendering settings. Also the `trail` section of the engine config.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct TrailOptions {
    pub max_points: usize,
    pub line_color: String,
    pub line_opacity: f64,
    pub show_arrows: bool,
    /// Idle time before a trail starts fading; 0 disables fading.
    #[serde(rename = "fadeOutDuration")]
    pub fade_out_ms: f64,
}

impl Default for TrailOptions {
    fn default() -> Self {
        Self {
            max_points: 100,
            line_color: "#4CAF50".to_owned(),
            line_opacity: 0.6,
            show_arrows: true,
            fade_out_ms: 5000.0,
        }
    }
}

impl TrailOptions {
    fn trail_style(&self) -> TrailStyle {
        TrailStyle {
            color: self.line_color.clone(),
            opacity: self.line_opacity,
            weight: TRAIL_WEIGHT,
            geodesic: true,
        }
    }

    fn arrow_style(&self, heading_deg: f64) -> ArrowStyle {
        ArrowStyle {
            color: self.line_color.clone(),
            opacity: self.line_opacity,
            scale: ARROW_SCALE,
            heading_deg,
        }
    }
}

/// Oldest first point and newest last point across every trail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct TimeRange {
    pub oldest: i64,
    pub newest: i64,
}

type ArrowList = SmallVec<[OverlayId; MAX_ARROWS]>;

#[derive(Debug)]
struct Trail {
    buffer: PathBuffer,
    line: Option<OverlayId>,
    arrows: ArrowList,
    opacity: f64,
    fade_epoch: u64,
    fade_timer: Option<TaskToken>,
}

impl Trail {
    fn overlays(&self) -> impl Iterator<Item = OverlayId> + '_ {
        self.line.into_iter().chain(self.arrows.iter().copied())
    }
}

#[derive(Default)]
struct VisualizerState {
    surface: Option<Weak<dyn MapSurface>>,
    trails: BTreeMap<MarkerId, Trail>,
    next_epoch: u64,
}

impl VisualizerState {
    fn surface(&self) -> Option<Rc<dyn MapSurface>> {
        self.surface.as_ref().and_then(Weak::upgrade)
    }
}

enum FadeStep {
    Stale,
    Dim(f64, Vec<OverlayId>),
    Expired,
}

/// Draws a bounded, fading trail behind each marker on a borrowed map surface.
pub struct PathVisualizer {
    frames: Rc<dyn FrameClock>,
    options: TrailOptions,
    state: Rc<RefCell<VisualizerState>>,
}

impl PathVisualizer {
    pub fn new(frames: Rc<dyn FrameClock>, options: TrailOptions) -> Self {
        Self {
            frames,
            options,
            state: Rc::new(RefCell::new(VisualizerState::default())),
        }
    }

    pub fn options(&self) -> &TrailOptions {
        &self.options
    }

    /// Attach to `surface`, or detach with `None`.
    ///
    /// Detaching or switching to another surface removes every trail, since overlays belong
    /// to the surface they were drawn on. Re-setting the current surface keeps them.
    pub fn set_surface(&self, surface: Option<Rc<dyn MapSurface>>) {
        let current = self.state.borrow().surface();
        let same = match (&current, &surface) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        };
        if !same {
            let evicted = self.clear_all_paths();
            if evicted > 0 {
                tracing::debug!(evicted, "surface changed, trails evicted");
            }
        }
        self.state.borrow_mut().surface = surface.as_ref().map(Rc::downgrade);
    }

    /// Whether a live surface is attached.
    pub fn is_visible(&self) -> bool {
        self.state.borrow().surface().is_some()
    }

    /// Append a point stamped with the frame clock.
    pub fn add_point(&self, id: impl Into<MarkerId>, position: Coordinate) -> bool {
        let timestamp = self.frames.now_ms().round() as i64;
        self.add_point_at(id, position, timestamp)
    }

    /// Append a point and redraw the marker's trail. Returns `false` when no surface is attached.
    pub fn add_point_at(&self, id: impl Into<MarkerId>, position: Coordinate, timestamp: i64) -> bool {
        let id = id.into();
        let Some(surface) = self.state.borrow().surface() else {
            tracing::debug!(marker_id = %id, "no map surface, point dropped");
            return false;
        };

        let (coords, line, stale_arrows, stale_timer, epoch) = {
            let mut state = self.state.borrow_mut();
            state.next_epoch += 1;
            let epoch = state.next_epoch;
            let max_points = self.options.max_points;
            let trail = state.trails.entry(id.clone()).or_insert_with(|| Trail {
                buffer: PathBuffer::new(max_points),
                line: None,
                arrows: ArrowList::new(),
                opacity: 0.0,
                fade_epoch: 0,
                fade_timer: None,
            });
            trail.buffer.push(PathPoint {
                position,
                timestamp,
            });
            trail.opacity = self.options.line_opacity;
            trail.fade_epoch = epoch;
            (
                trail.buffer.coordinates(),
                trail.line,
                std::mem::take(&mut trail.arrows),
                trail.fade_timer.take(),
                epoch,
            )
        };

        if let Some(token) = stale_timer {
            self.frames.cancel(token);
        }

        let line = match line {
            Some(line) => {
                surface.set_trail_path(line, &coords);
                surface.set_overlay_opacity(line, self.options.line_opacity);
                line
            }
            None => surface.attach_trail(&coords, &self.options.trail_style()),
        };
        for arrow in stale_arrows {
            surface.detach_overlay(arrow);
        }
        let arrows: ArrowList = if self.options.show_arrows {
            arrow_placements(&coords)
                .into_iter()
                .map(|(at, heading)| surface.attach_arrow(at, &self.options.arrow_style(heading)))
                .collect()
        } else {
            ArrowList::new()
        };
        let fade_timer = self.schedule_fade(&id, epoch);

        let mut state = self.state.borrow_mut();
        if let Some(trail) = state.trails.get_mut(&id) {
            trail.line = Some(line);
            trail.arrows = arrows;
            trail.fade_timer = fade_timer;
            return true;
        }
        // Removed by the surface while it was being redrawn.
        drop(state);
        if let Some(token) = fade_timer {
            self.frames.cancel(token);
        }
        for overlay in std::iter::once(line).chain(arrows) {
            surface.detach_overlay(overlay);
        }
        true
    }

    fn schedule_fade(&self, id: &MarkerId, epoch: u64) -> Option<TaskToken> {
        let delay = self.options.fade_out_ms;
        if !(delay.is_finite() && delay > 0.0) {
            return None;
        }
        let task = fade_task(
            Rc::downgrade(&self.state),
            id.clone(),
            epoch,
            self.options.line_opacity,
        );
        Some(self.frames.set_timer(delay, task))
    }

    /// Drop the trail of `id` and its overlays. Unknown ids return `false`.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn remove_path(&self, id: &str) -> bool {
        let (trail, surface) = {
            let mut state = self.state.borrow_mut();
            (state.trails.remove(id), state.surface())
        };
        let Some(trail) = trail else {
            return false;
        };
        if let Some(token) = trail.fade_timer {
            self.frames.cancel(token);
        }
        detach_trail(surface.as_deref(), &trail);
        true
    }

    /// Drop every trail. Returns how many were removed.
    pub fn clear_all_paths(&self) -> usize {
        let (trails, surface) = {
            let mut state = self.state.borrow_mut();
            (std::mem::take(&mut state.trails), state.surface())
        };
        for trail in trails.values() {
            if let Some(token) = trail.fade_timer {
                self.frames.cancel(token);
            }
            detach_trail(surface.as_deref(), trail);
        }
        trails.len()
    }

    pub fn path_length(&self, id: &str) -> usize {
        self.with_trail(id, |t| t.buffer.len()).unwrap_or(0)
    }

    pub fn path_bounds(&self, id: &str) -> Option<PathBounds> {
        self.with_trail(id, |t| t.buffer.bounds()).flatten()
    }

    /// Length of the trail in meters.
    pub fn path_distance(&self, id: &str) -> f64 {
        self.with_trail(id, |t| t.buffer.distance_m()).unwrap_or(0.0)
    }

    /// Trail distance over the time between its first and last point, km/h.
    pub fn average_speed(&self, id: &str) -> f64 {
        self.with_trail(id, |t| t.buffer.average_speed_kmh())
            .unwrap_or(0.0)
    }

    pub fn path_lengths(&self) -> BTreeMap<MarkerId, usize> {
        self.state
            .borrow()
            .trails
            .iter()
            .map(|(id, t)| (id.clone(), t.buffer.len()))
            .collect()
    }

    pub fn time_range(&self) -> Option<TimeRange> {
        let state = self.state.borrow();
        let oldest = state
            .trails
            .values()
            .filter_map(|t| t.buffer.first())
            .map(|p| p.timestamp)
            .min()?;
        let newest = state
            .trails
            .values()
            .filter_map(|t| t.buffer.last())
            .map(|p| p.timestamp)
            .max()?;
        Some(TimeRange { oldest, newest })
    }

    pub fn path_points(&self, id: &str) -> Vec<PathPoint> {
        self.with_trail(id, |t| t.buffer.points().copied().collect())
            .unwrap_or_default()
    }

    /// Timestamp of the newest point of `id`.
    pub fn last_update(&self, id: &str) -> Option<i64> {
        self.with_trail(id, |t| t.buffer.last().map(|p| p.timestamp))
            .flatten()
    }

    /// Current line opacity of `id`; drops while the trail fades.
    pub fn trail_opacity(&self, id: &str) -> Option<f64> {
        self.with_trail(id, |t| t.opacity)
    }

    pub fn arrow_count(&self, id: &str) -> usize {
        self.with_trail(id, |t| t.arrows.len()).unwrap_or(0)
    }

    pub fn path_count(&self) -> usize {
        self.state.borrow().trails.len()
    }

    /// Ask the surface to frame the trail of `id`.
    pub fn fit_to_path(&self, id: &str) -> bool {
        let (bounds, surface) = {
            let state = self.state.borrow();
            let bounds = state.trails.get(id).and_then(|t| t.buffer.bounds());
            (bounds, state.surface())
        };
        match (bounds, surface) {
            (Some(bounds), Some(surface)) => {
                surface.fit_bounds(bounds);
                true
            }
            _ => false,
        }
    }

    fn with_trail<R>(&self, id: &str, f: impl FnOnce(&Trail) -> R) -> Option<R> {
        self.state.borrow().trails.get(id).map(f)
    }
}

impl Drop for PathVisualizer {
    fn drop(&mut self) {
        let cleared = self.clear_all_paths();
        if cleared > 0 {
            tracing::debug!(cleared, "path visualizer dropped, trails removed");
        }
    }
}

/// Midpoint and heading of up to [`MAX_ARROWS`] evenly spaced segments.
fn arrow_placements(coords: &[Coordinate]) -> SmallVec<[(Coordinate, f64); MAX_ARROWS]> {
    if coords.len() < 2 {
        return SmallVec::new();
    }
    let step = coords.len().div_ceil(MAX_ARROWS);
    (1..coords.len())
        .step_by(step)
        .map(|i| {
            let (a, b) = (coords[i - 1], coords[i]);
            (interpolate(a, b, 0.5), geo::heading_deg(a, b))
        })
        .collect()
}

fn detach_trail(surface: Option<&dyn MapSurface>, trail: &Trail) {
    let Some(surface) = surface else {
        return;
    };
    for overlay in trail.overlays() {
        surface.detach_overlay(overlay);
    }
}

/// Timer that waits out the idle period, then dims the trail step by step and finally
/// removes it. Every firing first checks that no newer point arrived.
fn fade_task(
    state: Weak<RefCell<VisualizerState>>,
    id: MarkerId,
    epoch: u64,
    line_opacity: f64,
) -> TimerTask {
    let mut decaying = false;
    Box::new(move |_now| {
        let Some(state) = state.upgrade() else {
            return TimerControl::Finish;
        };
        let step = {
            let mut guard = state.borrow_mut();
            match guard.trails.get_mut(&id) {
                Some(trail) if trail.fade_epoch == epoch => {
                    if decaying {
                        trail.opacity -= FADE_STEP;
                    } else {
                        decaying = true;
                        trail.opacity = line_opacity;
                    }
                    if trail.opacity <= OPACITY_EPSILON {
                        FadeStep::Expired
                    } else {
                        FadeStep::Dim(trail.opacity, trail.overlays().collect())
                    }
                }
                _ => FadeStep::Stale,
            }
        };

        match step {
            FadeStep::Stale => TimerControl::Finish,
            FadeStep::Dim(opacity, overlays) => {
                let surface = state.borrow().surface();
                if let Some(surface) = surface {
                    for overlay in overlays {
                        surface.set_overlay_opacity(overlay, opacity);
                    }
                }
                TimerControl::Reschedule(FADE_INTERVAL_MS)
            }
            FadeStep::Expired => {
                let (trail, surface) = {
                    let mut guard = state.borrow_mut();
                    (guard.trails.remove(&id), guard.surface())
                };
                if let Some(trail) = trail {
                    detach_trail(surface.as_deref(), &trail);
                }
                tracing::debug!(marker_id = %id, "trail faded out");
                TimerControl::Finish
            }
        }
    })
}

#[cfg(test)]
#[path = "../../tests/unit/trail/visualizer.rs"]
mod tests;
