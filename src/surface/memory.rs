use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::foundation::core::{Coordinate, PathBounds};
use crate::foundation::error::{MarkerflowError, MarkerflowResult};
use crate::surface::{ArrowStyle, MapSurface, MarkerHandle, OverlayId, TrailStyle};

/// Marker kept in memory. Can be told to reject updates to exercise failure paths.
#[derive(Debug)]
pub struct MemoryMarker {
    coordinate: Cell<Coordinate>,
    attached: Cell<bool>,
    failures_remaining: Cell<u32>,
    updates: Cell<u64>,
}

impl MemoryMarker {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate: Cell::new(coordinate),
            attached: Cell::new(true),
            failures_remaining: Cell::new(0),
            updates: Cell::new(0),
        }
    }

    pub fn attach(&self) {
        self.attached.set(true);
    }

    pub fn detach(&self) {
        self.attached.set(false);
    }

    /// Reject the next `n` calls to `set_coordinate`.
    pub fn fail_next_updates(&self, n: u32) {
        self.failures_remaining.set(n);
    }

    /// Number of accepted coordinate updates.
    pub fn update_count(&self) -> u64 {
        self.updates.get()
    }
}

impl MarkerHandle for MemoryMarker {
    fn coordinate(&self) -> Coordinate {
        self.coordinate.get()
    }

    fn set_coordinate(&self, coordinate: Coordinate) -> MarkerflowResult<()> {
        let remaining = self.failures_remaining.get();
        if remaining > 0 {
            self.failures_remaining.set(remaining - 1);
            return Err(MarkerflowError::render("marker rejected coordinate update"));
        }
        self.coordinate.set(coordinate);
        self.updates.set(self.updates.get() + 1);
        Ok(())
    }

    fn is_attached(&self) -> bool {
        self.attached.get()
    }
}

/// Overlay as recorded by [`MemorySurface`].
#[derive(Clone, Debug, PartialEq)]
pub enum Overlay {
    Trail {
        path: Vec<Coordinate>,
        style: TrailStyle,
        opacity: f64,
    },
    Arrow {
        position: Coordinate,
        style: ArrowStyle,
        opacity: f64,
    },
}

impl Overlay {
    pub fn opacity(&self) -> f64 {
        match self {
            Self::Trail { opacity, .. } | Self::Arrow { opacity, .. } => *opacity,
        }
    }
}

#[derive(Debug, Default)]
struct SurfaceState {
    next_id: u64,
    overlays: BTreeMap<OverlayId, Overlay>,
    detached: u64,
    unknown_detaches: u64,
    last_fit: Option<PathBounds>,
}

/// Map surface that records overlays instead of drawing them.
#[derive(Debug, Default)]
pub struct MemorySurface {
    state: RefCell<SurfaceState>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overlay(&self, id: OverlayId) -> Option<Overlay> {
        self.state.borrow().overlays.get(&id).cloned()
    }

    pub fn overlay_count(&self) -> usize {
        self.state.borrow().overlays.len()
    }

    pub fn trail_count(&self) -> usize {
        self.state
            .borrow()
            .overlays
            .values()
            .filter(|o| matches!(o, Overlay::Trail { .. }))
            .count()
    }

    pub fn arrow_count(&self) -> usize {
        self.overlay_count() - self.trail_count()
    }

    /// Paths of every attached trail, in attach order.
    pub fn trail_paths(&self) -> Vec<Vec<Coordinate>> {
        self.state
            .borrow()
            .overlays
            .values()
            .filter_map(|o| match o {
                Overlay::Trail { path, .. } => Some(path.clone()),
                Overlay::Arrow { .. } => None,
            })
            .collect()
    }

    /// Successful detaches so far.
    pub fn detached_count(&self) -> u64 {
        self.state.borrow().detached
    }

    /// Detach calls for overlays that were not attached (double teardown).
    pub fn unknown_detach_count(&self) -> u64 {
        self.state.borrow().unknown_detaches
    }

    pub fn last_fit(&self) -> Option<PathBounds> {
        self.state.borrow().last_fit
    }

    fn insert(&self, overlay: Overlay) -> OverlayId {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = OverlayId(state.next_id);
        state.overlays.insert(id, overlay);
        id
    }
}

impl MapSurface for MemorySurface {
    fn attach_trail(&self, path: &[Coordinate], style: &TrailStyle) -> OverlayId {
        self.insert(Overlay::Trail {
            path: path.to_vec(),
            style: style.clone(),
            opacity: style.opacity,
        })
    }

    fn set_trail_path(&self, overlay: OverlayId, new_path: &[Coordinate]) {
        let mut state = self.state.borrow_mut();
        match state.overlays.get_mut(&overlay) {
            Some(Overlay::Trail { path, .. }) => *path = new_path.to_vec(),
            _ => tracing::warn!(?overlay, "set_trail_path on unknown trail overlay"),
        }
    }

    fn attach_arrow(&self, position: Coordinate, style: &ArrowStyle) -> OverlayId {
        self.insert(Overlay::Arrow {
            position,
            style: style.clone(),
            opacity: style.opacity,
        })
    }

    fn set_overlay_opacity(&self, overlay: OverlayId, value: f64) {
        let mut state = self.state.borrow_mut();
        match state.overlays.get_mut(&overlay) {
            Some(Overlay::Trail { opacity, .. } | Overlay::Arrow { opacity, .. }) => {
                *opacity = value
            }
            None => tracing::warn!(?overlay, "set_overlay_opacity on unknown overlay"),
        }
    }

    fn detach_overlay(&self, overlay: OverlayId) {
        let mut state = self.state.borrow_mut();
        if state.overlays.remove(&overlay).is_some() {
            state.detached += 1;
        } else {
            state.unknown_detaches += 1;
            tracing::warn!(?overlay, "detach of unknown overlay");
        }
    }

    fn fit_bounds(&self, bounds: PathBounds) {
        self.state.borrow_mut().last_fit = Some(bounds);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/surface/memory.rs"]
mod tests;
