//! Capabilities consumed from the map rendering library.
//!
//! The engine never draws anything itself. It computes coordinates, paths and opacities
//! and hands them to a [`MarkerHandle`] or [`MapSurface`] implementation. One adapter per
//! rendering technology implements these traits; [`memory`] holds the in-process adapter
//! used by the simulator and the tests.

pub mod memory;

use crate::foundation::core::{Coordinate, PathBounds};
use crate::foundation::error::MarkerflowResult;

/// Renderable object representing one tracked actor.
pub trait MarkerHandle {
    /// Position the marker is currently rendered at.
    fn coordinate(&self) -> Coordinate;

    /// Move the rendered marker. Failures are reported, never panicked.
    fn set_coordinate(&self, coordinate: Coordinate) -> MarkerflowResult<()>;

    /// Whether the marker is currently attached to a map surface.
    fn is_attached(&self) -> bool;
}

/// Identifier of an overlay attached to a [`MapSurface`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct OverlayId(pub u64);

/// Stroke settings for a trail polyline.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailStyle {
    pub color: String,
    pub opacity: f64,
    pub weight: f64,
    /// Draw segments as great-circle arcs.
    pub geodesic: bool,
}

/// Directional arrow glyph placed along a trail.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrowStyle {
    pub color: String,
    pub opacity: f64,
    pub scale: f64,
    /// Rotation in degrees clockwise from north.
    pub heading_deg: f64,
}

/// Rendering canvas markers and overlays are attached to.
pub trait MapSurface {
    fn attach_trail(&self, path: &[Coordinate], style: &TrailStyle) -> OverlayId;

    /// Replace the whole polyline of an attached trail.
    fn set_trail_path(&self, overlay: OverlayId, path: &[Coordinate]);

    fn attach_arrow(&self, position: Coordinate, style: &ArrowStyle) -> OverlayId;

    fn set_overlay_opacity(&self, overlay: OverlayId, opacity: f64);

    fn detach_overlay(&self, overlay: OverlayId);

    /// Move the viewport so `bounds` is visible.
    fn fit_bounds(&self, bounds: PathBounds);
}
