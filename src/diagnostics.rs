//! Read-only health and debug views over the animation and trail services.
//!
//! Nothing here mutates the services it reads from; every call is a point-in-time snapshot.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::animation::tracker::{AnimationState, AnimationTracker};
use crate::foundation::core::{MarkerId, PathBounds};
use crate::perf::tracker::{Metric, PerformanceTracker};
use crate::surface::{MapSurface, MarkerHandle};
use crate::trail::visualizer::PathVisualizer;

/// What the host application knows about its map.
#[derive(Clone, Default)]
pub struct MapState {
    pub surface: Option<Rc<dyn MapSurface>>,
    pub markers: BTreeMap<MarkerId, Rc<dyn MarkerHandle>>,
    pub is_loaded: bool,
    pub debug_mode: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStats {
    pub total_markers: usize,
    pub visible_markers: usize,
    pub invisible_markers: usize,
    pub paths_visualized: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapHealth {
    pub healthy: bool,
    pub issues: Vec<String>,
    pub stats: HealthStats,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerStatus {
    pub id: MarkerId,
    pub visible: bool,
    pub has_path: bool,
    pub path_length: usize,
    /// Timestamp of the newest trail point, if the marker has a trail.
    pub last_update: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathDebugInfo {
    pub marker_id: MarkerId,
    pub point_count: usize,
    /// Meters.
    pub total_distance: f64,
    /// km/h.
    pub average_speed: f64,
    pub last_update: i64,
    pub bounds: PathBounds,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationState {
    pub enabled: bool,
    pub active_paths: usize,
    pub total_points: usize,
    pub average_path_length: f64,
    /// 0 when there are no points.
    pub oldest_point: i64,
    pub newest_point: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathVisualizationSummary {
    pub enabled: bool,
    pub total_paths: usize,
    pub average_path_length: f64,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationSummary {
    pub active: usize,
    /// Lowest instantaneous fps among animations that rendered at least one frame.
    pub lowest_fps: Option<f64>,
    pub animations: Vec<AnimationState>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugStats {
    pub health: MapHealth,
    pub markers: Vec<MarkerStatus>,
    pub path_visualization: PathVisualizationSummary,
}

/// Everything the diagnostics can say at one instant.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub stats: DebugStats,
    pub visualization: VisualizationState,
    pub paths: Vec<PathDebugInfo>,
    pub animations: AnimationSummary,
    pub metrics: Vec<Metric>,
}

/// Borrowing view over the services being diagnosed.
#[derive(Clone, Copy)]
pub struct Diagnostics<'a> {
    visualizer: &'a PathVisualizer,
    tracker: &'a AnimationTracker,
    performance: &'a PerformanceTracker,
}

impl<'a> Diagnostics<'a> {
    pub fn new(
        visualizer: &'a PathVisualizer,
        tracker: &'a AnimationTracker,
        performance: &'a PerformanceTracker,
    ) -> Self {
        Self {
            visualizer,
            tracker,
            performance,
        }
    }

    pub fn map_health(&self, map: &MapState) -> MapHealth {
        let mut issues = Vec::new();
        if map.surface.is_none() {
            issues.push("map surface not initialized".to_owned());
        }
        if !map.is_loaded {
            issues.push("map not marked as loaded".to_owned());
        }

        let total_markers = map.markers.len();
        let invisible_markers = map.markers.values().filter(|m| !m.is_attached()).count();
        let paths_visualized = self.active_paths();

        if total_markers == 0 {
            issues.push("no markers present on map".to_owned());
        }
        if invisible_markers > 0 {
            issues.push(format!("{invisible_markers} markers are invisible"));
        }
        if map.debug_mode && paths_visualized == 0 && total_markers > 0 {
            issues.push("no marker paths are being visualized".to_owned());
        }

        MapHealth {
            healthy: issues.is_empty(),
            issues,
            stats: HealthStats {
                total_markers,
                visible_markers: total_markers - invisible_markers,
                invisible_markers,
                paths_visualized,
            },
        }
    }

    pub fn marker_statuses(&self, map: &MapState) -> Vec<MarkerStatus> {
        map.markers
            .iter()
            .map(|(id, marker)| {
                let path_length = self.visualizer.path_length(id.as_str());
                MarkerStatus {
                    id: id.clone(),
                    visible: marker.is_attached(),
                    has_path: path_length > 0,
                    path_length,
                    last_update: self.visualizer.last_update(id.as_str()),
                }
            })
            .collect()
    }

    pub fn path_debug_info(&self, id: &str) -> Option<PathDebugInfo> {
        let point_count = self.visualizer.path_length(id);
        if point_count == 0 {
            return None;
        }
        Some(PathDebugInfo {
            marker_id: MarkerId::from(id),
            point_count,
            total_distance: self.visualizer.path_distance(id),
            average_speed: self.visualizer.average_speed(id),
            last_update: self.visualizer.last_update(id)?,
            bounds: self.visualizer.path_bounds(id)?,
        })
    }

    pub fn visualization_state(&self) -> VisualizationState {
        let lengths = self.visualizer.path_lengths();
        let active_paths = lengths.values().filter(|n| **n > 0).count();
        let total_points: usize = lengths.values().sum();
        let average_path_length = if active_paths > 0 {
            total_points as f64 / active_paths as f64
        } else {
            0.0
        };
        let range = self.visualizer.time_range();
        VisualizationState {
            enabled: self.visualizer.is_visible(),
            active_paths,
            total_points,
            average_path_length,
            oldest_point: range.map_or(0, |r| r.oldest),
            newest_point: range.map_or(0, |r| r.newest),
        }
    }

    pub fn animation_summary(&self) -> AnimationSummary {
        let animations = self.tracker.active_animations();
        let lowest_fps = animations
            .iter()
            .filter(|a| a.frame_count > 0)
            .map(|a| a.fps)
            .min_by(f64::total_cmp);
        AnimationSummary {
            active: animations.len(),
            lowest_fps,
            animations,
        }
    }

    pub fn debug_stats(&self, map: &MapState) -> DebugStats {
        let visualization = self.visualization_state();
        DebugStats {
            health: self.map_health(map),
            markers: self.marker_statuses(map),
            path_visualization: PathVisualizationSummary {
                enabled: visualization.enabled,
                total_paths: visualization.active_paths,
                average_path_length: visualization.average_path_length,
            },
        }
    }

    pub fn report(&self, map: &MapState) -> DiagnosticsReport {
        let paths = self
            .visualizer
            .path_lengths()
            .keys()
            .filter_map(|id| self.path_debug_info(id.as_str()))
            .collect();
        DiagnosticsReport {
            stats: self.debug_stats(map),
            visualization: self.visualization_state(),
            paths,
            animations: self.animation_summary(),
            metrics: self.performance.metrics(),
        }
    }

    /// Emit the trail figures of one marker at debug level.
    pub fn log_marker_debug_info(&self, id: &str) {
        match self.path_debug_info(id) {
            Some(info) => tracing::debug!(
                marker_id = id,
                points = info.point_count,
                distance_km = format_args!("{:.2}", info.total_distance / 1000.0),
                speed_kmh = format_args!("{:.1}", info.average_speed),
                bounds = ?info.bounds,
                "marker path details"
            ),
            None => tracing::debug!(marker_id = id, "no path data for marker"),
        }
    }

    fn active_paths(&self) -> usize {
        self.visualizer
            .path_lengths()
            .values()
            .filter(|n| **n > 0)
            .count()
    }
}

#[cfg(test)]
#[path = "../tests/unit/diagnostics/diagnostics.rs"]
mod tests;
