use std::collections::VecDeque;

use crate::foundation::core::{Coordinate, PathBounds};
use crate::foundation::geo;

/// One recorded position of a marker.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PathPoint {
    pub position: Coordinate,
    /// Milliseconds.
    pub timestamp: i64,
}

/// Chronological, capacity-bounded history of one marker's positions.
///
/// Pushing past capacity drops the oldest points first.
#[derive(Clone, Debug)]
pub struct PathBuffer {
    points: VecDeque<PathPoint>,
    capacity: usize,
}

impl PathBuffer {
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, point: PathPoint) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Points, oldest first.
    pub fn points(&self) -> impl ExactSizeIterator<Item = &PathPoint> + '_ {
        self.points.iter()
    }

    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.points.iter().map(|p| p.position).collect()
    }

    pub fn first(&self) -> Option<&PathPoint> {
        self.points.front()
    }

    pub fn last(&self) -> Option<&PathPoint> {
        self.points.back()
    }

    pub fn bounds(&self) -> Option<PathBounds> {
        PathBounds::from_coordinates(self.points.iter().map(|p| p.position))
    }

    /// Sum of great-circle segment lengths, meters.
    pub fn distance_m(&self) -> f64 {
        geo::path_length_m(self.points.iter().map(|p| p.position))
    }

    /// Milliseconds between the oldest and newest point.
    pub fn time_span_ms(&self) -> Option<i64> {
        Some(self.last()?.timestamp - self.first()?.timestamp)
    }

    /// Total distance over elapsed time, km/h. 0 with fewer than two points or no elapsed time.
    pub fn average_speed_kmh(&self) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        let seconds = self.time_span_ms().unwrap_or(0) as f64 / 1000.0;
        geo::speed_kmh(self.distance_m(), seconds)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/trail/buffer.rs"]
mod tests;
