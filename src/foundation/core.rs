use std::borrow::Borrow;
use std::fmt;

use crate::foundation::error::{MarkerflowError, MarkerflowResult};

/// Opaque identifier of one visual marker instance.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct MarkerId(String);

impl MarkerId {
    /// Wrap an identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for MarkerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MarkerId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for MarkerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&MarkerId> for MarkerId {
    fn from(value: &MarkerId) -> Self {
        value.clone()
    }
}

/// Geographic position in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, positive north.
    pub latitude: f64,
    /// Longitude in degrees, positive east.
    pub longitude: f64,
}

impl Coordinate {
    /// Build a coordinate from latitude and longitude.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Build a coordinate, rejecting non-finite or out-of-range values.
    pub fn checked(latitude: f64, longitude: f64) -> MarkerflowResult<Self> {
        let c = Self::new(latitude, longitude);
        c.validate()?;
        Ok(c)
    }

    /// Check that both components are finite and inside the WGS84 ranges.
    pub fn validate(self) -> MarkerflowResult<()> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(MarkerflowError::validation(format!(
                "coordinate must be finite, got ({}, {})",
                self.latitude, self.longitude
            )));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(MarkerflowError::validation(format!(
                "latitude {} outside [-90, 90]",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(MarkerflowError::validation(format!(
                "longitude {} outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }

    /// Planar view used for bounds math (x = longitude, y = latitude).
    pub fn to_point(self) -> kurbo::Point {
        kurbo::Point::new(self.longitude, self.latitude)
    }
}

pub trait Lerp: Sized {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self;
}

impl Lerp for f64 {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self {
        // Endpoints are returned verbatim so a finished animation lands exactly on target.
        if t <= 0.0 {
            *a
        } else if t >= 1.0 {
            *b
        } else {
            a + (b - a) * t
        }
    }
}

impl Lerp for Coordinate {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self {
        Self {
            latitude: <f64 as Lerp>::lerp(&a.latitude, &b.latitude, t),
            longitude: <f64 as Lerp>::lerp(&a.longitude, &b.longitude, t),
        }
    }
}

/// Componentwise linear interpolation between two coordinates.
pub fn interpolate(start: Coordinate, end: Coordinate, progress: f64) -> Coordinate {
    Coordinate::lerp(&start, &end, progress)
}

/// Axis-aligned lat/lng box around a set of coordinates.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PathBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl PathBounds {
    /// Smallest box containing every coordinate; `None` for an empty input.
    pub fn from_coordinates<I>(coords: I) -> Option<Self>
    where
        I: IntoIterator<Item = Coordinate>,
    {
        let mut iter = coords.into_iter();
        let first = iter.next()?.to_point();
        let rect = iter.fold(kurbo::Rect::from_points(first, first), |r, c| {
            r.union_pt(c.to_point())
        });
        Some(Self::from_rect(rect))
    }

    fn from_rect(rect: kurbo::Rect) -> Self {
        Self {
            north: rect.y1,
            south: rect.y0,
            east: rect.x1,
            west: rect.x0,
        }
    }

    pub fn contains(&self, c: Coordinate) -> bool {
        (self.south..=self.north).contains(&c.latitude)
            && (self.west..=self.east).contains(&c.longitude)
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.north + self.south) / 2.0,
            (self.east + self.west) / 2.0,
        )
    }
}

/// One entry of the external position feed.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    pub marker_id: MarkerId,
    pub coordinate: Coordinate,
    /// Milliseconds on the feed's clock.
    pub timestamp: i64,
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
