//! Spherical-earth helpers for trail statistics and arrow placement.

use crate::foundation::core::Coordinate;

/// Sphere radius in meters (WGS84 equatorial radius, as used by web map libraries).
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Great-circle distance in meters (haversine).
pub fn distance_m(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Sum of consecutive segment distances along a path, in meters.
pub fn path_length_m<I>(coords: I) -> f64
where
    I: IntoIterator<Item = Coordinate>,
{
    let mut iter = coords.into_iter();
    let Some(mut prev) = iter.next() else {
        return 0.0;
    };
    let mut total = 0.0;
    for c in iter {
        total += distance_m(prev, c);
        prev = c;
    }
    total
}

/// Initial bearing from `a` to `b` in degrees, normalized to [-180, 180).
pub fn heading_deg(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let deg = y.atan2(x).to_degrees();
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

/// Average speed in km/h for `meters` covered in `seconds`; zero for an empty span.
pub fn speed_kmh(meters: f64, seconds: f64) -> f64 {
    if seconds <= 0.0 {
        return 0.0;
    }
    (meters / seconds) * 3.6
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/geo.rs"]
mod tests;
