use super::*;

fn point(lat: f64, lng: f64, timestamp: i64) -> PathPoint {
    PathPoint {
        position: Coordinate::new(lat, lng),
        timestamp,
    }
}

#[test]
fn drops_oldest_points_past_capacity() {
    let mut buf = PathBuffer::new(3);
    for i in 0..5 {
        buf.push(point(i as f64, 0.0, i));
    }
    assert_eq!(buf.len(), 3);
    let stamps: Vec<i64> = buf.points().map(|p| p.timestamp).collect();
    assert_eq!(stamps, vec![2, 3, 4]);
}

#[test]
fn zero_capacity_keeps_one_point() {
    let mut buf = PathBuffer::new(0);
    buf.push(point(0.0, 0.0, 0));
    buf.push(point(1.0, 0.0, 1));
    assert_eq!(buf.capacity(), 1);
    assert_eq!(buf.last().unwrap().timestamp, 1);
}

#[test]
fn distance_is_sum_of_segments() {
    let mut buf = PathBuffer::new(10);
    let a = Coordinate::new(0.0, 0.0);
    let b = Coordinate::new(0.0, 0.01);
    let c = Coordinate::new(0.01, 0.01);
    buf.push(PathPoint { position: a, timestamp: 0 });
    buf.push(PathPoint { position: b, timestamp: 1_000 });
    buf.push(PathPoint { position: c, timestamp: 2_000 });
    let expected = geo::distance_m(a, b) + geo::distance_m(b, c);
    assert!((buf.distance_m() - expected).abs() < 1e-9);
}

#[test]
fn average_speed_uses_first_to_last_span() {
    let mut buf = PathBuffer::new(10);
    buf.push(point(0.0, 0.0, 0));
    assert_eq!(buf.average_speed_kmh(), 0.0);
    buf.push(point(0.0, 0.01, 10_000));
    let expected = buf.distance_m() / 10.0 * 3.6;
    assert!((buf.average_speed_kmh() - expected).abs() < 1e-9);
    assert_eq!(buf.time_span_ms(), Some(10_000));
}

#[test]
fn same_timestamp_speed_is_zero() {
    let mut buf = PathBuffer::new(10);
    buf.push(point(0.0, 0.0, 5));
    buf.push(point(1.0, 1.0, 5));
    assert_eq!(buf.average_speed_kmh(), 0.0);
}

#[test]
fn bounds_cover_every_point() {
    let mut buf = PathBuffer::new(10);
    assert!(buf.bounds().is_none());
    buf.push(point(1.0, -2.0, 0));
    buf.push(point(-3.0, 4.0, 1));
    let b = buf.bounds().unwrap();
    assert_eq!((b.north, b.south, b.east, b.west), (1.0, -3.0, 4.0, -2.0));
}
