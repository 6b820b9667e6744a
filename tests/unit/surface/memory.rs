use super::*;

fn style() -> TrailStyle {
    TrailStyle {
        color: "#4CAF50".to_owned(),
        opacity: 0.6,
        weight: 2.0,
        geodesic: true,
    }
}

#[test]
fn marker_failure_injection_is_one_shot_per_count() {
    let m = MemoryMarker::new(Coordinate::new(0.0, 0.0));
    m.fail_next_updates(1);
    assert!(m.set_coordinate(Coordinate::new(1.0, 1.0)).is_err());
    assert_eq!(m.coordinate(), Coordinate::new(0.0, 0.0));
    assert!(m.set_coordinate(Coordinate::new(2.0, 2.0)).is_ok());
    assert_eq!(m.coordinate(), Coordinate::new(2.0, 2.0));
    assert_eq!(m.update_count(), 1);
}

#[test]
fn marker_attachment_flag() {
    let m = MemoryMarker::new(Coordinate::new(0.0, 0.0));
    assert!(m.is_attached());
    m.detach();
    assert!(!m.is_attached());
    m.attach();
    assert!(m.is_attached());
}

#[test]
fn surface_tracks_overlays_and_double_detach() {
    let s = MemorySurface::new();
    let path = [Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)];
    let trail = s.attach_trail(&path, &style());
    let arrow = s.attach_arrow(
        Coordinate::new(0.5, 0.5),
        &ArrowStyle {
            color: "#4CAF50".to_owned(),
            opacity: 0.6,
            scale: 3.0,
            heading_deg: 45.0,
        },
    );
    assert_eq!(s.trail_count(), 1);
    assert_eq!(s.arrow_count(), 1);

    s.set_trail_path(trail, &path[..1]);
    assert_eq!(s.trail_paths(), vec![vec![path[0]]]);

    s.set_overlay_opacity(arrow, 0.2);
    assert_eq!(s.overlay(arrow).unwrap().opacity(), 0.2);

    s.detach_overlay(trail);
    s.detach_overlay(trail);
    assert_eq!(s.detached_count(), 1);
    assert_eq!(s.unknown_detach_count(), 1);
    assert_eq!(s.overlay_count(), 1);
}
