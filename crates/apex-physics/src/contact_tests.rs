//! Tests for contact classification.

use super::*;

fn surface(mu: f32, bounce: f32, spring: f32) -> Surface {
    Surface {
        mu,
        bounce,
        spring,
        ..Surface::default()
    }
}

#[test]
fn test_physical_pair_combines_surfaces() {
    let class = classify_pair(
        &surface(0.5, 0.1, f32::INFINITY),
        &surface(0.6, 0.2, f32::INFINITY),
        0.01,
    );
    assert!(class.colliding1);
    assert!(class.colliding2);
    let PairResponse::Physical(params) = class.response else {
        panic!("expected a physical contact");
    };
    assert!((params.friction - 0.3).abs() < 1e-6);
    assert!((params.restitution - 0.3).abs() < 1e-6);
    assert!(params.softness.is_none());
}

#[test]
fn test_sensor_pair_has_no_response() {
    let sensor = Surface::sensor();
    let car = surface(1.0, 0.0, f32::INFINITY);
    let class = classify_pair(&sensor, &car, 0.01);
    assert_eq!(class.response, PairResponse::Sensor);
    // The sensor sees the car; the car does not see the sensor.
    assert!(class.colliding1);
    assert!(!class.colliding2);

    let class = classify_pair(&car, &sensor, 0.01);
    assert_eq!(class.response, PairResponse::Sensor);
    assert!(!class.colliding1);
    assert!(class.colliding2);
}

#[test]
fn test_two_sensors_do_not_see_each_other() {
    let class = classify_pair(&Surface::sensor(), &Surface::sensor(), 0.01);
    assert_eq!(class.response, PairResponse::Sensor);
    assert!(!class.colliding1);
    assert!(!class.colliding2);
}

#[test]
fn test_soft_surface_produces_softness() {
    let class = classify_pair(
        &surface(1.0, 0.0, 5000.0),
        &surface(1.0, 0.0, f32::INFINITY),
        0.01,
    );
    let PairResponse::Physical(params) = class.response else {
        panic!("expected a physical contact");
    };
    assert!(params.softness.is_some());
}

#[test]
fn test_wheel_side_rules() {
    assert_eq!(wheel_side(true, true, false, false), Some(WheelSide::First));
    assert_eq!(wheel_side(false, false, true, true), Some(WheelSide::Second));
    // A wheel must be on a body.
    assert_eq!(wheel_side(true, false, false, true), None);
    assert_eq!(wheel_side(false, true, true, false), None);
    // Wheel against wheel is a plain contact.
    assert_eq!(wheel_side(true, true, true, true), None);
    assert_eq!(wheel_side(false, true, false, true), None);
}

#[test]
fn test_feedback_requests_are_deduplicated() {
    let mut geoms: Registry<GeomId, ()> = Registry::new();
    let request = FeedbackRequest {
        geom1: geoms.insert(()),
        geom2: geoms.insert(()),
        collider1: ColliderHandle::from_raw_parts(0, 0),
        collider2: ColliderHandle::from_raw_parts(1, 0),
    };
    let mut outcome = ContactOutcome::default();
    outcome.request_feedback(request);
    outcome.request_feedback(request);
    assert_eq!(outcome.feedback.len(), 1);
}
