//! Collision feedback: solved contact forces turned into damage.
//!
//! Pairs flagged by the contact policy are read back from the narrow phase
//! once the solver has run. Each entry is consumed exactly once, in the same
//! micro step it was created.

use glam::Vec3;
use rapier3d::prelude::*;
use tracing::{debug, trace};

use crate::body::Body;
use crate::contact::FeedbackRequest;
use crate::events::{EventBuffer, EventTarget, ScriptEvent};
use crate::geom::{DamageSink, Geom};
use crate::registry::{BodyId, GeomId, Registry};
use crate::vec_from_rapier;

/// Force captured for one solved pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionFeedback {
    /// First geom.
    pub geom1: GeomId,
    /// Second geom.
    pub geom2: GeomId,
    /// Force on the first geom.
    pub f1: Vec3,
    /// Force on the second geom.
    pub f2: Vec3,
}

impl CollisionFeedback {
    /// Builds an entry from the pair's total impulse over `step` seconds.
    pub fn from_impulse(geom1: GeomId, geom2: GeomId, impulse: Vec3, step: f32) -> Self {
        let force = impulse / step;
        Self {
            geom1,
            geom2,
            f1: force,
            f2: -force,
        }
    }

    /// The larger of the two force magnitudes.
    pub fn magnitude(&self) -> f32 {
        self.f1.length().max(self.f2.length())
    }
}

/// Reads solved impulses for the requested pairs.
pub fn collect_feedback(
    requests: &[FeedbackRequest],
    narrow_phase: &NarrowPhase,
    step: f32,
) -> Vec<CollisionFeedback> {
    requests
        .iter()
        .filter_map(|request| {
            let pair = narrow_phase.contact_pair(request.collider1, request.collider2)?;
            let impulse = vec_from_rapier(&pair.total_impulse());
            Some(CollisionFeedback::from_impulse(
                request.geom1,
                request.geom2,
                impulse,
                step,
            ))
        })
        .collect()
}

/// Damage handed to buffers while resolving feedback.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeedbackSummary {
    /// Entries consumed.
    pub resolved: usize,
    /// Sum of `force · step` over every buffer hit.
    pub damage_dealt: f32,
}

/// Drains `feedback`, passing the larger force of each entry to both geoms.
pub fn resolve_feedback(
    feedback: &mut Vec<CollisionFeedback>,
    geoms: &mut Registry<GeomId, Geom>,
    bodies: &mut Registry<BodyId, Body>,
    events: &mut EventBuffer,
    step: f32,
) -> FeedbackSummary {
    let mut summary = FeedbackSummary::default();
    for entry in feedback.drain(..) {
        let force = entry.magnitude();
        trace!(geom1 = ?entry.geom1, geom2 = ?entry.geom2, force, "collision feedback");
        summary.damage_dealt += damage_geom(entry.geom1, force, step, geoms, bodies, events);
        summary.damage_dealt += damage_geom(entry.geom2, force, step, geoms, bodies, events);
        summary.resolved += 1;
    }
    summary
}

/// Applies a hit to wherever the geom's damage goes. Returns the damage
/// actually applied.
pub(crate) fn damage_geom(
    id: GeomId,
    force: f32,
    step: f32,
    geoms: &mut Registry<GeomId, Geom>,
    bodies: &mut Registry<BodyId, Body>,
    events: &mut EventBuffer,
) -> f32 {
    let Some(geom) = geoms.get_mut(id) else {
        return 0.0;
    };
    match geom.sink_mut() {
        DamageSink::Disabled => 0.0,
        DamageSink::Local(buffer) => {
            if force < buffer.threshold {
                return 0.0;
            }
            if buffer.damage(force, step) {
                debug!(geom = ?id, "geom buffer depleted");
                events.queue(ScriptEvent::BufferDepleted, EventTarget::Geom(id));
            }
            force * step
        }
        DamageSink::Forward(body_id) => {
            let body_id = *body_id;
            damage_body(body_id, force, step, bodies, events)
        }
    }
}

/// Applies a hit to a body's buffer. Returns the damage actually applied.
pub(crate) fn damage_body(
    id: BodyId,
    force: f32,
    step: f32,
    bodies: &mut Registry<BodyId, Body>,
    events: &mut EventBuffer,
) -> f32 {
    let Some(body) = bodies.get_mut(id) else {
        return 0.0;
    };
    let Some(threshold) = body.buffer().map(|b| b.threshold) else {
        return 0.0;
    };
    if force < threshold {
        return 0.0;
    }
    if body.damage_buffer(force, step) {
        debug!(body = ?id, "body buffer depleted");
        events.queue(ScriptEvent::BufferDepleted, EventTarget::Body(id));
    }
    force * step
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forces_are_opposite() {
        let mut geoms: Registry<GeomId, ()> = Registry::new();
        let fb = CollisionFeedback::from_impulse(
            geoms.insert(()),
            geoms.insert(()),
            Vec3::new(0.0, 0.0, 0.5),
            0.01,
        );
        assert!((fb.f1 - Vec3::new(0.0, 0.0, 50.0)).length() < 1e-4);
        assert!((fb.f1 + fb.f2).length() < 1e-6);
        assert!((fb.magnitude() - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_magnitude_takes_larger_side() {
        let mut geoms: Registry<GeomId, ()> = Registry::new();
        let fb = CollisionFeedback {
            geom1: geoms.insert(()),
            geom2: geoms.insert(()),
            f1: Vec3::new(3.0, 4.0, 0.0),
            f2: Vec3::new(0.0, 0.0, -7.0),
        };
        assert_eq!(fb.magnitude(), 7.0);
    }
}
