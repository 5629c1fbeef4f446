//! Contact policy run inside Rapier's narrow phase.
//!
//! For every contact manifold Rapier produces, [`ContactPolicy`] resolves the
//! effective surface on both sides, decides whether the pair is a sensor,
//! combines the surfaces, hands wheel contacts to their tyre model and
//! records which pairs need force feedback. The decisions themselves are the
//! pure functions [`classify_pair`] and [`wheel_side`].
//!
//! Collision flags are read after the step by [`collision_marks`]. Rapier
//! skips the hooks for sleeping islands but keeps their manifolds, so the
//! flags survive a body falling asleep.

use std::sync::{Mutex, PoisonError};

use glam::Vec3;
use rapier3d::prelude::*;
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::geom::Geom;
use crate::registry::{GeomId, Registry};
use crate::surface::{ContactParams, Surface, combine_surfaces};
use crate::wheel::WheelContact;
use crate::{quat_from_rapier, vec_from_rapier};

/// How a touching pair is resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PairResponse {
    /// Overlap is reported but nothing pushes back.
    Sensor,
    /// A regular contact with these parameters.
    Physical(ContactParams),
}

/// Outcome of [`classify_pair`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairClassification {
    /// The first geom counts as colliding.
    pub colliding1: bool,
    /// The second geom counts as colliding.
    pub colliding2: bool,
    /// Contact response.
    pub response: PairResponse,
}

/// Decides collision flags and response for two effective surfaces.
///
/// A side is colliding when the *other* side's spring is non-zero, so a
/// sensor sees everything that touches it while nothing sees the sensor.
pub fn classify_pair(s1: &Surface, s2: &Surface, step: f32) -> PairClassification {
    let response = if s1.is_sensor() || s2.is_sensor() {
        PairResponse::Sensor
    } else {
        PairResponse::Physical(combine_surfaces(s1, s2, step))
    };
    PairClassification {
        colliding1: !s2.is_sensor(),
        colliding2: !s1.is_sensor(),
        response,
    }
}

/// Which side of a pair gets wheel treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelSide {
    /// The first geom is the wheel.
    First,
    /// The second geom is the wheel.
    Second,
}

/// Returns the wheel side when exactly one geom is a wheel on a body.
///
/// Two wheels touching use the plain combined parameters.
pub fn wheel_side(wheel1: bool, body1: bool, wheel2: bool, body2: bool) -> Option<WheelSide> {
    match (wheel1, wheel2) {
        (true, false) if body1 => Some(WheelSide::First),
        (false, true) if body2 => Some(WheelSide::Second),
        _ => None,
    }
}

/// A collision flag to set after the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionMark {
    /// Geom touched.
    pub geom: GeomId,
    /// Triangle touched, for trimesh geoms.
    pub triangle: Option<u32>,
    /// Whether the geom's `colliding` flag is set.
    pub colliding: bool,
}

/// A pair whose solved impulse must reach the damage buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedbackRequest {
    /// First geom.
    pub geom1: GeomId,
    /// Second geom.
    pub geom2: GeomId,
    /// First collider.
    pub collider1: ColliderHandle,
    /// Second collider.
    pub collider2: ColliderHandle,
}

/// Everything the policy recorded during one detection pass.
#[derive(Debug, Default)]
pub struct ContactOutcome {
    /// Feedback requests, one per collider pair.
    pub feedback: Vec<FeedbackRequest>,
    seen: FxHashSet<(ColliderHandle, ColliderHandle)>,
}

impl ContactOutcome {
    fn request_feedback(&mut self, request: FeedbackRequest) {
        if self.seen.insert((request.collider1, request.collider2)) {
            self.feedback.push(request);
        }
    }
}

/// Rapier hooks implementing the surface policy for one micro step.
pub struct ContactPolicy<'a> {
    geoms: &'a Registry<GeomId, Geom>,
    step: f32,
    contact_points: usize,
    default_erp: f32,
    outcome: Mutex<ContactOutcome>,
}

impl<'a> ContactPolicy<'a> {
    /// Creates the policy for a micro step of `step` seconds.
    pub fn new(
        geoms: &'a Registry<GeomId, Geom>,
        step: f32,
        contact_points: u32,
        default_erp: f32,
    ) -> Self {
        Self {
            geoms,
            step,
            contact_points: contact_points.max(1) as usize,
            default_erp: if default_erp > 0.0 { default_erp } else { 1.0 },
            outcome: Mutex::new(ContactOutcome::default()),
        }
    }

    /// Consumes the policy, returning what it recorded.
    pub fn into_outcome(self) -> ContactOutcome {
        self.outcome
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn geom_of(&self, colliders: &ColliderSet, handle: ColliderHandle) -> Option<(GeomId, &Geom)> {
        let id = GeomId::from_user_data(colliders.get(handle)?.user_data);
        self.geoms.get(id).map(|geom| (id, geom))
    }

    fn wheel_params(
        &self,
        context: &ContactModificationContext,
        side: WheelSide,
        (id1, g1, s1): (GeomId, &Geom, Surface),
        (id2, g2, s2): (GeomId, &Geom, Surface),
        params: ContactParams,
    ) -> ContactParams {
        let (wheel_geom, wheel_body, other_surface) = match side {
            WheelSide::First => (g1, context.rigid_body1, s2),
            WheelSide::Second => (g2, context.rigid_body2, s1),
        };
        let (Some(wheel), Some(body)) = (
            wheel_geom.wheel(),
            wheel_body.and_then(|h| context.bodies.get(h)),
        ) else {
            return params;
        };
        let axle = quat_from_rapier(&body.rotation()) * Vec3::Z;
        let depth = context
            .solver_contacts
            .iter()
            .map(|c| -c.dist)
            .fold(0.0_f32, f32::max);
        wheel.add_contact(&WheelContact {
            body1: g1.body(),
            body2: g2.body(),
            geom1: id1,
            geom2: id2,
            wheel_is_first: side == WheelSide::First,
            axle,
            other_surface,
            params,
            normal: vec_from_rapier(&*context.normal),
            depth,
            stepsize: self.step,
        })
    }
}

impl PhysicsHooks for ContactPolicy<'_> {
    fn modify_solver_contacts(&self, context: &mut ContactModificationContext) {
        // Same body, or two static geoms: nothing to resolve.
        if context.rigid_body1 == context.rigid_body2 {
            return;
        }
        let (Some((id1, g1)), Some((id2, g2))) = (
            self.geom_of(context.colliders, context.collider1),
            self.geom_of(context.colliders, context.collider2),
        ) else {
            return;
        };

        let tri1 = g1.has_triangles().then_some(context.manifold.subshape1);
        let tri2 = g2.has_triangles().then_some(context.manifold.subshape2);
        let s1 = g1.surface_for_triangle(tri1);
        let s2 = g2.surface_for_triangle(tri2);
        let class = classify_pair(&s1, &s2, self.step);

        let touching = context.solver_contacts.iter().any(|c| c.dist <= 0.0);
        let params = match class.response {
            PairResponse::Sensor => {
                context.solver_contacts.clear();
                None
            }
            PairResponse::Physical(params) => Some(params),
        };

        let wheel = params.and_then(|_| {
            wheel_side(
                g1.wheel().is_some(),
                context.rigid_body1.is_some(),
                g2.wheel().is_some(),
                context.rigid_body2.is_some(),
            )
        });
        let params = match (params, wheel) {
            (Some(params), Some(side)) => Some(self.wheel_params(
                context,
                side,
                (id1, g1, s1),
                (id2, g2, s2),
                params,
            )),
            (params, _) => params,
        };

        if let Some(params) = params {
            context.solver_contacts.truncate(self.contact_points);
            let soft_scale = params
                .softness
                .map(|soft| (soft.erp / self.default_erp).clamp(0.0, 1.0));
            for contact in context.solver_contacts.iter_mut() {
                contact.friction = params.friction;
                contact.restitution = params.restitution;
                if let Some(scale) = soft_scale
                    && contact.dist < 0.0
                {
                    contact.dist *= scale;
                }
            }
        }

        if params.is_some()
            && wheel.is_none()
            && (g1.wants_feedback() || g2.wants_feedback())
            && !context.solver_contacts.is_empty()
        {
            let mut outcome = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
            outcome.request_feedback(FeedbackRequest {
                geom1: id1,
                geom2: id2,
                collider1: context.collider1,
                collider2: context.collider2,
            });
        }
        trace!(
            geom1 = ?id1,
            geom2 = ?id2,
            touching,
            sensor = params.is_none(),
            "contact resolved"
        );
    }
}

/// Collision flags for every touching manifold the narrow phase holds.
///
/// Runs after the step. A manifold counts as touching when any of its points
/// has non-positive distance. Pairs on the same body, or between two static
/// geoms, are skipped.
pub fn collision_marks(
    narrow_phase: &NarrowPhase,
    colliders: &ColliderSet,
    geoms: &Registry<GeomId, Geom>,
    step: f32,
) -> Vec<CollisionMark> {
    let mut marks = Vec::new();
    for pair in narrow_phase.contact_pairs() {
        let (Some(c1), Some(c2)) = (colliders.get(pair.collider1), colliders.get(pair.collider2))
        else {
            continue;
        };
        if c1.parent() == c2.parent() {
            continue;
        }
        let id1 = GeomId::from_user_data(c1.user_data);
        let id2 = GeomId::from_user_data(c2.user_data);
        let (Some(g1), Some(g2)) = (geoms.get(id1), geoms.get(id2)) else {
            continue;
        };
        for manifold in &pair.manifolds {
            if !manifold.points.iter().any(|p| p.dist <= 0.0) {
                continue;
            }
            let tri1 = g1.has_triangles().then_some(manifold.subshape1);
            let tri2 = g2.has_triangles().then_some(manifold.subshape2);
            let class = classify_pair(
                &g1.surface_for_triangle(tri1),
                &g2.surface_for_triangle(tri2),
                step,
            );
            marks.push(CollisionMark {
                geom: id1,
                triangle: tri1,
                colliding: class.colliding1,
            });
            marks.push(CollisionMark {
                geom: id2,
                triangle: tri2,
                colliding: class.colliding2,
            });
        }
    }
    marks
}

#[cfg(test)]
#[path = "contact_tests.rs"]
mod tests;
