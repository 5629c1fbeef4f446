//! Joints between bodies.
//!
//! Fixed, ball and hinge joints are Rapier impulse joints. Spring joints have
//! no Rapier counterpart; they push their bodies apart or together once per
//! micro step.

use glam::{Quat, Vec3};
use rapier3d::prelude::*;

use crate::body::Body;
use crate::registry::{BodyId, JointId, ObjectId, Registry};
use crate::{quat_from_rapier, vec_from_rapier, vec_to_rapier};

/// Joint type and its local anchors (in each body's frame).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointKind {
    /// Locks all relative motion.
    Fixed {
        /// Anchor on the first body.
        anchor1: Vec3,
        /// Anchor on the second body.
        anchor2: Vec3,
    },
    /// Shared point, free rotation.
    Ball {
        /// Anchor on the first body.
        anchor1: Vec3,
        /// Anchor on the second body.
        anchor2: Vec3,
    },
    /// Rotation about one axis.
    Hinge {
        /// Hinge axis in both bodies' frames.
        axis: Vec3,
        /// Anchor on the first body.
        anchor1: Vec3,
        /// Anchor on the second body.
        anchor2: Vec3,
    },
    /// Damped spring between two anchors.
    Spring {
        /// Anchor on the first body.
        anchor1: Vec3,
        /// Anchor on the second body.
        anchor2: Vec3,
        /// Length at which the spring exerts no force.
        rest_length: f32,
        /// Stiffness in N/m.
        stiffness: f32,
        /// Damping in N·s/m.
        damping: f32,
    },
}

/// Creation parameters for [`Joint`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointDesc {
    /// First body.
    pub body1: BodyId,
    /// Second body.
    pub body2: BodyId,
    /// Joint type.
    pub kind: JointKind,
}

impl JointKind {
    pub(crate) fn build(&self) -> Option<GenericJoint> {
        match *self {
            JointKind::Fixed { anchor1, anchor2 } => Some(
                FixedJointBuilder::new()
                    .local_anchor1(vec_to_rapier(anchor1))
                    .local_anchor2(vec_to_rapier(anchor2))
                    .build()
                    .into(),
            ),
            JointKind::Ball { anchor1, anchor2 } => Some(
                SphericalJointBuilder::new()
                    .local_anchor1(vec_to_rapier(anchor1))
                    .local_anchor2(vec_to_rapier(anchor2))
                    .build()
                    .into(),
            ),
            JointKind::Hinge {
                axis,
                anchor1,
                anchor2,
            } => Some(
                RevoluteJointBuilder::new(vec_to_rapier(axis.try_normalize().unwrap_or(Vec3::Z)))
                    .local_anchor1(vec_to_rapier(anchor1))
                    .local_anchor2(vec_to_rapier(anchor2))
                    .build()
                    .into(),
            ),
            JointKind::Spring { .. } => None,
        }
    }
}

/// A joint in the scene.
#[derive(Debug, Clone)]
pub struct Joint {
    object: ObjectId,
    body1: BodyId,
    body2: BodyId,
    kind: JointKind,
    handle: Option<ImpulseJointHandle>,
}

impl Joint {
    pub(crate) fn new(object: ObjectId, desc: &JointDesc, handle: Option<ImpulseJointHandle>) -> Self {
        Self {
            object,
            body1: desc.body1,
            body2: desc.body2,
            kind: desc.kind,
            handle,
        }
    }

    /// Owning object.
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Connected bodies.
    pub fn bodies(&self) -> (BodyId, BodyId) {
        (self.body1, self.body2)
    }

    /// Joint type.
    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    /// Rapier handle, `None` for spring joints.
    pub fn handle(&self) -> Option<ImpulseJointHandle> {
        self.handle
    }
}

/// Force a damped spring exerts on its second anchor.
///
/// `offset` runs from anchor 1 to anchor 2 and `relative_velocity` is anchor
/// 2's velocity minus anchor 1's.
pub fn spring_force(
    offset: Vec3,
    relative_velocity: Vec3,
    rest_length: f32,
    stiffness: f32,
    damping: f32,
) -> Vec3 {
    let length = offset.length();
    if length <= f32::EPSILON {
        return Vec3::ZERO;
    }
    let direction = offset / length;
    let stretch = length - rest_length;
    let closing = relative_velocity.dot(direction);
    -direction * (stiffness * stretch + damping * closing)
}

struct AnchorState {
    point: Vec3,
    velocity: Vec3,
}

fn anchor_state(rb: &RigidBody, local: Vec3) -> AnchorState {
    let rotation: Quat = quat_from_rapier(&rb.rotation());
    let arm = rotation * local;
    let point = vec_from_rapier(&rb.translation()) + arm;
    let velocity = vec_from_rapier(&rb.linvel()) + vec_from_rapier(&rb.angvel()).cross(arm);
    AnchorState { point, velocity }
}

/// Applies every spring joint's force for one micro step.
pub fn apply_spring_forces(
    joints: &Registry<JointId, Joint>,
    bodies: &Registry<BodyId, Body>,
    rigid_bodies: &mut RigidBodySet,
    step: f32,
) {
    for (_, joint) in joints.iter() {
        let JointKind::Spring {
            anchor1,
            anchor2,
            rest_length,
            stiffness,
            damping,
        } = joint.kind
        else {
            continue;
        };
        let (Some(b1), Some(b2)) = (bodies.get(joint.body1), bodies.get(joint.body2)) else {
            continue;
        };
        let (h1, h2) = (b1.handle(), b2.handle());
        let (Some(rb1), Some(rb2)) = (rigid_bodies.get(h1), rigid_bodies.get(h2)) else {
            continue;
        };
        let a1 = anchor_state(rb1, anchor1);
        let a2 = anchor_state(rb2, anchor2);
        let force = spring_force(
            a2.point - a1.point,
            a2.velocity - a1.velocity,
            rest_length,
            stiffness,
            damping,
        );
        let impulse = force * step;
        if let Some(rb) = rigid_bodies.get_mut(h2) {
            rb.apply_impulse_at_point(vec_to_rapier(impulse), vec_to_rapier(a2.point), true);
        }
        if let Some(rb) = rigid_bodies.get_mut(h1) {
            rb.apply_impulse_at_point(vec_to_rapier(-impulse), vec_to_rapier(a1.point), true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stretched_spring_pulls_back() {
        let f = spring_force(Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO, 1.0, 100.0, 0.0);
        assert!((f - Vec3::new(-100.0, 0.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_compressed_spring_pushes_out() {
        let f = spring_force(Vec3::new(0.0, 0.0, 0.5), Vec3::ZERO, 1.0, 100.0, 0.0);
        assert!((f - Vec3::new(0.0, 0.0, 50.0)).length() < 1e-4);
    }

    #[test]
    fn test_damping_opposes_separation() {
        let f = spring_force(Vec3::X, Vec3::new(3.0, 0.0, 0.0), 1.0, 0.0, 10.0);
        assert!((f - Vec3::new(-30.0, 0.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_coincident_anchors_exert_nothing() {
        assert_eq!(
            spring_force(Vec3::ZERO, Vec3::X, 1.0, 100.0, 10.0),
            Vec3::ZERO
        );
    }

    #[test]
    fn test_spring_has_no_rapier_joint() {
        let spring = JointKind::Spring {
            anchor1: Vec3::ZERO,
            anchor2: Vec3::ZERO,
            rest_length: 1.0,
            stiffness: 1.0,
            damping: 0.0,
        };
        assert!(spring.build().is_none());
        let ball = JointKind::Ball {
            anchor1: Vec3::ZERO,
            anchor2: Vec3::X,
        };
        assert!(ball.build().is_some());
    }
}
