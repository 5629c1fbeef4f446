//! Physics core error types.

use crate::registry::{BodyId, GeomId, JointId, ObjectId};

/// Failures surfaced by creation paths and world initialization.
///
/// Per-step contact problems are never reported here; they are corrected
/// in place and logged.
#[derive(Debug, thiserror::Error)]
pub enum PhysicsError {
    /// The configuration cannot produce a working world.
    #[error("invalid physics configuration: {0}")]
    InvalidConfig(String),

    /// The object handle does not refer to a live object.
    #[error("object {0:?} does not exist")]
    UnknownObject(ObjectId),

    /// The body handle does not refer to a live body.
    #[error("body {0:?} does not exist")]
    UnknownBody(BodyId),

    /// The geom handle does not refer to a live geom.
    #[error("geom {0:?} does not exist")]
    UnknownGeom(GeomId),

    /// The joint handle does not refer to a live joint.
    #[error("joint {0:?} does not exist")]
    UnknownJoint(JointId),

    /// The geom has no body to forward damage to.
    #[error("geom {0:?} is not attached to a body")]
    StaticGeom(GeomId),

    /// A triangle mesh without triangles.
    #[error("triangle mesh has no triangles")]
    EmptyMesh,

    /// A triangle mesh whose data cannot be turned into a collision shape.
    #[error("invalid triangle mesh: {0}")]
    InvalidMesh(String),

    /// An object's activity counter was decremented below zero.
    #[error("activity counter underflow on object {0:?}")]
    ActivityUnderflow(ObjectId),

    /// The simulation thread could not be spawned.
    #[error("failed to spawn simulation thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}
