//! Physics core of the Apex racing simulator.
//!
//! Wraps the Rapier 3D engine behind a [`PhysicsWorld`] and layers the
//! simulator's own rules on top: contact surfaces and sensors, tyre friction
//! delegation, damage buffers fed by collision feedback, activity-counted
//! object lifetime, deferred script events, and a fixed-step simulation loop
//! running on its own thread with double-buffered render output.

pub mod body;
pub mod buffer;
pub mod contact;
pub mod error;
pub mod events;
pub mod feedback;
pub mod geom;
pub mod joint;
pub mod mesh;
pub mod object;
pub mod registry;
pub mod render_list;
pub mod simulation;
pub mod surface;
pub mod thread;
pub mod timers;
pub mod wheel;

pub use body::{AutoDisable, Body, BodyDesc, BodyKind, Drag, Environment};
pub use buffer::DamageBuffer;
pub use contact::{
    CollisionMark, ContactPolicy, PairClassification, PairResponse, classify_pair, collision_marks,
};
pub use error::PhysicsError;
pub use events::{EventTarget, ScriptCall, ScriptEvent, ScriptHandle};
pub use feedback::CollisionFeedback;
pub use geom::{DamageSink, Geom, GeomDesc, GeomShape};
pub use joint::{Joint, JointDesc, JointKind};
pub use mesh::{MaterialRange, TriangleMesh};
pub use object::{ComponentId, Object};
pub use registry::{BodyId, GeomId, JointId, ObjectId, Registry};
pub use render_list::{ModelId, RenderEntry, RenderFrame, RenderList, RenderSource};
pub use simulation::{Controller, Simulation, StepStats};
pub use surface::{ContactParams, Softness, Surface, combine_surfaces};
pub use thread::{RunLevel, SimulationHandle, SimulationThread};
pub use timers::TimerId;
pub use wheel::{Tyre, WheelContact, WheelFriction};

use rapier3d::prelude::*;

/// All Rapier state for one scene.
pub struct PhysicsWorld {
    /// World-space gravity.
    pub gravity: Vector,
    /// Timestep and solver configuration.
    pub integration_parameters: IntegrationParameters,
    /// The main simulation pipeline.
    pub physics_pipeline: PhysicsPipeline,
    /// Tracks sleeping/awake body islands.
    pub island_manager: IslandManager,
    /// Broad-phase collision detection.
    pub broad_phase: BroadPhaseBvh,
    /// Narrow-phase collision detection (contact manifolds).
    pub narrow_phase: NarrowPhase,
    /// All rigid bodies.
    pub rigid_body_set: RigidBodySet,
    /// All colliders.
    pub collider_set: ColliderSet,
    /// Impulse-based joints.
    pub impulse_joint_set: ImpulseJointSet,
    /// Multibody joints (unused by the core, required by the pipeline).
    pub multibody_joint_set: MultibodyJointSet,
    /// Continuous collision detection solver.
    pub ccd_solver: CCDSolver,
}

impl PhysicsWorld {
    /// Creates an empty world stepping `dt` seconds with `iterations` solver
    /// iterations. Gravity starts at zero.
    pub fn new(dt: f32, iterations: u32) -> Self {
        let integration_parameters = IntegrationParameters {
            dt,
            num_solver_iterations: iterations.max(1) as usize,
            ..Default::default()
        };

        Self {
            gravity: Vector::new(0.0, 0.0, 0.0),
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
        }
    }

    /// Advances the world by one step without contact hooks.
    pub fn step(&mut self) {
        self.step_with_hooks(&());
    }

    /// Advances the world by one step, running `hooks` on every contact
    /// manifold.
    pub fn step_with_hooks(&mut self, hooks: &dyn PhysicsHooks) {
        self.physics_pipeline.step(
            self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            hooks,
            &(),
        );
    }

    /// Sets the world gravity vector.
    pub fn set_gravity(&mut self, gravity: glam::Vec3) {
        self.gravity = vec_to_rapier(gravity);
    }

    /// Current gravity.
    pub fn gravity(&self) -> glam::Vec3 {
        vec_from_rapier(&self.gravity)
    }

    /// Removes a rigid body and everything attached to it.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) -> Option<RigidBody> {
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        )
    }

    /// Removes a collider, waking its parent body.
    pub fn remove_collider(&mut self, handle: ColliderHandle) -> Option<Collider> {
        self.collider_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.rigid_body_set,
            true,
        )
    }
}

pub(crate) fn vec_to_rapier(v: glam::Vec3) -> Vector {
    Vector::new(v.x, v.y, v.z)
}

pub(crate) fn vec_from_rapier(v: &Vector) -> glam::Vec3 {
    glam::Vec3::new(v.x, v.y, v.z)
}

pub(crate) fn quat_from_rapier(r: &rapier3d::math::Rotation) -> glam::Quat {
    glam::Quat::from_xyzw(r.x, r.y, r.z, r.w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physics_world_initializes() {
        let world = PhysicsWorld::new(0.0025, 5);
        assert_eq!(world.rigid_body_set.len(), 0);
        assert_eq!(world.collider_set.len(), 0);
        assert_eq!(world.gravity(), glam::Vec3::ZERO);
        assert!((world.integration_parameters.dt - 0.0025).abs() < f32::EPSILON);
        assert_eq!(world.integration_parameters.num_solver_iterations, 5);
    }

    #[test]
    fn test_zero_iterations_runs_one() {
        let world = PhysicsWorld::new(0.01, 0);
        assert_eq!(world.integration_parameters.num_solver_iterations, 1);
    }

    #[test]
    fn test_gravity_set_custom() {
        let mut world = PhysicsWorld::new(0.01, 5);
        world.set_gravity(glam::Vec3::new(0.0, 0.0, -9.82));
        assert_eq!(world.gravity(), glam::Vec3::new(0.0, 0.0, -9.82));
    }

    #[test]
    fn test_step_advances_simulation() {
        let mut world = PhysicsWorld::new(1.0 / 60.0, 4);
        world.set_gravity(glam::Vec3::new(0.0, 0.0, -9.82));
        let body = RigidBodyBuilder::dynamic()
            .translation(Vector::new(0.0, 0.0, 10.0))
            .build();
        let handle = world.rigid_body_set.insert(body);
        let collider = ColliderBuilder::ball(0.5).build();
        world
            .collider_set
            .insert_with_parent(collider, handle, &mut world.rigid_body_set);

        for _ in 0..60 {
            world.step();
        }

        let pos = world.rigid_body_set[handle].translation();
        assert!(pos.z < 10.0, "Body should have fallen: z={}", pos.z);
    }

    #[test]
    fn test_remove_body_removes_colliders() {
        let mut world = PhysicsWorld::new(0.01, 4);
        let handle = world
            .rigid_body_set
            .insert(RigidBodyBuilder::dynamic().build());
        world.collider_set.insert_with_parent(
            ColliderBuilder::ball(0.5).build(),
            handle,
            &mut world.rigid_body_set,
        );
        assert!(world.remove_body(handle).is_some());
        assert_eq!(world.collider_set.len(), 0);
        assert!(world.remove_body(handle).is_none());
    }
}
