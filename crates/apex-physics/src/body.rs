//! Rigid bodies: Rapier bodies plus wind-relative drag, a damage buffer and
//! the auto-disable thresholds handed to Rapier's sleep logic.

use apex_config::{EnvironmentConfig, PhysicsConfig};
use glam::{Quat, Vec3};
use rapier3d::prelude::*;
use tracing::{debug, warn};

use crate::buffer::DamageBuffer;
use crate::events::ScriptHandle;
use crate::registry::ObjectId;
use crate::render_list::ModelId;
use crate::{quat_from_rapier, vec_from_rapier, vec_to_rapier};

/// Drag coefficient, either the same in every direction or per body axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Drag {
    /// Same coefficient along every axis.
    Uniform(f32),
    /// One coefficient per body-space axis.
    PerAxis(Vec3),
}

impl Default for Drag {
    fn default() -> Self {
        Drag::Uniform(0.0)
    }
}

/// Air and gravity the bodies move through.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    /// Gravity in m/s².
    pub gravity: Vec3,
    /// Air density in kg/m³.
    pub density: f32,
    /// Wind velocity in m/s.
    pub wind: Vec3,
}

impl Default for Environment {
    fn default() -> Self {
        Self::from(&EnvironmentConfig::default())
    }
}

impl From<&EnvironmentConfig> for Environment {
    fn from(config: &EnvironmentConfig) -> Self {
        Self {
            gravity: Vec3::from_array(config.gravity),
            density: config.density,
            wind: Vec3::from_array(config.wind),
        }
    }
}

/// How a body is driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyKind {
    /// Moved by forces and contacts.
    #[default]
    Dynamic,
    /// Moved only by its velocity.
    Kinematic,
}

/// Creation parameters for [`Body`].
#[derive(Debug, Clone)]
pub struct BodyDesc {
    /// Dynamic or kinematic.
    pub kind: BodyKind,
    /// Initial position.
    pub translation: Vec3,
    /// Initial orientation.
    pub rotation: Quat,
    /// Initial linear velocity.
    pub linvel: Vec3,
    /// Initial angular velocity.
    pub angvel: Vec3,
    /// Mass added on top of whatever the attached geoms contribute.
    pub additional_mass: f32,
    /// Linear drag; `None` uses the configured default.
    pub linear_drag: Option<Drag>,
    /// Angular drag; `None` uses the configured default.
    pub angular_drag: Option<Drag>,
    /// Render model drawn at this body's pose.
    pub model: Option<ModelId>,
}

impl Default for BodyDesc {
    fn default() -> Self {
        Self {
            kind: BodyKind::Dynamic,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            linvel: Vec3::ZERO,
            angvel: Vec3::ZERO,
            additional_mass: 0.0,
            linear_drag: None,
            angular_drag: None,
            model: None,
        }
    }
}

impl BodyDesc {
    /// Dynamic body at `translation`.
    pub fn dynamic(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::default()
        }
    }

    pub(crate) fn build(&self, user_data: u128, auto_disable: &AutoDisable) -> RigidBody {
        let builder = match self.kind {
            BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
            BodyKind::Kinematic => RigidBodyBuilder::kinematic_velocity_based(),
        };
        let builder = builder
            .translation(vec_to_rapier(self.translation))
            .rotation(vec_to_rapier(self.rotation.to_scaled_axis()))
            .linvel(vec_to_rapier(self.linvel))
            .angvel(vec_to_rapier(self.angvel))
            .user_data(user_data);
        let mut rb = if self.additional_mass > 0.0 {
            builder.additional_mass(self.additional_mass).build()
        } else {
            builder.build()
        };
        auto_disable.apply(rb.activation_mut());
        rb
    }
}

/// Thresholds for putting idle bodies to sleep.
///
/// Rapier's island manager does the sleeping; these values only configure
/// each body's [`RigidBodyActivation`]. A negative speed threshold keeps the
/// body awake for good.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoDisable {
    /// Linear speed below which a body is idle.
    pub linear: f32,
    /// Angular speed below which a body is idle.
    pub angular: f32,
    /// Seconds of idleness required.
    pub time: f32,
}

impl AutoDisable {
    /// Writes the thresholds into a body's activation state.
    pub fn apply(&self, activation: &mut RigidBodyActivation) {
        activation.normalized_linear_threshold = self.linear;
        activation.angular_threshold = self.angular;
        activation.time_until_sleep = self.time;
    }

    /// Whether these thresholds ever let a body sleep.
    pub fn enabled(&self) -> bool {
        self.linear >= 0.0 && self.angular >= 0.0
    }
}

impl From<&PhysicsConfig> for AutoDisable {
    /// The step count requirement folds into the idle time: a body must stay
    /// idle for at least `auto_disable_steps` micro steps.
    fn from(config: &PhysicsConfig) -> Self {
        let micro_step = config.micro_stepsize();
        let linear = config.auto_disable_linear;
        let angular = config.auto_disable_angular;
        // Rapier treats a negative threshold on either axis as "never sleep".
        let (linear, angular) = if linear < 0.0 || angular < 0.0 {
            (-1.0, -1.0)
        } else {
            (linear, angular)
        };
        Self {
            linear,
            angular,
            time: config
                .auto_disable_time
                .max(config.auto_disable_steps as f32 * micro_step),
        }
    }
}

/// A rigid body in the scene.
#[derive(Debug)]
pub struct Body {
    object: ObjectId,
    handle: RigidBodyHandle,
    mass: f32,
    /// Linear drag.
    pub linear_drag: Drag,
    /// Angular drag.
    pub angular_drag: Drag,
    buffer: Option<DamageBuffer>,
    model: Option<ModelId>,
    sleeping: bool,
}

impl Body {
    pub(crate) fn new(
        object: ObjectId,
        handle: RigidBodyHandle,
        desc: &BodyDesc,
        config: &PhysicsConfig,
    ) -> Self {
        Self {
            object,
            handle,
            mass: 0.0,
            linear_drag: desc
                .linear_drag
                .unwrap_or(Drag::Uniform(config.default_linear_drag)),
            angular_drag: desc
                .angular_drag
                .unwrap_or(Drag::Uniform(config.default_angular_drag)),
            buffer: None,
            model: desc.model,
            sleeping: false,
        }
    }

    /// Owning object.
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Rapier handle.
    pub fn handle(&self) -> RigidBodyHandle {
        self.handle
    }

    /// Mass as of the last micro step.
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Render model, if any.
    pub fn model(&self) -> Option<ModelId> {
        self.model
    }

    /// Configured damage buffer.
    pub fn buffer(&self) -> Option<&DamageBuffer> {
        self.buffer.as_ref()
    }

    /// Enables the damage buffer, or disables it when `script` is `None` or
    /// the parameters are invalid. Returns whether the buffer is enabled.
    pub fn set_buffer_event(
        &mut self,
        threshold: f32,
        capacity: f32,
        script: Option<ScriptHandle>,
    ) -> bool {
        self.buffer = script.and_then(|script| {
            let buffer = DamageBuffer::new(threshold, capacity, script);
            if buffer.is_none() {
                warn!(
                    threshold,
                    capacity, "invalid body buffer parameters, buffer disabled"
                );
            }
            buffer
        });
        self.buffer.is_some()
    }

    /// Applies a hit. Returns `true` if it depleted the buffer.
    pub fn damage_buffer(&mut self, force: f32, step: f32) -> bool {
        self.buffer
            .as_mut()
            .is_some_and(|buffer| buffer.damage(force, step))
    }

    /// Restores capacity. Returns `true` if the buffer is still depleted.
    pub fn increase_buffer(&mut self, amount: f32) -> bool {
        self.buffer
            .as_mut()
            .is_some_and(|buffer| buffer.increase(amount))
    }

    /// Applies wind-relative drag to the body's velocities.
    pub fn apply_drag(&mut self, rb: &mut RigidBody, env: &Environment, step: f32) {
        self.mass = rb.mass();
        if self.mass <= 0.0 || !rb.is_dynamic() || rb.is_sleeping() {
            return;
        }
        let rotation = quat_from_rapier(&rb.rotation());
        let factor = env.density * step / self.mass;

        let linvel = vec_from_rapier(&rb.linvel());
        let linvel = drag_velocity(linvel, env.wind, rotation, self.linear_drag, factor);
        rb.set_linvel(vec_to_rapier(linvel), false);

        let angvel = vec_from_rapier(&rb.angvel());
        let angvel = drag_velocity(angvel, Vec3::ZERO, rotation, self.angular_drag, factor);
        rb.set_angvel(vec_to_rapier(angvel), false);
    }

    /// Records whether Rapier put the body to sleep. Returns `true` on the
    /// step it fell asleep.
    pub(crate) fn track_sleep(&mut self, rb: &RigidBody) -> bool {
        let sleeping = rb.is_sleeping();
        let fell_asleep = sleeping && !self.sleeping;
        self.sleeping = sleeping;
        if fell_asleep {
            debug!(handle = ?self.handle, "body auto-disabled");
        }
        fell_asleep
    }
}

/// Drag applied to `velocity` moving through air that itself moves at `wind`.
///
/// `factor` is `density · step / mass`. Uniform drag scales the relative
/// velocity by `1 / (1 + |v_rel| · drag · factor)`. Per-axis drag does the
/// same per body-space component, using the full relative speed.
pub fn drag_velocity(velocity: Vec3, wind: Vec3, rotation: Quat, drag: Drag, factor: f32) -> Vec3 {
    let relative = velocity - wind;
    let speed = relative.length();
    match drag {
        Drag::Uniform(coefficient) => wind + relative / (1.0 + speed * coefficient * factor),
        Drag::PerAxis(coefficients) => {
            let local = rotation.inverse() * relative;
            let local = local / (Vec3::ONE + coefficients * (speed * factor));
            wind + rotation * local
        }
    }
}
