//! Collision geoms: Rapier colliders plus contact surfaces, per-triangle
//! tracking, sensor and damage configuration, and an optional wheel model.

use std::sync::Arc;

use glam::{Quat, Vec3};
use rapier3d::prelude::*;
use tracing::{debug, warn};

use crate::buffer::DamageBuffer;
use crate::error::PhysicsError;
use crate::events::ScriptHandle;
use crate::mesh::{MaterialRange, TriangleMesh, material_index};
use crate::registry::{BodyId, ObjectId};
use crate::render_list::ModelId;
use crate::surface::Surface;
use crate::vec_to_rapier;
use crate::wheel::WheelFriction;

/// Collision shape of a geom. Capsules and cylinders run along local Z.
#[derive(Debug, Clone)]
pub enum GeomShape {
    /// Sphere.
    Sphere {
        /// Radius.
        radius: f32,
    },
    /// Box.
    Box {
        /// Half-extents along each axis.
        half_extents: Vec3,
    },
    /// Capsule.
    Capsule {
        /// Half the length of the cylindrical part.
        half_height: f32,
        /// Radius.
        radius: f32,
    },
    /// Cylinder, the usual wheel shape.
    Cylinder {
        /// Half the length.
        half_height: f32,
        /// Radius.
        radius: f32,
    },
    /// Triangle mesh with material ranges.
    TriMesh(Arc<TriangleMesh>),
}

impl GeomShape {
    fn to_shape(&self) -> Result<SharedShape, PhysicsError> {
        Ok(match self {
            GeomShape::Sphere { radius } => SharedShape::ball(*radius),
            GeomShape::Box { half_extents } => {
                SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            GeomShape::Capsule {
                half_height,
                radius,
            } => SharedShape::capsule_z(*half_height, *radius),
            GeomShape::Cylinder {
                half_height,
                radius,
            } => SharedShape::cylinder(*half_height, *radius),
            GeomShape::TriMesh(mesh) => mesh.to_shape()?,
        })
    }

    /// Rapier cylinders run along Y; turn them onto Z.
    fn shape_rotation(&self) -> Quat {
        match self {
            GeomShape::Cylinder { .. } => Quat::from_rotation_x(std::f32::consts::FRAC_PI_2),
            _ => Quat::IDENTITY,
        }
    }
}

/// Creation parameters for [`Geom`].
#[derive(Debug, Clone)]
pub struct GeomDesc {
    /// Shape.
    pub shape: GeomShape,
    /// Offset from the parent body, or world position when static.
    pub translation: Vec3,
    /// Orientation relative to the parent body, or world orientation.
    pub rotation: Quat,
    /// Density used for the parent body's mass.
    pub density: f32,
    /// Default contact surface.
    pub surface: Surface,
    /// Render model drawn at this geom's pose.
    pub model: Option<ModelId>,
}

impl GeomDesc {
    /// Geom with default placement and surface.
    pub fn new(shape: GeomShape) -> Self {
        Self {
            shape,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            density: 1.0,
            surface: Surface::default(),
            model: None,
        }
    }

    /// Sets the offset.
    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    /// Sets the orientation.
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Sets the default surface.
    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.surface = surface;
        self
    }

    /// Sets the density.
    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    /// Draws `model` at this geom's pose.
    pub fn with_model(mut self, model: ModelId) -> Self {
        self.model = Some(model);
        self
    }

    pub(crate) fn build(&self) -> Result<Collider, PhysicsError> {
        let shape = self.shape.to_shape()?;
        let rotation = self.rotation * self.shape.shape_rotation();
        Ok(ColliderBuilder::new(shape)
            .translation(vec_to_rapier(self.translation))
            .rotation(vec_to_rapier(rotation.to_scaled_axis()))
            .density(self.density.max(0.0))
            .friction(self.surface.mu)
            .restitution(self.surface.bounce)
            .active_hooks(ActiveHooks::MODIFY_SOLVER_CONTACTS)
            .active_collision_types(
                ActiveCollisionTypes::default()
                    | ActiveCollisionTypes::KINEMATIC_FIXED
                    | ActiveCollisionTypes::KINEMATIC_KINEMATIC,
            )
            .build())
    }
}

/// Where damage reported for a geom goes.
#[derive(Debug, Clone, Default)]
pub enum DamageSink {
    /// No damage tracking.
    #[default]
    Disabled,
    /// The geom's own buffer.
    Local(DamageBuffer),
    /// The buffer of the geom's body.
    Forward(BodyId),
}

/// Sensor scripts and the state seen at the last poll.
#[derive(Debug, Clone, Default)]
pub struct SensorEvent {
    /// Run when the geom starts colliding.
    pub on_trigger: Option<ScriptHandle>,
    /// Run when the geom stops colliding.
    pub on_untrigger: Option<ScriptHandle>,
    /// `colliding` as of the last poll.
    pub last_state: bool,
}

#[derive(Debug, Clone)]
struct MeshTracking {
    triangle_colliding: Vec<bool>,
    materials: Vec<MaterialRange>,
    material_surfaces: Option<Vec<Surface>>,
}

/// A collision shape in the scene.
pub struct Geom {
    object: ObjectId,
    collider: ColliderHandle,
    body: Option<BodyId>,
    /// Surface used when no per-material surface applies.
    pub surface: Surface,
    colliding: bool,
    mesh: Option<MeshTracking>,
    sink: DamageSink,
    sensor: Option<SensorEvent>,
    wheel: Option<Arc<dyn WheelFriction>>,
    model: Option<ModelId>,
}

impl std::fmt::Debug for Geom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Geom")
            .field("object", &self.object)
            .field("collider", &self.collider)
            .field("body", &self.body)
            .field("surface", &self.surface)
            .field("colliding", &self.colliding)
            .field("sink", &self.sink)
            .field("wheel", &self.wheel.is_some())
            .finish_non_exhaustive()
    }
}

impl Geom {
    pub(crate) fn new(
        object: ObjectId,
        collider: ColliderHandle,
        body: Option<BodyId>,
        desc: &GeomDesc,
    ) -> Self {
        let mesh = match &desc.shape {
            GeomShape::TriMesh(mesh) => Some(MeshTracking {
                triangle_colliding: vec![false; mesh.triangle_count()],
                materials: mesh.materials.clone(),
                material_surfaces: None,
            }),
            _ => None,
        };
        Self {
            object,
            collider,
            body,
            surface: desc.surface,
            colliding: false,
            mesh,
            sink: DamageSink::Disabled,
            sensor: None,
            wheel: None,
            model: desc.model,
        }
    }

    /// Owning object.
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Rapier handle.
    pub fn collider(&self) -> ColliderHandle {
        self.collider
    }

    /// Body the geom is attached to, `None` for static geoms.
    pub fn body(&self) -> Option<BodyId> {
        self.body
    }

    /// Render model, if any.
    pub fn model(&self) -> Option<ModelId> {
        self.model
    }

    /// Whether the geom touched anything non-sensor in the last micro step.
    pub fn colliding(&self) -> bool {
        self.colliding
    }

    /// Whether triangle `t` was touched in the last micro step.
    pub fn triangle_colliding(&self, t: u32) -> bool {
        self.mesh
            .as_ref()
            .and_then(|mesh| mesh.triangle_colliding.get(t as usize).copied())
            .unwrap_or(false)
    }

    /// Resets all collision flags before a detection pass.
    pub fn clear_collisions(&mut self) {
        self.colliding = false;
        if let Some(mesh) = &mut self.mesh {
            mesh.triangle_colliding.fill(false);
        }
    }

    /// Whether the geom tracks per-triangle contacts.
    pub fn has_triangles(&self) -> bool {
        self.mesh.is_some()
    }

    pub(crate) fn mark_colliding(&mut self) {
        self.colliding = true;
    }

    /// Flags triangle `t` as touched. Out-of-range indices are ignored.
    pub(crate) fn mark_triangle(&mut self, t: u32) {
        if let Some(mesh) = &mut self.mesh
            && let Some(flag) = mesh.triangle_colliding.get_mut(t as usize)
        {
            *flag = true;
        }
    }

    /// Surface in effect for a contact on `triangle`.
    pub fn surface_for_triangle(&self, triangle: Option<u32>) -> Surface {
        let Some(mesh) = &self.mesh else {
            return self.surface;
        };
        let (Some(surfaces), Some(t)) = (&mesh.material_surfaces, triangle) else {
            return self.surface;
        };
        material_index(&mesh.materials, t)
            .and_then(|i| surfaces.get(i).copied())
            .unwrap_or(self.surface)
    }

    /// Per-material surface for `name`, created from the default surface on
    /// first use. Returns `None` for unknown materials or non-mesh geoms.
    pub fn material_surface_mut(&mut self, name: &str) -> Option<&mut Surface> {
        let Some(mesh) = &mut self.mesh else {
            warn!(material = name, "geom has no triangle mesh, using default surface");
            return None;
        };
        let Some(index) = mesh.materials.iter().position(|m| m.name == name) else {
            warn!(material = name, "unknown material, using default surface");
            return None;
        };
        let default = self.surface;
        let count = mesh.materials.len();
        let surfaces = mesh
            .material_surfaces
            .get_or_insert_with(|| vec![default; count]);
        surfaces.get_mut(index)
    }

    /// Configures sensor scripts and resets the observed state to "not
    /// colliding". Passing `None` for both disables the sensor.
    pub fn set_sensor_event(
        &mut self,
        on_trigger: Option<ScriptHandle>,
        on_untrigger: Option<ScriptHandle>,
    ) {
        if on_trigger.is_none() && on_untrigger.is_none() {
            self.sensor = None;
            return;
        }
        self.sensor = Some(SensorEvent {
            on_trigger,
            on_untrigger,
            last_state: false,
        });
    }

    /// Sensor configuration.
    pub fn sensor(&self) -> Option<&SensorEvent> {
        self.sensor.as_ref()
    }

    /// Compares `colliding` with the last poll. Returns the new state on an
    /// edge and remembers it.
    pub fn poll_sensor(&mut self) -> Option<bool> {
        let colliding = self.colliding;
        let sensor = self.sensor.as_mut()?;
        if sensor.last_state == colliding {
            return None;
        }
        sensor.last_state = colliding;
        Some(colliding)
    }

    /// Gives the geom its own damage buffer, or disables damage tracking when
    /// `script` is `None` or the parameters are invalid.
    pub fn set_buffer_event(
        &mut self,
        threshold: f32,
        capacity: f32,
        script: Option<ScriptHandle>,
    ) -> bool {
        self.sink = match script.map(|s| DamageBuffer::new(threshold, capacity, s)) {
            Some(Some(buffer)) => DamageSink::Local(buffer),
            Some(None) => {
                warn!(
                    threshold,
                    capacity, "invalid geom buffer parameters, buffer disabled"
                );
                DamageSink::Disabled
            }
            None => DamageSink::Disabled,
        };
        matches!(self.sink, DamageSink::Local(_))
    }

    /// Forwards damage to the geom's body. Fails for static geoms.
    pub(crate) fn set_buffer_body(&mut self) -> Option<BodyId> {
        let body = self.body?;
        debug!(?body, "geom damage forwarded to body");
        self.sink = DamageSink::Forward(body);
        Some(body)
    }

    /// Disables damage tracking.
    pub fn clear_buffer_event(&mut self) {
        self.sink = DamageSink::Disabled;
    }

    /// Damage routing.
    pub fn sink(&self) -> &DamageSink {
        &self.sink
    }

    pub(crate) fn sink_mut(&mut self) -> &mut DamageSink {
        &mut self.sink
    }

    /// Whether contacts involving this geom need force feedback.
    pub fn wants_feedback(&self) -> bool {
        !matches!(self.sink, DamageSink::Disabled)
    }

    /// Sets or clears the wheel model.
    pub fn set_wheel(&mut self, wheel: Option<Arc<dyn WheelFriction>>) {
        self.wheel = wheel;
    }

    /// Wheel model, if any.
    pub fn wheel(&self) -> Option<&Arc<dyn WheelFriction>> {
        self.wheel.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn track() -> Arc<TriangleMesh> {
        let range = |name: &str, start, end| MaterialRange {
            name: name.to_string(),
            start,
            end,
        };
        Arc::new(TriangleMesh {
            vertices: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            indices: vec![[0, 1, 2], [0, 2, 3], [1, 2, 3], [0, 1, 3]],
            materials: vec![range("asphalt", 0, 2), range("gravel", 2, 4)],
        })
    }

    fn geom(shape: GeomShape) -> Geom {
        let mut objects: Registry<ObjectId, ()> = Registry::new();
        let object = objects.insert(());
        let desc = GeomDesc::new(shape).with_surface(Surface {
            mu: 1.0,
            ..Surface::default()
        });
        Geom::new(object, ColliderHandle::invalid(), None, &desc)
    }

    #[test]
    fn test_material_surfaces_start_as_default() {
        let mut g = geom(GeomShape::TriMesh(track()));
        assert_eq!(g.surface_for_triangle(Some(3)).mu, 1.0);

        g.material_surface_mut("gravel").unwrap().mu = 0.4;
        assert_eq!(g.surface_for_triangle(Some(0)).mu, 1.0);
        assert_eq!(g.surface_for_triangle(Some(1)).mu, 1.0);
        assert_eq!(g.surface_for_triangle(Some(2)).mu, 0.4);
        assert_eq!(g.surface_for_triangle(Some(3)).mu, 0.4);
        assert_eq!(g.surface_for_triangle(None).mu, 1.0);
    }

    #[test]
    fn test_unknown_material_returns_none() {
        let mut g = geom(GeomShape::TriMesh(track()));
        assert!(g.material_surface_mut("ice").is_none());

        let mut ball = geom(GeomShape::Sphere { radius: 1.0 });
        assert!(ball.material_surface_mut("asphalt").is_none());
    }

    #[test]
    fn test_triangle_flags() {
        let mut g = geom(GeomShape::TriMesh(track()));
        assert!(g.has_triangles());
        g.mark_triangle(2);
        g.mark_triangle(99);
        g.mark_colliding();
        assert!(g.colliding());
        assert!(g.triangle_colliding(2));
        assert!(!g.triangle_colliding(1));
        assert!(!g.triangle_colliding(99));

        g.clear_collisions();
        assert!(!g.colliding());
        assert!(!g.triangle_colliding(2));
    }

    #[test]
    fn test_sensor_edges() {
        let mut g = geom(GeomShape::Sphere { radius: 1.0 });
        assert_eq!(g.poll_sensor(), None);

        g.set_sensor_event(Some(ScriptHandle::new(|_| {})), None);
        assert_eq!(g.poll_sensor(), None);

        g.mark_colliding();
        assert_eq!(g.poll_sensor(), Some(true));
        assert_eq!(g.poll_sensor(), None);

        g.clear_collisions();
        assert_eq!(g.poll_sensor(), Some(false));
        assert_eq!(g.poll_sensor(), None);

        g.set_sensor_event(None, None);
        assert!(g.sensor().is_none());
    }

    #[test]
    fn test_buffer_configuration() {
        let mut g = geom(GeomShape::Sphere { radius: 1.0 });
        assert!(!g.wants_feedback());
        assert!(g.set_buffer_event(1.0, 10.0, Some(ScriptHandle::new(|_| {}))));
        assert!(g.wants_feedback());
        assert!(!g.set_buffer_event(1.0, -10.0, Some(ScriptHandle::new(|_| {}))));
        assert!(!g.wants_feedback());
    }

    #[test]
    fn test_static_geom_cannot_forward() {
        let mut g = geom(GeomShape::Sphere { radius: 1.0 });
        assert!(g.set_buffer_body().is_none());
        assert!(!g.wants_feedback());
    }

    #[test]
    fn test_desc_builds_collider() {
        let collider = GeomDesc::new(GeomShape::Box {
            half_extents: Vec3::splat(0.5),
        })
        .build()
        .unwrap();
        assert_eq!(collider.user_data, 0);

        let empty = GeomDesc::new(GeomShape::TriMesh(Arc::new(TriangleMesh::default())));
        assert!(matches!(empty.build(), Err(PhysicsError::EmptyMesh)));
    }

    #[test]
    fn test_kinematic_bodies_touch_static_geoms() {
        let collider = GeomDesc::new(GeomShape::Sphere { radius: 1.0 })
            .build()
            .unwrap();
        let types = collider.active_collision_types();
        assert!(types.contains(ActiveCollisionTypes::KINEMATIC_FIXED));
        assert!(types.contains(ActiveCollisionTypes::DYNAMIC_FIXED));
        assert!(!types.contains(ActiveCollisionTypes::FIXED_FIXED));
    }
}
