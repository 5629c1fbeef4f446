//! Demo track: a two-material ground mesh, breakable crates, a rolling wheel
//! and a finish-line sensor.
//!
//! Every script only forwards its call to the interface thread over a
//! channel. The interface thread reacts by editing the scene through the
//! simulation handle.

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use apex_physics::{
    BodyDesc, BodyId, Controller, EventTarget, GeomDesc, GeomId, GeomShape, MaterialRange,
    ModelId, ObjectId, PhysicsError, PhysicsWorld, ScriptCall, ScriptEvent, ScriptHandle,
    Simulation, Surface, TriangleMesh, Tyre,
};
use crossbeam_channel::Sender;
use glam::{Quat, Vec3};
use rapier3d::prelude::{RigidBodyHandle, Vector};
use tracing::{debug, info, warn};

const GROUND_HALF_SIZE: f32 = 50.0;
const CRATE_HALF_SIZE: f32 = 0.5;
const WHEEL_RADIUS: f32 = 0.35;

/// Keeps a wheel spinning by feeding it a torque impulse every micro step.
struct Throttle {
    body: RigidBodyHandle,
    torque: Vec3,
}

impl Controller for Throttle {
    fn physics_step(&mut self, world: &mut PhysicsWorld, step: f32) {
        if let Some(rb) = world.rigid_body_set.get_mut(self.body) {
            let impulse = self.torque * step;
            rb.apply_torque_impulse(Vector::new(impulse.x, impulse.y, impulse.z), true);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Crate {
    object: ObjectId,
    body: BodyId,
}

/// Ids the interface thread needs to react to script calls.
#[derive(Debug)]
pub struct DemoScene {
    crates: Vec<Crate>,
    finish_line: GeomId,
    wheel: BodyId,
    laps: u32,
}

fn forward(tx: &Sender<ScriptCall>) -> ScriptHandle {
    let tx = tx.clone();
    ScriptHandle::new(move |call| {
        // The receiver only goes away during shutdown.
        let _ = tx.send(*call);
    })
}

fn ground_mesh() -> TriangleMesh {
    let h = GROUND_HALF_SIZE;
    TriangleMesh {
        vertices: vec![
            Vec3::new(-h, -h, 0.0),
            Vec3::new(h, -h, 0.0),
            Vec3::new(h, h, 0.0),
            Vec3::new(-h, h, 0.0),
        ],
        indices: vec![[0, 1, 2], [0, 2, 3]],
        materials: vec![
            MaterialRange {
                name: "asphalt".into(),
                start: 0,
                end: 1,
            },
            MaterialRange {
                name: "grass".into(),
                start: 1,
                end: 2,
            },
        ],
    }
}

impl DemoScene {
    /// Populates `sim` with the demo track.
    pub fn build(sim: &mut Simulation, tx: &Sender<ScriptCall>) -> Result<Self, PhysicsError> {
        let ground = sim.create_named_object("ground");
        let asphalt = Surface {
            mu: 1.0,
            ..Surface::default()
        };
        let ground_geom = sim.add_geom(
            ground,
            None,
            GeomDesc::new(GeomShape::TriMesh(Arc::new(ground_mesh()))).with_surface(asphalt),
        )?;
        if let Some(grass) = sim
            .geom_mut(ground_geom)
            .and_then(|g| g.material_surface_mut("grass"))
        {
            grass.mu = 0.6;
            grass.sensitivity = 0.8;
            grass.rollres = 3.0;
        }

        let mut crates = Vec::new();
        for (i, height) in [2.0_f32, 4.0, 6.0].into_iter().enumerate() {
            let object = sim.create_named_object(format!("crate-{i}"));
            let body = sim.add_body(
                object,
                BodyDesc {
                    model: Some(ModelId(1)),
                    ..BodyDesc::dynamic(Vec3::new(3.0 * i as f32, -5.0, height))
                },
            )?;
            let geom = sim.add_geom(
                object,
                Some(body),
                GeomDesc::new(GeomShape::Box {
                    half_extents: Vec3::splat(CRATE_HALF_SIZE),
                })
                .with_surface(Surface {
                    mu: 0.8,
                    bounce: 0.1,
                    ..Surface::default()
                }),
            )?;
            sim.set_geom_buffer_event(geom, 20.0, 4.0, Some(forward(tx)))?;
            sim.set_inactive_event(object, Some(forward(tx)))?;
            crates.push(Crate { object, body });
        }

        let car = sim.create_named_object("wheel");
        // Body Z is the axle; turn it onto world Y so the wheel rolls along X.
        let wheel = sim.add_body(
            car,
            BodyDesc {
                rotation: Quat::from_rotation_x(-FRAC_PI_2),
                linvel: Vec3::new(4.0, 0.0, 0.0),
                model: Some(ModelId(2)),
                ..BodyDesc::dynamic(Vec3::new(-20.0, 5.0, WHEEL_RADIUS + 0.05))
            },
        )?;
        let tyre = sim.add_geom(
            car,
            Some(wheel),
            GeomDesc::new(GeomShape::Cylinder {
                half_height: 0.12,
                radius: WHEEL_RADIUS,
            })
            .with_density(200.0),
        )?;
        if let Some(geom) = sim.geom_mut(tyre) {
            geom.set_wheel(Some(Arc::new(Tyre {
                mu: 1.1,
                rollres_loss: 0.2,
            })));
        }
        sim.set_body_buffer_event(wheel, 2000.0, 50.0, Some(forward(tx)))?;
        sim.set_buffer_body(tyre)?;

        let handle = sim
            .body(wheel)
            .ok_or(PhysicsError::UnknownBody(wheel))?
            .handle();
        sim.add_controller(Box::new(Throttle {
            body: handle,
            torque: Vec3::new(0.0, 2.0, 0.0),
        }));

        let zone = sim.create_named_object("finish-line");
        let finish_line = sim.add_geom(
            zone,
            None,
            GeomDesc::new(GeomShape::Box {
                half_extents: Vec3::new(0.5, 10.0, 2.0),
            })
            .with_translation(Vec3::new(10.0, 0.0, 2.0))
            .with_surface(Surface::sensor()),
        )?;
        sim.set_sensor_event(finish_line, Some(forward(tx)), Some(forward(tx)))?;

        sim.add_timer(1.0, Some(1.0), forward(tx));

        info!(
            crates = crates.len(),
            geoms = sim.geoms().len(),
            "demo scene built"
        );
        Ok(Self {
            crates,
            finish_line,
            wheel,
            laps: 0,
        })
    }

    /// Reacts to a script call forwarded from the simulation thread.
    pub fn handle_call(&mut self, call: &ScriptCall, sim: &mut Simulation) {
        match (call.event, call.target) {
            (ScriptEvent::BufferDepleted, EventTarget::Geom(geom)) => {
                let Some(body) = sim.geom(geom).and_then(|g| g.body()) else {
                    return;
                };
                info!(?geom, "crate smashed");
                // Removing the body takes its geom along and drops the
                // object's activity to zero.
                if let Err(e) = sim.destroy_body(body) {
                    warn!(error = %e, "failed to remove smashed crate");
                }
            }
            (ScriptEvent::BufferDepleted, EventTarget::Body(body)) if body == self.wheel => {
                info!("wheel damaged beyond repair, restoring it");
                if let Err(e) = sim.increase_body_buffer(body, 100.0) {
                    warn!(error = %e, "failed to repair wheel");
                }
            }
            (ScriptEvent::ObjectInactive, EventTarget::Object(object)) => {
                if let Some(index) = self.crates.iter().position(|c| c.object == object) {
                    let removed = self.crates.swap_remove(index);
                    debug!(body = ?removed.body, "crate object inactive");
                }
                if let Err(e) = sim.destroy_object(object) {
                    warn!(error = %e, "failed to destroy inactive object");
                }
            }
            (ScriptEvent::SensorTriggered(entered), EventTarget::Geom(geom))
                if geom == self.finish_line =>
            {
                if entered {
                    self.laps += 1;
                    info!(laps = self.laps, time = sim.time(), "finish line crossed");
                } else {
                    debug!("finish line clear");
                }
            }
            (ScriptEvent::Timer, EventTarget::Timer(_)) => {
                let speed = sim
                    .rigid_body(self.wheel)
                    .map(|rb| Vec3::new(rb.linvel().x, rb.linvel().y, rb.linvel().z).length())
                    .unwrap_or_default();
                info!(time = sim.time(), speed, crates = self.crates.len(), "split");
            }
            (event, target) => debug!(?event, ?target, "unhandled script call"),
        }
    }

    /// Finish-line crossings so far.
    pub fn laps(&self) -> u32 {
        self.laps
    }

    /// Crates still standing.
    pub fn crates_left(&self) -> usize {
        self.crates.len()
    }
}
