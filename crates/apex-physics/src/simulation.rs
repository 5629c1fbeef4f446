//! The simulation context: every registry, the Rapier world, the event queue
//! and the fixed-step stepping logic.
//!
//! One macro step runs `multiplier` micro steps of `stepsize / multiplier`
//! seconds each, then polls sensors, flushes script events and advances
//! timers. Render state is published separately so a paused loop can keep
//! publishing.

use std::sync::Arc;

use apex_config::{EnvironmentConfig, PhysicsConfig};
use tracing::{debug, info, trace, warn};

use crate::PhysicsWorld;
use crate::body::{AutoDisable, Body, BodyDesc, Environment};
use crate::contact::{self, ContactPolicy};
use crate::error::PhysicsError;
use crate::events::{EventBuffer, EventTarget, QueuedEvent, ScriptCall, ScriptEvent, ScriptHandle};
use crate::feedback::{self, CollisionFeedback};
use crate::geom::{DamageSink, Geom, GeomDesc};
use crate::joint::{self, Joint, JointDesc};
use crate::object::{ComponentId, Object};
use crate::registry::{BodyId, GeomId, JointId, ObjectId, Registry};
use crate::render_list::{RenderEntry, RenderList, RenderSource};
use crate::timers::{TimerId, TimerQueue};
use crate::{quat_from_rapier, vec_from_rapier};

/// External behaviour stepped at the start of every micro step (driver
/// input, scripted motion, camera kinematics).
pub trait Controller: Send {
    /// Runs once per micro step of `step` seconds.
    fn physics_step(&mut self, world: &mut PhysicsWorld, step: f32);
}

/// Counters for the most recent macro step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepStats {
    /// Micro steps run.
    pub micro_steps: u32,
    /// Collision feedback entries consumed.
    pub feedback_resolved: usize,
    /// Sum of `force · step` handed to damage buffers.
    pub damage_dealt: f32,
    /// Scripts run while flushing events.
    pub events_flushed: usize,
    /// Timers that fired.
    pub timers_fired: usize,
    /// Bodies that fell asleep.
    pub bodies_disabled: usize,
}

/// A complete scene and its stepping state.
pub struct Simulation {
    world: PhysicsWorld,
    objects: Registry<ObjectId, Object>,
    bodies: Registry<BodyId, Body>,
    geoms: Registry<GeomId, Geom>,
    joints: Registry<JointId, Joint>,
    events: EventBuffer,
    feedback: Vec<CollisionFeedback>,
    timers: TimerQueue,
    controllers: Vec<Box<dyn Controller>>,
    config: PhysicsConfig,
    environment: Environment,
    auto_disable: AutoDisable,
    render: Arc<RenderList>,
    stats: StepStats,
    steps: u64,
    time: f64,
}

impl Simulation {
    /// Creates an empty scene.
    ///
    /// Fails if the step size cannot drive a world. A zero multiplier is
    /// replaced by 1.
    pub fn new(
        config: &PhysicsConfig,
        environment: &EnvironmentConfig,
    ) -> Result<Self, PhysicsError> {
        if !(config.stepsize.is_finite() && config.stepsize > 0.0) {
            return Err(PhysicsError::InvalidConfig(format!(
                "stepsize must be positive, got {}",
                config.stepsize
            )));
        }
        let mut config = config.clone();
        if config.multiplier == 0 {
            warn!("multiplier is 0, using 1");
            config.multiplier = 1;
        }

        let environment = Environment::from(environment);
        let mut world = PhysicsWorld::new(config.micro_stepsize(), config.iterations);
        world.set_gravity(environment.gravity);

        info!(
            stepsize = config.stepsize,
            multiplier = config.multiplier,
            iterations = config.iterations,
            "simulation created"
        );

        Ok(Self {
            world,
            objects: Registry::new(),
            bodies: Registry::new(),
            geoms: Registry::new(),
            joints: Registry::new(),
            events: EventBuffer::new(),
            feedback: Vec::new(),
            timers: TimerQueue::new(),
            controllers: Vec::new(),
            auto_disable: AutoDisable::from(&config),
            config,
            environment,
            render: Arc::new(RenderList::new()),
            stats: StepStats::default(),
            steps: 0,
            time: 0.0,
        })
    }

    // --- Accessors ---

    /// Rapier state.
    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    /// Mutable Rapier state.
    pub fn world_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.world
    }

    /// Effective configuration.
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Current environment.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Replaces the environment, including world gravity.
    pub fn set_environment(&mut self, environment: Environment) {
        self.world.set_gravity(environment.gravity);
        self.environment = environment;
    }

    /// Shared render list.
    pub fn render_list(&self) -> Arc<RenderList> {
        Arc::clone(&self.render)
    }

    /// Counters for the last macro step.
    pub fn stats(&self) -> StepStats {
        self.stats
    }

    /// Macro steps run so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Simulated seconds so far.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Pending script events.
    pub fn events(&self) -> &EventBuffer {
        &self.events
    }

    /// Object lookup.
    pub fn object(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(id)
    }

    /// Body lookup.
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id)
    }

    /// Mutable body lookup.
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(id)
    }

    /// Geom lookup.
    pub fn geom(&self, id: GeomId) -> Option<&Geom> {
        self.geoms.get(id)
    }

    /// Mutable geom lookup.
    pub fn geom_mut(&mut self, id: GeomId) -> Option<&mut Geom> {
        self.geoms.get_mut(id)
    }

    /// Joint lookup.
    pub fn joint(&self, id: JointId) -> Option<&Joint> {
        self.joints.get(id)
    }

    /// All objects.
    pub fn objects(&self) -> &Registry<ObjectId, Object> {
        &self.objects
    }

    /// All bodies.
    pub fn bodies(&self) -> &Registry<BodyId, Body> {
        &self.bodies
    }

    /// All geoms.
    pub fn geoms(&self) -> &Registry<GeomId, Geom> {
        &self.geoms
    }

    /// All joints.
    pub fn joints(&self) -> &Registry<JointId, Joint> {
        &self.joints
    }

    /// Rapier body behind a body handle.
    pub fn rigid_body(&self, id: BodyId) -> Option<&rapier3d::prelude::RigidBody> {
        let handle = self.bodies.get(id)?.handle();
        self.world.rigid_body_set.get(handle)
    }

    /// Mutable Rapier body behind a body handle.
    pub fn rigid_body_mut(&mut self, id: BodyId) -> Option<&mut rapier3d::prelude::RigidBody> {
        let handle = self.bodies.get(id)?.handle();
        self.world.rigid_body_set.get_mut(handle)
    }

    // --- Scene construction ---

    /// Creates an empty object.
    pub fn create_object(&mut self) -> ObjectId {
        self.objects.insert(Object::new())
    }

    /// Creates an empty named object.
    pub fn create_named_object(&mut self, name: impl Into<String>) -> ObjectId {
        self.objects.insert(Object::named(name))
    }

    /// Registers an external controller.
    pub fn add_controller(&mut self, controller: Box<dyn Controller>) {
        self.controllers.push(controller);
    }

    fn attach(&mut self, object: ObjectId, component: ComponentId) {
        if let Some(obj) = self.objects.get_mut(object) {
            obj.attach(component);
            obj.increase_activity();
        }
    }

    /// Adds a rigid body to `object`.
    pub fn add_body(&mut self, object: ObjectId, desc: BodyDesc) -> Result<BodyId, PhysicsError> {
        if !self.objects.contains(object) {
            return Err(PhysicsError::UnknownObject(object));
        }
        let world = &mut self.world;
        let config = &self.config;
        let auto_disable = &self.auto_disable;
        let id = self.bodies.insert_with(|id| {
            let handle = world
                .rigid_body_set
                .insert(desc.build(id.to_user_data(), auto_disable));
            Body::new(object, handle, &desc, config)
        });
        self.attach(object, ComponentId::Body(id));
        debug!(?object, body = ?id, "body added");
        Ok(id)
    }

    /// Adds a geom to `object`, attached to `body` or static when `None`.
    pub fn add_geom(
        &mut self,
        object: ObjectId,
        body: Option<BodyId>,
        desc: GeomDesc,
    ) -> Result<GeomId, PhysicsError> {
        if !self.objects.contains(object) {
            return Err(PhysicsError::UnknownObject(object));
        }
        let parent = match body {
            Some(body_id) => Some(
                self.bodies
                    .get(body_id)
                    .ok_or(PhysicsError::UnknownBody(body_id))?
                    .handle(),
            ),
            None => None,
        };
        let mut collider = desc.build()?;

        let world = &mut self.world;
        let id = self.geoms.insert_with(|id| {
            collider.user_data = id.to_user_data();
            let handle = match parent {
                Some(parent) => world.collider_set.insert_with_parent(
                    collider,
                    parent,
                    &mut world.rigid_body_set,
                ),
                None => world.collider_set.insert(collider),
            };
            Geom::new(object, handle, body, &desc)
        });
        self.attach(object, ComponentId::Geom(id));
        debug!(?object, geom = ?id, ?body, "geom added");
        Ok(id)
    }

    /// Adds a joint between two bodies to `object`.
    pub fn add_joint(&mut self, object: ObjectId, desc: JointDesc) -> Result<JointId, PhysicsError> {
        if !self.objects.contains(object) {
            return Err(PhysicsError::UnknownObject(object));
        }
        let h1 = self
            .bodies
            .get(desc.body1)
            .ok_or(PhysicsError::UnknownBody(desc.body1))?
            .handle();
        let h2 = self
            .bodies
            .get(desc.body2)
            .ok_or(PhysicsError::UnknownBody(desc.body2))?
            .handle();
        let handle = desc
            .kind
            .build()
            .map(|joint| self.world.impulse_joint_set.insert(h1, h2, joint, true));
        let id = self.joints.insert(Joint::new(object, &desc, handle));
        self.attach(object, ComponentId::Joint(id));
        debug!(?object, joint = ?id, "joint added");
        Ok(id)
    }

    // --- Activity and destruction ---

    /// Bumps an object's activity counter.
    pub fn increase_activity(&mut self, object: ObjectId) -> Result<(), PhysicsError> {
        self.objects
            .get_mut(object)
            .ok_or(PhysicsError::UnknownObject(object))?
            .increase_activity();
        Ok(())
    }

    /// Drops an object's activity counter, queueing `ObjectInactive` when it
    /// reaches zero.
    pub fn decrease_activity(&mut self, object: ObjectId) -> Result<(), PhysicsError> {
        let obj = self
            .objects
            .get_mut(object)
            .ok_or(PhysicsError::UnknownObject(object))?;
        if obj.decrease_activity(object)? {
            debug!(?object, "object inactive");
            self.events
                .queue(ScriptEvent::ObjectInactive, EventTarget::Object(object));
        }
        Ok(())
    }

    /// Detaches a destroyed component from its (possibly already gone) object.
    fn release(&mut self, object: ObjectId, component: ComponentId) {
        let Some(obj) = self.objects.get_mut(object) else {
            return;
        };
        if obj.detach(component) {
            // Underflow is logged inside and leaves the counter at zero.
            let _ = self.decrease_activity(object);
        }
    }

    /// Destroys a joint.
    pub fn destroy_joint(&mut self, id: JointId) -> Result<(), PhysicsError> {
        let joint = self.joints.remove(id).ok_or(PhysicsError::UnknownJoint(id))?;
        if let Some(handle) = joint.handle() {
            self.world.impulse_joint_set.remove(handle, true);
        }
        self.release(joint.object(), ComponentId::Joint(id));
        trace!(joint = ?id, "joint destroyed");
        Ok(())
    }

    /// Destroys a geom.
    pub fn destroy_geom(&mut self, id: GeomId) -> Result<(), PhysicsError> {
        let geom = self.geoms.remove(id).ok_or(PhysicsError::UnknownGeom(id))?;
        self.events.purge(EventTarget::Geom(id));
        self.feedback
            .retain(|f| f.geom1 != id && f.geom2 != id);
        self.world.remove_collider(geom.collider());
        self.release(geom.object(), ComponentId::Geom(id));
        trace!(geom = ?id, "geom destroyed");
        Ok(())
    }

    /// Destroys a body together with the geoms and joints attached to it.
    pub fn destroy_body(&mut self, id: BodyId) -> Result<(), PhysicsError> {
        if !self.bodies.contains(id) {
            return Err(PhysicsError::UnknownBody(id));
        }
        let attached_geoms: Vec<GeomId> = self
            .geoms
            .iter()
            .filter(|(_, g)| g.body() == Some(id))
            .map(|(gid, _)| gid)
            .collect();
        for geom in attached_geoms {
            self.destroy_geom(geom)?;
        }
        let attached_joints: Vec<JointId> = self
            .joints
            .iter()
            .filter(|(_, j)| {
                let (b1, b2) = j.bodies();
                b1 == id || b2 == id
            })
            .map(|(jid, _)| jid)
            .collect();
        for joint in attached_joints {
            self.destroy_joint(joint)?;
        }

        let body = self.bodies.remove(id).ok_or(PhysicsError::UnknownBody(id))?;
        self.events.purge(EventTarget::Body(id));
        self.world.remove_body(body.handle());
        self.release(body.object(), ComponentId::Body(id));
        trace!(body = ?id, "body destroyed");
        Ok(())
    }

    fn destroy_component(&mut self, component: ComponentId) {
        // Components may already be gone (a body takes its geoms with it).
        let _ = match component {
            ComponentId::Joint(id) => self.destroy_joint(id),
            ComponentId::Geom(id) => self.destroy_geom(id),
            ComponentId::Body(id) => self.destroy_body(id),
        };
    }

    /// Destroys an object and every component attached to it.
    pub fn destroy_object(&mut self, id: ObjectId) -> Result<(), PhysicsError> {
        let mut object = self
            .objects
            .remove(id)
            .ok_or(PhysicsError::UnknownObject(id))?;
        let components = object.take_components();
        for component in components.into_iter().rev() {
            self.destroy_component(component);
        }
        self.events.purge(EventTarget::Object(id));
        debug!(object = ?id, name = ?object.name, "object destroyed");
        Ok(())
    }

    /// Destroys every object.
    pub fn destroy_all(&mut self) {
        let objects = self.objects.keys();
        let count = objects.len();
        for id in objects {
            let _ = self.destroy_object(id);
        }
        info!(count, "all objects destroyed");
    }

    /// Drains every registry, queue and controller.
    pub fn teardown(&mut self) {
        self.destroy_all();
        self.events.drain();
        self.feedback.clear();
        self.timers.clear();
        self.controllers.clear();
        info!(steps = self.steps, time = self.time, "simulation torn down");
    }

    // --- Event configuration ---

    /// Sets or clears the script run when `object` becomes inactive.
    pub fn set_inactive_event(
        &mut self,
        object: ObjectId,
        script: Option<ScriptHandle>,
    ) -> Result<(), PhysicsError> {
        self.objects
            .get_mut(object)
            .ok_or(PhysicsError::UnknownObject(object))?
            .set_inactive_event(script);
        Ok(())
    }

    /// Configures a body's damage buffer. Returns whether it is enabled.
    pub fn set_body_buffer_event(
        &mut self,
        body: BodyId,
        threshold: f32,
        capacity: f32,
        script: Option<ScriptHandle>,
    ) -> Result<bool, PhysicsError> {
        let enabled = self
            .bodies
            .get_mut(body)
            .ok_or(PhysicsError::UnknownBody(body))?
            .set_buffer_event(threshold, capacity, script);
        self.events
            .purge_kind(ScriptEvent::BufferDepleted, EventTarget::Body(body));
        Ok(enabled)
    }

    /// Configures a geom's own damage buffer. Returns whether it is enabled.
    pub fn set_geom_buffer_event(
        &mut self,
        geom: GeomId,
        threshold: f32,
        capacity: f32,
        script: Option<ScriptHandle>,
    ) -> Result<bool, PhysicsError> {
        let enabled = self
            .geoms
            .get_mut(geom)
            .ok_or(PhysicsError::UnknownGeom(geom))?
            .set_buffer_event(threshold, capacity, script);
        self.events
            .purge_kind(ScriptEvent::BufferDepleted, EventTarget::Geom(geom));
        Ok(enabled)
    }

    /// Sends a geom's damage to its body's buffer.
    pub fn set_buffer_body(&mut self, geom: GeomId) -> Result<BodyId, PhysicsError> {
        let body = self
            .geoms
            .get_mut(geom)
            .ok_or(PhysicsError::UnknownGeom(geom))?
            .set_buffer_body()
            .ok_or(PhysicsError::StaticGeom(geom))?;
        self.events
            .purge_kind(ScriptEvent::BufferDepleted, EventTarget::Geom(geom));
        Ok(body)
    }

    /// Configures sensor scripts on a geom.
    pub fn set_sensor_event(
        &mut self,
        geom: GeomId,
        on_trigger: Option<ScriptHandle>,
        on_untrigger: Option<ScriptHandle>,
    ) -> Result<(), PhysicsError> {
        self.geoms
            .get_mut(geom)
            .ok_or(PhysicsError::UnknownGeom(geom))?
            .set_sensor_event(on_trigger, on_untrigger);
        self.events
            .purge_kind(ScriptEvent::SensorTriggered(false), EventTarget::Geom(geom));
        Ok(())
    }

    /// Applies a hit to a body's buffer.
    pub fn damage_body_buffer(
        &mut self,
        body: BodyId,
        force: f32,
        step: f32,
    ) -> Result<(), PhysicsError> {
        if !self.bodies.contains(body) {
            return Err(PhysicsError::UnknownBody(body));
        }
        feedback::damage_body(body, force, step, &mut self.bodies, &mut self.events);
        Ok(())
    }

    /// Applies a hit to wherever a geom's damage goes.
    pub fn damage_geom_buffer(
        &mut self,
        geom: GeomId,
        force: f32,
        step: f32,
    ) -> Result<(), PhysicsError> {
        if !self.geoms.contains(geom) {
            return Err(PhysicsError::UnknownGeom(geom));
        }
        feedback::damage_geom(
            geom,
            force,
            step,
            &mut self.geoms,
            &mut self.bodies,
            &mut self.events,
        );
        Ok(())
    }

    /// Restores body buffer capacity, re-queueing depletion if still negative.
    pub fn increase_body_buffer(&mut self, body: BodyId, amount: f32) -> Result<(), PhysicsError> {
        let still_depleted = self
            .bodies
            .get_mut(body)
            .ok_or(PhysicsError::UnknownBody(body))?
            .increase_buffer(amount);
        if still_depleted {
            self.events
                .queue(ScriptEvent::BufferDepleted, EventTarget::Body(body));
        }
        Ok(())
    }

    /// Restores geom buffer capacity (or its body's, when forwarded),
    /// re-queueing depletion if still negative.
    pub fn increase_geom_buffer(&mut self, geom: GeomId, amount: f32) -> Result<(), PhysicsError> {
        let sink = self
            .geoms
            .get_mut(geom)
            .ok_or(PhysicsError::UnknownGeom(geom))?
            .sink_mut();
        match sink {
            DamageSink::Disabled => Ok(()),
            DamageSink::Local(buffer) => {
                if buffer.increase(amount) {
                    self.events
                        .queue(ScriptEvent::BufferDepleted, EventTarget::Geom(geom));
                }
                Ok(())
            }
            DamageSink::Forward(body) => {
                let body = *body;
                self.increase_body_buffer(body, amount)
            }
        }
    }

    /// Schedules `script` after `delay` seconds, repeating every `interval`.
    pub fn add_timer(
        &mut self,
        delay: f32,
        interval: Option<f32>,
        script: ScriptHandle,
    ) -> TimerId {
        self.timers.add(delay, interval, script)
    }

    /// Cancels a timer.
    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.timers.cancel(id)
    }

    // --- Stepping ---

    /// Runs one micro step.
    pub fn micro_step(&mut self) {
        let step = self.config.micro_stepsize();

        for controller in &mut self.controllers {
            controller.physics_step(&mut self.world, step);
        }

        for (_, body) in self.bodies.iter_mut() {
            if let Some(rb) = self.world.rigid_body_set.get_mut(body.handle()) {
                body.apply_drag(rb, &self.environment, step);
            }
        }

        let policy = ContactPolicy::new(
            &self.geoms,
            step,
            self.config.contact_points,
            self.config.default_erp,
        );
        self.world.step_with_hooks(&policy);
        let outcome = policy.into_outcome();

        for (_, body) in self.bodies.iter_mut() {
            if let Some(rb) = self.world.rigid_body_set.get(body.handle())
                && body.track_sleep(rb)
            {
                self.stats.bodies_disabled += 1;
            }
        }

        let marks = contact::collision_marks(
            &self.world.narrow_phase,
            &self.world.collider_set,
            &self.geoms,
            step,
        );
        for (_, geom) in self.geoms.iter_mut() {
            geom.clear_collisions();
        }
        for mark in &marks {
            if let Some(geom) = self.geoms.get_mut(mark.geom) {
                if let Some(triangle) = mark.triangle {
                    geom.mark_triangle(triangle);
                }
                if mark.colliding {
                    geom.mark_colliding();
                }
            }
        }

        joint::apply_spring_forces(
            &self.joints,
            &self.bodies,
            &mut self.world.rigid_body_set,
            step,
        );

        self.feedback.extend(feedback::collect_feedback(
            &outcome.feedback,
            &self.world.narrow_phase,
            step,
        ));
        let summary = feedback::resolve_feedback(
            &mut self.feedback,
            &mut self.geoms,
            &mut self.bodies,
            &mut self.events,
            step,
        );
        self.stats.feedback_resolved += summary.resolved;
        self.stats.damage_dealt += summary.damage_dealt;
        self.stats.micro_steps += 1;
    }

    /// Runs one macro step: every micro step, then sensors, events and timers.
    pub fn macro_step(&mut self) -> StepStats {
        self.stats = StepStats::default();
        for _ in 0..self.config.multiplier {
            self.micro_step();
        }
        self.poll_sensors();
        self.stats.events_flushed = self.flush_events();

        self.steps += 1;
        self.time += self.config.stepsize as f64;
        self.stats.timers_fired = self.advance_timers(self.config.stepsize);
        trace!(step = self.steps, stats = ?self.stats, "macro step");
        self.stats
    }

    /// Macro step followed by a render publish.
    pub fn step(&mut self) -> StepStats {
        let stats = self.macro_step();
        self.publish_render_state();
        stats
    }

    /// Queues sensor edges seen since the last poll.
    pub fn poll_sensors(&mut self) {
        for (id, geom) in self.geoms.iter_mut() {
            if let Some(state) = geom.poll_sensor() {
                debug!(geom = ?id, state, "sensor edge");
                self.events
                    .queue(ScriptEvent::SensorTriggered(state), EventTarget::Geom(id));
            }
        }
    }

    fn script_for(&self, event: &QueuedEvent) -> Option<ScriptHandle> {
        match (event.event, event.target) {
            (ScriptEvent::BufferDepleted, EventTarget::Body(id)) => {
                Some(self.bodies.get(id)?.buffer()?.script.clone())
            }
            (ScriptEvent::BufferDepleted, EventTarget::Geom(id)) => {
                match self.geoms.get(id)?.sink() {
                    DamageSink::Local(buffer) => Some(buffer.script.clone()),
                    _ => None,
                }
            }
            (ScriptEvent::SensorTriggered(state), EventTarget::Geom(id)) => {
                let sensor = self.geoms.get(id)?.sensor()?;
                if state {
                    sensor.on_trigger.clone()
                } else {
                    sensor.on_untrigger.clone()
                }
            }
            (ScriptEvent::ObjectInactive, EventTarget::Object(id)) => {
                self.objects.get(id)?.on_inactive().cloned()
            }
            _ => None,
        }
    }

    /// Runs the scripts for every pending event in insertion order. Returns
    /// how many scripts ran.
    pub fn flush_events(&mut self) -> usize {
        let mut ran = 0;
        for event in self.events.drain() {
            match self.script_for(&event) {
                Some(script) => {
                    script.call(&ScriptCall {
                        event: event.event,
                        target: event.target,
                    });
                    ran += 1;
                }
                None => debug!(?event, "event target has no script, dropped"),
            }
        }
        ran
    }

    fn advance_timers(&mut self, dt: f32) -> usize {
        let fired = self.timers.advance(dt);
        for (id, script) in &fired {
            script.call(&ScriptCall {
                event: ScriptEvent::Timer,
                target: EventTarget::Timer(*id),
            });
        }
        fired.len()
    }

    /// Publishes poses of every body and geom with a render model.
    pub fn publish_render_state(&self) -> u64 {
        let world = &self.world;
        self.render.publish(self.time, |entries| {
            for (id, body) in self.bodies.iter() {
                let (Some(model), Some(rb)) = (body.model(), world.rigid_body_set.get(body.handle()))
                else {
                    continue;
                };
                entries.push(RenderEntry {
                    source: RenderSource::Body(id),
                    model,
                    translation: vec_from_rapier(&rb.translation()),
                    rotation: quat_from_rapier(&rb.rotation()),
                });
            }
            for (id, geom) in self.geoms.iter() {
                let (Some(model), Some(collider)) =
                    (geom.model(), world.collider_set.get(geom.collider()))
                else {
                    continue;
                };
                entries.push(RenderEntry {
                    source: RenderSource::Geom(id),
                    model,
                    translation: vec_from_rapier(&collider.translation()),
                    rotation: quat_from_rapier(&collider.rotation()),
                });
            }
        })
    }
}

#[cfg(test)]
#[path = "simulation_tests.rs"]
mod tests;
