//! Scene objects: the coordination point every component hangs off.

use tracing::error;

use crate::error::PhysicsError;
use crate::events::ScriptHandle;
use crate::registry::{BodyId, GeomId, JointId, ObjectId};

/// A component attached to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentId {
    /// Rigid body.
    Body(BodyId),
    /// Collision geom.
    Geom(GeomId),
    /// Joint.
    Joint(JointId),
}

/// Root of a scene entity.
///
/// Owns no physics state itself. Tracks which components belong to it and
/// how many of them still count as active.
#[derive(Debug, Default)]
pub struct Object {
    /// Optional display name.
    pub name: Option<String>,
    activity: u32,
    components: Vec<ComponentId>,
    on_inactive: Option<ScriptHandle>,
}

impl Object {
    /// Creates an object with no components.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a named object.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Current activity count.
    pub fn activity(&self) -> u32 {
        self.activity
    }

    /// Components in attach order.
    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    /// Script run when activity reaches zero.
    pub fn on_inactive(&self) -> Option<&ScriptHandle> {
        self.on_inactive.as_ref()
    }

    /// Sets or clears the inactivity script.
    pub fn set_inactive_event(&mut self, script: Option<ScriptHandle>) {
        self.on_inactive = script;
    }

    /// Bumps the activity counter.
    pub fn increase_activity(&mut self) {
        self.activity += 1;
    }

    /// Drops the activity counter by one.
    ///
    /// Returns `Ok(true)` when this decrement reached zero. Decrementing an
    /// inactive object is an error; the counter stays at zero.
    pub fn decrease_activity(&mut self, id: ObjectId) -> Result<bool, PhysicsError> {
        match self.activity.checked_sub(1) {
            Some(next) => {
                self.activity = next;
                Ok(next == 0)
            }
            None => {
                error!(object = ?id, "activity counter decremented below zero");
                Err(PhysicsError::ActivityUnderflow(id))
            }
        }
    }

    pub(crate) fn attach(&mut self, component: ComponentId) {
        self.components.push(component);
    }

    /// Forgets a component. Returns `false` if it was not attached.
    pub(crate) fn detach(&mut self, component: ComponentId) -> bool {
        match self.components.iter().position(|c| *c == component) {
            Some(index) => {
                self.components.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn take_components(&mut self) -> Vec<ComponentId> {
        std::mem::take(&mut self.components)
    }
}
