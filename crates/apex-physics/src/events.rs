//! Deferred script events.
//!
//! Conditions raised during micro steps (buffer depletion, sensor edges,
//! object inactivity) are queued here and flushed once per macro step. The
//! queue stores only `(kind, target)`; the script handle is looked up on the
//! target at flush time, so reconfiguring or destroying the target before the
//! flush is always safe.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::registry::{BodyId, GeomId, ObjectId};
use crate::timers::TimerId;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptEvent {
    /// A damage buffer's capacity went negative.
    BufferDepleted,
    /// A sensor geom started (`true`) or stopped (`false`) colliding.
    SensorTriggered(bool),
    /// An object's activity counter reached zero.
    ObjectInactive,
    /// A timer reached its deadline.
    Timer,
}

/// Who it happened to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTarget {
    /// A scene object.
    Object(ObjectId),
    /// A rigid body.
    Body(BodyId),
    /// A collision geom.
    Geom(GeomId),
    /// A timer.
    Timer(TimerId),
}

/// The value handed to a script when it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptCall {
    /// Event kind.
    pub event: ScriptEvent,
    /// Event source.
    pub target: EventTarget,
}

/// Opaque callable owned by the scripting layer.
///
/// Scripts run on the simulation thread while the world lock is held. They
/// must not lock the world themselves; forward work through a channel instead.
#[derive(Clone)]
pub struct ScriptHandle(Arc<dyn Fn(&ScriptCall) + Send + Sync>);

impl ScriptHandle {
    /// Wraps a closure.
    pub fn new(f: impl Fn(&ScriptCall) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Runs the script.
    pub fn call(&self, call: &ScriptCall) {
        (self.0)(call)
    }
}

impl fmt::Debug for ScriptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScriptHandle(..)")
    }
}

/// A queued event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueuedEvent {
    /// Event kind.
    pub event: ScriptEvent,
    /// Event source.
    pub target: EventTarget,
}

/// FIFO of pending events with at most one entry per `(kind, target)`.
///
/// Both sensor edges share one key, so a geom has at most one pending edge.
#[derive(Debug, Default)]
pub struct EventBuffer {
    queue: VecDeque<QueuedEvent>,
    pending: FxHashSet<(EventKey, EventTarget)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EventKey {
    Buffer,
    Sensor,
    Inactive,
    Timer,
}

fn key(event: ScriptEvent) -> EventKey {
    match event {
        ScriptEvent::BufferDepleted => EventKey::Buffer,
        ScriptEvent::SensorTriggered(_) => EventKey::Sensor,
        ScriptEvent::ObjectInactive => EventKey::Inactive,
        ScriptEvent::Timer => EventKey::Timer,
    }
}

impl EventBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an event. Returns `false` if an entry of the same kind was
    /// already pending for this target.
    pub fn queue(&mut self, event: ScriptEvent, target: EventTarget) -> bool {
        if !self.pending.insert((key(event), target)) {
            return false;
        }
        self.queue.push_back(QueuedEvent { event, target });
        true
    }

    /// Drops every pending event for `target`.
    pub fn purge(&mut self, target: EventTarget) {
        if self.queue.iter().all(|e| e.target != target) {
            return;
        }
        self.queue.retain(|e| e.target != target);
        self.pending.retain(|(_, t)| *t != target);
    }

    /// Drops pending events of one kind for `target`.
    pub fn purge_kind(&mut self, event: ScriptEvent, target: EventTarget) {
        let k = key(event);
        if self.pending.remove(&(k, target)) {
            self.queue
                .retain(|e| !(e.target == target && key(e.event) == k));
        }
    }

    /// Removes all pending events in insertion order.
    pub fn drain(&mut self) -> Vec<QueuedEvent> {
        self.pending.clear();
        self.queue.drain(..).collect()
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns `true` if `event` is pending for `target`.
    pub fn is_pending(&self, event: ScriptEvent, target: EventTarget) -> bool {
        self.pending.contains(&(key(event), target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn ids() -> (GeomId, BodyId) {
        let mut geoms: Registry<GeomId, ()> = Registry::new();
        let mut bodies: Registry<BodyId, ()> = Registry::new();
        (geoms.insert(()), bodies.insert(()))
    }

    #[test]
    fn test_fifo_order() {
        let (geom, body) = ids();
        let mut buf = EventBuffer::new();
        buf.queue(ScriptEvent::BufferDepleted, EventTarget::Body(body));
        buf.queue(ScriptEvent::SensorTriggered(true), EventTarget::Geom(geom));
        buf.queue(ScriptEvent::BufferDepleted, EventTarget::Geom(geom));

        let drained = buf.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].target, EventTarget::Body(body));
        assert_eq!(drained[1].event, ScriptEvent::SensorTriggered(true));
        assert_eq!(drained[2].event, ScriptEvent::BufferDepleted);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_duplicate_not_requeued() {
        let (_, body) = ids();
        let mut buf = EventBuffer::new();
        assert!(buf.queue(ScriptEvent::BufferDepleted, EventTarget::Body(body)));
        assert!(!buf.queue(ScriptEvent::BufferDepleted, EventTarget::Body(body)));
        assert_eq!(buf.len(), 1);

        // After a flush the same event may be queued again.
        buf.drain();
        assert!(buf.queue(ScriptEvent::BufferDepleted, EventTarget::Body(body)));
    }

    #[test]
    fn test_purge_removes_target() {
        let (geom, body) = ids();
        let mut buf = EventBuffer::new();
        buf.queue(ScriptEvent::BufferDepleted, EventTarget::Geom(geom));
        buf.queue(ScriptEvent::SensorTriggered(false), EventTarget::Geom(geom));
        buf.queue(ScriptEvent::BufferDepleted, EventTarget::Body(body));

        buf.purge(EventTarget::Geom(geom));
        assert_eq!(buf.len(), 1);
        assert!(!buf.is_pending(ScriptEvent::BufferDepleted, EventTarget::Geom(geom)));
        assert!(buf.queue(ScriptEvent::BufferDepleted, EventTarget::Geom(geom)));
    }

    #[test]
    fn test_purge_kind_keeps_other_kinds() {
        let (geom, _) = ids();
        let mut buf = EventBuffer::new();
        buf.queue(ScriptEvent::BufferDepleted, EventTarget::Geom(geom));
        buf.queue(ScriptEvent::SensorTriggered(true), EventTarget::Geom(geom));

        buf.purge_kind(ScriptEvent::BufferDepleted, EventTarget::Geom(geom));
        let drained = buf.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].event, ScriptEvent::SensorTriggered(true));
    }

    #[test]
    fn test_script_handle_receives_call() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let (geom, _) = ids();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let script = ScriptHandle::new(move |call| {
            assert_eq!(call.event, ScriptEvent::SensorTriggered(true));
            seen.fetch_add(1, Ordering::SeqCst);
        });
        script.call(&ScriptCall {
            event: ScriptEvent::SensorTriggered(true),
            target: EventTarget::Geom(geom),
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
