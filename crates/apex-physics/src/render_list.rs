//! Double-buffered render snapshots handed from the simulation thread to the
//! presentation thread.
//!
//! The simulation fills the back buffer, then swaps it with the front buffer
//! under a short lock. Readers only ever see complete frames.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use glam::{Quat, Vec3};

use crate::registry::{BodyId, GeomId};

/// Opaque id of a render model owned by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(pub u32);

/// What a render entry follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderSource {
    /// A body's pose.
    Body(BodyId),
    /// A geom's world pose.
    Geom(GeomId),
}

/// One model at one pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderEntry {
    /// Where the pose came from.
    pub source: RenderSource,
    /// Model to draw.
    pub model: ModelId,
    /// World position.
    pub translation: Vec3,
    /// World orientation.
    pub rotation: Quat,
}

/// A complete snapshot published after a macro step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderFrame {
    /// Publish counter, starting at 1 for the first frame.
    pub sequence: u64,
    /// Simulated time in seconds.
    pub time: f64,
    /// Models to draw.
    pub entries: Vec<RenderEntry>,
}

/// Back and front render buffers plus the new-frame signal.
#[derive(Debug, Default)]
pub struct RenderList {
    back: Mutex<RenderFrame>,
    front: Mutex<RenderFrame>,
    new_frame: Condvar,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RenderList {
    /// Creates an empty list. No frame is published yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills the back buffer with `fill` and swaps it to the front.
    ///
    /// Returns the sequence number of the published frame.
    pub fn publish(&self, time: f64, fill: impl FnOnce(&mut Vec<RenderEntry>)) -> u64 {
        let mut back = lock(&self.back);
        back.entries.clear();
        fill(&mut back.entries);
        back.time = time;

        let mut front = lock(&self.front);
        back.sequence = front.sequence + 1;
        std::mem::swap(&mut *back, &mut *front);
        front.sequence
    }

    /// Wakes every thread blocked in [`wait_for_frame`](Self::wait_for_frame).
    pub fn notify(&self) {
        self.new_frame.notify_all();
    }

    /// Clone of the most recent frame.
    pub fn latest(&self) -> RenderFrame {
        lock(&self.front).clone()
    }

    /// Sequence number of the most recent frame, 0 before the first publish.
    pub fn sequence(&self) -> u64 {
        lock(&self.front).sequence
    }

    /// Blocks until a frame newer than `after` is published or `timeout`
    /// passes. Returns the frame, or `None` on timeout.
    pub fn wait_for_frame(&self, after: u64, timeout: Duration) -> Option<RenderFrame> {
        let front = lock(&self.front);
        let (front, _) = self
            .new_frame
            .wait_timeout_while(front, timeout, |frame| frame.sequence <= after)
            .unwrap_or_else(PoisonError::into_inner);
        (front.sequence > after).then(|| front.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::registry::Registry;

    fn entry(body: BodyId, x: f32) -> RenderEntry {
        RenderEntry {
            source: RenderSource::Body(body),
            model: ModelId(7),
            translation: Vec3::new(x, 0.0, 0.0),
            rotation: Quat::IDENTITY,
        }
    }

    #[test]
    fn test_publish_swaps_buffers() {
        let mut bodies: Registry<BodyId, ()> = Registry::new();
        let body = bodies.insert(());
        let list = RenderList::new();
        assert_eq!(list.sequence(), 0);

        assert_eq!(list.publish(0.01, |e| e.push(entry(body, 1.0))), 1);
        assert_eq!(list.publish(0.02, |e| e.push(entry(body, 2.0))), 2);

        let frame = list.latest();
        assert_eq!(frame.sequence, 2);
        assert_eq!(frame.entries.len(), 1);
        assert_eq!(frame.entries[0].translation.x, 2.0);
        assert!((frame.time - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_back_buffer_is_cleared_before_fill() {
        let mut bodies: Registry<BodyId, ()> = Registry::new();
        let body = bodies.insert(());
        let list = RenderList::new();
        for i in 0..4 {
            list.publish(0.0, |e| e.push(entry(body, i as f32)));
        }
        assert_eq!(list.latest().entries.len(), 1);
    }

    #[test]
    fn test_wait_times_out_without_publish() {
        let list = RenderList::new();
        assert!(list.wait_for_frame(0, Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_reader_sees_new_frame_after_publish() {
        let list = Arc::new(RenderList::new());
        let reader = {
            let list = Arc::clone(&list);
            std::thread::spawn(move || list.wait_for_frame(0, Duration::from_secs(5)))
        };
        std::thread::sleep(Duration::from_millis(20));
        list.publish(0.01, |_| {});
        list.notify();

        let frame = reader.join().unwrap();
        assert_eq!(frame.map(|f| f.sequence), Some(1));
    }

    #[test]
    fn test_already_published_frame_returns_immediately() {
        let list = RenderList::new();
        list.publish(0.01, |_| {});
        let frame = list.wait_for_frame(0, Duration::ZERO);
        assert!(frame.is_some());
        assert!(list.wait_for_frame(1, Duration::ZERO).is_none());
    }
}
