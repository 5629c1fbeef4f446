//! Time-based script triggers, advanced once per macro step.

use crate::events::ScriptHandle;

/// Handle to a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

struct Timer {
    id: TimerId,
    remaining: f32,
    interval: Option<f32>,
    script: ScriptHandle,
}

/// Pending timers.
#[derive(Default)]
pub struct TimerQueue {
    timers: Vec<Timer>,
    next_id: u64,
}

impl TimerQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `script` after `delay` seconds, then every `interval` seconds
    /// if one is given. Non-positive intervals make the timer one-shot.
    pub fn add(&mut self, delay: f32, interval: Option<f32>, script: ScriptHandle) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.timers.push(Timer {
            id,
            remaining: delay.max(0.0),
            interval: interval.filter(|i| *i > 0.0),
            script,
        });
        id
    }

    /// Cancels a timer. Returns `false` if it already fired or never existed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        self.timers.len() != before
    }

    /// Advances every timer by `dt` and returns the ones that fired, in
    /// creation order. Each timer fires at most once per call.
    pub fn advance(&mut self, dt: f32) -> Vec<(TimerId, ScriptHandle)> {
        let mut fired = Vec::new();
        self.timers.retain_mut(|timer| {
            timer.remaining -= dt;
            if timer.remaining > 0.0 {
                return true;
            }
            fired.push((timer.id, timer.script.clone()));
            match timer.interval {
                Some(interval) => {
                    timer.remaining = (timer.remaining + interval).max(0.0);
                    true
                }
                None => false,
            }
        });
        fired
    }

    /// Number of live timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Returns `true` if no timers are live.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Drops every timer.
    pub fn clear(&mut self) {
        self.timers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> ScriptHandle {
        ScriptHandle::new(|_| {})
    }

    #[test]
    fn test_one_shot_fires_once_at_deadline() {
        let mut timers = TimerQueue::new();
        let id = timers.add(0.75, None, noop());

        assert!(timers.advance(0.25).is_empty());
        assert!(timers.advance(0.25).is_empty());
        let fired = timers.advance(0.25);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, id);
        assert!(timers.is_empty());
        assert!(timers.advance(0.25).is_empty());
    }

    #[test]
    fn test_repeating_fires_every_interval() {
        let mut timers = TimerQueue::new();
        timers.add(0.5, Some(0.5), noop());

        let fires: usize = (0..10).map(|_| timers.advance(0.25).len()).sum();
        assert_eq!(fires, 5);
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn test_repeating_fires_at_most_once_per_advance() {
        let mut timers = TimerQueue::new();
        timers.add(0.0, Some(0.001), noop());
        assert_eq!(timers.advance(0.05).len(), 1);
        assert_eq!(timers.advance(0.05).len(), 1);
    }

    #[test]
    fn test_cancel() {
        let mut timers = TimerQueue::new();
        let id = timers.add(1.0, None, noop());
        assert!(timers.cancel(id));
        assert!(!timers.cancel(id));
        assert!(timers.advance(2.0).is_empty());
    }
}
