//! Damage buffers: a capacity drained by contact forces above a threshold.

use crate::events::ScriptHandle;

/// Threshold/capacity pair plus the script run on depletion.
#[derive(Clone)]
pub struct DamageBuffer {
    /// Smallest force that causes damage.
    pub threshold: f32,
    /// Remaining capacity; negative once depleted.
    pub capacity: f32,
    /// Script run when the buffer depletes.
    pub script: ScriptHandle,
}

impl std::fmt::Debug for DamageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DamageBuffer")
            .field("threshold", &self.threshold)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl DamageBuffer {
    /// Creates a buffer, or `None` if the parameters cannot describe one.
    ///
    /// `threshold` must be non-negative and `capacity` strictly positive.
    pub fn new(threshold: f32, capacity: f32, script: ScriptHandle) -> Option<Self> {
        if threshold.is_finite() && capacity.is_finite() && threshold >= 0.0 && capacity > 0.0 {
            Some(Self {
                threshold,
                capacity,
                script,
            })
        } else {
            None
        }
    }

    /// Applies `force` for `step` seconds.
    ///
    /// Returns `true` exactly when this hit took the capacity from
    /// non-negative to negative. Forces below the threshold do nothing.
    pub fn damage(&mut self, force: f32, step: f32) -> bool {
        if force < self.threshold {
            return false;
        }
        let before = self.capacity;
        self.capacity -= force * step;
        before >= 0.0 && self.capacity < 0.0
    }

    /// Restores `amount` of capacity. Returns `true` if still depleted.
    pub fn increase(&mut self, amount: f32) -> bool {
        self.capacity += amount;
        self.capacity < 0.0
    }

    /// Returns `true` if the capacity is negative.
    pub fn is_depleted(&self) -> bool {
        self.capacity < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(threshold: f32, capacity: f32) -> DamageBuffer {
        DamageBuffer::new(threshold, capacity, ScriptHandle::new(|_| {})).unwrap()
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let script = ScriptHandle::new(|_| {});
        assert!(DamageBuffer::new(-1.0, 10.0, script.clone()).is_none());
        assert!(DamageBuffer::new(1.0, 0.0, script.clone()).is_none());
        assert!(DamageBuffer::new(1.0, f32::NAN, script.clone()).is_none());
        assert!(DamageBuffer::new(0.0, 1.0, script).is_some());
    }

    #[test]
    fn test_below_threshold_is_ignored() {
        let mut b = buffer(100.0, 1.0);
        assert!(!b.damage(99.0, 1.0));
        assert_eq!(b.capacity, 1.0);
    }

    #[test]
    fn test_depletes_once_per_crossing() {
        let mut b = buffer(10.0, 1.0);
        assert!(!b.damage(50.0, 0.01)); // 1.0 -> 0.5
        assert!(b.damage(100.0, 0.01)); // 0.5 -> -0.5
        assert!(!b.damage(100.0, 0.01)); // stays negative, no new crossing
        assert!((b.capacity + 1.5).abs() < 1e-5);
        assert!(b.is_depleted());
    }

    #[test]
    fn test_increase_reports_still_depleted() {
        let mut b = buffer(0.0, 1.0);
        b.damage(300.0, 0.01);
        assert!(b.increase(1.0)); // -2 -> -1
        assert!(!b.increase(5.0)); // -1 -> 4
        // Recharged buffer can cross zero again.
        assert!(b.damage(500.0, 0.01));
    }
}
