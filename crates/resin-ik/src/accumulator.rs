//! Per-joint weighted rotation averaging.

use glam::Quat;

/// Collects weighted rotation proposals for one joint during a solve.
///
/// Proposals are summed on a common hemisphere and normalized on read, which
/// approximates a weighted circular mean. The dirty flag survives
/// [`clear`](Self::clear) so callers can tell which joints the last solve touched.
#[derive(Debug, Clone, Copy)]
pub struct RotationAccumulator {
    sum: Quat,
    total_weight: f32,
    count: u32,
    dirty: bool,
}

impl Default for RotationAccumulator {
    fn default() -> Self {
        Self {
            sum: Quat::from_xyzw(0.0, 0.0, 0.0, 0.0),
            total_weight: 0.0,
            count: 0,
            dirty: false,
        }
    }
}

impl RotationAccumulator {
    /// Adds a proposal with the given weight. Non-positive weights are ignored.
    pub fn add(&mut self, rotation: Quat, weight: f32) {
        if weight.is_nan() || weight <= 0.0 {
            return;
        }
        let signed = if self.sum.dot(rotation) < 0.0 {
            -weight
        } else {
            weight
        };
        self.sum = self.sum + rotation * signed;
        self.total_weight += weight;
        self.count += 1;
        self.dirty = true;
    }

    /// Number of proposals since the last clear.
    pub fn size(&self) -> usize {
        self.count as usize
    }

    /// Returns true if no proposals are pending.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Normalized weighted mean of the pending proposals.
    ///
    /// Falls back to identity when the total weight is zero.
    pub fn average(&self) -> Quat {
        let length = self.sum.length();
        if self.total_weight > 0.0 && length > f32::EPSILON {
            self.sum * (1.0 / length)
        } else {
            Quat::IDENTITY
        }
    }

    /// Whether any proposal was added since the last [`clear_and_clean`](Self::clear_and_clean).
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Drops pending proposals but keeps the dirty flag.
    pub fn clear(&mut self) {
        let dirty = self.dirty;
        *self = Self { dirty, ..Self::default() };
    }

    /// Drops pending proposals and the dirty flag.
    pub fn clear_and_clean(&mut self) {
        *self = Self::default();
    }
}
