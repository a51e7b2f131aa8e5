//! Hips offset: a smoothed root translation that helps limbs reach.
//!
//! After a solve without an explicit hips target, the residual between where
//! the targeted joints ended up and where they wanted to be is measured and
//! relaxed into a persistent offset. The next frame applies that offset to the
//! hips before solving.

use crate::config::IkConfig;
use crate::target::{Target, TargetType};
use crate::transform::Transform;
use glam::Vec3;

/// Persistent, exponentially relaxed hips offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HipOffsetEstimator {
    offset: Vec3,
    max_length: f32,
}

impl Default for HipOffsetEstimator {
    fn default() -> Self {
        Self::new(IkConfig::default().max_hips_offset_length)
    }
}

impl HipOffsetEstimator {
    /// Creates a zero offset clamped to `max_length`.
    pub fn new(max_length: f32) -> Self {
        Self {
            offset: Vec3::ZERO,
            max_length: max_length.max(0.0),
        }
    }

    /// Current offset.
    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    /// Largest allowed offset magnitude.
    pub fn max_length(&self) -> f32 {
        self.max_length
    }

    /// Sets the magnitude clamp. Takes effect on the next update.
    pub fn set_max_length(&mut self, max_length: f32) {
        self.max_length = max_length.max(0.0);
    }

    /// Zeroes the offset.
    pub fn reset(&mut self) {
        self.offset = Vec3::ZERO;
    }

    /// Sums the residuals of the solved targets into a new offset goal.
    ///
    /// `solved` are absolute poses after the solve. `under_head` is the
    /// head's absolute position in the under poses.
    pub fn measure(
        &self,
        config: &IkConfig,
        targets: &[Target],
        solved: &[Transform],
        head_index: Option<usize>,
        under_head: Option<Vec3>,
    ) -> Vec3 {
        let pressure =
            |v: Vec3| v * config.hips_pressure_scale - Vec3::Y * config.hips_pressure_offset;
        let mut new_offset = Vec3::ZERO;
        for target in targets {
            let Some(actual) = solved.get(target.index).map(|p| p.translation) else {
                continue;
            };
            let residual = target.translation() - actual;
            if Some(target.index) == head_index {
                match target.target_type {
                    TargetType::RotationOnly => {
                        if let Some(under) = under_head {
                            new_offset += (actual - under) * config.head_offset_slave_factor;
                        }
                    }
                    TargetType::HmdHead => {
                        // The head alone decides where the hips go.
                        new_offset = pressure(self.offset + residual);
                        break;
                    }
                    TargetType::RotationAndPosition => {
                        new_offset = pressure(new_offset + residual);
                    }
                    _ => {}
                }
            } else if target.target_type == TargetType::RotationAndPosition {
                new_offset += residual;
            }
        }
        if new_offset.is_finite() {
            new_offset
        } else {
            self.offset
        }
    }

    /// Relaxes the offset toward `new_offset` over `dt` seconds, then clamps it.
    pub fn relax(&mut self, config: &IkConfig, new_offset: Vec3, dt: f32) {
        let timescale = config.hips_offset_timescale;
        let tau = if dt < timescale { (dt / timescale).max(0.0) } else { 1.0 };
        self.offset += (new_offset - self.offset) * tau;

        let length = self.offset.length();
        if length > self.max_length {
            self.offset *= self.max_length / length;
        }
    }

    /// The offset with `dead_zone` removed from its length, if anything is left.
    pub fn applied_offset(&self, dead_zone: f32) -> Option<Vec3> {
        let length = self.offset.length();
        (length > dead_zone && length > 0.0).then(|| self.offset * ((length - dead_zone) / length))
    }
}
