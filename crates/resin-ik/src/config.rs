//! Solver tuning parameters.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Configuration for the inverse kinematics solver.
///
/// Lengths are in the skeleton's own units. The defaults were tuned against
/// centimetre-scale humanoid rigs.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IkConfig {
    /// Maximum CCD iterations per solve.
    pub max_iterations: u32,
    /// Stop iterating once every positional target is this close.
    pub max_error_tolerance: f32,
    /// Flex coefficient for chain depths beyond a target's own table.
    pub default_flex_coefficient: f32,
    /// Fraction of the missing tip twist leaked into a pivot when the tip is clamped.
    pub limit_leak_fraction: f32,
    /// Fraction of the head orientation error distributed per pivot for HMD targets.
    pub hmd_angle_distribution: f32,
    /// How strongly head drift of a rotation-only head target pulls the hips.
    pub head_offset_slave_factor: f32,
    /// Time constant (seconds) for relaxing the hips offset.
    pub hips_offset_timescale: f32,
    /// Dead zone subtracted from the hips offset before it is applied.
    pub min_hips_offset_length: f32,
    /// Upper bound on the hips offset magnitude.
    pub max_hips_offset_length: f32,
    /// Decay applied to head-driven hips offsets (downward pressure).
    pub hips_pressure_scale: f32,
    /// Downward bias applied to head-driven hips offsets.
    pub hips_pressure_offset: f32,
    /// Per-frame blend factor for the "relax" solution sources.
    pub relax_blend_factor: f32,
    /// Largest frame delta the solver will integrate over.
    pub max_overlay_dt: f32,
    /// Extra downward rotation of the upper arms in the limit-center pose.
    pub upper_arm_rest_angle: f32,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            max_iterations: 16,
            max_error_tolerance: 0.1,
            default_flex_coefficient: 0.5,
            limit_leak_fraction: 0.1,
            hmd_angle_distribution: 0.45,
            head_offset_slave_factor: 0.65,
            hips_offset_timescale: 0.1,
            min_hips_offset_length: 0.03,
            max_hips_offset_length: f32::MAX,
            hips_pressure_scale: 0.95,
            hips_pressure_offset: 1.0,
            relax_blend_factor: 1.0 / 16.0,
            max_overlay_dt: 1.0 / 30.0,
            upper_arm_rest_angle: PI / 3.0,
        }
    }
}

impl IkConfig {
    /// Sets the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.max_error_tolerance = tolerance;
        self
    }

    /// Sets the hips offset clamp.
    pub fn with_max_hips_offset_length(mut self, length: f32) -> Self {
        self.max_hips_offset_length = length;
        self
    }
}
