//! Single-axis hinge constraint for elbows and knees.

use super::AngleLimits;
use crate::math::{perpendicular, signed_twist_angle, swing_twist_decomposition};
use glam::{Quat, Vec3};
use std::f32::consts::PI;

/// Swing parts with a larger rotation than this are projected away.
const MAX_SWING_W: f32 = 0.99999;

/// Hinge constraint: rotation about one axis, within an angle range.
///
/// The axis is expressed in the parent frame. Angles are measured from the
/// reference rotation, so the reference itself sits at angle zero.
#[derive(Debug, Clone)]
pub struct HingeConstraint {
    axis: Vec3,
    perp: Vec3,
    reference_rotation: Quat,
    limits: AngleLimits,
}

impl HingeConstraint {
    /// Creates a hinge about `axis` with an unrestricted angle.
    pub fn new(axis: Vec3) -> Self {
        let axis = axis.try_normalize().unwrap_or(Vec3::X);
        Self {
            axis,
            perp: perpendicular(axis),
            reference_rotation: Quat::IDENTITY,
            limits: AngleLimits::new(-PI, PI),
        }
    }

    /// Sets the rest rotation.
    pub fn with_reference_rotation(mut self, rotation: Quat) -> Self {
        self.reference_rotation = rotation.normalize();
        self
    }

    /// Sets the allowed angle range.
    pub fn with_angle_limits(mut self, min: f32, max: f32) -> Self {
        self.limits = AngleLimits::new(min, max);
        self
    }

    /// Hinge axis in the parent frame.
    pub fn axis(&self) -> Vec3 {
        self.axis
    }

    /// Lower angle bound.
    pub fn min_angle(&self) -> f32 {
        self.limits.min()
    }

    /// Upper angle bound.
    pub fn max_angle(&self) -> f32 {
        self.limits.max()
    }

    /// The rest rotation.
    pub fn reference_rotation(&self) -> Quat {
        self.reference_rotation
    }

    /// Splits `rotation` into its off-axis swing and its hinge angle.
    fn decompose(&self, rotation: Quat) -> (Quat, f32) {
        let post_rotation = rotation * self.reference_rotation.inverse();
        let (swing, twist) = swing_twist_decomposition(post_rotation, self.axis);
        (swing, signed_twist_angle(twist, self.axis, self.perp))
    }

    /// Hinge angle of a parent-relative rotation.
    pub fn angle_of(&self, rotation: Quat) -> f32 {
        self.decompose(rotation).1
    }

    /// Projects `rotation` onto the hinge and clamps its angle.
    ///
    /// Returns true if the rotation changed.
    pub fn apply(&mut self, rotation: &mut Quat) -> bool {
        let (swing, angle) = self.decompose(*rotation);
        let (clamped_angle, clamped) = self.limits.clamp(angle);
        if clamped || swing.w.abs() < MAX_SWING_W {
            *rotation = (Quat::from_axis_angle(self.axis, clamped_angle) * self.reference_rotation)
                .normalize();
            return true;
        }
        false
    }

    /// Grows the angle range to admit `rotation`.
    pub fn dynamically_adjust_limits(&mut self, rotation: Quat) {
        let angle = self.angle_of(rotation);
        if angle < self.limits.min() || angle > self.limits.max() {
            tracing::trace!(angle, "expanded hinge limit");
        }
        self.limits.expand(angle);
    }

    /// Rotation at the middle of the angle range.
    pub fn center_rotation(&self) -> Quat {
        (Quat::from_axis_angle(self.axis, self.limits.center()) * self.reference_rotation)
            .normalize()
    }

    /// Forgets which boundary was hit last.
    pub fn clear_history(&mut self) {
        self.limits.clear_history();
    }
}
