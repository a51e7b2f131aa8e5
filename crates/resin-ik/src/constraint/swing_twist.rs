//! Swing-twist (ball joint) constraint.
//!
//! The candidate rotation is expressed relative to a reference rotation and
//! split into a twist about the joint's local Y axis followed by a swing that
//! tilts Y away from its rest direction. Twist is clamped to a range; swing is
//! clamped against a closed polygon of minimum dot products sampled evenly
//! around the Y axis, so cones need not be circular.

use super::AngleLimits;
use crate::math::{signed_twist_angle, swing_twist_decomposition};
use glam::{Quat, Vec3};
use std::f32::consts::TAU;

const MIN_MINDOT: f32 = -0.999;
const MAX_MINDOT: f32 = 1.0;
const MIN_SWING_AXIS_LENGTH: f32 = 1.0e-5;
const ELLIPSE_SUBDIVISIONS: usize = 16;
const CENTER_SAMPLES: usize = 16;

/// Unit swing axis and polar angle of a swung Y direction.
///
/// The polar angle is zero along +Z and grows toward +X. A swing with no
/// well-defined axis reports +X and angle zero.
fn swing_axis_theta(swung_y: Vec3) -> (Vec3, f32) {
    let swing_axis = Vec3::Y.cross(swung_y);
    let length = swing_axis.length();
    if length > MIN_SWING_AXIS_LENGTH {
        let axis = swing_axis / length;
        (axis, (-axis.z).atan2(axis.x))
    } else {
        (Vec3::X, 0.0)
    }
}

/// Unit direction at polar angle `theta` whose Y component equals `min_dot`.
fn swung_direction(theta: f32, min_dot: f32) -> Vec3 {
    let cos_phi = min_dot.clamp(-1.0, 1.0);
    let sin_phi = (1.0 - cos_phi * cos_phi).max(0.0).sqrt();
    let (sin_theta, cos_theta) = theta.sin_cos();
    Vec3::new(sin_phi * sin_theta, cos_phi, sin_phi * cos_theta)
}

/// Piecewise-linear swing limit as a function of polar angle.
///
/// Stores the samples as a closed loop: the last entry repeats the first.
#[derive(Debug, Clone, PartialEq)]
pub struct SwingLimitFunction {
    min_dots: Vec<f32>,
}

impl Default for SwingLimitFunction {
    fn default() -> Self {
        let mut function = Self {
            min_dots: Vec::new(),
        };
        function.set_min_dots(&[]);
        function
    }
}

impl SwingLimitFunction {
    /// Replaces the samples. An empty slice means "nearly unconstrained".
    pub fn set_min_dots(&mut self, min_dots: &[f32]) {
        self.min_dots.clear();
        if min_dots.is_empty() {
            self.min_dots.extend([MIN_MINDOT, MIN_MINDOT]);
        } else {
            self.min_dots
                .extend(min_dots.iter().map(|d| d.clamp(MIN_MINDOT, MAX_MINDOT)));
            self.min_dots.push(self.min_dots[0]);
        }
    }

    /// The samples, including the closing repeat of the first one.
    pub fn min_dots(&self) -> &[f32] {
        &self.min_dots
    }

    /// The distinct samples, evenly spaced from polar angle zero.
    pub fn samples(&self) -> &[f32] {
        &self.min_dots[..self.min_dots.len() - 1]
    }

    fn bracket(&self, theta: f32) -> (usize, usize, f32) {
        let normalized = (theta / TAU).rem_euclid(1.0);
        let segments = self.min_dots.len() - 1;
        let scaled = normalized * segments as f32;
        let i = (scaled.floor() as usize).min(segments - 1);
        let fraction = (scaled - i as f32).clamp(0.0, 1.0);
        (i, i + 1, fraction)
    }

    /// Interpolated minimum dot product at polar angle `theta`.
    pub fn min_dot(&self, theta: f32) -> f32 {
        let (i, j, fraction) = self.bracket(theta);
        self.min_dots[i] * (1.0 - fraction) + self.min_dots[j] * fraction
    }

    /// Lowers the two samples around `theta` so that `min_dot` becomes admissible.
    pub fn expand_to(&mut self, theta: f32, min_dot: f32) {
        let target = min_dot.max(MIN_MINDOT);
        let current = self.min_dot(theta);
        if target >= current {
            return;
        }
        let deficit = current - target;
        let (i, j, _) = self.bracket(theta);
        for k in [i, j] {
            self.min_dots[k] = (self.min_dots[k] - deficit).min(target).max(MIN_MINDOT);
        }

        let last = self.min_dots.len() - 1;
        if i == 0 {
            self.min_dots[last] = self.min_dots[0];
        }
        if j == last {
            self.min_dots[0] = self.min_dots[last];
        }
    }
}

/// Ball-joint constraint with a swing cone and a twist range.
#[derive(Debug, Clone)]
pub struct SwingTwistConstraint {
    reference_rotation: Quat,
    swing_limits: SwingLimitFunction,
    twist: AngleLimits,
    lower_spine: bool,
}

impl Default for SwingTwistConstraint {
    fn default() -> Self {
        Self::new()
    }
}

impl SwingTwistConstraint {
    /// Creates a constraint with free swing and unlimited twist.
    pub fn new() -> Self {
        Self {
            reference_rotation: Quat::IDENTITY,
            swing_limits: SwingLimitFunction::default(),
            twist: AngleLimits::new(0.0, 0.0),
            lower_spine: false,
        }
    }

    /// Sets the rest rotation.
    pub fn with_reference_rotation(mut self, rotation: Quat) -> Self {
        self.reference_rotation = rotation.normalize();
        self
    }

    /// Sets the twist range. `min == max` disables twist limits.
    pub fn with_twist_limits(mut self, min: f32, max: f32) -> Self {
        self.twist = AngleLimits::new(min, max);
        self
    }

    /// Sets evenly spaced swing samples (cosines of the allowed swing angle).
    pub fn with_swing_limits(mut self, min_dots: &[f32]) -> Self {
        self.swing_limits.set_min_dots(min_dots);
        self
    }

    /// Sets a uniform cone with the given half-angle.
    pub fn with_cone(self, max_swing: f32) -> Self {
        self.with_swing_limits(&[max_swing.cos()])
    }

    /// Sets an elliptical cone.
    ///
    /// `lateral` is the swing limit for side-to-side swings, `anterior` for
    /// forward and backward swings.
    pub fn with_elliptical_swing(self, lateral: f32, anterior: f32) -> Self {
        let d_theta = TAU / ELLIPSE_SUBDIVISIONS as f32;
        let min_dots: Vec<f32> = (0..ELLIPSE_SUBDIVISIONS)
            .map(|i| {
                let theta = i as f32 * d_theta;
                let theta_prime = ((anterior / lateral) * theta.tan()).atan();
                let phi = (2.0 * theta_prime).cos() * ((anterior - lateral) / 2.0)
                    + (anterior + lateral) / 2.0;
                phi.cos()
            })
            .collect();
        self.with_swing_limits(&min_dots)
    }

    /// Sets swing limits from boundary directions in the constraint frame.
    ///
    /// Directions need not be normalized. Directions along the rest axis carry
    /// no polar angle and are skipped. The rest are sorted by polar angle and
    /// resampled into evenly spaced samples.
    pub fn with_swing_directions(mut self, directions: &[Vec3]) -> Self {
        let mut limits: Vec<(f32, f32)> = directions
            .iter()
            .filter_map(|d| {
                let unit = d.try_normalize()?;
                if Vec3::Y.cross(unit).length() <= MIN_SWING_AXIS_LENGTH {
                    return None;
                }
                let (_, theta) = swing_axis_theta(unit);
                Some((theta.rem_euclid(TAU), unit.y))
            })
            .collect();

        match limits.len() {
            0 => self.swing_limits.set_min_dots(&[]),
            1 => self.swing_limits.set_min_dots(&[limits[0].1]),
            n => {
                limits.sort_by(|a, b| a.0.total_cmp(&b.0));
                let d_theta = TAU / n as f32;
                let min_dots: Vec<f32> = (0..n)
                    .map(|k| {
                        let theta = k as f32 * d_theta;
                        let (right, right_theta) =
                            match limits.iter().position(|l| l.0 >= theta) {
                                Some(r) => (r, limits[r].0),
                                None => (0, limits[0].0 + TAU),
                            };
                        let left = (right + n - 1) % n;
                        let left_theta = if right == 0 && right_theta <= limits[left].0 {
                            limits[left].0 - TAU
                        } else {
                            limits[left].0
                        };
                        let span = right_theta - left_theta;
                        let fraction = if span > f32::EPSILON {
                            ((theta - left_theta) / span).clamp(0.0, 1.0)
                        } else {
                            0.0
                        };
                        limits[left].1 + fraction * (limits[right].1 - limits[left].1)
                    })
                    .collect();
                self.swing_limits.set_min_dots(&min_dots);
            }
        }
        self
    }

    /// Flags this joint as part of the lower spine.
    pub fn with_lower_spine(mut self, lower_spine: bool) -> Self {
        self.lower_spine = lower_spine;
        self
    }

    /// The rest rotation.
    pub fn reference_rotation(&self) -> Quat {
        self.reference_rotation
    }

    /// Lower twist bound.
    pub fn min_twist(&self) -> f32 {
        self.twist.min()
    }

    /// Upper twist bound.
    pub fn max_twist(&self) -> f32 {
        self.twist.max()
    }

    /// Whether twist is unlimited.
    pub fn is_twist_free(&self) -> bool {
        self.twist.min() == self.twist.max()
    }

    /// Swing limit samples.
    pub fn swing_limits(&self) -> &SwingLimitFunction {
        &self.swing_limits
    }

    /// Whether this joint is flagged as lower spine.
    pub fn is_lower_spine(&self) -> bool {
        self.lower_spine
    }

    /// Splits a parent-relative rotation into `(swing, twist_angle)` relative to the reference.
    pub fn decompose(&self, rotation: Quat) -> (Quat, f32) {
        let post_rotation = rotation * self.reference_rotation.inverse();
        let (swing, twist) = swing_twist_decomposition(post_rotation, Vec3::Y);
        (swing, signed_twist_angle(twist, Vec3::Y, Vec3::X))
    }

    /// Clamps `rotation` into the allowed region. Returns true if it changed.
    pub fn apply(&mut self, rotation: &mut Quat) -> bool {
        let (mut swing, twist_angle) = self.decompose(*rotation);

        let mut clamped = false;
        let mut final_twist = twist_angle;
        if !self.is_twist_free() {
            let (angle, was_clamped) = self.twist.clamp(twist_angle);
            final_twist = angle;
            clamped |= was_clamped;
        }

        let swung_y = swing * Vec3::Y;
        let (swing_axis, theta) = swing_axis_theta(swung_y);
        let min_dot = self.swing_limits.min_dot(theta);
        if swung_y.y < min_dot {
            swing = Quat::from_axis_angle(swing_axis, min_dot.clamp(-1.0, 1.0).acos());
            clamped = true;
        }

        if clamped {
            *rotation =
                (swing * Quat::from_axis_angle(Vec3::Y, final_twist) * self.reference_rotation)
                    .normalize();
        }
        clamped
    }

    /// Grows the limits to admit `rotation`.
    pub fn dynamically_adjust_limits(&mut self, rotation: Quat) {
        let (swing, twist_angle) = self.decompose(rotation);
        let swung_y = swing * Vec3::Y;
        let (_, theta) = swing_axis_theta(swung_y);
        let before = self.swing_limits.min_dot(theta);
        self.swing_limits.expand_to(theta, swung_y.y);
        if !self.is_twist_free() {
            self.twist.expand(twist_angle);
        }
        if self.swing_limits.min_dot(theta) < before {
            tracing::trace!(theta, min_dot = swung_y.y, "expanded swing limit");
        }
    }

    /// A rotation at the center of the swing polygon and twist range.
    pub fn center_rotation(&self) -> Quat {
        let d_theta = TAU / CENTER_SAMPLES as f32;
        let sum: Vec3 = (0..CENTER_SAMPLES)
            .map(|k| {
                let theta = k as f32 * d_theta;
                swung_direction(theta, self.swing_limits.min_dot(theta))
            })
            .sum();
        let swing = match sum.try_normalize() {
            Some(center) => Quat::from_rotation_arc(Vec3::Y, center),
            None => Quat::IDENTITY,
        };
        let twist = if self.is_twist_free() {
            0.0
        } else {
            self.twist.center()
        };
        (swing * Quat::from_axis_angle(Vec3::Y, twist) * self.reference_rotation).normalize()
    }

    /// Forgets which twist boundary was hit last.
    pub fn clear_history(&mut self) {
        self.twist.clear_history();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    #[test]
    fn test_twist_clamped_to_upper_limit() {
        let x = 0.3;
        let mut constraint = SwingTwistConstraint::new().with_twist_limits(-x, x);
        let swing = Quat::from_rotation_x(0.2);
        let mut rotation = swing * Quat::from_rotation_y(2.0 * x);

        assert!(constraint.apply(&mut rotation));
        let (clamped_swing, twist) = constraint.decompose(rotation);
        assert_relative_eq!(twist, x, epsilon = 1e-5);
        assert_relative_eq!(clamped_swing.angle_between(swing), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_within_limits_untouched() {
        let mut constraint = SwingTwistConstraint::new()
            .with_twist_limits(-0.5, 0.5)
            .with_cone(FRAC_PI_4);
        let original = Quat::from_rotation_z(0.3) * Quat::from_rotation_y(0.2);
        let mut rotation = original;
        assert!(!constraint.apply(&mut rotation));
        assert_eq!(rotation, original);
    }

    #[test]
    fn test_swing_clamped_to_cone() {
        let mut constraint = SwingTwistConstraint::new().with_cone(FRAC_PI_4);
        let mut rotation = Quat::from_rotation_z(FRAC_PI_2);
        assert!(constraint.apply(&mut rotation));

        let swung = rotation * Vec3::Y;
        assert_relative_eq!(swung.dot(Vec3::Y), FRAC_PI_4.cos(), epsilon = 1e-4);
        // the swing direction is preserved
        assert!(swung.x < 0.0);
        assert_relative_eq!(swung.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_reference_rotation_is_rest() {
        let reference = Quat::from_rotation_x(1.0);
        let mut constraint = SwingTwistConstraint::new()
            .with_reference_rotation(reference)
            .with_twist_limits(-0.1, 0.1)
            .with_cone(0.1);
        let mut rotation = reference;
        assert!(!constraint.apply(&mut rotation));

        let mut far = Quat::from_rotation_z(1.0) * reference;
        assert!(constraint.apply(&mut far));
        let (swing, _) = constraint.decompose(far);
        assert!((swing * Vec3::Y).y >= 0.1f32.cos() - 1e-4);
    }

    #[test]
    fn test_elliptical_limits() {
        let constraint = SwingTwistConstraint::new().with_elliptical_swing(PI / 15.0, PI / 10.0);
        let limits = constraint.swing_limits();
        assert_eq!(limits.samples().len(), 16);
        // theta = 0 takes the anterior limit, theta = PI / 2 the lateral one
        assert_relative_eq!(limits.min_dot(0.0), (PI / 10.0).cos(), epsilon = 1e-4);
        assert_relative_eq!(limits.min_dot(FRAC_PI_2), (PI / 15.0).cos(), epsilon = 1e-3);
    }

    #[test]
    fn test_min_dot_interpolates_and_wraps() {
        let mut limits = SwingLimitFunction::default();
        limits.set_min_dots(&[0.0, 0.5, 1.0, 0.5]);
        assert_eq!(limits.min_dots().len(), 5);
        assert_relative_eq!(limits.min_dot(0.0), 0.0);
        assert_relative_eq!(limits.min_dot(FRAC_PI_4), 0.25, epsilon = 1e-5);
        assert_relative_eq!(limits.min_dot(PI), 1.0, epsilon = 1e-5);
        assert_relative_eq!(limits.min_dot(-FRAC_PI_4), 0.25, epsilon = 1e-5);
        assert_relative_eq!(limits.min_dot(TAU + FRAC_PI_4), 0.25, epsilon = 1e-5);
    }

    #[test]
    fn test_swing_directions_resampled() {
        // a cone narrower toward +X than elsewhere
        let constraint = SwingTwistConstraint::new().with_swing_directions(&[
            Vec3::new(0.0, 1.0, 1.0),
            Vec3::new(1.0, 3.0, 0.0),
            Vec3::new(0.0, 1.0, -1.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ]);
        let limits = constraint.swing_limits();
        assert_eq!(limits.samples().len(), 4);
        let wide = 1.0 / 2.0f32.sqrt();
        let narrow = 3.0 / 10.0f32.sqrt();
        assert_relative_eq!(limits.min_dot(0.0), wide, epsilon = 1e-4);
        assert_relative_eq!(limits.min_dot(FRAC_PI_2), narrow, epsilon = 1e-4);
        assert_relative_eq!(limits.min_dot(PI), wide, epsilon = 1e-4);
    }

    #[test]
    fn test_dynamic_expansion_admits_rotation() {
        let mut constraint = SwingTwistConstraint::new()
            .with_twist_limits(-0.1, 0.1)
            .with_cone(0.2);
        let authored = Quat::from_rotation_x(0.6) * Quat::from_rotation_y(0.4);
        constraint.dynamically_adjust_limits(authored);

        let mut rotation = authored;
        assert!(!constraint.apply(&mut rotation));
        assert!(constraint.max_twist() >= 0.4 - 1e-4);

        // expansion never shrinks
        let before = constraint.swing_limits().clone();
        constraint.dynamically_adjust_limits(Quat::IDENTITY);
        assert_eq!(constraint.swing_limits(), &before);
        assert!(constraint.max_twist() >= 0.4 - 1e-4);
    }

    #[test]
    fn test_center_rotation() {
        let reference = Quat::from_rotation_z(0.4);
        let constraint = SwingTwistConstraint::new()
            .with_reference_rotation(reference)
            .with_twist_limits(0.0, 0.6)
            .with_cone(0.5);
        let center = constraint.center_rotation();
        let (swing, twist) = constraint.decompose(center);
        assert_relative_eq!(twist, 0.3, epsilon = 1e-4);
        assert_relative_eq!(swing.angle_between(Quat::IDENTITY), 0.0, epsilon = 1e-2);
    }
}
