//! Quaternion helpers shared by constraints and the solver.

use glam::{Quat, Vec3};

/// Vectors shorter than this are treated as degenerate.
pub const MIN_AXIS_LENGTH: f32 = 1.0e-4;

/// Splits `rotation` into `(swing, twist)` about `axis` so that `rotation == swing * twist`.
///
/// `axis` must be normalized. The twist part rotates about `axis`; the swing
/// part rotates about an axis perpendicular to it.
pub fn swing_twist_decomposition(rotation: Quat, axis: Vec3) -> (Quat, Quat) {
    let imaginary = Vec3::new(rotation.x, rotation.y, rotation.z);
    let projected = axis * imaginary.dot(axis);
    let raw = Quat::from_xyzw(projected.x, projected.y, projected.z, rotation.w);
    let length = raw.length();
    let twist = if length > f32::EPSILON {
        raw * (1.0 / length)
    } else {
        Quat::IDENTITY
    };
    let swing = rotation * twist.inverse();
    (swing, twist)
}

/// Signed angle of a pure `twist` about `axis`, measured with the help of `perp`.
///
/// `perp` must be a unit vector perpendicular to `axis`. Result is in `[-PI, PI]`.
pub fn signed_twist_angle(twist: Quat, axis: Vec3, perp: Vec3) -> f32 {
    let angle = 2.0 * twist.w.abs().min(1.0).acos();
    let twisted = twist * perp;
    if perp.cross(twisted).dot(axis) < 0.0 {
        -angle
    } else {
        angle
    }
}

/// Any unit vector perpendicular to `axis`.
pub fn perpendicular(axis: Vec3) -> Vec3 {
    let hint = if axis.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    (hint - axis * hint.dot(axis)).normalize_or_zero()
}

/// Normalized lerp from `a` to `b`, flipping `b` onto `a`'s hemisphere first.
pub fn nlerp_shortest(a: Quat, b: Quat, t: f32) -> Quat {
    let b = if a.dot(b) < 0.0 { -b } else { b };
    normalize_or_identity(a * (1.0 - t) + b * t)
}

/// A fraction of `rotation`, taken along the shorter arc from identity.
pub fn fraction_of(rotation: Quat, fraction: f32) -> Quat {
    let signed = if rotation.w < 0.0 { -rotation } else { rotation };
    normalize_or_identity(Quat::IDENTITY * (1.0 - fraction) + signed * fraction)
}

/// Normalizes `q`, falling back to identity for degenerate input.
pub fn normalize_or_identity(q: Quat) -> Quat {
    let length = q.length();
    if length > f32::EPSILON && length.is_finite() {
        q * (1.0 / length)
    } else {
        Quat::IDENTITY
    }
}

/// Rotation that swings `from` onto `to` by the full angle between them.
///
/// Returns `None` when either vector is degenerate or they are (anti)parallel.
pub fn swing_between(from: Vec3, to: Vec3) -> Option<(Vec3, f32)> {
    let axis = from.cross(to);
    let axis_length = axis.length();
    if axis_length.is_nan() || axis_length <= MIN_AXIS_LENGTH {
        return None;
    }
    let denom = from.length() * to.length();
    if denom <= f32::EPSILON {
        return None;
    }
    let cos_angle = (from.dot(to) / denom).clamp(-1.0, 1.0);
    Some((axis / axis_length, cos_angle.acos()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

    #[test]
    fn test_decomposition_recomposes() {
        let rotation = Quat::from_rotation_x(0.3) * Quat::from_rotation_y(0.7);
        let (swing, twist) = swing_twist_decomposition(rotation, Vec3::Y);
        assert_relative_eq!(swing * twist, rotation, epsilon = 1e-5);

        // twist is purely about the axis, swing carries no component along it
        assert_relative_eq!(twist.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(twist.z, 0.0, epsilon = 1e-6);
        assert_relative_eq!(swing.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_pure_swing_has_identity_twist() {
        let (swing, twist) = swing_twist_decomposition(Quat::from_rotation_z(FRAC_PI_2), Vec3::Y);
        assert_relative_eq!(twist, Quat::IDENTITY, epsilon = 1e-6);
        assert_relative_eq!(swing, Quat::from_rotation_z(FRAC_PI_2), epsilon = 1e-6);
    }

    #[test]
    fn test_signed_twist_angle() {
        let twist = Quat::from_axis_angle(Vec3::Y, -FRAC_PI_4);
        assert_relative_eq!(
            signed_twist_angle(twist, Vec3::Y, Vec3::X),
            -FRAC_PI_4,
            epsilon = 1e-5
        );
        // the same rotation written on the other hemisphere measures the same
        assert_relative_eq!(
            signed_twist_angle(-twist, Vec3::Y, Vec3::X),
            -FRAC_PI_4,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_fraction_of_takes_short_arc() {
        let q = -Quat::from_rotation_x(1.0);
        let half = fraction_of(q, 0.5);
        let (axis, angle) = half.to_axis_angle();
        assert_relative_eq!(angle, 0.5, epsilon = 0.02);
        assert!(axis.x > 0.99);
    }

    #[test]
    fn test_swing_between_degenerate() {
        assert!(swing_between(Vec3::ZERO, Vec3::X).is_none());
        assert!(swing_between(Vec3::X, Vec3::X * 3.0).is_none());
        let (axis, angle) = swing_between(Vec3::X, Vec3::Y).unwrap();
        assert_relative_eq!(axis, Vec3::Z, epsilon = 1e-6);
        assert_relative_eq!(angle, FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn test_perpendicular() {
        for axis in [Vec3::X, Vec3::Y, Vec3::new(1.0, 1.0, 0.0).normalize()] {
            let p = perpendicular(axis);
            assert_relative_eq!(p.dot(axis), 0.0, epsilon = 1e-6);
            assert_relative_eq!(p.length(), 1.0, epsilon = 1e-6);
        }
    }
}
