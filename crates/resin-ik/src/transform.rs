//! Joint transform type (translation, rotation, scale).

use glam::{Mat4, Quat, Vec3};
use std::ops::Mul;

/// A joint pose: translation, rotation and per-axis scale.
///
/// Used both for parent-relative poses and for fully composed absolute poses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position offset.
    pub translation: Vec3,
    /// Rotation quaternion.
    pub rotation: Quat,
    /// Scale factors per axis.
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    /// Identity transform.
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Creates a new transform.
    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Creates a unit-scale transform from a rotation and a translation.
    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale: Vec3::ONE,
        }
    }

    /// Creates a transform with only translation.
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Creates a transform with only rotation.
    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    /// Converts to a 4x4 matrix (TRS order).
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Composes two transforms: `self` is the parent frame, `child` is expressed in it.
    pub fn then(&self, child: &Transform) -> Transform {
        Transform {
            translation: self.translation + self.rotation * (self.scale * child.translation),
            rotation: self.rotation * child.rotation,
            scale: self.scale * child.scale,
        }
    }

    /// Returns the inverse transform.
    pub fn inverse(&self) -> Transform {
        let inv_rotation = self.rotation.inverse();
        let inv_scale = Vec3::ONE / self.scale;
        Transform {
            translation: inv_scale * (inv_rotation * -self.translation),
            rotation: inv_rotation,
            scale: inv_scale,
        }
    }

    /// Transforms a point.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.translation + self.rotation * (self.scale * point)
    }

    /// Transforms a vector (ignores translation, applies scale).
    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * (self.scale * vector)
    }
}

impl Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        self.then(&rhs)
    }
}

impl From<Transform> for Mat4 {
    fn from(t: Transform) -> Self {
        t.to_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_identity() {
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(Transform::IDENTITY.transform_point(p), p);
    }

    #[test]
    fn test_rotation_then_translation() {
        let parent = Transform::from_rotation(Quat::from_rotation_z(FRAC_PI_2));
        let child = Transform::from_translation(Vec3::Y);
        let composed = parent * child;
        assert_relative_eq!(composed.translation, Vec3::new(-1.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_inverse_with_scale() {
        let t = Transform::new(
            Vec3::new(5.0, 3.0, 1.0),
            Quat::from_rotation_y(0.5),
            Vec3::new(2.0, 2.0, 2.0),
        );
        let combined = t.then(&t.inverse());

        assert_relative_eq!(combined.translation, Vec3::ZERO, epsilon = 1e-5);
        assert_relative_eq!(combined.rotation.w, 1.0, epsilon = 1e-6);
        assert_relative_eq!(combined.scale, Vec3::ONE, epsilon = 1e-6);

        let p = Vec3::new(0.3, -2.0, 7.0);
        assert_relative_eq!(t.inverse().transform_point(t.transform_point(p)), p, epsilon = 1e-5);
    }

    #[test]
    fn test_matches_matrix_product() {
        let a = Transform::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_x(0.4), Vec3::ONE);
        let b = Transform::new(Vec3::new(-1.0, 0.5, 2.0), Quat::from_rotation_y(1.1), Vec3::ONE);
        let p = Vec3::new(0.2, 0.4, 0.6);
        let by_matrix = (a.to_matrix() * b.to_matrix()).transform_point3(p);
        assert_relative_eq!((a * b).transform_point(p), by_matrix, epsilon = 1e-5);
    }
}
