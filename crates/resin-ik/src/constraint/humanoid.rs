//! Default joint limits for humanoid skeletons.
//!
//! Joints are recognised by name (`Hips`, `Spine1`, `LeftForeArm`, ...). A
//! `Left` or `Right` prefix selects the mirrored variant. Every limit is
//! measured from the joint's default parent-relative rotation.

use super::{ConstraintSet, HingeConstraint, RotationConstraint, SwingTwistConstraint};
use crate::skeleton::Skeleton;
use glam::{Quat, Vec3};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

/// Splits `LeftArm` into `("Arm", -1.0)` and `RightArm` into `("Arm", 1.0)`.
fn strip_side(name: &str) -> (&str, f32) {
    if let Some(base) = name.strip_prefix("Left") {
        (base, -1.0)
    } else if let Some(base) = name.strip_prefix("Right") {
        (base, 1.0)
    } else {
        (name, 1.0)
    }
}

/// Thigh swing limits: one min-dot per even polar step, starting posterior.
///
/// Each entry is the height of a swung direction around the thigh, so the
/// table does not depend on the side.
fn up_leg_min_dots() -> [f32; 8] {
    const HEIGHTS: [f32; 8] = [1.0, 0.5, 0.25, -1.5, -3.0, -1.5, 0.25, 0.5];
    let d_theta = TAU / HEIGHTS.len() as f32;
    std::array::from_fn(|k| {
        let (sin, cos) = (k as f32 * d_theta).sin_cos();
        Vec3::new(cos, HEIGHTS[k], sin).normalize().y
    })
}

/// Hinge about `parent_axis` with its limits carried into the child frame.
///
/// The limit lines are swung about the parent-frame axis, rotated into the
/// child frame by the inverse rest rotation and measured about the child-frame
/// axis from the projected Y axis.
fn hinge(reference: Quat, parent_axis: Vec3, min: f32, max: f32) -> HingeConstraint {
    let axis = reference * parent_axis;
    let projected_y = (Vec3::Y - axis * Vec3::Y.dot(axis)).try_normalize();
    let inverse_reference = reference.inverse();
    let measure = |angle: f32| {
        let Some(projected_y) = projected_y else {
            return angle;
        };
        let limit_line = inverse_reference * (Quat::from_axis_angle(parent_axis, angle) * Vec3::Y);
        let unsigned = projected_y.dot(limit_line).clamp(-1.0, 1.0).acos();
        if axis.dot(projected_y.cross(limit_line)) < 0.0 {
            -unsigned
        } else {
            unsigned
        }
    };
    HingeConstraint::new(axis)
        .with_reference_rotation(reference)
        .with_angle_limits(measure(min), measure(max))
}

/// Builds the constraint for one joint, or `None` if the name is not recognised.
pub(super) fn humanoid_constraint(name: &str, reference: Quat) -> Option<RotationConstraint> {
    let (base, mirror) = strip_side(name);
    let swing_twist = || SwingTwistConstraint::new().with_reference_rotation(reference);

    let constraint: RotationConstraint = match base {
        "Arm" => swing_twist()
            .with_twist_limits(-FRAC_PI_2, FRAC_PI_2)
            .with_cone(FRAC_PI_2)
            .into(),
        "UpLeg" => swing_twist()
            .with_twist_limits(-FRAC_PI_4, FRAC_PI_4)
            .with_swing_limits(&up_leg_min_dots())
            .into(),
        "Hand" => swing_twist().with_twist_limits(0.0, 0.0).with_cone(FRAC_PI_2).into(),
        "Neck" => swing_twist()
            .with_twist_limits(-PI / 8.0, PI / 8.0)
            .with_elliptical_swing(PI / 12.0, PI / 10.0)
            .into(),
        "Head" => swing_twist()
            .with_twist_limits(-PI / 6.0, PI / 6.0)
            .with_elliptical_swing(FRAC_PI_4, PI / 3.0)
            .into(),
        "ForeArm" => hinge(reference, -mirror * Vec3::Z, 0.05, 11.0 * PI / 12.0).into(),
        "Leg" => hinge(reference, -Vec3::X, 0.097, 7.0 * PI / 8.0).into(),
        "Foot" => {
            let local = reference.inverse();
            let directions = [
                Vec3::Y,
                Vec3::X,
                Vec3::new(1.0, 1.0, 1.0),
                Vec3::new(1.0, 1.0, -1.0),
            ]
            .map(|d| local * d);
            swing_twist()
                .with_twist_limits(-FRAC_PI_4, FRAC_PI_4)
                .with_swing_directions(&directions)
                .into()
        }
        _ if base.starts_with("Shoulder") => swing_twist()
            .with_twist_limits(-PI / 10.0, PI / 10.0)
            .with_cone(PI / 12.0)
            .into(),
        _ if base.starts_with("Spine") => swing_twist()
            .with_twist_limits(-PI / 20.0, PI / 20.0)
            .with_elliptical_swing(PI / 15.0, PI / 10.0)
            .with_lower_spine(name == "Spine" || name == "Spine1")
            .into(),
        _ => return None,
    };
    Some(constraint)
}

/// Builds the default humanoid constraint set for `skeleton`.
///
/// Joints with unrecognised names are left unconstrained.
pub fn humanoid_constraints(skeleton: &Skeleton) -> ConstraintSet {
    let mut set = ConstraintSet::new();
    for (index, joint) in skeleton.joints().iter().enumerate() {
        if let Some(constraint) = humanoid_constraint(&joint.name, joint.default_pose.rotation) {
            set.insert(index, constraint);
        }
    }
    tracing::debug!(
        joints = skeleton.num_joints(),
        constrained = set.len(),
        "built humanoid constraints"
    );
    set
}
