//! Per-frame starting pose for the solver.
//!
//! Before each solve the working poses are initialized from a
//! [`SolutionSource`]: the previous solution, the animation's under poses, the
//! constraint limit centers, or a slow relaxation toward one of the latter.

use crate::accumulator::RotationAccumulator;
use crate::config::IkConfig;
use crate::constraint::ConstraintSet;
use crate::math::nlerp_shortest;
use crate::skeleton::Skeleton;
use crate::transform::Transform;
use glam::{Quat, Vec3};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Where the solver's working poses come from each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SolutionSource {
    /// Ease the previous solution toward the under poses.
    #[default]
    RelaxToUnderPoses,
    /// Ease the previous solution toward the limit-center poses.
    RelaxToLimitCenterPoses,
    /// Start from the previous solution unchanged.
    PreviousSolution,
    /// Start from the under poses.
    UnderPoses,
    /// Start from the limit-center poses.
    LimitCenterPoses,
}

impl From<i32> for SolutionSource {
    fn from(value: i32) -> Self {
        match value {
            1 => SolutionSource::RelaxToLimitCenterPoses,
            2 => SolutionSource::PreviousSolution,
            3 => SolutionSource::UnderPoses,
            4 => SolutionSource::LimitCenterPoses,
            _ => SolutionSource::RelaxToUnderPoses,
        }
    }
}

impl From<SolutionSource> for i32 {
    fn from(value: SolutionSource) -> Self {
        match value {
            SolutionSource::RelaxToUnderPoses => 0,
            SolutionSource::RelaxToLimitCenterPoses => 1,
            SolutionSource::PreviousSolution => 2,
            SolutionSource::UnderPoses => 3,
            SolutionSource::LimitCenterPoses => 4,
        }
    }
}

/// Blends `poses` toward `target_poses`.
///
/// Joints the last solve touched move `factor` of the way toward the target
/// rotation along the shorter arc. Every other joint snaps to its under
/// rotation. Translations always come from `under_poses`.
pub fn blend_to_poses(
    poses: &mut [Transform],
    target_poses: &[Transform],
    under_poses: &[Transform],
    accumulators: &[RotationAccumulator],
    factor: f32,
) {
    for (i, pose) in poses.iter_mut().enumerate() {
        let (Some(target), Some(under)) = (target_poses.get(i), under_poses.get(i)) else {
            continue;
        };
        let touched = accumulators.get(i).is_some_and(RotationAccumulator::is_dirty);
        pose.rotation = if touched {
            nlerp_shortest(pose.rotation, target.rotation, factor)
        } else {
            under.rotation
        };
        pose.translation = under.translation;
    }
}

/// Default relative poses with every constrained joint turned to its limit center.
///
/// The upper arms are additionally lowered by `upper_arm_rest_angle` so the
/// rest pose is not a T-pose.
pub fn limit_center_poses(
    skeleton: &Skeleton,
    constraints: &ConstraintSet,
    upper_arm_rest_angle: f32,
) -> Vec<Transform> {
    let mut poses = skeleton.relative_default_poses();
    for (&joint, constraint) in constraints.iter() {
        if let Some(pose) = poses.get_mut(joint) {
            pose.rotation = constraint.center_rotation();
        }
    }

    let arm_rotation = Quat::from_axis_angle(Vec3::X, upper_arm_rest_angle);
    for name in ["LeftArm", "RightArm"] {
        if let Some(pose) = skeleton.find_joint(name).and_then(|i| poses.get_mut(i)) {
            pose.rotation = (pose.rotation * arm_rotation).normalize();
        }
    }
    poses
}

/// Initializes `poses` from `source`.
pub(crate) fn init_from_source(
    source: SolutionSource,
    config: &IkConfig,
    poses: &mut Vec<Transform>,
    under_poses: &[Transform],
    limit_centers: &[Transform],
    accumulators: &[RotationAccumulator],
) {
    match source {
        SolutionSource::RelaxToUnderPoses => blend_to_poses(
            poses,
            under_poses,
            under_poses,
            accumulators,
            config.relax_blend_factor,
        ),
        SolutionSource::RelaxToLimitCenterPoses => blend_to_poses(
            poses,
            limit_centers,
            under_poses,
            accumulators,
            config.relax_blend_factor,
        ),
        SolutionSource::PreviousSolution => {}
        SolutionSource::UnderPoses => {
            poses.clear();
            poses.extend_from_slice(under_poses);
        }
        SolutionSource::LimitCenterPoses => {
            blend_to_poses(poses, limit_centers, under_poses, accumulators, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{HingeConstraint, humanoid_constraints};
    use crate::test_rig::humanoid_skeleton;
    use approx::assert_relative_eq;

    fn dirty(flags: &[bool]) -> Vec<RotationAccumulator> {
        flags
            .iter()
            .map(|&d| {
                let mut acc = RotationAccumulator::default();
                if d {
                    acc.add(Quat::IDENTITY, 1.0);
                    acc.clear();
                }
                acc
            })
            .collect()
    }

    #[test]
    fn test_source_from_i32() {
        assert_eq!(SolutionSource::from(2), SolutionSource::PreviousSolution);
        assert_eq!(SolutionSource::from(4), SolutionSource::LimitCenterPoses);
        assert_eq!(SolutionSource::from(-3), SolutionSource::RelaxToUnderPoses);
        assert_eq!(i32::from(SolutionSource::UnderPoses), 3);
    }

    #[test]
    fn test_blend_relaxes_touched_joints_only() {
        let previous = Quat::from_rotation_x(1.0);
        let mut poses = vec![Transform::from_rotation(previous); 2];
        let under = vec![
            Transform::from_rotation_translation(Quat::IDENTITY, Vec3::new(0.0, 1.0, 0.0));
            2
        ];
        blend_to_poses(&mut poses, &under, &under, &dirty(&[true, false]), 0.5);

        let (_, angle) = poses[0].rotation.to_axis_angle();
        assert!(angle > 0.3 && angle < 0.7);
        assert_eq!(poses[1].rotation, Quat::IDENTITY);
        assert_eq!(poses[0].translation, Vec3::Y);
        assert_eq!(poses[1].translation, Vec3::Y);
    }

    #[test]
    fn test_blend_takes_short_arc() {
        let mut poses = vec![Transform::from_rotation(Quat::from_rotation_y(0.2))];
        let target = vec![Transform::from_rotation(-Quat::from_rotation_y(0.4))];
        blend_to_poses(&mut poses, &target, &target, &dirty(&[true]), 0.5);
        assert_relative_eq!(
            poses[0].rotation.angle_between(Quat::from_rotation_y(0.3)),
            0.0,
            epsilon = 1e-2
        );
    }

    #[test]
    fn test_previous_solution_is_untouched() {
        let config = IkConfig::default();
        let original = vec![Transform::from_rotation(Quat::from_rotation_z(0.7)); 3];
        let mut poses = original.clone();
        let under = vec![Transform::IDENTITY; 3];
        init_from_source(
            SolutionSource::PreviousSolution,
            &config,
            &mut poses,
            &under,
            &under,
            &dirty(&[true, true, false]),
        );
        assert_eq!(poses, original);

        init_from_source(SolutionSource::UnderPoses, &config, &mut poses, &under, &under, &[]);
        assert_eq!(poses, under);
    }

    #[test]
    fn test_limit_centers() {
        let skeleton = humanoid_skeleton();
        let mut constraints = humanoid_constraints(&skeleton);
        let fore_arm = skeleton.find_joint("LeftForeArm").unwrap();
        constraints.insert(fore_arm, HingeConstraint::new(Vec3::Z).with_angle_limits(0.0, 1.0));

        let centers = limit_center_poses(&skeleton, &constraints, 1.0);
        assert_relative_eq!(
            centers[fore_arm].rotation.angle_between(Quat::from_rotation_z(0.5)),
            0.0,
            epsilon = 1e-3
        );

        let arm = skeleton.find_joint("LeftArm").unwrap();
        let arm_center = constraints.get(arm).unwrap().center_rotation();
        assert_relative_eq!(
            centers[arm].rotation.angle_between(arm_center * Quat::from_rotation_x(1.0)),
            0.0,
            epsilon = 1e-3
        );

        let hips = skeleton.find_joint("Hips").unwrap();
        assert_eq!(centers[hips], skeleton.relative_default_poses()[hips]);
    }
}
