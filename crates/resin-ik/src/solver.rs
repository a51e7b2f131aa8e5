//! Cyclic coordinate descent with per-joint rotation accumulation.
//!
//! Every iteration walks each target's chain from the tip toward the hips and
//! proposes a rotation for each joint it passes. Proposals are collected in
//! [`RotationAccumulator`]s and only committed once all targets have been
//! visited, so targets sharing a joint do not depend on evaluation order.

use crate::accumulator::RotationAccumulator;
use crate::config::IkConfig;
use crate::constraint::ConstraintSet;
use crate::math::{
    MIN_AXIS_LENGTH, fraction_of, normalize_or_identity, swing_between,
    swing_twist_decomposition,
};
use crate::skeleton::Skeleton;
use crate::target::{Target, TargetType};
use crate::transform::Transform;
use glam::{Quat, Vec3};

/// Swings smaller than this are skipped.
const MIN_ADJUSTMENT_ANGLE: f32 = 1.0e-4;

/// Everything one solve reads but does not own.
#[derive(Debug, Clone, Copy)]
pub struct SolveInput<'a> {
    /// Joint hierarchy.
    pub skeleton: &'a Skeleton,
    /// Tuning.
    pub config: &'a IkConfig,
    /// Targets resolved for this frame.
    pub targets: &'a [Target],
    /// Joint at which chain walks stop.
    pub hips_index: Option<usize>,
    /// Head joint, exempt from lower-spine projection.
    pub head_index: Option<usize>,
    /// Whether one of `targets` addresses the hips joint.
    pub hips_target_active: bool,
}

/// Outcome of one solve.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SolveStats {
    /// Outer iterations run.
    pub iterations: u32,
    /// Largest remaining positional error over position-bearing targets.
    pub max_error: f32,
}

/// CCD solver state: accumulators and scratch absolute poses.
#[derive(Debug, Clone, Default)]
pub struct CcdSolver {
    accumulators: Vec<RotationAccumulator>,
    absolute_poses: Vec<Transform>,
}

impl CcdSolver {
    /// Creates an empty solver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the per-joint accumulators to `joints` clean entries.
    pub fn reset(&mut self, joints: usize) {
        self.accumulators.clear();
        self.accumulators.resize(joints, RotationAccumulator::default());
        self.absolute_poses.clear();
    }

    /// Drops all state.
    pub fn clear(&mut self) {
        self.reset(0);
    }

    /// Per-joint accumulators, as left by the last solve.
    pub fn accumulators(&self) -> &[RotationAccumulator] {
        &self.accumulators
    }

    /// Whether the last solve proposed a rotation for `joint`.
    pub fn is_dirty(&self, joint: usize) -> bool {
        self.accumulators.get(joint).is_some_and(RotationAccumulator::is_dirty)
    }

    /// Absolute poses matching the relative poses the last solve produced.
    pub fn absolute_poses(&self) -> &[Transform] {
        &self.absolute_poses
    }

    fn compute_absolute_poses(&mut self, skeleton: &Skeleton, relative_poses: &[Transform]) {
        self.absolute_poses.clear();
        self.absolute_poses.extend_from_slice(relative_poses);
        skeleton.relative_to_absolute(&mut self.absolute_poses);
    }

    /// Runs CCD on `relative_poses` in place.
    pub fn solve(
        &mut self,
        input: &SolveInput<'_>,
        constraints: &mut ConstraintSet,
        relative_poses: &mut [Transform],
    ) -> SolveStats {
        let config = input.config;
        let joints = relative_poses.len();
        if self.accumulators.len() != joints {
            self.accumulators.resize(joints, RotationAccumulator::default());
        }
        self.compute_absolute_poses(input.skeleton, relative_poses);

        // A pose that already meets the tolerance is left alone, and so are the
        // marks of which joints the solve that produced it touched.
        let mut max_error = self.max_error(input.targets);
        if max_error > config.max_error_tolerance {
            for accumulator in &mut self.accumulators {
                accumulator.clear_and_clean();
            }
        }
        let mut iterations = 0;
        while max_error > config.max_error_tolerance && iterations < config.max_iterations {
            iterations += 1;

            for target in input.targets {
                solve_target(
                    input,
                    constraints,
                    target,
                    &self.absolute_poses,
                    &mut self.accumulators,
                );
            }

            for (pose, accumulator) in relative_poses.iter_mut().zip(&mut self.accumulators) {
                if !accumulator.is_empty() {
                    pose.rotation = accumulator.average();
                    accumulator.clear();
                }
            }

            self.compute_absolute_poses(input.skeleton, relative_poses);
            max_error = self.max_error(input.targets);
        }

        // Rotation-only targets off every other chain get their rotation directly.
        let mut forced = false;
        for target in input.targets {
            if target.target_type != TargetType::RotationOnly || target.index >= joints {
                continue;
            }
            if self.accumulators[target.index].is_dirty() {
                continue;
            }
            let Some(parent) = input.skeleton.parent(target.index) else {
                continue;
            };
            let mut rotation = normalize_or_identity(
                self.absolute_poses[parent].rotation.inverse() * target.rotation(),
            );
            constraints.apply(target.index, &mut rotation);
            relative_poses[target.index].rotation = rotation;
            forced = true;
        }
        if forced {
            self.compute_absolute_poses(input.skeleton, relative_poses);
        }

        tracing::debug!(iterations, max_error, targets = input.targets.len(), "CCD solve finished");
        SolveStats {
            iterations,
            max_error,
        }
    }

    fn max_error(&self, targets: &[Target]) -> f32 {
        targets
            .iter()
            .filter(|t| t.target_type.measures_error())
            .filter_map(|t| {
                let pose = self.absolute_poses.get(t.index)?;
                Some((pose.translation - t.translation()).length())
            })
            .fold(0.0, f32::max)
    }
}

// ============================================================================
// Chain walk
// ============================================================================

/// Projects both vectors onto the plane perpendicular to `axis`, or zeroes them
/// when there is no usable axis.
fn project_off_axis(axis: Option<Vec3>, lever_arm: &mut Vec3, target_line: &mut Vec3) {
    match axis.filter(|a| a.length() > MIN_AXIS_LENGTH) {
        Some(axis) => {
            let axis = axis.normalize();
            *lever_arm -= axis * lever_arm.dot(axis);
            *target_line -= axis * target_line.dot(axis);
        }
        None => {
            *lever_arm = Vec3::ZERO;
            *target_line = Vec3::ZERO;
        }
    }
}

/// One inward pass for one target, writing proposals into `accumulators`.
fn solve_target(
    input: &SolveInput<'_>,
    constraints: &mut ConstraintSet,
    target: &Target,
    absolute_poses: &[Transform],
    accumulators: &mut [RotationAccumulator],
) {
    let target_type = target.target_type;
    if matches!(target_type, TargetType::RotationOnly | TargetType::Unknown) {
        return;
    }
    let tip = target.index;
    if tip >= absolute_poses.len() {
        return;
    }
    let skeleton = input.skeleton;
    let config = input.config;
    let Some(mut pivot) = skeleton.parent(tip) else {
        return;
    };
    if Some(pivot) == input.hips_index {
        return;
    }
    let flex = |depth: usize| target.flex_coefficient(depth, config.default_flex_coefficient);
    let target_rotation = target.rotation();

    let mut depth = 0;
    let mut tip_orientation = absolute_poses[tip].rotation;
    let mut tip_parent_orientation = absolute_poses[pivot].rotation;

    // Turn the tip toward its target orientation.
    let delta = fraction_of(target_rotation * tip_orientation.inverse(), flex(depth));
    let mut tip_relative =
        normalize_or_identity(tip_parent_orientation.inverse() * delta * tip_orientation);
    if constraints.apply(tip, &mut tip_relative) {
        tip_orientation = tip_parent_orientation * tip_relative;
    }
    accumulators[tip].add(tip_relative, target.weight);

    let mut tip_position = absolute_poses[tip].translation;
    depth += 1;

    loop {
        let pivot_parent = skeleton.parent(pivot);
        let joint_position = absolute_poses[pivot].translation;
        let mut lever_arm = tip_position - joint_position;

        let mut delta = Quat::IDENTITY;
        if target_type.drives_position() {
            let mut target_line = target.translation() - joint_position;

            // Lower spine only twists unless the hips are targeted explicitly.
            if !input.hips_target_active
                && constraints.is_lower_spine(pivot)
                && Some(tip) != input.head_index
            {
                let twist_axis =
                    pivot_parent.map(|p| joint_position - absolute_poses[p].translation);
                project_off_axis(twist_axis, &mut lever_arm, &mut target_line);
            }

            if let Some((axis, angle)) = swing_between(lever_arm, target_line) {
                if angle > MIN_ADJUSTMENT_ANGLE {
                    delta = Quat::from_axis_angle(axis, angle * flex(depth));

                    // If the tip cannot reach its orientation from here, leak a
                    // little of the missing twist into this pivot.
                    let mut final_tip = normalize_or_identity(
                        (delta * tip_parent_orientation).inverse() * target_rotation,
                    );
                    if constraints.apply(tip, &mut final_tip) {
                        let constrained_tip = delta * tip_parent_orientation * final_tip;
                        let missing = target_rotation * constrained_tip.inverse();
                        if let Some(twist_axis) = (delta * lever_arm).try_normalize() {
                            let (_, twist) = swing_twist_decomposition(missing, twist_axis);
                            delta = normalize_or_identity(
                                fraction_of(twist, config.limit_leak_fraction) * delta,
                            );
                        }
                    }
                }
            }
        } else if target_type == TargetType::HmdHead {
            // Orientation is spread up the chain; position is left to the hips.
            delta = fraction_of(
                target_rotation * tip_orientation.inverse(),
                config.hmd_angle_distribution,
            );
        }

        let parent_rotation = pivot_parent.map_or(Quat::IDENTITY, |p| absolute_poses[p].rotation);
        let pivot_rotation = absolute_poses[pivot].rotation;
        let mut new_rotation =
            normalize_or_identity(parent_rotation.inverse() * delta * pivot_rotation);
        if constraints.apply(pivot, &mut new_rotation) {
            delta = parent_rotation * new_rotation * pivot_rotation.inverse();
        }
        accumulators[pivot].add(new_rotation, target.weight);

        tip_position = joint_position + delta * (tip_position - joint_position);
        tip_orientation = normalize_or_identity(delta * tip_orientation);
        tip_parent_orientation = normalize_or_identity(delta * tip_parent_orientation);
        depth += 1;

        match pivot_parent {
            Some(parent) if Some(parent) != input.hips_index => pivot = parent,
            _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::SwingTwistConstraint;
    use crate::math::signed_twist_angle;
    use crate::target::FlexCoefficients;
    use crate::test_rig::vertical_chain;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    fn position_target(index: usize, translation: Vec3) -> Target {
        Target {
            index,
            target_type: TargetType::RotationAndPosition,
            pose: Transform::from_translation(translation),
            weight: 1.0,
            flex_coefficients: FlexCoefficients::default(),
            hips: false,
        }
    }

    fn run(
        skeleton: &Skeleton,
        constraints: &mut ConstraintSet,
        targets: &[Target],
        hips_index: Option<usize>,
        poses: &mut [Transform],
    ) -> (CcdSolver, SolveStats) {
        let config = IkConfig::default();
        let input = SolveInput {
            skeleton,
            config: &config,
            targets,
            hips_index,
            head_index: None,
            hips_target_active: false,
        };
        let mut solver = CcdSolver::new();
        let stats = solver.solve(&input, constraints, poses);
        (solver, stats)
    }

    #[test]
    fn test_absolute_poses_compose() {
        let skeleton = vertical_chain(4);
        let mut poses = skeleton.relative_default_poses();
        let targets = [position_target(3, Vec3::new(1.5, 1.5, 0.5))];
        let (solver, _) = run(&skeleton, &mut ConstraintSet::new(), &targets, None, &mut poses);

        let absolute = solver.absolute_poses();
        assert_eq!(absolute[0], poses[0]);
        for i in 1..poses.len() {
            let parent = skeleton.parent(i).unwrap();
            let composed = absolute[parent].then(&poses[i]);
            assert_relative_eq!(absolute[i].translation, composed.translation, epsilon = 1e-5);
            assert_relative_eq!(absolute[i].rotation, composed.rotation, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_two_joint_chain_converges() {
        let skeleton = vertical_chain(2);
        let mut poses = skeleton.relative_default_poses();
        let goal = Vec3::new(1.0, 0.0, 0.0);
        let targets = [position_target(1, goal)];
        let (solver, stats) =
            run(&skeleton, &mut ConstraintSet::new(), &targets, None, &mut poses);

        assert!(stats.iterations < IkConfig::default().max_iterations);
        assert!(stats.max_error <= 0.1);
        let tip = solver.absolute_poses()[1].translation;
        assert!((tip - goal).length() <= 0.1);
    }

    #[test]
    fn test_unreachable_target_hits_iteration_cap() {
        let skeleton = vertical_chain(2);
        let mut poses = skeleton.relative_default_poses();
        let targets = [position_target(1, Vec3::new(3.0, 0.0, 0.0))];
        let (solver, stats) =
            run(&skeleton, &mut ConstraintSet::new(), &targets, None, &mut poses);

        assert_eq!(stats.iterations, IkConfig::default().max_iterations);
        let tip = solver.absolute_poses()[1].translation;
        assert_relative_eq!(tip, Vec3::X, epsilon = 1e-3);
        assert_relative_eq!(stats.max_error, 2.0, epsilon = 1e-3);
    }

    #[test]
    fn test_vertical_chain_extends_along_line() {
        // hips -> spine -> head, head aimed 10% past its reach
        let skeleton = vertical_chain(3);
        let mut poses = skeleton.relative_default_poses();
        let spine = Vec3::Y;
        let direction = Vec3::new(1.0, 1.0, 0.0).normalize();
        let targets = [position_target(2, spine + direction * 1.1)];
        let (solver, stats) =
            run(&skeleton, &mut ConstraintSet::new(), &targets, Some(0), &mut poses);

        assert!(stats.iterations <= IkConfig::default().max_iterations);
        let head = solver.absolute_poses()[2].translation;
        assert_relative_eq!(head, spine + direction, epsilon = 1e-3);
    }

    #[test]
    fn test_hips_stop_the_walk() {
        let skeleton = vertical_chain(3);
        let mut poses = skeleton.relative_default_poses();
        let targets = [position_target(2, Vec3::new(1.0, 1.0, 0.0))];
        let (solver, _) = run(&skeleton, &mut ConstraintSet::new(), &targets, Some(0), &mut poses);

        assert_eq!(poses[0].rotation, Quat::IDENTITY);
        assert!(!solver.is_dirty(0));
        assert!(solver.is_dirty(1));
        let head = solver.absolute_poses()[2].translation;
        assert_relative_eq!(head, Vec3::new(1.0, 1.0, 0.0), epsilon = 0.1);
    }

    #[test]
    fn test_constraints_respected() {
        let skeleton = vertical_chain(2);
        let mut poses = skeleton.relative_default_poses();
        let cone = 0.3;
        let mut constraints = ConstraintSet::new();
        constraints.insert(
            0,
            SwingTwistConstraint::new().with_twist_limits(-0.1, 0.1).with_cone(cone),
        );
        let targets = [position_target(1, Vec3::new(1.0, 0.0, 0.0))];
        run(&skeleton, &mut constraints, &targets, None, &mut poses);

        let swing_twist = constraints.get(0).and_then(|c| c.as_swing_twist()).unwrap();
        let (swing, twist) = swing_twist.decompose(poses[0].rotation);
        assert!((swing * Vec3::Y).y >= cone.cos() - 1e-4);
        assert!(twist.abs() <= 0.1 + 1e-4);
        // the root still leaned toward the target as far as it could
        assert!((poses[0].rotation * Vec3::Y).x > 0.2);
    }

    #[test]
    fn test_lower_spine_only_twists() {
        let mut skeleton = vertical_chain(3);
        let hand = skeleton
            .add_joint(
                crate::skeleton::Joint::new("hand")
                    .with_parent(2)
                    .with_pose(Transform::from_translation(Vec3::X)),
            )
            .unwrap();
        let mut constraints = ConstraintSet::new();
        constraints.insert(1, SwingTwistConstraint::new().with_lower_spine(true));
        let mut poses = skeleton.relative_default_poses();
        let targets = [position_target(hand, Vec3::new(0.0, 2.5, 1.0))];
        run(&skeleton, &mut constraints, &targets, Some(0), &mut poses);

        assert!(poses[1].rotation.angle_between(Quat::IDENTITY) > 1e-3);
        assert_relative_eq!(poses[1].rotation * Vec3::Y, Vec3::Y, epsilon = 1e-4);
    }

    #[test]
    fn test_rotation_only_target_forced() {
        let skeleton = vertical_chain(3);
        let mut poses = skeleton.relative_default_poses();
        let desired = Quat::from_rotation_z(0.5);
        let targets = [Target {
            index: 2,
            target_type: TargetType::RotationOnly,
            pose: Transform::from_rotation(desired),
            weight: 1.0,
            flex_coefficients: FlexCoefficients::default(),
            hips: false,
        }];
        let (solver, stats) =
            run(&skeleton, &mut ConstraintSet::new(), &targets, None, &mut poses);

        assert_eq!(stats.max_error, 0.0);
        assert_eq!(stats.iterations, 0);
        assert_relative_eq!(solver.absolute_poses()[2].rotation, desired, epsilon = 1e-5);
    }

    #[test]
    fn test_degenerate_input_stays_finite() {
        let mut skeleton = Skeleton::new();
        for i in 0..3 {
            let mut joint = crate::skeleton::Joint::new(format!("j{i}"));
            if i > 0 {
                joint = joint.with_parent(i - 1);
            }
            skeleton.add_joint(joint).unwrap();
        }
        // every joint sits at the origin
        let mut poses = skeleton.relative_default_poses();
        let targets = [
            position_target(2, Vec3::ZERO),
            position_target(1, Vec3::new(f32::NAN, 0.0, 0.0)),
        ];
        let (solver, _) = run(&skeleton, &mut ConstraintSet::new(), &targets, None, &mut poses);

        for pose in poses.iter().chain(solver.absolute_poses()) {
            assert!(pose.translation.is_finite());
            assert!(pose.rotation.is_finite());
        }
    }

    #[test]
    fn test_converged_pose_is_left_alone() {
        let skeleton = vertical_chain(2);
        let mut poses = skeleton.relative_default_poses();
        let config = IkConfig::default();
        let targets = [position_target(1, Vec3::new(1.0, 0.0, 0.0))];
        let input = SolveInput {
            skeleton: &skeleton,
            config: &config,
            targets: &targets,
            hips_index: None,
            head_index: None,
            hips_target_active: false,
        };
        let mut solver = CcdSolver::new();
        let mut constraints = ConstraintSet::new();

        let first = solver.solve(&input, &mut constraints, &mut poses);
        assert!(first.iterations > 0);
        assert!(first.max_error <= config.max_error_tolerance);

        let solved = poses.clone();
        let second = solver.solve(&input, &mut constraints, &mut poses);
        assert_eq!(second.iterations, 0);
        assert_eq!(poses, solved);
        assert_relative_eq!(second.max_error, first.max_error, epsilon = 1e-6);
        // joints the first solve moved still count as touched
        assert!(solver.is_dirty(0));
        assert!(solver.is_dirty(1));
    }

    #[test]
    fn test_hmd_head_spreads_rotation_up_the_chain() {
        let skeleton = vertical_chain(3);
        let mut poses = skeleton.relative_default_poses();
        let config = IkConfig::default().with_max_iterations(1);
        // turning about the bone axis leaves every position in place
        let desired = Quat::from_rotation_y(0.4);
        let targets = [Target {
            index: 2,
            target_type: TargetType::HmdHead,
            pose: Transform::from_rotation_translation(desired, Vec3::new(0.0, 2.0, 1.0)),
            weight: 1.0,
            flex_coefficients: FlexCoefficients::default(),
            hips: false,
        }];
        let input = SolveInput {
            skeleton: &skeleton,
            config: &config,
            targets: &targets,
            hips_index: None,
            head_index: Some(2),
            hips_target_active: false,
        };
        let stats = CcdSolver::new().solve(&input, &mut ConstraintSet::new(), &mut poses);
        assert_eq!(stats.iterations, 1);

        let about_y = |q: Quat| {
            let (axis, angle) = q.to_axis_angle();
            assert!(axis.y > 0.99);
            angle
        };
        // the tip takes its flex share, each pivot 45% of what is still missing
        assert_relative_eq!(about_y(poses[2].rotation), 0.2, epsilon = 2e-3);
        assert_relative_eq!(about_y(poses[1].rotation), 0.45 * 0.4, epsilon = 2e-3);
        assert_relative_eq!(about_y(poses[0].rotation), 0.45 * (0.4 - 0.18), epsilon = 2e-3);
        for (pose, rest) in poses.iter().zip(skeleton.relative_default_poses()) {
            assert_eq!(pose.translation, rest.translation);
        }
    }

    #[test]
    fn test_tip_twist_limit_leaks_into_pivot() {
        let pivot_twist = |tip_twist_limit: Option<f32>| {
            let skeleton = vertical_chain(3);
            let mut poses = skeleton.relative_default_poses();
            let mut constraints = ConstraintSet::new();
            if let Some(limit) = tip_twist_limit {
                constraints.insert(
                    2,
                    SwingTwistConstraint::new()
                        .with_twist_limits(-limit, limit)
                        .with_cone(FRAC_PI_2),
                );
            }
            let config = IkConfig::default().with_max_iterations(1);
            let targets = [Target {
                index: 2,
                target_type: TargetType::RotationAndPosition,
                pose: Transform::from_rotation_translation(
                    Quat::from_rotation_y(1.0),
                    Vec3::new(0.5, 1.8, 0.0),
                ),
                weight: 1.0,
                flex_coefficients: FlexCoefficients::default(),
                hips: false,
            }];
            let input = SolveInput {
                skeleton: &skeleton,
                config: &config,
                targets: &targets,
                hips_index: Some(0),
                head_index: None,
                hips_target_active: false,
            };
            CcdSolver::new().solve(&input, &mut constraints, &mut poses);
            let (_, twist) = swing_twist_decomposition(poses[1].rotation, Vec3::Y);
            signed_twist_angle(twist, Vec3::Y, Vec3::X)
        };

        assert!(pivot_twist(None).abs() < 1e-3);
        // about a tenth of the twist the tip could not take
        let leaked = pivot_twist(Some(0.05));
        assert!(leaked > 0.05 && leaked < 0.15, "leaked {leaked}");
    }
}
