//! The inverse kinematics node.
//!
//! [`InverseKinematics`] owns everything that persists between frames: the
//! constraint set built for the current skeleton, the registered targets, the
//! previous solution and the hips offset. Call [`InverseKinematics::overlay`]
//! once per animation frame.

use crate::blend::{SolutionSource, init_from_source, limit_center_poses};
use crate::config::IkConfig;
use crate::constraint::{ConstraintSet, RotationConstraint, humanoid_constraints};
use crate::error::{IkError, IkResult};
use crate::hips::HipOffsetEstimator;
use crate::skeleton::Skeleton;
use crate::solver::{CcdSolver, SolveInput, SolveStats};
use crate::target::{Target, TargetResolver, TargetType, TargetVar};
use crate::transform::Transform;
use crate::vars::VarLookup;
use std::sync::Arc;

/// Joint name the chain walks stop at and the hips offset moves.
pub const HIPS_JOINT: &str = "Hips";
/// Joint name that receives head-specific hips handling.
pub const HEAD_JOINT: &str = "Head";

/// Constraint-aware CCD inverse kinematics over a skeleton.
///
/// # Example
///
/// ```
/// use rhizome_resin_ik::{AnimVars, InverseKinematics, Joint, Skeleton, TargetVar, Transform};
/// use glam::Vec3;
/// use std::sync::Arc;
///
/// let mut skeleton = Skeleton::new();
/// let root = skeleton.add_joint(Joint::new("root")).unwrap();
/// let tip = Joint::new("tip")
///     .with_parent(root)
///     .with_pose(Transform::from_translation(Vec3::Y));
/// skeleton.add_joint(tip).unwrap();
/// let under = skeleton.relative_default_poses();
///
/// let mut ik = InverseKinematics::default();
/// ik.set_skeleton(Some(Arc::new(skeleton)));
/// ik.register_target(TargetVar::new("tip").with_position_var("tipPosition"));
///
/// let mut vars = AnimVars::new();
/// vars.set("tipPosition", Vec3::new(1.0, 0.0, 0.0));
/// let solved = ik.overlay(&vars, 1.0 / 60.0, &under);
/// assert_eq!(solved.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InverseKinematics {
    config: IkConfig,
    skeleton: Option<Arc<Skeleton>>,
    constraints: ConstraintSet,
    limit_center_poses: Vec<Transform>,
    relative_poses: Vec<Transform>,
    resolver: TargetResolver,
    targets: Vec<Target>,
    solver: CcdSolver,
    hips: HipOffsetEstimator,
    solution_source: SolutionSource,
    solution_source_var: String,
    hips_index: Option<usize>,
    hips_parent_index: Option<usize>,
    head_index: Option<usize>,
    last_stats: SolveStats,
}

impl InverseKinematics {
    /// Creates a node with the given tuning and no skeleton.
    pub fn new(config: IkConfig) -> Self {
        Self {
            config,
            hips: HipOffsetEstimator::new(config.max_hips_offset_length),
            ..Self::default()
        }
    }

    /// Tuning parameters.
    pub fn config(&self) -> &IkConfig {
        &self.config
    }

    /// The current skeleton.
    pub fn skeleton(&self) -> Option<&Arc<Skeleton>> {
        self.skeleton.as_ref()
    }

    /// Assigns a skeleton, rebuilding constraints and limit-center poses.
    ///
    /// Target joint names are re-resolved against the new skeleton on the next
    /// frame. `None` detaches the node; [`overlay`](Self::overlay) then yields
    /// no poses.
    pub fn set_skeleton(&mut self, skeleton: Option<Arc<Skeleton>>) {
        self.resolver.invalidate_indices();
        self.solver.clear();
        self.relative_poses.clear();
        self.targets.clear();

        match skeleton.as_deref() {
            Some(s) => {
                self.constraints = humanoid_constraints(s);
                self.limit_center_poses =
                    limit_center_poses(s, &self.constraints, self.config.upper_arm_rest_angle);
                self.head_index = s.find_joint(HEAD_JOINT);
                self.hips_index = s.find_joint(HIPS_JOINT);
                self.hips_parent_index = self.hips_index.and_then(|h| s.parent(h));
                tracing::debug!(
                    joints = s.num_joints(),
                    constraints = self.constraints.len(),
                    hips = ?self.hips_index,
                    head = ?self.head_index,
                    "IK skeleton assigned"
                );
            }
            None => {
                self.constraints.clear();
                self.limit_center_poses.clear();
                self.head_index = None;
                self.hips_index = None;
                self.hips_parent_index = None;
            }
        }
        self.skeleton = skeleton;
    }

    /// Registers a target, replacing any earlier one for the same joint name.
    pub fn register_target(&mut self, var: TargetVar) {
        self.resolver.register(var);
    }

    /// Registered targets.
    pub fn target_vars(&self) -> &[TargetVar] {
        self.resolver.target_vars()
    }

    /// Targets resolved on the last frame.
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Installs or replaces the constraint on joint `index`.
    ///
    /// # Errors
    ///
    /// [`IkError::NoSkeleton`] before a skeleton is assigned, and
    /// [`IkError::JointOutOfRange`] for an index outside it.
    pub fn set_constraint(
        &mut self,
        index: usize,
        constraint: impl Into<RotationConstraint>,
    ) -> IkResult<()> {
        let skeleton = self.skeleton.as_deref().ok_or(IkError::NoSkeleton)?;
        let count = skeleton.num_joints();
        if index >= count {
            return Err(IkError::JointOutOfRange { index, count });
        }
        self.constraints.insert(index, constraint);
        self.limit_center_poses =
            limit_center_poses(skeleton, &self.constraints, self.config.upper_arm_rest_angle);
        Ok(())
    }

    /// The constraint set for the current skeleton.
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Limit-center poses for the current skeleton.
    pub fn limit_center_poses(&self) -> &[Transform] {
        &self.limit_center_poses
    }

    /// Sets the default solution source.
    pub fn set_solution_source(&mut self, source: SolutionSource) {
        self.solution_source = source;
    }

    /// The default solution source.
    pub fn solution_source(&self) -> SolutionSource {
        self.solution_source
    }

    /// Names an integer variable that overrides the solution source per frame.
    pub fn set_solution_source_var(&mut self, key: impl Into<String>) {
        self.solution_source_var = key.into();
    }

    /// Solution source for this frame, honouring the override variable.
    pub fn effective_solution_source(&self, vars: &impl VarLookup) -> SolutionSource {
        let fallback = self.solution_source.into();
        SolutionSource::from(vars.lookup_i32(&self.solution_source_var, fallback))
    }

    /// Sets the hips offset clamp. The length is in skeleton units.
    pub fn set_max_hips_offset_length(&mut self, length: f32) {
        self.hips.set_max_length(length);
    }

    /// The hips offset clamp.
    pub fn max_hips_offset_length(&self) -> f32 {
        self.hips.max_length()
    }

    /// The persistent hips offset.
    pub fn hips_offset(&self) -> glam::Vec3 {
        self.hips.offset()
    }

    /// Largest positional error left by the last solve.
    pub fn max_error_on_last_solve(&self) -> f32 {
        self.last_stats.max_error
    }

    /// Iterations the last solve used.
    pub fn iterations_on_last_solve(&self) -> u32 {
        self.last_stats.iterations
    }

    /// Forgets the boundary hysteresis of every constraint.
    pub fn clear_joint_limit_history(&mut self) {
        self.constraints.clear_history();
    }

    /// The poses produced by the last frame.
    pub fn relative_poses(&self) -> &[Transform] {
        &self.relative_poses
    }

    fn load_poses(&mut self, skeleton: &Skeleton, poses: &[Transform]) {
        if skeleton.num_joints() == poses.len() {
            self.relative_poses.clear();
            self.relative_poses.extend_from_slice(poses);
            self.solver.reset(poses.len());
        } else {
            if !poses.is_empty() {
                tracing::debug!(
                    poses = poses.len(),
                    joints = skeleton.num_joints(),
                    "pose count does not match skeleton, skipping IK"
                );
            }
            self.relative_poses.clear();
            self.solver.clear();
        }
    }

    /// Solves one frame.
    ///
    /// `under_poses` are the parent-relative poses of the animation below this
    /// node; `dt` is the frame time in seconds. Returns the solved relative
    /// poses, which are empty while no skeleton is assigned or the pose count
    /// does not match it.
    pub fn overlay(
        &mut self,
        vars: &impl VarLookup,
        dt: f32,
        under_poses: &[Transform],
    ) -> &[Transform] {
        let source = self.effective_solution_source(vars);
        let dt = dt.min(self.config.max_overlay_dt).max(0.0);

        let Some(skeleton) = self.skeleton.clone() else {
            self.relative_poses.clear();
            return &self.relative_poses;
        };

        if self.relative_poses.len() != under_poses.len() {
            self.load_poses(&skeleton, under_poses);
        } else {
            init_from_source(
                source,
                &self.config,
                &mut self.relative_poses,
                under_poses,
                &self.limit_center_poses,
                self.solver.accumulators(),
            );
            // Authored motion may exceed the limits; widen them rather than fight it.
            self.constraints
                .dynamically_adjust_limits(|i| under_poses.get(i).map(|p| p.rotation));
        }

        if self.relative_poses.is_empty() {
            return &self.relative_poses;
        }

        self.resolver
            .resolve(&skeleton, vars, under_poses, self.hips_index, &mut self.targets);
        if self.targets.is_empty() {
            self.relative_poses.clear();
            self.relative_poses.extend_from_slice(under_poses);
            return &self.relative_poses;
        }

        self.shift_hips(&skeleton, under_poses);

        let hips_target_active = self.targets.iter().any(|t| t.hips);
        let input = SolveInput {
            skeleton: &skeleton,
            config: &self.config,
            targets: &self.targets,
            hips_index: self.hips_index,
            head_index: self.head_index,
            hips_target_active,
        };
        self.last_stats = self
            .solver
            .solve(&input, &mut self.constraints, &mut self.relative_poses);

        if hips_target_active {
            self.hips.reset();
        } else {
            let under_head = self
                .head_index
                .map(|h| skeleton.absolute_pose(h, under_poses).translation);
            let goal = self.hips.measure(
                &self.config,
                &self.targets,
                self.solver.absolute_poses(),
                self.head_index,
                under_head,
            );
            self.hips.relax(&self.config, goal, dt);
        }

        &self.relative_poses
    }

    /// Moves the hips onto their target, or by last frame's offset, and drags
    /// hips-relative targets along.
    fn shift_hips(&mut self, skeleton: &Skeleton, under_poses: &[Transform]) {
        let Some(hips) = self.hips_index else {
            return;
        };

        let hips_target = self.targets.iter().find(|t| t.hips).copied();
        if let Some(target) = hips_target {
            self.relative_poses[hips] = match self.hips_parent_index {
                Some(parent) => skeleton
                    .absolute_pose(parent, &self.relative_poses)
                    .inverse()
                    .then(&target.pose),
                None => target.pose,
            };
        } else if let Some(offset) = self.hips.applied_offset(self.config.min_hips_offset_length) {
            match self.hips_parent_index {
                Some(parent) => {
                    let mut absolute_hips = skeleton.absolute_pose(hips, under_poses);
                    absolute_hips.translation += offset;
                    self.relative_poses[hips] = skeleton
                        .absolute_pose(parent, &self.relative_poses)
                        .inverse()
                        .then(&absolute_hips);
                }
                None => {
                    self.relative_poses[hips].translation = under_poses[hips].translation + offset;
                }
            }
        }

        let shift = skeleton.absolute_pose(hips, &self.relative_poses).translation
            - skeleton.absolute_pose(hips, under_poses).translation;
        for target in &mut self.targets {
            if target.target_type == TargetType::HipsRelativeRotationAndPosition {
                target.pose.translation += shift;
            }
        }
    }
}
