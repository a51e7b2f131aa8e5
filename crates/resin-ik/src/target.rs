//! IK targets: named configuration resolved into per-frame goals.
//!
//! A [`TargetVar`] names a joint and the animation variables that drive it.
//! Each frame the [`TargetResolver`] turns every registered var into a
//! [`Target`] with a concrete world-frame pose, falling back to the joint's
//! current under pose when a variable is missing.

use crate::skeleton::Skeleton;
use crate::transform::Transform;
use crate::vars::VarLookup;
use glam::{Quat, Vec3};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum number of per-depth flex coefficients a target can carry.
pub const MAX_FLEX_COEFFICIENTS: usize = 10;

/// How a target constrains its joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TargetType {
    /// Match both world position and world rotation.
    #[default]
    RotationAndPosition,
    /// Match world rotation only.
    RotationOnly,
    /// Head driven by a head-mounted display; position is corrected through the hips.
    HmdHead,
    /// Like `RotationAndPosition`, but the position moves with the hips offset.
    HipsRelativeRotationAndPosition,
    /// Disabled for this frame.
    Unknown,
}

impl TargetType {
    /// Whether the solver swings the chain toward this target's position.
    pub fn drives_position(self) -> bool {
        matches!(
            self,
            TargetType::RotationAndPosition | TargetType::HipsRelativeRotationAndPosition
        )
    }

    /// Whether this target's positional error counts toward convergence.
    pub fn measures_error(self) -> bool {
        self.drives_position() || self == TargetType::HmdHead
    }
}

impl From<i32> for TargetType {
    fn from(value: i32) -> Self {
        match value {
            0 => TargetType::RotationAndPosition,
            1 => TargetType::RotationOnly,
            2 => TargetType::HmdHead,
            3 => TargetType::HipsRelativeRotationAndPosition,
            _ => TargetType::Unknown,
        }
    }
}

impl From<TargetType> for i32 {
    fn from(value: TargetType) -> Self {
        match value {
            TargetType::RotationAndPosition => 0,
            TargetType::RotationOnly => 1,
            TargetType::HmdHead => 2,
            TargetType::HipsRelativeRotationAndPosition => 3,
            TargetType::Unknown => -1,
        }
    }
}

/// Fixed-capacity table of per-depth flex coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlexCoefficients {
    values: [f32; MAX_FLEX_COEFFICIENTS],
    len: usize,
}

impl FlexCoefficients {
    /// Builds a table, keeping at most [`MAX_FLEX_COEFFICIENTS`] values clamped to `[0, 1]`.
    pub fn new(coefficients: &[f32]) -> Self {
        let mut table = Self::default();
        for &c in coefficients.iter().take(MAX_FLEX_COEFFICIENTS) {
            table.values[table.len] = if c.is_nan() { 0.0 } else { c.clamp(0.0, 1.0) };
            table.len += 1;
        }
        table
    }

    /// Coefficient for `depth`, or `default` past the end of the table.
    pub fn get(&self, depth: usize, default: f32) -> f32 {
        if depth < self.len {
            self.values[depth]
        } else {
            default
        }
    }

    /// Number of configured depths.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no depths are configured.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The configured coefficients.
    pub fn as_slice(&self) -> &[f32] {
        &self.values[..self.len]
    }
}

/// Registered configuration for one joint target.
#[derive(Debug, Clone)]
pub struct TargetVar {
    joint_name: String,
    position_var: String,
    rotation_var: String,
    type_var: String,
    weight_var: String,
    weight: f32,
    flex_coefficients: FlexCoefficients,
    joint_index: Option<usize>,
}

impl TargetVar {
    /// Creates a target for `joint_name` with no variables bound and weight 1.
    pub fn new(joint_name: impl Into<String>) -> Self {
        Self {
            joint_name: joint_name.into(),
            position_var: String::new(),
            rotation_var: String::new(),
            type_var: String::new(),
            weight_var: String::new(),
            weight: 1.0,
            flex_coefficients: FlexCoefficients::default(),
            joint_index: None,
        }
    }

    /// Variable holding the desired position (rig frame).
    pub fn with_position_var(mut self, key: impl Into<String>) -> Self {
        self.position_var = key.into();
        self
    }

    /// Variable holding the desired rotation (rig frame).
    pub fn with_rotation_var(mut self, key: impl Into<String>) -> Self {
        self.rotation_var = key.into();
        self
    }

    /// Variable holding the [`TargetType`] as an integer.
    pub fn with_type_var(mut self, key: impl Into<String>) -> Self {
        self.type_var = key.into();
        self
    }

    /// Variable overriding the weight.
    pub fn with_weight_var(mut self, key: impl Into<String>) -> Self {
        self.weight_var = key.into();
        self
    }

    /// Weight used when the weight variable is missing. Negative values become zero.
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight.max(0.0);
        self
    }

    /// Per-depth flex coefficients, tip first.
    pub fn with_flex_coefficients(mut self, coefficients: &[f32]) -> Self {
        self.flex_coefficients = FlexCoefficients::new(coefficients);
        self
    }

    /// The target joint's name.
    pub fn joint_name(&self) -> &str {
        &self.joint_name
    }

    /// Static weight.
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Flex coefficient table.
    pub fn flex_coefficients(&self) -> &FlexCoefficients {
        &self.flex_coefficients
    }

    /// Resolved joint index, if resolution has happened.
    pub fn joint_index(&self) -> Option<usize> {
        self.joint_index
    }
}

/// A resolved target for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    /// Joint index.
    pub index: usize,
    /// Target type (never `Unknown`).
    pub target_type: TargetType,
    /// Desired world-frame pose.
    pub pose: Transform,
    /// Non-negative blend weight.
    pub weight: f32,
    /// Per-depth flex coefficients.
    pub flex_coefficients: FlexCoefficients,
    /// Whether this target addresses the hips joint.
    pub hips: bool,
}

impl Target {
    /// Desired world position.
    pub fn translation(&self) -> Vec3 {
        self.pose.translation
    }

    /// Desired world rotation.
    pub fn rotation(&self) -> Quat {
        self.pose.rotation
    }

    /// Flex coefficient for `depth`, using `default` past the configured table.
    pub fn flex_coefficient(&self, depth: usize, default: f32) -> f32 {
        self.flex_coefficients.get(depth, default)
    }
}

/// Owns registered [`TargetVar`]s and resolves them each frame.
#[derive(Debug, Clone, Default)]
pub struct TargetResolver {
    vars: Vec<TargetVar>,
    max_target_index: Option<usize>,
    hips_target_index: Option<usize>,
}

impl TargetResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a target. Replaces any earlier registration for the same joint name.
    pub fn register(&mut self, var: TargetVar) {
        match self.vars.iter_mut().find(|v| v.joint_name == var.joint_name) {
            Some(existing) => *existing = var,
            None => self.vars.push(var),
        }
    }

    /// Removes every registration.
    pub fn clear(&mut self) {
        self.vars.clear();
        self.max_target_index = None;
        self.hips_target_index = None;
    }

    /// Registered target vars. Order changes when entries are pruned.
    pub fn target_vars(&self) -> &[TargetVar] {
        &self.vars
    }

    /// Forgets cached joint indices, e.g. after the skeleton changes.
    pub fn invalidate_indices(&mut self) {
        for var in &mut self.vars {
            var.joint_index = None;
        }
    }

    /// Largest joint index referenced by the last resolve.
    pub fn max_target_index(&self) -> Option<usize> {
        self.max_target_index
    }

    /// Position in the last resolved list of the target addressing the hips joint.
    pub fn hips_target_index(&self) -> Option<usize> {
        self.hips_target_index
    }

    /// Resolves every registered var into `targets` (cleared first).
    ///
    /// Vars naming joints the skeleton lacks are dropped for good. Vars whose
    /// type variable reads as an unknown value are skipped for this frame only.
    pub fn resolve(
        &mut self,
        skeleton: &Skeleton,
        lookup: &impl VarLookup,
        under_poses: &[Transform],
        hips_index: Option<usize>,
        targets: &mut Vec<Target>,
    ) {
        targets.clear();
        self.max_target_index = None;
        self.hips_target_index = None;

        let mut i = 0;
        while i < self.vars.len() {
            let var = &mut self.vars[i];
            if var.joint_index.is_none() {
                var.joint_index = skeleton.find_joint(&var.joint_name);
            }
            if var.joint_index.is_none() {
                tracing::warn!(
                    joint = %var.joint_name,
                    "IK target joint not found, removing target"
                );
                self.vars.swap_remove(i);
            } else {
                i += 1;
            }
        }

        for var in &self.vars {
            let Some(index) = var.joint_index else {
                continue;
            };
            let target_type = TargetType::from(
                lookup.lookup_i32(&var.type_var, TargetType::RotationAndPosition.into()),
            );
            if target_type == TargetType::Unknown {
                continue;
            }

            let default_pose = skeleton.absolute_pose(index, under_poses);
            let rotation =
                lookup.lookup_rig_to_geometry_quat(&var.rotation_var, default_pose.rotation);
            let translation =
                lookup.lookup_rig_to_geometry_vec3(&var.position_var, default_pose.translation);
            let weight = lookup.lookup_f32(&var.weight_var, var.weight);

            let hips = Some(index) == hips_index;
            if hips {
                self.hips_target_index = Some(targets.len());
            }
            self.max_target_index = Some(self.max_target_index.map_or(index, |m| m.max(index)));
            targets.push(Target {
                index,
                target_type,
                pose: Transform::from_rotation_translation(rotation, translation),
                weight: if weight.is_nan() { 0.0 } else { weight.max(0.0) },
                flex_coefficients: var.flex_coefficients,
                hips,
            });
        }
    }
}
