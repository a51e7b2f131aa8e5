//! Joint rotation limits.
//!
//! A constraint clamps a proposed parent-relative rotation into its allowed
//! region and reports whether it had to. Two shapes exist: a swing-twist cone
//! for ball joints and a single-axis hinge for elbows and knees.

mod hinge;
mod humanoid;
mod swing_twist;

pub use hinge::HingeConstraint;
pub use humanoid::humanoid_constraints;
pub use swing_twist::{SwingLimitFunction, SwingTwistConstraint};

use glam::Quat;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::f32::consts::TAU;

/// A rotation limit attached to one joint.
#[derive(Debug, Clone)]
pub enum RotationConstraint {
    /// Ball joint: swing cone plus twist range.
    SwingTwist(SwingTwistConstraint),
    /// Single-axis hinge.
    Hinge(HingeConstraint),
}

impl RotationConstraint {
    /// Clamps `rotation` into the allowed region. Returns true if it changed.
    pub fn apply(&mut self, rotation: &mut Quat) -> bool {
        match self {
            RotationConstraint::SwingTwist(c) => c.apply(rotation),
            RotationConstraint::Hinge(c) => c.apply(rotation),
        }
    }

    /// The rest rotation the limits are measured against.
    pub fn reference_rotation(&self) -> Quat {
        match self {
            RotationConstraint::SwingTwist(c) => c.reference_rotation(),
            RotationConstraint::Hinge(c) => c.reference_rotation(),
        }
    }

    /// A rotation in the middle of the allowed region.
    pub fn center_rotation(&self) -> Quat {
        match self {
            RotationConstraint::SwingTwist(c) => c.center_rotation(),
            RotationConstraint::Hinge(c) => c.center_rotation(),
        }
    }

    /// Whether the solver should restrict this joint to twist-only corrections.
    pub fn is_lower_spine(&self) -> bool {
        match self {
            RotationConstraint::SwingTwist(c) => c.is_lower_spine(),
            RotationConstraint::Hinge(_) => false,
        }
    }

    /// Grows the limits so that `rotation` is admitted. Never shrinks them.
    pub fn dynamically_adjust_limits(&mut self, rotation: Quat) {
        match self {
            RotationConstraint::SwingTwist(c) => c.dynamically_adjust_limits(rotation),
            RotationConstraint::Hinge(c) => c.dynamically_adjust_limits(rotation),
        }
    }

    /// Forgets which boundary was hit last.
    pub fn clear_history(&mut self) {
        match self {
            RotationConstraint::SwingTwist(c) => c.clear_history(),
            RotationConstraint::Hinge(c) => c.clear_history(),
        }
    }

    /// Returns the swing-twist variant, if this is one.
    pub fn as_swing_twist(&self) -> Option<&SwingTwistConstraint> {
        match self {
            RotationConstraint::SwingTwist(c) => Some(c),
            RotationConstraint::Hinge(_) => None,
        }
    }

    /// Returns the hinge variant, if this is one.
    pub fn as_hinge(&self) -> Option<&HingeConstraint> {
        match self {
            RotationConstraint::Hinge(c) => Some(c),
            RotationConstraint::SwingTwist(_) => None,
        }
    }
}

impl From<SwingTwistConstraint> for RotationConstraint {
    fn from(c: SwingTwistConstraint) -> Self {
        RotationConstraint::SwingTwist(c)
    }
}

impl From<HingeConstraint> for RotationConstraint {
    fn from(c: HingeConstraint) -> Self {
        RotationConstraint::Hinge(c)
    }
}

/// Which boundary an angle was last clamped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum LastBoundary {
    #[default]
    None,
    Low,
    High,
}

/// A `[min, max]` angle range on a circle, clamped with hysteresis.
///
/// An angle in the forbidden arc goes to the nearer boundary, unless the
/// previous call already clamped to a boundary, in which case it stays there
/// until the angle comes back inside the range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleLimits {
    min: f32,
    max: f32,
    last: LastBoundary,
}

impl AngleLimits {
    /// Creates a range; the bounds are swapped if given out of order.
    pub fn new(min: f32, max: f32) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
            last: LastBoundary::None,
        }
    }

    /// Lower bound.
    pub fn min(&self) -> f32 {
        self.min
    }

    /// Upper bound.
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Midpoint of the range.
    pub fn center(&self) -> f32 {
        0.5 * (self.min + self.max)
    }

    /// Clamps `angle` and reports whether it was outside the range.
    pub fn clamp(&mut self, angle: f32) -> (f32, bool) {
        if angle >= self.min && angle <= self.max {
            self.last = LastBoundary::None;
            return (angle, false);
        }
        let boundary = match self.last {
            LastBoundary::None => {
                let past_max = (angle - self.max).rem_euclid(TAU);
                let before_min = (self.min - angle).rem_euclid(TAU);
                if past_max <= before_min {
                    LastBoundary::High
                } else {
                    LastBoundary::Low
                }
            }
            last => last,
        };
        self.last = boundary;
        match boundary {
            LastBoundary::Low => (self.min, true),
            _ => (self.max, true),
        }
    }

    /// Widens the range to contain `angle`.
    pub fn expand(&mut self, angle: f32) {
        if angle.is_finite() {
            self.min = self.min.min(angle);
            self.max = self.max.max(angle);
        }
    }

    /// Forgets the last clamped boundary.
    pub fn clear_history(&mut self) {
        self.last = LastBoundary::None;
    }
}

/// Constraints keyed by joint index.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    constraints: BTreeMap<usize, RotationConstraint>,
}

impl ConstraintSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs or replaces the constraint for `joint`.
    pub fn insert(&mut self, joint: usize, constraint: impl Into<RotationConstraint>) {
        self.constraints.insert(joint, constraint.into());
    }

    /// Returns the constraint for `joint`.
    pub fn get(&self, joint: usize) -> Option<&RotationConstraint> {
        self.constraints.get(&joint)
    }

    /// Returns the constraint for `joint` mutably.
    pub fn get_mut(&mut self, joint: usize) -> Option<&mut RotationConstraint> {
        self.constraints.get_mut(&joint)
    }

    /// Removes all constraints.
    pub fn clear(&mut self) {
        self.constraints.clear();
    }

    /// Returns the number of constrained joints.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Iterates `(joint, constraint)` pairs in joint order.
    pub fn iter(&self) -> btree_map::Iter<'_, usize, RotationConstraint> {
        self.constraints.iter()
    }

    /// Clamps `rotation` with the constraint of `joint`, if any.
    pub fn apply(&mut self, joint: usize, rotation: &mut Quat) -> bool {
        match self.constraints.get_mut(&joint) {
            Some(c) => c.apply(rotation),
            None => false,
        }
    }

    /// Whether `joint` carries a lower-spine constraint.
    pub fn is_lower_spine(&self, joint: usize) -> bool {
        self.get(joint).is_some_and(RotationConstraint::is_lower_spine)
    }

    /// Expands every constraint to admit the rotation `rotations` yields for its joint.
    pub fn dynamically_adjust_limits(&mut self, rotations: impl Fn(usize) -> Option<Quat>) {
        for (&joint, constraint) in self.constraints.iter_mut() {
            if let Some(rotation) = rotations(joint) {
                constraint.dynamically_adjust_limits(rotation);
            }
        }
    }

    /// Clears the hysteresis of every constraint.
    pub fn clear_history(&mut self) {
        for constraint in self.constraints.values_mut() {
            constraint.clear_history();
        }
    }
}
