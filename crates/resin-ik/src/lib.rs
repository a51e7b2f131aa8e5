//! Constraint-aware inverse kinematics for resin skeletons.
//!
//! A cyclic-coordinate-descent solver that pulls named joints toward
//! per-frame targets while keeping every joint inside its rotation limits
//! (swing-twist cones and hinges), then nudges the hips to make up for limbs
//! that cannot reach.
//!
//! The entry point is [`InverseKinematics::overlay`], which takes the
//! animation's "under" poses and returns the solved parent-relative poses.

mod accumulator;
mod blend;
mod config;
mod constraint;
mod error;
mod hips;
mod ik;
mod math;
mod skeleton;
mod solver;
mod target;
mod transform;
mod vars;

pub use accumulator::RotationAccumulator;
pub use blend::{SolutionSource, blend_to_poses, limit_center_poses};
pub use config::IkConfig;
pub use constraint::{
    AngleLimits, ConstraintSet, HingeConstraint, RotationConstraint, SwingLimitFunction,
    SwingTwistConstraint, humanoid_constraints,
};
pub use error::{IkError, IkResult};
pub use hips::HipOffsetEstimator;
pub use ik::{HEAD_JOINT, HIPS_JOINT, InverseKinematics};
pub use math::{
    fraction_of, nlerp_shortest, perpendicular, signed_twist_angle, swing_twist_decomposition,
};
pub use skeleton::{Joint, Skeleton};
pub use solver::{CcdSolver, SolveInput, SolveStats};
pub use target::{
    FlexCoefficients, MAX_FLEX_COEFFICIENTS, Target, TargetResolver, TargetType, TargetVar,
};
pub use transform::Transform;
pub use vars::{AnimVar, AnimVarType, AnimVars, VarLookup};
