//! Skeleton: a flat joint hierarchy with default (bind) poses.
//!
//! Joints are stored in an array with parent indices. A parent always comes
//! before its children, so a single forward pass composes absolute poses.

use crate::error::{IkError, IkResult};
use crate::transform::Transform;

/// A joint in a skeleton.
#[derive(Debug, Clone)]
pub struct Joint {
    /// Joint name, used to address targets and pick constraints.
    pub name: String,
    /// Parent joint index (None for a root).
    pub parent: Option<usize>,
    /// Default pose, relative to the parent.
    pub default_pose: Transform,
}

impl Joint {
    /// Creates a root joint at the identity pose.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            default_pose: Transform::IDENTITY,
        }
    }

    /// Sets the parent joint.
    pub fn with_parent(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets the default parent-relative pose.
    pub fn with_pose(mut self, pose: Transform) -> Self {
        self.default_pose = pose;
        self
    }
}

/// A read-only joint hierarchy.
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    joints: Vec<Joint>,
}

impl Skeleton {
    /// Creates an empty skeleton.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a joint and returns its index.
    ///
    /// # Errors
    ///
    /// Returns [`IkError::InvalidParent`] if the parent index does not precede
    /// the new joint.
    pub fn add_joint(&mut self, joint: Joint) -> IkResult<usize> {
        let index = self.joints.len();
        if let Some(parent) = joint.parent {
            if parent >= index {
                return Err(IkError::InvalidParent {
                    joint: index,
                    parent,
                });
            }
        }
        self.joints.push(joint);
        Ok(index)
    }

    /// Returns the number of joints.
    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    /// Returns all joints.
    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    /// Returns the parent of joint `index`, if any.
    pub fn parent(&self, index: usize) -> Option<usize> {
        self.joints.get(index).and_then(|j| j.parent)
    }

    /// Returns the name of joint `index`.
    pub fn joint_name(&self, index: usize) -> Option<&str> {
        self.joints.get(index).map(|j| j.name.as_str())
    }

    /// Finds a joint by name.
    pub fn find_joint(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    /// Default parent-relative poses, one per joint.
    pub fn relative_default_poses(&self) -> Vec<Transform> {
        self.joints.iter().map(|j| j.default_pose).collect()
    }

    /// Default absolute poses, one per joint.
    pub fn absolute_default_poses(&self) -> Vec<Transform> {
        let mut poses = self.relative_default_poses();
        self.relative_to_absolute(&mut poses);
        poses
    }

    /// Absolute pose of joint `index` given a full set of relative poses.
    ///
    /// Out-of-range indices (or a short pose list) yield the identity.
    pub fn absolute_pose(&self, index: usize, relative_poses: &[Transform]) -> Transform {
        let mut pose = match relative_poses.get(index) {
            Some(p) => *p,
            None => return Transform::IDENTITY,
        };
        let mut current = self.parent(index);
        while let Some(parent) = current {
            match relative_poses.get(parent) {
                Some(parent_pose) => pose = parent_pose.then(&pose),
                None => return Transform::IDENTITY,
            }
            current = self.parent(parent);
        }
        pose
    }

    /// Converts relative poses to absolute poses in place.
    pub fn relative_to_absolute(&self, poses: &mut [Transform]) {
        let count = poses.len().min(self.joints.len());
        for i in 0..count {
            if let Some(parent) = self.joints[i].parent {
                poses[i] = poses[parent].then(&poses[i]);
            }
        }
    }
}
