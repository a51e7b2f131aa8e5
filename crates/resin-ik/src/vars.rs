//! Named animation variables consumed by the solver.
//!
//! Target positions, rotations, weights and types are read each frame from a
//! [`VarLookup`]. Lookups never fail: a missing key, an empty key or a value of
//! the wrong type all yield the caller's default.

use crate::transform::Transform;
use glam::{Quat, Vec3};
use std::collections::HashMap;
use std::fmt;

/// A dynamically typed animation variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnimVar {
    /// Boolean.
    Bool(bool),
    /// 32-bit signed integer (also used for enums).
    Int(i32),
    /// 32-bit float.
    Float(f32),
    /// 3D vector.
    Vec3(Vec3),
    /// Rotation.
    Quat(Quat),
}

/// Type tag for [`AnimVar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnimVarType {
    /// Boolean.
    Bool,
    /// Integer.
    Int,
    /// Float.
    Float,
    /// 3D vector.
    Vec3,
    /// Rotation.
    Quat,
}

impl AnimVar {
    /// Returns the type of this variable.
    pub fn var_type(&self) -> AnimVarType {
        match self {
            AnimVar::Bool(_) => AnimVarType::Bool,
            AnimVar::Int(_) => AnimVarType::Int,
            AnimVar::Float(_) => AnimVarType::Float,
            AnimVar::Vec3(_) => AnimVarType::Vec3,
            AnimVar::Quat(_) => AnimVarType::Quat,
        }
    }
}

impl fmt::Display for AnimVarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnimVarType::Bool => write!(f, "bool"),
            AnimVarType::Int => write!(f, "int"),
            AnimVarType::Float => write!(f, "float"),
            AnimVarType::Vec3 => write!(f, "vec3"),
            AnimVarType::Quat => write!(f, "quat"),
        }
    }
}

impl From<bool> for AnimVar {
    fn from(v: bool) -> Self {
        AnimVar::Bool(v)
    }
}

impl From<i32> for AnimVar {
    fn from(v: i32) -> Self {
        AnimVar::Int(v)
    }
}

impl From<f32> for AnimVar {
    fn from(v: f32) -> Self {
        AnimVar::Float(v)
    }
}

impl From<Vec3> for AnimVar {
    fn from(v: Vec3) -> Self {
        AnimVar::Vec3(v)
    }
}

impl From<Quat> for AnimVar {
    fn from(v: Quat) -> Self {
        AnimVar::Quat(v)
    }
}

/// Typed get-with-default access to named variables.
pub trait VarLookup {
    /// Returns the raw variable for `key`.
    fn get(&self, key: &str) -> Option<AnimVar>;

    /// Transform from the rig frame (where variables are authored) to the
    /// geometry frame (where the skeleton lives).
    fn rig_to_geometry(&self) -> Transform {
        Transform::IDENTITY
    }

    /// Looks up a float.
    fn lookup_f32(&self, key: &str, default: f32) -> f32 {
        match self.get(key) {
            Some(AnimVar::Float(v)) => v,
            Some(AnimVar::Int(v)) => v as f32,
            _ => default,
        }
    }

    /// Looks up an integer (or enum discriminant).
    fn lookup_i32(&self, key: &str, default: i32) -> i32 {
        match self.get(key) {
            Some(AnimVar::Int(v)) => v,
            _ => default,
        }
    }

    /// Looks up a vector.
    fn lookup_vec3(&self, key: &str, default: Vec3) -> Vec3 {
        match self.get(key) {
            Some(AnimVar::Vec3(v)) => v,
            _ => default,
        }
    }

    /// Looks up a rotation.
    fn lookup_quat(&self, key: &str, default: Quat) -> Quat {
        match self.get(key) {
            Some(AnimVar::Quat(v)) => v,
            _ => default,
        }
    }

    /// Looks up a rig-frame point and converts it to the geometry frame.
    ///
    /// The default is already in the geometry frame and is returned untouched.
    fn lookup_rig_to_geometry_vec3(&self, key: &str, default: Vec3) -> Vec3 {
        match self.get(key) {
            Some(AnimVar::Vec3(v)) => self.rig_to_geometry().transform_point(v),
            _ => default,
        }
    }

    /// Looks up a rig-frame rotation and converts it to the geometry frame.
    fn lookup_rig_to_geometry_quat(&self, key: &str, default: Quat) -> Quat {
        match self.get(key) {
            Some(AnimVar::Quat(v)) => (self.rig_to_geometry().rotation * v).normalize(),
            _ => default,
        }
    }
}

/// A simple in-memory variable map.
#[derive(Debug, Clone, Default)]
pub struct AnimVars {
    vars: HashMap<String, AnimVar>,
    rig_to_geometry: Transform,
}

impl AnimVars {
    /// Creates an empty map with an identity rig-to-geometry transform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rig-to-geometry transform.
    pub fn with_rig_to_geometry(mut self, transform: Transform) -> Self {
        self.rig_to_geometry = transform;
        self
    }

    /// Sets a variable, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AnimVar>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Removes a variable.
    pub fn unset(&mut self, key: &str) {
        self.vars.remove(key);
    }

    /// Returns true if `key` is set.
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }
}

impl VarLookup for AnimVars {
    fn get(&self, key: &str) -> Option<AnimVar> {
        if key.is_empty() {
            return None;
        }
        self.vars.get(key).copied()
    }

    fn rig_to_geometry(&self) -> Transform {
        self.rig_to_geometry
    }
}
