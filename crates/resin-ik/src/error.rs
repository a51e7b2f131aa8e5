//! Error types for resin-ik.
//!
//! Only setup calls are fallible. A per-frame solve always produces a pose.

use thiserror::Error;

/// Errors raised while building a skeleton or configuring the solver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IkError {
    /// A joint named a parent at or after its own index.
    #[error("joint {joint} has invalid parent {parent} (parents must precede children)")]
    InvalidParent {
        /// Index the joint would occupy.
        joint: usize,
        /// The rejected parent index.
        parent: usize,
    },

    /// A joint index outside the skeleton.
    #[error("joint index {index} out of range (skeleton has {count} joints)")]
    JointOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of joints in the skeleton.
        count: usize,
    },

    /// The operation needs a skeleton and none has been assigned.
    #[error("no skeleton assigned")]
    NoSkeleton,
}

/// Result alias for fallible setup calls.
pub type IkResult<T> = Result<T, IkError>;
