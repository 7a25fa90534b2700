//! Error types for the physics core

use thiserror::Error;

use crate::collision::filter::GroupId;
use crate::core::handles::{BodyHandle, ColliderHandle, JointHandle, NodeHandle};

/// Errors surfaced by world and table mutation APIs. Nothing inside a step fails.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    /// Node handle is stale or was never issued
    #[error("Physics node not found: {0:?}")]
    NodeNotFound(NodeHandle),

    /// Rigid body not found
    #[error("Rigid body not found: {0:?}")]
    BodyNotFound(BodyHandle),

    /// Collider not found
    #[error("Collider not found: {0:?}")]
    ColliderNotFound(ColliderHandle),

    /// Joint not found
    #[error("Joint not found: {0:?}")]
    JointNotFound(JointHandle),

    /// Node already owns a component of this kind
    #[error("Node {node:?} already has a {component}")]
    NodeOccupied {
        node: NodeHandle,
        component: &'static str,
    },

    /// Re-parenting would make a node its own ancestor
    #[error("Parenting {child:?} under {parent:?} would create a cycle")]
    HierarchyCycle { child: NodeHandle, parent: NodeHandle },

    /// The collision table ran out of group bits
    #[error("Collision table is limited to {max} groups")]
    GroupLimitReached { max: usize },

    /// Group id was never registered with the collision table
    #[error("Unknown collision group: {0:?}")]
    UnknownGroup(GroupId),

    /// Filter block index out of range
    #[error("Filter for {a:?}/{b:?} has no block at {index}")]
    BlockNotFound { a: GroupId, b: GroupId, index: usize },
}

/// Result type for physics operations
pub type Result<T> = std::result::Result<T, PhysicsError>;
