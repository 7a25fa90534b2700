//! Scene-graph node: a transform plus at most one body and one collider.

use super::queue::PhysicsQueue;
use crate::core::{
    handles::{BodyHandle, ColliderHandle, NodeHandle},
    types::Transform,
};

/// One node of the physics hierarchy.
///
/// `local` is relative to the parent node, `world` is the committed world transform. Both are
/// kept in sync by the node manager's flush.
#[derive(Debug, Clone, Default)]
pub struct PhysicsNode {
    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,
    pub(crate) local: Transform,
    pub(crate) world: Transform,
    pub(crate) body: Option<BodyHandle>,
    pub(crate) collider: Option<ColliderHandle>,
    pub(crate) queue: PhysicsQueue,
    pub(crate) queued: bool,
    pub(crate) pending_delete: bool,
}

impl PhysicsNode {
    pub fn new(local: Transform) -> Self {
        Self {
            local,
            world: local,
            ..Self::default()
        }
    }

    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    pub fn local_transform(&self) -> &Transform {
        &self.local
    }

    pub fn world_transform(&self) -> &Transform {
        &self.world
    }

    pub fn body(&self) -> Option<BodyHandle> {
        self.body
    }

    pub fn collider(&self) -> Option<ColliderHandle> {
        self.collider
    }

    /// Work queued on this node since the last flush.
    pub fn pending(&self) -> &PhysicsQueue {
        &self.queue
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }

    pub fn is_pending_delete(&self) -> bool {
        self.pending_delete
    }

    pub(crate) fn remove_child(&mut self, child: NodeHandle) {
        self.children.retain(|&c| c != child);
    }
}
