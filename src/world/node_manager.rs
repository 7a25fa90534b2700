//! Deferred synchronisation of node transforms, body mass and broad-phase proxies.
//!
//! Scene edits only queue work on nodes. [`PhysicsNodeManager::flush`] commits it in a fixed
//! order: transforms top-down, mass bottom-up, then one batched broad-phase call per partition
//! and operation, and finally frees whatever was removed.

use std::collections::HashSet;

use super::node::PhysicsNode;
use super::queue::{BroadPhaseOp, BroadPhaseState, MassAction, QueueAction, TransformAction};
use crate::collision::broadphase::{BroadPhase, BroadPhasePartition, ProxyInsert, ProxyUpdate};
use crate::config::MIN_MASS;
use crate::core::{
    collider::Collider,
    handles::{BodyHandle, ColliderHandle, NodeHandle},
    rigidbody::RigidBody,
    types::{MassProperties, Transform},
};
use crate::utils::allocator::Arena;

/// Everything a flush reads and writes.
pub struct FlushContext<'a> {
    pub nodes: &'a mut Arena<NodeHandle, PhysicsNode>,
    pub bodies: &'a mut Arena<BodyHandle, RigidBody>,
    pub colliders: &'a mut Arena<ColliderHandle, Collider>,
    pub broadphase: &'a mut dyn BroadPhase,
}

/// What one flush committed. Per-partition counters are indexed by
/// [`BroadPhasePartition::index`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Nodes whose transforms were committed, in commit order.
    pub order: Vec<NodeHandle>,
    pub transform_commits: usize,
    pub mass_commits: usize,
    pub inserted: [usize; 2],
    pub updated: [usize; 2],
    pub removed: [usize; 2],
    /// The static partition changed and `construct` ran.
    pub constructed: bool,
    pub freed_nodes: usize,
    pub freed_bodies: usize,
    pub freed_colliders: usize,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        *self == FlushReport::default()
    }

    /// Proxies touched across both partitions.
    pub fn proxy_operations(&self) -> usize {
        self.inserted
            .iter()
            .chain(&self.updated)
            .chain(&self.removed)
            .sum()
    }
}

/// Owns the list of queued nodes and the objects waiting to be freed.
#[derive(Debug, Default)]
pub struct PhysicsNodeManager {
    queued: Vec<NodeHandle>,
    doomed_nodes: Vec<NodeHandle>,
    doomed_bodies: Vec<BodyHandle>,
    doomed_colliders: Vec<ColliderHandle>,
}

impl PhysicsNodeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes with pending work, in the order they were first queued.
    pub fn queued(&self) -> &[NodeHandle] {
        &self.queued
    }

    pub fn has_pending_work(&self) -> bool {
        !self.queued.is_empty()
            || !self.doomed_nodes.is_empty()
            || !self.doomed_bodies.is_empty()
            || !self.doomed_colliders.is_empty()
    }

    /// Folds `action` into the node's queue. Returns `false` for a stale handle.
    pub fn queue(
        &mut self,
        nodes: &mut Arena<NodeHandle, PhysicsNode>,
        node: NodeHandle,
        action: QueueAction,
    ) -> bool {
        let Some(entry) = nodes.get_mut(node) else {
            return false;
        };
        entry.queue.push(action);
        if !entry.queued {
            entry.queued = true;
            self.queued.push(node);
        }
        true
    }

    /// Queues everything the node needs to be fully resynchronised.
    pub fn queue_self(
        &mut self,
        nodes: &mut Arena<NodeHandle, PhysicsNode>,
        colliders: &Arena<ColliderHandle, Collider>,
        node: NodeHandle,
    ) -> bool {
        let Some(entry) = nodes.get(node) else {
            return false;
        };
        let has_body = entry.body.is_some();
        let proxy = entry
            .collider
            .and_then(|c| colliders.get(c))
            .map(|c| (c.membership(), c.desired_partition()));

        self.queue(nodes, node, QueueAction::Transform(TransformAction::FULL));
        if has_body {
            self.queue(nodes, node, QueueAction::Mass(MassAction::RECOMPUTE));
        }
        match proxy {
            Some((Some(current), desired)) if current == desired => {
                self.queue(nodes, node, QueueAction::BroadPhase(desired, BroadPhaseOp::Update));
            }
            Some((current, desired)) => {
                if let Some(current) = current {
                    self.queue(nodes, node, QueueAction::BroadPhase(current, BroadPhaseOp::Remove));
                }
                self.queue(nodes, node, QueueAction::BroadPhase(desired, BroadPhaseOp::Insert));
            }
            None => {}
        }
        true
    }

    pub(crate) fn defer_free_node(&mut self, node: NodeHandle) {
        self.doomed_nodes.push(node);
    }

    pub(crate) fn defer_free_body(&mut self, body: BodyHandle) {
        self.doomed_bodies.push(body);
    }

    pub(crate) fn defer_free_collider(&mut self, collider: ColliderHandle) {
        self.doomed_colliders.push(collider);
    }

    /// Commits all queued work.
    pub fn flush(&mut self, ctx: &mut FlushContext<'_>) -> FlushReport {
        let mut report = FlushReport::default();
        if !self.has_pending_work() {
            return report;
        }

        let mut seeds = std::mem::take(&mut self.queued);
        let order = ordered(ctx.nodes, &seeds);
        for &handle in &order {
            if self.commit_transform(ctx, handle) {
                report.transform_commits += 1;
            }
        }
        report.order = order;

        // Propagation queued descendants and mass owners that were not queued before.
        seeds.append(&mut self.queued);
        let touched = ordered(ctx.nodes, &seeds);
        for &handle in touched.iter().rev() {
            if commit_mass(ctx, handle) {
                report.mass_commits += 1;
            }
        }

        commit_broadphase(ctx, &touched, &mut report);
        self.free_pending(ctx, &mut report);
        log::trace!(
            "flush: {} transforms, {} masses, {} proxy operations",
            report.transform_commits,
            report.mass_commits,
            report.proxy_operations()
        );
        report
    }

    fn commit_transform(&mut self, ctx: &mut FlushContext<'_>, handle: NodeHandle) -> bool {
        let (action, parent) = match ctx.nodes.get_mut(handle) {
            Some(node) if !node.pending_delete => {
                (std::mem::take(&mut node.queue.transform), node.parent)
            }
            _ => return false,
        };
        if action.is_empty() {
            return false;
        }
        let parent_world = world_of(ctx.nodes, parent);
        let Some(node) = ctx.nodes.get_mut(handle) else {
            return false;
        };

        let full = action.contains(TransformAction::FULL);
        if full {
            node.world = parent_world.combine(&node.local);
        } else {
            // The body already wrote the world transform.
            node.local = node.world.relative_to(&parent_world);
        }
        self.place(ctx, handle, full, full);
        self.propagate(ctx, handle, full);
        true
    }

    /// Pushes a committed world transform into the node's body and collider.
    fn place(&mut self, ctx: &mut FlushContext<'_>, handle: NodeHandle, move_body: bool, mass_dirty: bool) {
        let Some(node) = ctx.nodes.get(handle) else {
            return;
        };
        let (world, body, collider) = (node.world, node.body, node.collider);

        if move_body {
            if let Some(body) = body.and_then(|b| ctx.bodies.get_mut(b)) {
                body.set_pose(&world);
                if body.is_dynamic() {
                    body.wake_up();
                }
            }
        }

        let Some(collider) = collider.and_then(|c| ctx.colliders.get_mut(c)) else {
            return;
        };
        collider.update_world(&world);
        let membership = collider.membership();
        let owner = collider.body().filter(|&owner| Some(owner) != body);
        if let Some(partition) = membership {
            self.queue(ctx.nodes, handle, QueueAction::BroadPhase(partition, BroadPhaseOp::Update));
        }
        if mass_dirty {
            if let Some(owner_node) = owner.and_then(|b| ctx.bodies.get(b)).and_then(RigidBody::node) {
                self.queue(ctx.nodes, owner_node, QueueAction::Mass(MassAction::RECOMPUTE));
            }
        }
    }

    /// Carries a node's new world transform down its subtree. Dynamic descendants keep their
    /// world pose and have their local transform recomputed instead.
    fn propagate(&mut self, ctx: &mut FlushContext<'_>, root: NodeHandle, mass_dirty: bool) {
        let mut stack: Vec<NodeHandle> = match ctx.nodes.get(root) {
            Some(node) => node.children.iter().rev().copied().collect(),
            None => return,
        };
        while let Some(child) = stack.pop() {
            let Some(node) = ctx.nodes.get(child) else {
                continue;
            };
            let parent_world = world_of(ctx.nodes, node.parent);
            let dynamic = node
                .body
                .and_then(|b| ctx.bodies.get(b))
                .is_some_and(RigidBody::is_dynamic);
            let Some(node) = ctx.nodes.get_mut(child) else {
                continue;
            };
            if node.pending_delete {
                continue;
            }
            if dynamic {
                node.local = node.world.relative_to(&parent_world);
                continue;
            }
            node.world = parent_world.combine(&node.local);
            stack.extend(node.children.iter().rev().copied());
            self.place(ctx, child, true, mass_dirty);
        }
    }

    fn free_pending(&mut self, ctx: &mut FlushContext<'_>, report: &mut FlushReport) {
        for handle in std::mem::take(&mut self.doomed_colliders) {
            let Some(collider) = ctx.colliders.remove(handle) else {
                continue;
            };
            if let Some(partition) = collider.membership() {
                log::warn!("collider {handle:?} freed while still in the {partition:?} partition");
                ctx.broadphase.remove_proxies(partition, &[handle]);
            }
            if let Some(node) = collider.node().and_then(|n| ctx.nodes.get_mut(n)) {
                if node.collider == Some(handle) {
                    node.collider = None;
                }
            }
            report.freed_colliders += 1;
        }
        for handle in std::mem::take(&mut self.doomed_bodies) {
            if ctx.bodies.remove(handle).is_some() {
                report.freed_bodies += 1;
            }
        }
        for handle in std::mem::take(&mut self.doomed_nodes) {
            if ctx.nodes.remove(handle).is_some() {
                report.freed_nodes += 1;
            }
        }
    }
}

fn world_of(nodes: &Arena<NodeHandle, PhysicsNode>, node: Option<NodeHandle>) -> Transform {
    node.and_then(|n| nodes.get(n))
        .map_or(Transform::IDENTITY, |n| n.world)
}

/// Queued nodes with every queued ancestor ahead of its descendants. Each node is visited at
/// most once; unqueued ancestors are walked through but not emitted.
fn ordered(nodes: &Arena<NodeHandle, PhysicsNode>, seeds: &[NodeHandle]) -> Vec<NodeHandle> {
    let mut visited = HashSet::with_capacity(seeds.len());
    let mut order = Vec::with_capacity(seeds.len());
    let mut chain = Vec::new();
    for &seed in seeds {
        chain.clear();
        let mut current = Some(seed);
        while let Some(handle) = current {
            if !visited.insert(handle) {
                break;
            }
            chain.push(handle);
            current = nodes.get(handle).and_then(|n| n.parent);
        }
        order.extend(
            chain
                .iter()
                .rev()
                .copied()
                .filter(|&h| nodes.get(h).is_some_and(|n| n.queued)),
        );
    }
    order
}

/// Re-sums a body's mass from its colliders, expressed about the body origin.
fn commit_mass(ctx: &mut FlushContext<'_>, handle: NodeHandle) -> bool {
    let Some(node) = ctx.nodes.get_mut(handle) else {
        return false;
    };
    let action = std::mem::take(&mut node.queue.mass);
    if !action.contains(MassAction::RECOMPUTE) {
        return false;
    }
    let Some(body_handle) = node.body else {
        return false;
    };
    let Some(body) = ctx.bodies.get(body_handle) else {
        return false;
    };

    let pose = body.pose();
    let mut total = MassProperties::ZERO;
    for collider in body.colliders().iter().filter_map(|&c| ctx.colliders.get(c)) {
        if collider.is_pending_delete() {
            continue;
        }
        let offset = collider.world_transform().relative_to(&pose);
        total.accumulate(
            &collider
                .shape
                .mass_properties(collider.material.density)
                .transformed(&offset),
        );
    }

    let has_volume = total.mass >= MIN_MASS;
    let props = match (body.mass_override, has_volume) {
        (Some(mass), true) => total.scaled(mass / total.mass),
        (Some(mass), false) => MassProperties::default().scaled(mass),
        (None, true) => total,
        (None, false) => MassProperties::default(),
    };
    if let Some(body) = ctx.bodies.get_mut(body_handle) {
        body.set_mass_properties(props);
    }
    true
}

fn commit_broadphase(ctx: &mut FlushContext<'_>, touched: &[NodeHandle], report: &mut FlushReport) {
    let mut inserts: [Vec<ProxyInsert>; 2] = Default::default();
    let mut updates: [Vec<ProxyUpdate>; 2] = Default::default();
    let mut removes: [Vec<ColliderHandle>; 2] = Default::default();

    for &handle in touched {
        let Some(node) = ctx.nodes.get_mut(handle) else {
            continue;
        };
        let queue = node.queue.take();
        node.queued = false;
        let Some(collider_handle) = node.collider else {
            continue;
        };
        let Some(collider) = ctx.colliders.get_mut(collider_handle) else {
            continue;
        };

        for partition in BroadPhasePartition::ALL {
            let index = partition.index();
            match queue.broadphase.state(partition) {
                BroadPhaseState::Empty => {}
                BroadPhaseState::Removed => {
                    if collider.membership == Some(partition) {
                        removes[index].push(collider_handle);
                        collider.membership = None;
                    }
                }
                BroadPhaseState::Inserted => {
                    if collider.pending_delete {
                        continue;
                    }
                    if let Some(previous) = collider.membership.filter(|&m| m != partition) {
                        removes[previous.index()].push(collider_handle);
                    }
                    inserts[index].push(ProxyInsert {
                        collider: collider_handle,
                        aabb: collider.aabb,
                    });
                    collider.membership = Some(partition);
                }
                BroadPhaseState::Updated => {
                    if collider.membership == Some(partition) && !collider.pending_delete {
                        updates[index].push(ProxyUpdate {
                            collider: collider_handle,
                            aabb: collider.aabb,
                        });
                    }
                }
            }
        }
    }

    let mut static_changed = false;
    for partition in BroadPhasePartition::ALL {
        let index = partition.index();
        if !removes[index].is_empty() {
            ctx.broadphase.remove_proxies(partition, &removes[index]);
        }
        if !inserts[index].is_empty() {
            ctx.broadphase.create_proxies(partition, &inserts[index]);
        }
        if !updates[index].is_empty() {
            ctx.broadphase.update_proxies(partition, &updates[index]);
        }
        report.removed[index] = removes[index].len();
        report.inserted[index] = inserts[index].len();
        report.updated[index] = updates[index].len();
        if partition == BroadPhasePartition::Static {
            static_changed =
                !(removes[index].is_empty() && inserts[index].is_empty() && updates[index].is_empty());
        }
    }
    if static_changed {
        ctx.broadphase.construct();
        report.constructed = true;
    }
}
