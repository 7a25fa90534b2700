//! The physics space: owns every arena and runs the per-step pipeline.
//!
//! Scene edits (nodes, bodies, colliders, joints) are applied immediately to the arenas but
//! only reach the broad-phase and the mass properties through the node queues, which are
//! flushed at the start and end of every sub-step.

pub mod collision_manager;
pub mod dynamics_manager;
pub mod events;
pub mod node;
pub mod node_manager;
pub mod queue;

use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use parking_lot::RwLock;

pub use collision_manager::{CollisionContext, CollisionManager, CollisionStepStats};
pub use dynamics_manager::{DynamicsContext, DynamicsManager, DynamicsStepReport};
pub use events::{CollisionEvent, EventQueue, EventRecipient, PhysicsEvent};
pub use node::PhysicsNode;
pub use node_manager::{FlushContext, FlushReport, PhysicsNodeManager};
pub use queue::{
    BroadPhaseAction, BroadPhaseOp, BroadPhaseState, MassAction, PhysicsQueue, QueueAction, TransformAction,
};

use crate::{
    collision::{
        broadphase::{BroadPhase, GridBroadPhase},
        ccd::{CcdDetector, TimeOfImpact},
        contact::Contact,
        filter::CollisionTable,
        primitives::{BoundingSphere, CastHit, CastShape, Frustum, Ray, Segment},
        shapes::ShapeInstance,
    },
    config::{PhysicsConfig, MAX_SUB_STEPS},
    core::{
        collider::Collider,
        handles::{BodyHandle, ColliderHandle, ContactHandle, JointHandle, NodeHandle},
        mesh::Aabb,
        rigidbody::{top_level_body, BodyMode, RigidBody},
        types::Transform,
    },
    dynamics::{forces::ForceRegistry, island::Island, joints::Joint, solver::ConstraintSolver},
    error::{PhysicsError, Result},
    utils::{
        allocator::Arena,
        logging::ScopedTimer,
        profiling::{PhysicsProfiler, ScopedTimer as StageTimer},
    },
};

/// One collider hit by a scene query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CastResult {
    pub collider: ColliderHandle,
    pub hit: CastHit,
}

/// One collider met by a swept collider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepResult {
    pub collider: ColliderHandle,
    /// Seconds into the sweep at first contact.
    pub time: f32,
    pub point: Vec3,
    /// Unit normal from the hit collider towards the swept one.
    pub normal: Vec3,
    pub penetration: f32,
}

/// Central simulation container orchestrating all subsystems.
pub struct PhysicsWorld {
    config: PhysicsConfig,
    nodes: Arena<NodeHandle, PhysicsNode>,
    bodies: Arena<BodyHandle, RigidBody>,
    colliders: Arena<ColliderHandle, Collider>,
    contacts: Arena<ContactHandle, Contact>,
    joints: Arena<JointHandle, Joint>,
    node_manager: PhysicsNodeManager,
    broadphase: Box<dyn BroadPhase>,
    collision: CollisionManager,
    ccd: CcdDetector,
    dynamics: DynamicsManager,
    events: EventQueue,
    profiler: PhysicsProfiler,
    last_flush: FlushReport,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

impl PhysicsWorld {
    pub fn new(config: PhysicsConfig) -> Self {
        let broadphase = Box::new(GridBroadPhase::new(config.broadphase_cell_size));
        Self::with_broadphase(config, broadphase)
    }

    /// Builds a world around a caller-supplied broad-phase.
    pub fn with_broadphase(mut config: PhysicsConfig, broadphase: Box<dyn BroadPhase>) -> Self {
        let sub_steps = config.sub_steps;
        config.set_sub_steps(sub_steps);
        Self {
            dynamics: DynamicsManager::new(&config),
            ccd: CcdDetector {
                enabled: config.ccd_enabled,
                ..CcdDetector::new()
            },
            config,
            nodes: Arena::new(),
            bodies: Arena::new(),
            colliders: Arena::new(),
            contacts: Arena::new(),
            joints: Arena::new(),
            node_manager: PhysicsNodeManager::new(),
            broadphase,
            collision: CollisionManager::new(),
            events: EventQueue::new(),
            profiler: PhysicsProfiler::default(),
            last_flush: FlushReport::default(),
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.config.gravity = gravity;
        self.dynamics.forces.set_gravity(gravity);
    }

    pub fn set_sub_steps(&mut self, sub_steps: u32) {
        self.config.set_sub_steps(sub_steps);
    }

    pub fn set_sleep_enabled(&mut self, allow_sleep: bool) {
        self.config.allow_sleep = allow_sleep;
        if !allow_sleep {
            for (_, body) in self.bodies.iter_mut() {
                body.wake_up();
            }
        }
    }

    pub fn set_ccd_enabled(&mut self, enabled: bool) {
        self.config.ccd_enabled = enabled;
        self.ccd.enabled = enabled;
    }

    pub fn set_solver(&mut self, solver: Box<dyn ConstraintSolver>) {
        self.dynamics.set_solver(solver);
    }

    pub fn forces(&self) -> &ForceRegistry {
        &self.dynamics.forces
    }

    pub fn forces_mut(&mut self) -> &mut ForceRegistry {
        &mut self.dynamics.forces
    }

    pub fn profiler(&self) -> &PhysicsProfiler {
        &self.profiler
    }

    /// What the most recent flush committed.
    pub fn last_flush(&self) -> &FlushReport {
        &self.last_flush
    }

    /// Islands solved in the last sub-step.
    pub fn islands(&self) -> &[Island] {
        self.dynamics.islands.islands()
    }

    // ----- nodes -----

    /// Creates a node under `parent` (or at the root) with the given local transform.
    pub fn create_node(&mut self, parent: Option<NodeHandle>, local: Transform) -> Result<NodeHandle> {
        let parent_world = match parent {
            Some(parent) => self.live_node(parent)?.world,
            None => Transform::IDENTITY,
        };
        let mut node = PhysicsNode::new(local);
        node.parent = parent;
        node.world = parent_world.combine(&local);
        let handle = self.nodes.insert(node);
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.push(handle);
        }
        Ok(handle)
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&PhysicsNode> {
        self.nodes.get(handle).filter(|n| !n.pending_delete)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeHandle, &PhysicsNode)> + '_ {
        self.nodes.iter().filter(|(_, n)| !n.pending_delete)
    }

    /// Replaces the node's local transform; the world transform follows at the next flush.
    pub fn set_local_transform(&mut self, node: NodeHandle, local: Transform) -> Result<()> {
        self.live_node_mut(node)?.local = local;
        self.queue(node, QueueAction::Transform(TransformAction::FULL))
    }

    /// Moves `child` under `parent` (or to the root), keeping its local transform.
    pub fn set_parent(&mut self, child: NodeHandle, parent: Option<NodeHandle>) -> Result<()> {
        let old_parent = self.live_node(child)?.parent;
        if let Some(parent) = parent {
            self.live_node(parent)?;
            if self.is_ancestor_or_self(child, parent) {
                return Err(PhysicsError::HierarchyCycle { child, parent });
            }
        }
        if old_parent == parent {
            return Ok(());
        }

        if let Some(old) = old_parent.and_then(|p| self.nodes.get_mut(p)) {
            old.remove_child(child);
        }
        if let Some(new) = parent.and_then(|p| self.nodes.get_mut(p)) {
            new.children.push(child);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = parent;
        }
        self.rebind_subtree(child);
        self.queue(child, QueueAction::Transform(TransformAction::FULL))
    }

    /// Removes the node, its descendants and every body and collider they own.
    ///
    /// The nodes are detached at once and freed at the next flush.
    pub fn remove_node(&mut self, handle: NodeHandle) -> Result<()> {
        let parent = self.live_node(handle)?.parent;
        let subtree = self.subtree(handle);

        for &node in subtree.iter().rev() {
            let Some((body, collider)) = self.nodes.get(node).map(|n| (n.body, n.collider)) else {
                continue;
            };
            if let Some(collider) = collider.filter(|&c| self.is_live_collider(c)) {
                self.remove_collider(collider)?;
            }
            if let Some(body) = body {
                self.remove_body(body)?;
            }
        }
        for &node in &subtree {
            if let Some(entry) = self.nodes.get_mut(node) {
                entry.pending_delete = true;
            }
            self.node_manager.defer_free_node(node);
        }
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.remove_child(handle);
        }
        if let Some(node) = self.nodes.get_mut(handle) {
            node.parent = None;
        }
        Ok(())
    }

    /// Folds an action into the node's queue.
    pub fn queue(&mut self, node: NodeHandle, action: QueueAction) -> Result<()> {
        self.live_node(node)?;
        self.node_manager.queue(&mut self.nodes, node, action);
        Ok(())
    }

    /// Queues a full resynchronisation of the node.
    pub fn queue_self(&mut self, node: NodeHandle) -> Result<()> {
        self.live_node(node)?;
        self.node_manager
            .queue_self(&mut self.nodes, &self.colliders, node);
        Ok(())
    }

    // ----- bodies -----

    /// Attaches `body` to `node`. World defaults (2D mode, damping, speed limit) are applied.
    pub fn add_body(&mut self, node: NodeHandle, mut body: RigidBody) -> Result<BodyHandle> {
        let entry = self.live_node(node)?;
        if entry.body.is_some() {
            return Err(PhysicsError::NodeOccupied {
                node,
                component: "body",
            });
        }
        let world = entry.world;

        body.node = Some(node);
        body.parent = None;
        body.colliders.clear();
        body.set_pose(&world);
        body.max_velocity = self.config.max_velocity;
        body.mode_2d |= self.config.mode_2d;
        if body.linear_damping == 0.0 {
            body.linear_damping = self.config.linear_damping;
        }
        if body.angular_damping == 0.0 {
            body.angular_damping = self.config.angular_damping;
        }
        if body.is_kinematic() {
            body.kinematic_previous = Some(world);
        }

        let handle = self.bodies.insert(body);
        if let Some(entry) = self.nodes.get_mut(node) {
            entry.body = Some(handle);
        }
        self.rebind_subtree(node);
        self.node_manager
            .queue(&mut self.nodes, node, QueueAction::Transform(TransformAction::FULL));
        self.node_manager
            .queue(&mut self.nodes, node, QueueAction::Mass(MassAction::RECOMPUTE));
        log::trace!("body {handle:?} added to node {node:?}");
        Ok(handle)
    }

    /// Detaches the body from its node. Its colliders fall back to the nearest body above, or
    /// become static.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<()> {
        let node = self
            .bodies
            .get(handle)
            .and_then(|b| b.node)
            .ok_or(PhysicsError::BodyNotFound(handle))?;
        if let Some(entry) = self.nodes.get_mut(node) {
            entry.body = None;
        }
        if let Some(body) = self.bodies.get_mut(handle) {
            body.node = None;
        }
        self.rebind_subtree(node);
        self.node_manager.defer_free_body(handle);
        Ok(())
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle).filter(|b| b.node.is_some())
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle).filter(|b| b.node.is_some())
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> + '_ {
        self.bodies.iter().filter(|(_, b)| b.node.is_some())
    }

    pub fn set_body_mode(&mut self, handle: BodyHandle, mode: BodyMode) -> Result<()> {
        let body = self
            .body_mut(handle)
            .ok_or(PhysicsError::BodyNotFound(handle))?;
        body.set_mode(mode);
        let node = body.node;
        let pose = body.pose();
        if mode == BodyMode::Kinematic {
            body.kinematic_previous = Some(pose);
        }
        if let Some(node) = node {
            self.node_manager
                .queue(&mut self.nodes, node, QueueAction::Mass(MassAction::RECOMPUTE));
        }
        Ok(())
    }

    pub fn wake_body(&mut self, handle: BodyHandle) -> Result<()> {
        self.body_mut(handle)
            .ok_or(PhysicsError::BodyNotFound(handle))?
            .wake_up();
        Ok(())
    }

    // ----- colliders -----

    /// Attaches `collider` to `node`; it belongs to the nearest body at or above the node.
    pub fn add_collider(&mut self, node: NodeHandle, mut collider: Collider) -> Result<ColliderHandle> {
        let entry = self.live_node(node)?;
        if entry.collider.is_some() {
            return Err(PhysicsError::NodeOccupied {
                node,
                component: "collider",
            });
        }
        let world = entry.world;

        collider.node = Some(node);
        collider.body = None;
        collider.membership = None;
        collider.contacts.clear();
        collider.joints.clear();
        collider.pending_delete = false;
        collider.update_world(&world);

        let handle = self.colliders.insert(collider);
        if let Some(entry) = self.nodes.get_mut(node) {
            entry.collider = Some(handle);
        }
        let body = self.body_at_or_above(node);
        self.bind_collider(handle, body);
        Ok(handle)
    }

    /// Removes the collider: its contacts end now, its joints turn invalid, its proxy leaves
    /// the broad-phase at the next flush.
    pub fn remove_collider(&mut self, handle: ColliderHandle) -> Result<()> {
        if !self.is_live_collider(handle) {
            return Err(PhysicsError::ColliderNotFound(handle));
        }
        self.collision.destroy_contacts_of(
            handle,
            &mut self.colliders,
            &mut self.contacts,
            &mut self.events,
        );

        let Some(collider) = self.colliders.get_mut(handle) else {
            return Err(PhysicsError::ColliderNotFound(handle));
        };
        collider.pending_delete = true;
        let node = collider.node;
        let body = collider.body.take();
        let membership = collider.membership;
        let joints = std::mem::take(&mut collider.joints);

        for joint in joints {
            if let Some(joint) = self.joints.get_mut(joint) {
                joint.valid = false;
            }
        }
        if let Some(body) = body.and_then(|b| self.bodies.get_mut(b)) {
            body.colliders.retain(|&c| c != handle);
            if let Some(owner) = body.node {
                self.node_manager
                    .queue(&mut self.nodes, owner, QueueAction::Mass(MassAction::RECOMPUTE));
            }
        }
        if let (Some(node), Some(partition)) = (node, membership) {
            self.node_manager.queue(
                &mut self.nodes,
                node,
                QueueAction::BroadPhase(partition, BroadPhaseOp::Remove),
            );
        }
        self.node_manager.defer_free_collider(handle);
        Ok(())
    }

    pub fn collider(&self, handle: ColliderHandle) -> Option<&Collider> {
        self.colliders.get(handle).filter(|c| !c.pending_delete)
    }

    pub fn colliders(&self) -> impl Iterator<Item = (ColliderHandle, &Collider)> + '_ {
        self.colliders.iter().filter(|(_, c)| !c.pending_delete)
    }

    /// Ignores collisions between two specific colliders until the filter is removed.
    pub fn add_pair_filter(&mut self, a: ColliderHandle, b: ColliderHandle) -> Result<bool> {
        for handle in [a, b] {
            if !self.is_live_collider(handle) {
                return Err(PhysicsError::ColliderNotFound(handle));
            }
        }
        Ok(self.collision.add_pair_filter(a, b))
    }

    pub fn remove_pair_filter(&mut self, a: ColliderHandle, b: ColliderHandle) -> bool {
        self.collision.remove_pair_filter(a, b)
    }

    /// Shared handle to the group table; edits apply from the next step.
    pub fn collision_table(&self) -> Arc<RwLock<CollisionTable>> {
        self.collision.table()
    }

    // ----- contacts -----

    pub fn contact(&self, handle: ContactHandle) -> Option<&Contact> {
        self.contacts.get(handle)
    }

    pub fn contacts(&self) -> impl Iterator<Item = (ContactHandle, &Contact)> + '_ {
        self.contacts.iter()
    }

    pub fn contact_between(&self, a: ColliderHandle, b: ColliderHandle) -> Option<&Contact> {
        self.collision
            .contact_between(a, b)
            .and_then(|h| self.contacts.get(h))
    }

    // ----- joints -----

    /// Adds a joint and derives its frames from the colliders' current placement.
    pub fn add_joint(&mut self, mut joint: Joint) -> Result<JointHandle> {
        let mut frames = [Transform::IDENTITY; 2];
        for (frame, collider) in frames.iter_mut().zip(joint.colliders) {
            let Some(collider) = collider else {
                continue;
            };
            let entry = self
                .collider(collider)
                .ok_or(PhysicsError::ColliderNotFound(collider))?;
            *frame = entry.world;
        }
        joint.compute_initial_configuration(&frames[0], &frames[1]);
        joint.on_island = false;

        let endpoints = joint.colliders;
        let handle = self.joints.insert(joint);
        for collider in endpoints.into_iter().flatten() {
            if let Some(collider) = self.colliders.get_mut(collider) {
                if !collider.joints.contains(&handle) {
                    collider.joints.push(handle);
                }
            }
        }
        self.wake_joint_bodies(handle);
        Ok(handle)
    }

    pub fn remove_joint(&mut self, handle: JointHandle) -> Result<Joint> {
        self.wake_joint_bodies(handle);
        let joint = self
            .joints
            .remove(handle)
            .ok_or(PhysicsError::JointNotFound(handle))?;
        for collider in joint.colliders.into_iter().flatten() {
            if let Some(collider) = self.colliders.get_mut(collider) {
                collider.remove_joint_edge(handle);
            }
        }
        Ok(joint)
    }

    pub fn joint(&self, handle: JointHandle) -> Option<&Joint> {
        self.joints.get(handle)
    }

    pub fn joint_mut(&mut self, handle: JointHandle) -> Option<&mut Joint> {
        self.joints.get_mut(handle)
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointHandle, &Joint)> + '_ {
        self.joints.iter()
    }

    // ----- events -----

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<PhysicsEvent> {
        self.events.drain()
    }

    // ----- stepping -----

    /// Commits every queued node action now.
    pub fn flush(&mut self) -> &FlushReport {
        let mut ctx = FlushContext {
            nodes: &mut self.nodes,
            bodies: &mut self.bodies,
            colliders: &mut self.colliders,
            broadphase: self.broadphase.as_mut(),
        };
        self.last_flush = self.node_manager.flush(&mut ctx);
        &self.last_flush
    }

    /// Advances the simulation by `dt`, split into the configured number of sub-steps.
    pub fn step(&mut self, dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            log::warn!("ignoring physics step with non-positive or non-finite dt {dt}");
            return;
        }
        let _timer = ScopedTimer::new("physics::step");
        let mut profiler = PhysicsProfiler::default();
        let mut total = Duration::ZERO;
        {
            let _total = StageTimer::new(&mut total);
            let sub_steps = self.config.sub_steps.clamp(1, MAX_SUB_STEPS);
            let h = dt / sub_steps as f32;
            for _ in 0..sub_steps {
                self.sub_step(h, &mut profiler);
            }
        }
        profiler.total_frame_time = total;

        profiler.body_count = self.bodies.len();
        profiler.collider_count = self.colliders.len();
        profiler.contact_count = self.contacts.len();
        profiler.sleeping_body_count = self.bodies.values().filter(|b| b.is_asleep()).count();
        profiler.report();
        self.profiler = profiler;
    }

    fn sub_step(&mut self, h: f32, profiler: &mut PhysicsProfiler) {
        {
            let _timer = ScopedTimer::new("queue::flush");
            let _stage = StageTimer::new(&mut profiler.queue_flush_time);
            self.flush();
        }

        let pairs = {
            let _timer = ScopedTimer::new("broadphase::pairs");
            let _stage = StageTimer::new(&mut profiler.broad_phase_time);
            self.broadphase.candidate_pairs()
        };
        profiler.candidate_pair_count += pairs.len();

        {
            let _timer = ScopedTimer::new("collision::update");
            let _stage = StageTimer::new(&mut profiler.narrow_phase_time);
            let mut ctx = CollisionContext {
                bodies: &self.bodies,
                colliders: &mut self.colliders,
                contacts: &mut self.contacts,
                joints: &self.joints,
                events: &mut self.events,
            };
            self.collision.update(pairs, &mut ctx);
        }

        let swept = self.ccd_starts();
        let report = {
            let _timer = ScopedTimer::new("dynamics::step");
            let mut ctx = DynamicsContext {
                bodies: &mut self.bodies,
                colliders: &self.colliders,
                contacts: &mut self.contacts,
                joints: &mut self.joints,
                events: &mut self.events,
            };
            self.dynamics.step(h, &self.config, &mut ctx)
        };
        profiler.island_time += report.island_time;
        profiler.solver_time += report.solver_time;
        profiler.active_island_count = report.islands;

        if !swept.is_empty() {
            let _timer = ScopedTimer::new("ccd::sweep");
            let _stage = StageTimer::new(&mut profiler.ccd_time);
            self.resolve_tunnelling(&swept);
        }

        self.publish_poses(&report.moved);
        {
            let _timer = ScopedTimer::new("queue::flush");
            let _stage = StageTimer::new(&mut profiler.queue_flush_time);
            self.flush();
        }
    }

    /// Start positions of the awake bodies flagged for continuous collision.
    fn ccd_starts(&self) -> Vec<(BodyHandle, Vec3)> {
        if !self.ccd.enabled {
            return Vec::new();
        }
        self.bodies()
            .filter(|(_, b)| b.ccd && b.is_dynamic() && b.is_awake() && !b.colliders.is_empty())
            .map(|(handle, b)| (handle, b.position))
            .collect()
    }

    /// Pulls swept bodies back to their first impact and drops the velocity carrying them in.
    fn resolve_tunnelling(&mut self, swept: &[(BodyHandle, Vec3)]) {
        for &(handle, start) in swept {
            let Some(motion) = self.bodies.get(handle).map(|b| b.position - start) else {
                continue;
            };
            let Some(toi) = self.earliest_impact(handle, motion) else {
                continue;
            };
            let Some(body) = self.bodies.get_mut(handle) else {
                continue;
            };
            body.position = start + motion * toi.fraction;
            let velocity = body.linear_velocity();
            let approach = velocity.dot(toi.normal);
            if approach < 0.0 {
                body.set_linear_velocity(velocity - toi.normal * approach);
            }
            log::debug!(
                "ccd: {handle:?} stopped at {:.3} of its motion against normal {}",
                toi.fraction,
                toi.normal
            );
        }
    }

    /// Earliest impact of a body's colliders with non-dynamic geometry along `motion`.
    /// Contacts already present at the start are left to the solver.
    fn earliest_impact(&self, handle: BodyHandle, motion: Vec3) -> Option<TimeOfImpact> {
        let body = self.bodies.get(handle)?;
        let top = top_level_body(&self.bodies, handle);
        let dispatch = self.collision.dispatch();
        let table = self.collision.table();
        let table = table.read();

        let mut earliest: Option<TimeOfImpact> = None;
        for &own in &body.colliders {
            let Some(collider) = self.colliders.get(own) else {
                continue;
            };
            if collider.is_ghost() || collider.is_pending_delete() {
                continue;
            }
            let moving = ShapeInstance::from_collider(collider);
            if !self.ccd.needs_sweep(motion, &moving.aabb) {
                continue;
            }
            for other in self.swept_candidates(&moving, motion) {
                let Some(target) = self.colliders.get(other) else {
                    continue;
                };
                if target.is_ghost()
                    || target.is_pending_delete()
                    || self.collision.is_pair_filtered(own, other)
                {
                    continue;
                }
                let target_top = target.body().map(|b| top_level_body(&self.bodies, b));
                if target_top == Some(top)
                    || target_top
                        .and_then(|b| self.bodies.get(b))
                        .is_some_and(|b| b.is_dynamic())
                {
                    continue;
                }
                let filter = table.evaluate(collider.group, target.group);
                if filter.skip_detection || filter.skip_resolution {
                    continue;
                }
                let Some(toi) = self.ccd.time_of_impact(
                    dispatch,
                    &moving,
                    motion,
                    &ShapeInstance::from_collider(target),
                ) else {
                    continue;
                };
                if toi.fraction > 0.0 && earliest.map_or(true, |e| toi.fraction < e.fraction) {
                    earliest = Some(toi);
                }
            }
        }
        earliest
    }

    /// Broad-phase candidates under the bounds swept by `moving` along `motion`.
    fn swept_candidates(&self, moving: &ShapeInstance, motion: Vec3) -> Vec<ColliderHandle> {
        let end = Aabb::new(moving.aabb.min + motion, moving.aabb.max + motion);
        self.broadphase
            .query(&CastShape::Aabb(moving.aabb.merged(&end)))
    }

    /// Writes solved body poses back to their nodes.
    fn publish_poses(&mut self, moved: &[BodyHandle]) {
        for &handle in moved {
            let Some((node, pose)) = self
                .bodies
                .get(handle)
                .and_then(|b| b.node.map(|n| (n, b.pose())))
            else {
                continue;
            };
            if let Some(entry) = self.nodes.get_mut(node) {
                entry.world = pose;
            }
            self.node_manager.queue(
                &mut self.nodes,
                node,
                QueueAction::Transform(TransformAction::INTEGRATION),
            );
        }
    }

    // ----- scene queries -----

    /// Colliders hit by `cast`, nearest first, at most `max_results`.
    ///
    /// Queries see the broad-phase as of the last flush.
    pub fn cast(&self, cast: &CastShape, max_results: usize) -> Vec<CastResult> {
        let dispatch = self.collision.dispatch();
        let mut results: Vec<CastResult> = self
            .broadphase
            .query(cast)
            .into_iter()
            .filter_map(|handle| {
                let collider = self.collider(handle)?;
                let hit = dispatch.cast(cast, &ShapeInstance::from_collider(collider))?;
                Some(CastResult {
                    collider: handle,
                    hit,
                })
            })
            .collect();
        results.sort_by(|a, b| {
            a.hit
                .distance
                .total_cmp(&b.hit.distance)
                .then(a.collider.cmp(&b.collider))
        });
        results.truncate(max_results);
        results
    }

    pub fn cast_ray(&self, origin: Vec3, direction: Vec3, max_results: usize) -> Vec<CastResult> {
        self.cast(&CastShape::Ray(Ray::new(origin, direction)), max_results)
    }

    pub fn cast_segment(&self, start: Vec3, end: Vec3, max_results: usize) -> Vec<CastResult> {
        self.cast(&CastShape::Segment(Segment::new(start, end)), max_results)
    }

    pub fn cast_aabb(&self, aabb: Aabb, max_results: usize) -> Vec<CastResult> {
        self.cast(&CastShape::Aabb(aabb), max_results)
    }

    pub fn cast_sphere(&self, center: Vec3, radius: f32, max_results: usize) -> Vec<CastResult> {
        self.cast(
            &CastShape::Sphere(BoundingSphere::new(center, radius)),
            max_results,
        )
    }

    pub fn cast_frustum(&self, frustum: Frustum, max_results: usize) -> Vec<CastResult> {
        self.cast(&CastShape::Frustum(frustum), max_results)
    }

    /// Colliders met by `handle` moving at `velocity` for `dt` seconds, earliest first.
    ///
    /// Colliders already touching it report time zero; colliders on its own body are skipped.
    pub fn sweep_collider(
        &self,
        handle: ColliderHandle,
        velocity: Vec3,
        dt: f32,
    ) -> Result<Vec<SweepResult>> {
        let collider = self
            .colliders
            .get(handle)
            .filter(|c| !c.is_pending_delete())
            .ok_or(PhysicsError::ColliderNotFound(handle))?;
        let dt = dt.max(0.0);
        let motion = velocity * dt;
        let moving = ShapeInstance::from_collider(collider);
        let own_top = collider.body().map(|b| top_level_body(&self.bodies, b));
        let dispatch = self.collision.dispatch();

        let mut results: Vec<SweepResult> = self
            .swept_candidates(&moving, motion)
            .into_iter()
            .filter(|&other| other != handle)
            .filter_map(|other| {
                let target = self.colliders.get(other).filter(|c| !c.is_pending_delete())?;
                let target_top = target.body().map(|b| top_level_body(&self.bodies, b));
                if own_top.is_some() && target_top == own_top {
                    return None;
                }
                let toi = self.ccd.time_of_impact(
                    dispatch,
                    &moving,
                    motion,
                    &ShapeInstance::from_collider(target),
                )?;
                Some(SweepResult {
                    collider: other,
                    time: toi.fraction * dt,
                    point: toi.point,
                    normal: toi.normal,
                    penetration: toi.penetration,
                })
            })
            .collect();
        results.sort_by(|a, b| {
            a.time
                .total_cmp(&b.time)
                .then(a.collider.cmp(&b.collider))
        });
        Ok(results)
    }

    // ----- hierarchy bookkeeping -----

    fn live_node(&self, handle: NodeHandle) -> Result<&PhysicsNode> {
        self.node(handle).ok_or(PhysicsError::NodeNotFound(handle))
    }

    fn live_node_mut(&mut self, handle: NodeHandle) -> Result<&mut PhysicsNode> {
        self.nodes
            .get_mut(handle)
            .filter(|n| !n.pending_delete)
            .ok_or(PhysicsError::NodeNotFound(handle))
    }

    fn is_live_collider(&self, handle: ColliderHandle) -> bool {
        self.collider(handle).is_some()
    }

    fn is_ancestor_or_self(&self, ancestor: NodeHandle, mut node: NodeHandle) -> bool {
        let mut steps = 0;
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes.get(node).and_then(|n| n.parent) {
                Some(parent) if steps <= self.nodes.len() => {
                    node = parent;
                    steps += 1;
                }
                _ => return false,
            }
        }
    }

    /// `root` and its descendants, parents before children.
    fn subtree(&self, root: NodeHandle) -> Vec<NodeHandle> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            let Some(node) = self.nodes.get(handle) else {
                continue;
            };
            out.push(handle);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    fn body_at_or_above(&self, node: NodeHandle) -> Option<BodyHandle> {
        let entry = self.nodes.get(node)?;
        entry.body.or_else(|| self.body_above(node))
    }

    /// Nearest body strictly above `node`.
    fn body_above(&self, node: NodeHandle) -> Option<BodyHandle> {
        let mut current = self.nodes.get(node)?.parent;
        let mut steps = 0;
        while let Some(handle) = current {
            let entry = self.nodes.get(handle)?;
            if entry.body.is_some() {
                return entry.body;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return None;
            }
            current = entry.parent;
        }
        None
    }

    /// Recomputes body parents and collider owners below `root` after the hierarchy changed.
    fn rebind_subtree(&mut self, root: NodeHandle) {
        let mut stack = vec![(root, self.body_above(root))];
        while let Some((handle, above)) = stack.pop() {
            let Some(node) = self.nodes.get(handle) else {
                continue;
            };
            let own = node.body;
            let collider = node.collider;
            let children = node.children.clone();

            if let Some(body) = own.and_then(|b| self.bodies.get_mut(b)) {
                body.parent = above;
            }
            let effective = own.or(above);
            if let Some(collider) = collider {
                self.bind_collider(collider, effective);
            }
            stack.extend(children.into_iter().rev().map(|child| (child, effective)));
        }
    }

    /// Hands the collider to `body`, moving it to the matching broad-phase partition.
    fn bind_collider(&mut self, handle: ColliderHandle, body: Option<BodyHandle>) {
        let Some(collider) = self.colliders.get(handle).filter(|c| !c.pending_delete) else {
            return;
        };
        let old = collider.body;
        let Some(node) = collider.node else {
            return;
        };

        if old != body {
            self.collision.destroy_contacts_of(
                handle,
                &mut self.colliders,
                &mut self.contacts,
                &mut self.events,
            );
            if let Some(previous) = old.and_then(|b| self.bodies.get_mut(b)) {
                previous.colliders.retain(|&c| c != handle);
                if let Some(owner) = previous.node {
                    self.node_manager
                        .queue(&mut self.nodes, owner, QueueAction::Mass(MassAction::RECOMPUTE));
                }
            }
            if let Some(next) = body.and_then(|b| self.bodies.get_mut(b)) {
                next.colliders.push(handle);
                next.wake_up();
                if let Some(owner) = next.node {
                    self.node_manager
                        .queue(&mut self.nodes, owner, QueueAction::Mass(MassAction::RECOMPUTE));
                }
            }
            if let Some(collider) = self.colliders.get_mut(handle) {
                collider.body = body;
            }
        }

        let Some(collider) = self.colliders.get(handle) else {
            return;
        };
        let (membership, desired) = (collider.membership, collider.desired_partition());
        if membership != Some(desired) {
            if let Some(current) = membership {
                self.node_manager.queue(
                    &mut self.nodes,
                    node,
                    QueueAction::BroadPhase(current, BroadPhaseOp::Remove),
                );
            }
            self.node_manager.queue(
                &mut self.nodes,
                node,
                QueueAction::BroadPhase(desired, BroadPhaseOp::Insert),
            );
        }
    }

    fn wake_joint_bodies(&mut self, handle: JointHandle) {
        let Some(endpoints) = self.joints.get(handle).map(|j| j.colliders) else {
            return;
        };
        for collider in endpoints.into_iter().flatten() {
            if let Some(body) = self.colliders.get(collider).and_then(|c| c.body) {
                if let Some(body) = self.bodies.get_mut(body) {
                    body.wake_up();
                }
            }
        }
    }
}
