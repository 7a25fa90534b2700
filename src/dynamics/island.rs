//! Islands: connected groups of awake dynamic bodies solved and put to sleep together.

use std::collections::{HashMap, HashSet};

use super::integrator::{integrate_position, integrate_velocity};
use super::joints::Joint;
use super::solver::{ConstraintSolver, SolverContext};
use crate::collision::contact::Contact;
use crate::config::PhysicsConfig;
use crate::core::{
    collider::Collider,
    handles::{BodyHandle, ColliderHandle, ContactHandle, JointHandle},
    rigidbody::{top_level_body, RigidBody},
    types::Velocity,
};
use crate::utils::allocator::Arena;

/// Lifecycle of an island within one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IslandState {
    #[default]
    New,
    Populated,
    Solved,
    SleepEvaluated,
    Cleared,
}

/// Thresholds deciding when a resting island goes to sleep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SleepSettings {
    pub linear_epsilon: f32,
    pub angular_epsilon: f32,
    pub time_to_sleep: f32,
}

impl From<&PhysicsConfig> for SleepSettings {
    fn from(config: &PhysicsConfig) -> Self {
        Self {
            linear_epsilon: config.linear_sleep_epsilon,
            angular_epsilon: config.angular_sleep_epsilon,
            time_to_sleep: config.time_to_sleep,
        }
    }
}

impl Default for SleepSettings {
    fn default() -> Self {
        Self::from(&PhysicsConfig::default())
    }
}

/// Represents a connected set of bodies and constraints that can be solved independently.
#[derive(Debug, Default)]
pub struct Island {
    colliders: Vec<ColliderHandle>,
    bodies: Vec<BodyHandle>,
    body_set: HashSet<BodyHandle>,
    contacts: Vec<ContactHandle>,
    ghost_contacts: Vec<ContactHandle>,
    joints: Vec<JointHandle>,
    unsolvable_joints: Vec<JointHandle>,
    state: IslandState,
    kinematic_motion: bool,
}

impl Island {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> IslandState {
        self.state
    }

    pub fn bodies(&self) -> &[BodyHandle] {
        &self.bodies
    }

    pub fn colliders(&self) -> &[ColliderHandle] {
        &self.colliders
    }

    pub fn contacts(&self) -> &[ContactHandle] {
        &self.contacts
    }

    pub fn ghost_contacts(&self) -> &[ContactHandle] {
        &self.ghost_contacts
    }

    pub fn joints(&self) -> &[JointHandle] {
        &self.joints
    }

    pub fn unsolvable_joints(&self) -> &[JointHandle] {
        &self.unsolvable_joints
    }

    pub fn contains_body(&self, body: BodyHandle) -> bool {
        self.body_set.contains(&body)
    }

    /// A moving kinematic body touches the island and keeps it awake.
    pub fn has_kinematic_motion(&self) -> bool {
        self.kinematic_motion
    }

    pub fn mark_kinematic_motion(&mut self) {
        self.kinematic_motion = true;
    }

    pub fn add_body(&mut self, body: BodyHandle) {
        if self.body_set.insert(body) {
            self.bodies.push(body);
            self.state = IslandState::Populated;
        }
    }

    pub fn add_collider(&mut self, collider: ColliderHandle, body: Option<BodyHandle>) {
        self.colliders.push(collider);
        if let Some(body) = body {
            self.add_body(body);
        }
    }

    /// Ghost contacts and contacts that skip resolution are tracked but not solved.
    ///
    /// The ghost flag is re-derived from the endpoint colliders, so a contact created before
    /// either side became a ghost is still routed aside.
    pub fn add_contact(
        &mut self,
        handle: ContactHandle,
        contact: &mut Contact,
        colliders: &Arena<ColliderHandle, Collider>,
    ) {
        contact.on_island = true;
        sync_contact_flags(contact, colliders);
        if contact.ghost || contact.skip_resolution {
            self.ghost_contacts.push(handle);
        } else {
            self.contacts.push(handle);
        }
        self.state = IslandState::Populated;
    }

    /// Joints whose endpoints move with the same top-level body cannot be solved, nor can
    /// inactive or ghost joints.
    pub fn add_joint(
        &mut self,
        handle: JointHandle,
        joint: &mut Joint,
        top_a: Option<BodyHandle>,
        top_b: Option<BodyHandle>,
    ) {
        joint.on_island = true;
        if !joint.is_solvable() || (top_a.is_some() && top_a == top_b) {
            self.unsolvable_joints.push(handle);
        } else {
            self.joints.push(handle);
        }
        self.state = IslandState::Populated;
    }

    /// Splices another island's lists onto this one.
    ///
    /// The larger island keeps its lists and the smaller one is appended.
    pub fn merge(&mut self, mut other: Island) {
        if other.bodies.len() > self.bodies.len() {
            std::mem::swap(self, &mut other);
        }
        for body in other.bodies {
            if self.body_set.insert(body) {
                self.bodies.push(body);
            }
        }
        self.colliders.extend(other.colliders);
        self.contacts.extend(other.contacts);
        self.ghost_contacts.extend(other.ghost_contacts);
        self.joints.extend(other.joints);
        self.unsolvable_joints.extend(other.unsolvable_joints);
        self.kinematic_motion |= other.kinematic_motion;
        if self.state == IslandState::New {
            self.state = other.state;
        }
    }

    /// Integrates, solves and evaluates sleep. Returns whether the island went to sleep.
    pub fn solve(
        &mut self,
        dt: f32,
        allow_sleep: bool,
        sleep: &SleepSettings,
        solver: &mut dyn ConstraintSolver,
        ctx: &mut SolverContext<'_>,
    ) -> bool {
        for &handle in &self.bodies {
            if let Some(body) = ctx.bodies.get_mut(handle) {
                integrate_velocity(body, dt);
            }
        }

        solver.add_contacts(&self.contacts);
        solver.add_joints(&self.joints);
        solver.solve(dt, ctx);

        for &handle in &self.bodies {
            if let Some(body) = ctx.bodies.get_mut(handle) {
                integrate_position(body, dt);
            }
        }
        solver.solve_positions(ctx);
        self.state = IslandState::Solved;

        let slept = self.evaluate_sleep(dt, allow_sleep, sleep, ctx.bodies);
        solver.clear();
        slept
    }

    /// Advances every member's timer once, then sleeps the whole island if all rested long
    /// enough.
    pub fn evaluate_sleep(
        &mut self,
        dt: f32,
        allow_sleep: bool,
        sleep: &SleepSettings,
        bodies: &mut Arena<BodyHandle, RigidBody>,
    ) -> bool {
        let mut all_rested = true;
        for &handle in &self.bodies {
            let Some(body) = bodies.get_mut(handle) else {
                continue;
            };
            let timer = body.update_sleep_timer(dt, sleep.linear_epsilon, sleep.angular_epsilon);
            if !body.allow_sleep || timer < sleep.time_to_sleep {
                all_rested = false;
            }
        }
        self.state = IslandState::SleepEvaluated;

        if !allow_sleep || !all_rested || self.kinematic_motion || self.bodies.is_empty() {
            return false;
        }
        for &handle in &self.bodies {
            if let Some(body) = bodies.get_mut(handle) {
                body.put_to_sleep();
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.colliders.clear();
        self.bodies.clear();
        self.body_set.clear();
        self.contacts.clear();
        self.ghost_contacts.clear();
        self.joints.clear();
        self.unsolvable_joints.clear();
        self.kinematic_motion = false;
        self.state = IslandState::Cleared;
    }
}

/// Scene state islands are built from.
pub struct IslandInputs<'a> {
    pub bodies: &'a mut Arena<BodyHandle, RigidBody>,
    pub colliders: &'a Arena<ColliderHandle, Collider>,
    pub contacts: &'a mut Arena<ContactHandle, Contact>,
    pub joints: &'a mut Arena<JointHandle, Joint>,
}

/// One constraint edge reduced to the bodies that move its endpoints.
#[derive(Debug, Clone, Copy)]
struct Edge {
    tops: [Option<BodyHandle>; 2],
    /// Per endpoint: the top-level body is dynamic.
    dynamic: [bool; 2],
    /// Either endpoint is a kinematic body that moved this step.
    kinematic_motion: bool,
    /// Solvable contacts and joints connect islands; ghosts do not.
    traversable: bool,
    kind: EdgeKind,
}

#[derive(Debug, Clone, Copy)]
enum EdgeKind {
    Contact(ContactHandle),
    Joint(JointHandle),
}

/// Builds islands each step and wakes bodies touched by awake ones.
#[derive(Debug, Default)]
pub struct IslandManager {
    islands: Vec<Island>,
}

impl IslandManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    pub fn islands_mut(&mut self) -> &mut [Island] {
        &mut self.islands
    }

    pub fn island_count(&self) -> usize {
        self.islands.len()
    }

    pub fn take_islands(&mut self) -> Vec<Island> {
        std::mem::take(&mut self.islands)
    }

    pub fn clear(&mut self) {
        self.islands.clear();
    }

    /// Partitions the awake dynamic bodies into islands through traversable edges.
    ///
    /// Sleeping bodies reachable from awake ones are woken first; static and kinematic
    /// bodies never join or bridge islands. Returns the bodies that were woken.
    pub fn build(&mut self, inputs: IslandInputs<'_>) -> Vec<BodyHandle> {
        self.islands.clear();
        let IslandInputs {
            bodies,
            colliders,
            contacts,
            joints,
        } = inputs;

        let edges = collect_edges(&*bodies, colliders, contacts, joints);
        let woken = propagate_wake(bodies, &edges);

        // One island per awake dynamic body, in arena order.
        let mut slots: Vec<Option<Island>> = Vec::new();
        let mut slot_of: HashMap<BodyHandle, usize> = HashMap::new();
        for (handle, body) in bodies.iter() {
            if !body.is_dynamic() || body.is_asleep() {
                continue;
            }
            let mut island = Island::new();
            for &collider in body.colliders() {
                island.add_collider(collider, Some(handle));
            }
            island.add_body(handle);
            slot_of.insert(handle, slots.len());
            slots.push(Some(island));
        }
        // Colliders of kinematic children ride on their dynamic parent.
        for (handle, body) in bodies.iter() {
            if body.is_dynamic() || body.parent().is_none() {
                continue;
            }
            let top = top_level_body(&*bodies, handle);
            if top == handle {
                continue;
            }
            if let Some(island) = slot_of.get(&top).and_then(|&s| slots[s].as_mut()) {
                for &collider in body.colliders() {
                    island.add_collider(collider, None);
                }
            }
        }

        let mut parents: Vec<usize> = (0..slots.len()).collect();
        for edge in edges.iter().filter(|e| e.traversable) {
            let (Some(a), Some(b)) = (
                edge.tops[0].filter(|_| edge.dynamic[0]).and_then(|h| slot_of.get(&h)),
                edge.tops[1].filter(|_| edge.dynamic[1]).and_then(|h| slot_of.get(&h)),
            ) else {
                continue;
            };
            let (root_a, root_b) = (find(&mut parents, *a), find(&mut parents, *b));
            if root_a == root_b {
                continue;
            }
            let (keep, absorb) = (root_a.min(root_b), root_a.max(root_b));
            parents[absorb] = keep;
            if let Some(absorbed) = slots[absorb].take() {
                if let Some(island) = slots[keep].as_mut() {
                    island.merge(absorbed);
                }
            }
        }

        for edge in &edges {
            let slot = (0..2)
                .filter(|&i| edge.dynamic[i])
                .find_map(|i| edge.tops[i].and_then(|h| slot_of.get(&h)).copied());
            let Some(slot) = slot else {
                continue;
            };
            let root = find(&mut parents, slot);
            let Some(island) = slots[root].as_mut() else {
                continue;
            };
            if edge.kinematic_motion {
                island.mark_kinematic_motion();
            }
            match edge.kind {
                EdgeKind::Contact(handle) => {
                    if let Some(contact) = contacts.get_mut(handle) {
                        island.add_contact(handle, contact, colliders);
                    }
                }
                EdgeKind::Joint(handle) => {
                    if let Some(joint) = joints.get_mut(handle) {
                        island.add_joint(handle, joint, edge.tops[0], edge.tops[1]);
                    }
                }
            }
        }

        self.islands = slots.into_iter().flatten().collect();
        woken
    }
}

fn find(parents: &mut [usize], mut index: usize) -> usize {
    while parents[index] != index {
        parents[index] = parents[parents[index]];
        index = parents[index];
    }
    index
}

fn top_of(
    bodies: &Arena<BodyHandle, RigidBody>,
    colliders: &Arena<ColliderHandle, Collider>,
    collider: Option<ColliderHandle>,
) -> Option<BodyHandle> {
    let body = collider.and_then(|c| colliders.get(c)).and_then(Collider::body)?;
    Some(top_level_body(bodies, body))
}

/// Marks a contact as a ghost when either collider is one, and as skipping resolution when
/// its filter or a ghost says so.
fn sync_contact_flags(contact: &mut Contact, colliders: &Arena<ColliderHandle, Collider>) {
    let ghost = contact
        .colliders
        .iter()
        .filter_map(|&c| colliders.get(c))
        .any(Collider::is_ghost);
    contact.ghost |= ghost;
    contact.skip_resolution |= contact.ghost || contact.filter.skip_resolution;
}

fn collect_edges(
    bodies: &Arena<BodyHandle, RigidBody>,
    colliders: &Arena<ColliderHandle, Collider>,
    contacts: &mut Arena<ContactHandle, Contact>,
    joints: &mut Arena<JointHandle, Joint>,
) -> Vec<Edge> {
    let describe = |tops: [Option<BodyHandle>; 2]| {
        let mut dynamic = [false; 2];
        let mut kinematic_motion = false;
        for (i, top) in tops.iter().enumerate() {
            let Some(body) = top.and_then(|h| bodies.get(h)) else {
                continue;
            };
            dynamic[i] = body.is_dynamic();
            if body.is_kinematic() && body.velocity() != Velocity::ZERO {
                kinematic_motion = true;
            }
        }
        (dynamic, kinematic_motion)
    };

    let mut edges = Vec::new();
    for (handle, contact) in contacts.iter_mut() {
        contact.on_island = false;
        if !contact.valid {
            continue;
        }
        let tops = [
            top_of(bodies, colliders, Some(contact.colliders[0])),
            top_of(bodies, colliders, Some(contact.colliders[1])),
        ];
        sync_contact_flags(contact, colliders);
        let (dynamic, kinematic_motion) = describe(tops);
        edges.push(Edge {
            tops,
            dynamic,
            kinematic_motion,
            traversable: !contact.ghost && !contact.skip_resolution && tops[0] != tops[1],
            kind: EdgeKind::Contact(handle),
        });
    }
    for (handle, joint) in joints.iter_mut() {
        joint.on_island = false;
        if !joint.valid {
            continue;
        }
        let tops = [
            top_of(bodies, colliders, joint.colliders[0]),
            top_of(bodies, colliders, joint.colliders[1]),
        ];
        let (dynamic, kinematic_motion) = describe(tops);
        let same_body = tops[0].is_some() && tops[0] == tops[1];
        edges.push(Edge {
            tops,
            dynamic,
            kinematic_motion,
            traversable: joint.is_solvable() && !same_body,
            kind: EdgeKind::Joint(handle),
        });
    }
    edges
}

/// Wakes sleeping dynamic bodies connected to awake ones, until nothing changes.
fn propagate_wake(bodies: &mut Arena<BodyHandle, RigidBody>, edges: &[Edge]) -> Vec<BodyHandle> {
    let mut woken = Vec::new();
    loop {
        let mut changed = false;
        for edge in edges.iter().filter(|e| e.traversable) {
            let awake: [bool; 2] = std::array::from_fn(|i| {
                edge.dynamic[i]
                    && edge.tops[i]
                        .and_then(|h| bodies.get(h))
                        .is_some_and(RigidBody::is_awake)
            });
            for i in 0..2 {
                let other = 1 - i;
                let trigger = awake[other] || edge.kinematic_motion;
                if !edge.dynamic[i] || awake[i] || !trigger {
                    continue;
                }
                let Some(handle) = edge.tops[i] else {
                    continue;
                };
                if let Some(body) = bodies.get_mut(handle) {
                    body.wake_up();
                    woken.push(handle);
                    changed = true;
                }
            }
        }
        if !changed {
            return woken;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{
        filter::{FilterResult, GroupId},
        manifold::Manifold,
    };
    use crate::core::types::{MaterialPairProperties, Transform};
    use glam::Vec3;

    struct Scene {
        bodies: Arena<BodyHandle, RigidBody>,
        colliders: Arena<ColliderHandle, Collider>,
        contacts: Arena<ContactHandle, Contact>,
        joints: Arena<JointHandle, Joint>,
    }

    impl Scene {
        fn new() -> Self {
            Self {
                bodies: Arena::new(),
                colliders: Arena::new(),
                contacts: Arena::new(),
                joints: Arena::new(),
            }
        }

        fn body(&mut self, body: RigidBody) -> (BodyHandle, ColliderHandle) {
            let handle = self.bodies.insert(body);
            let mut collider = Collider::default();
            collider.body = Some(handle);
            collider.update_world(&Transform::IDENTITY);
            let collider = self.colliders.insert(collider);
            if let Some(body) = self.bodies.get_mut(handle) {
                body.colliders.push(collider);
            }
            (handle, collider)
        }

        fn ground(&mut self) -> ColliderHandle {
            self.colliders.insert(Collider::default())
        }

        fn touch(&mut self, a: ColliderHandle, b: ColliderHandle) -> ContactHandle {
            let mut contact = Contact::new(
                [a, b],
                [None, None],
                MaterialPairProperties::default(),
                FilterResult::unfiltered(GroupId::DEFAULT, GroupId::DEFAULT),
            );
            contact.update_manifold(Manifold::single(Vec3::ZERO, Vec3::Y, 0.0));
            self.contacts.insert(contact)
        }

        fn build(&mut self, manager: &mut IslandManager) -> Vec<BodyHandle> {
            manager.build(IslandInputs {
                bodies: &mut self.bodies,
                colliders: &self.colliders,
                contacts: &mut self.contacts,
                joints: &mut self.joints,
            })
        }
    }

    #[test]
    fn touching_bodies_share_an_island() {
        let mut scene = Scene::new();
        let (_, a) = scene.body(RigidBody::dynamic());
        let (_, b) = scene.body(RigidBody::dynamic());
        scene.body(RigidBody::dynamic());
        scene.touch(a, b);

        let mut manager = IslandManager::new();
        scene.build(&mut manager);
        assert_eq!(manager.island_count(), 2);
        assert_eq!(manager.islands()[0].bodies().len(), 2);
        assert_eq!(manager.islands()[0].contacts().len(), 1);
    }

    #[test]
    fn static_ground_does_not_bridge_islands() {
        let mut scene = Scene::new();
        let ground = scene.ground();
        let (_, a) = scene.body(RigidBody::dynamic());
        let (_, b) = scene.body(RigidBody::dynamic());
        scene.touch(ground, a);
        scene.touch(ground, b);

        let mut manager = IslandManager::new();
        scene.build(&mut manager);
        assert_eq!(manager.island_count(), 2);
        assert!(manager.islands().iter().all(|i| i.contacts().len() == 1));
    }

    #[test]
    fn ghost_contacts_are_routed_aside() {
        let mut scene = Scene::new();
        let (_, a) = scene.body(RigidBody::dynamic());
        let (_, b) = scene.body(RigidBody::dynamic());
        let contact = scene.touch(a, b);
        if let Some(contact) = scene.contacts.get_mut(contact) {
            contact.ghost = true;
        }

        let mut manager = IslandManager::new();
        scene.build(&mut manager);
        assert_eq!(manager.island_count(), 2);
        let ghosts: usize = manager.islands().iter().map(|i| i.ghost_contacts().len()).sum();
        assert_eq!(ghosts, 1);
        assert!(scene.contacts.get(contact).is_some_and(Contact::is_on_island));
    }

    #[test]
    fn awake_body_wakes_its_sleeping_neighbour() {
        let mut scene = Scene::new();
        let (_, a) = scene.body(RigidBody::dynamic());
        let mut sleeper = RigidBody::dynamic();
        sleeper.put_to_sleep();
        let (sleeper, b) = scene.body(sleeper);
        scene.touch(a, b);

        let mut manager = IslandManager::new();
        let woken = scene.build(&mut manager);
        assert_eq!(woken, vec![sleeper]);
        assert_eq!(manager.island_count(), 1);
    }

    #[test]
    fn island_sleeps_only_when_every_member_rests() {
        let settings = SleepSettings {
            linear_epsilon: 0.01,
            angular_epsilon: 0.01,
            time_to_sleep: 0.5,
        };
        let mut scene = Scene::new();
        let (still, a) = scene.body(RigidBody::dynamic());
        let (moving, b) = scene.body(RigidBody::dynamic().with_velocity(Vec3::X, Vec3::ZERO));
        scene.touch(a, b);

        let mut manager = IslandManager::new();
        scene.build(&mut manager);
        let mut island = manager.take_islands().remove(0);
        for _ in 0..10 {
            for body in [still, moving] {
                if let Some(body) = scene.bodies.get_mut(body) {
                    body.reset_sleep_accumulated();
                }
            }
            assert!(!island.evaluate_sleep(0.1, true, &settings, &mut scene.bodies));
        }

        if let Some(body) = scene.bodies.get_mut(moving) {
            body.set_linear_velocity(Vec3::ZERO);
        }
        let mut slept = false;
        for _ in 0..10 {
            for body in [still, moving] {
                if let Some(body) = scene.bodies.get_mut(body) {
                    body.reset_sleep_accumulated();
                }
            }
            if island.evaluate_sleep(0.1, true, &settings, &mut scene.bodies) {
                slept = true;
                break;
            }
        }
        assert!(slept);
        assert!(scene.bodies.get(still).is_some_and(RigidBody::is_asleep));
        assert!(scene.bodies.get(moving).is_some_and(RigidBody::is_asleep));
    }

    #[test]
    fn merge_splices_lists() {
        let mut a = Island::new();
        a.add_body(BodyHandle::new(0, 0));
        let mut b = Island::new();
        b.add_body(BodyHandle::new(1, 0));
        b.add_body(BodyHandle::new(0, 0));
        a.merge(b);
        assert_eq!(a.bodies().len(), 2);
        a.clear();
        assert_eq!(a.state(), IslandState::Cleared);
        assert!(a.bodies().is_empty());
    }

    #[test]
    fn merging_keeps_the_larger_island_in_front() {
        let mut small = Island::new();
        small.add_body(BodyHandle::new(9, 0));
        small.mark_kinematic_motion();
        let mut large = Island::new();
        for i in 0..4 {
            large.add_body(BodyHandle::new(i, 0));
        }

        small.merge(large);
        let order: Vec<_> = small.bodies().to_vec();
        assert_eq!(order[..4], [0, 1, 2, 3].map(|i| BodyHandle::new(i, 0)));
        assert_eq!(order[4], BodyHandle::new(9, 0));
        assert!(order.iter().all(|&b| small.contains_body(b)));
        assert!(small.has_kinematic_motion());
    }

    #[test]
    fn contacts_with_ghost_colliders_are_routed_aside() {
        let mut scene = Scene::new();
        let (_, a) = scene.body(RigidBody::dynamic());
        let (_, b) = scene.body(RigidBody::dynamic());
        let contact = scene.touch(a, b);
        // Only the collider is flagged; the contact itself was never told.
        if let Some(collider) = scene.colliders.get_mut(b) {
            collider.ghost = true;
        }

        let mut manager = IslandManager::new();
        scene.build(&mut manager);
        assert_eq!(manager.island_count(), 2);
        let solved: usize = manager.islands().iter().map(|i| i.contacts().len()).sum();
        assert_eq!(solved, 0);
        assert!(scene
            .contacts
            .get(contact)
            .is_some_and(|c| c.ghost && c.skip_resolution));
    }

    #[test]
    fn inactive_joints_are_not_solved() {
        let mut scene = Scene::new();
        let (_, a) = scene.body(RigidBody::dynamic());
        let (_, b) = scene.body(RigidBody::dynamic());
        let mut joint = Joint::position(a, Some(b), Vec3::ZERO, Vec3::ZERO);
        joint.active = false;
        let joint = scene.joints.insert(joint);

        let mut manager = IslandManager::new();
        scene.build(&mut manager);
        assert_eq!(manager.island_count(), 2);
        let unsolvable: Vec<_> = manager
            .islands()
            .iter()
            .flat_map(|i| i.unsolvable_joints().iter().copied())
            .collect();
        assert_eq!(unsolvable, vec![joint]);
        assert!(manager.islands().iter().all(|i| i.joints().is_empty()));
    }
}
