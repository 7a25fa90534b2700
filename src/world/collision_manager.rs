//! Collision pipeline: candidate pairs are filtered, dispatched to the narrow phase and turned
//! into persistent contact edges.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::events::{EventQueue, PairEvent};
use crate::collision::{
    contact::Contact,
    dispatch::ShapeDispatchTable,
    filter::{CollisionTable, FilterBlockKind, FilterResult},
    manifold::Manifold,
    shapes::ShapeInstance,
};
use crate::core::{
    collider::Collider,
    handles::{BodyHandle, ColliderHandle, ContactHandle, JointHandle},
    rigidbody::{top_level_body, RigidBody},
    types::Material,
};
use crate::dynamics::joints::Joint;
use crate::utils::allocator::Arena;

type Pair = (ColliderHandle, ColliderHandle);

/// Scene state the collision stage reads and writes.
pub struct CollisionContext<'a> {
    pub bodies: &'a Arena<BodyHandle, RigidBody>,
    pub colliders: &'a mut Arena<ColliderHandle, Collider>,
    pub contacts: &'a mut Arena<ContactHandle, Contact>,
    pub joints: &'a Arena<JointHandle, Joint>,
    pub events: &'a mut EventQueue,
}

/// Counters from one collision update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionStepStats {
    pub candidate_pairs: usize,
    pub filtered_pairs: usize,
    pub manifolds: usize,
    pub started: usize,
    pub ended: usize,
}

/// A pair that survived filtering and goes to the narrow phase.
struct NarrowJob {
    pair: Pair,
    filter: FilterResult,
}

pub struct CollisionManager {
    dispatch: Arc<ShapeDispatchTable>,
    table: Arc<RwLock<CollisionTable>>,
    pair_filters: HashSet<Pair>,
    contact_index: HashMap<Pair, ContactHandle>,
}

impl Default for CollisionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CollisionManager {
    pub fn new() -> Self {
        Self::with_table(Arc::new(RwLock::new(CollisionTable::new())))
    }

    pub fn with_table(table: Arc<RwLock<CollisionTable>>) -> Self {
        Self {
            dispatch: ShapeDispatchTable::shared(),
            table,
            pair_filters: HashSet::new(),
            contact_index: HashMap::new(),
        }
    }

    pub fn dispatch(&self) -> &ShapeDispatchTable {
        &self.dispatch
    }

    pub fn table(&self) -> Arc<RwLock<CollisionTable>> {
        Arc::clone(&self.table)
    }

    /// Ignores every collision between `a` and `b` until the filter is removed.
    pub fn add_pair_filter(&mut self, a: ColliderHandle, b: ColliderHandle) -> bool {
        self.pair_filters.insert(ordered_pair(a, b))
    }

    pub fn remove_pair_filter(&mut self, a: ColliderHandle, b: ColliderHandle) -> bool {
        self.pair_filters.remove(&ordered_pair(a, b))
    }

    pub fn is_pair_filtered(&self, a: ColliderHandle, b: ColliderHandle) -> bool {
        self.pair_filters.contains(&ordered_pair(a, b))
    }

    pub fn contact_between(&self, a: ColliderHandle, b: ColliderHandle) -> Option<ContactHandle> {
        self.contact_index.get(&ordered_pair(a, b)).copied()
    }

    /// Runs filtering, the narrow phase and contact bookkeeping for one step.
    pub fn update(&mut self, pairs: Vec<Pair>, ctx: &mut CollisionContext<'_>) -> CollisionStepStats {
        let mut stats = CollisionStepStats {
            candidate_pairs: pairs.len(),
            ..CollisionStepStats::default()
        };
        let table = Arc::clone(&self.table);
        let table = table.read();

        // Contacts are keyed by the ordered pair whatever order the broad-phase reports.
        let mut unique: HashSet<Pair> = HashSet::with_capacity(pairs.len());
        let jobs: Vec<NarrowJob> = pairs
            .into_iter()
            .map(|(a, b)| ordered_pair(a, b))
            .filter(|&pair| pair.0 != pair.1 && unique.insert(pair))
            .filter_map(|pair| self.filter_pair(pair, &table, &*ctx))
            .collect();
        stats.filtered_pairs = stats.candidate_pairs - jobs.len();

        let manifolds = self.narrow_phase(&jobs, &*ctx.colliders);

        let mut seen: HashSet<Pair> = HashSet::with_capacity(jobs.len());
        for (job, manifold) in jobs.into_iter().zip(manifolds) {
            let Some(manifold) = manifold.filter(|m| !m.points.is_empty()) else {
                continue;
            };
            stats.manifolds += 1;
            seen.insert(job.pair);
            if self.refresh_contact(job, manifold, &table, ctx) {
                stats.started += 1;
            }
        }

        stats.ended = self.retire_contacts(&seen, &table, ctx);
        log::trace!(
            "collision: {} candidates, {} filtered, {} manifolds, {} started, {} ended",
            stats.candidate_pairs,
            stats.filtered_pairs,
            stats.manifolds,
            stats.started,
            stats.ended
        );
        stats
    }

    /// Destroys every contact on `collider`, reporting each as ended.
    pub fn destroy_contacts_of(
        &mut self,
        collider: ColliderHandle,
        colliders: &mut Arena<ColliderHandle, Collider>,
        contacts: &mut Arena<ContactHandle, Contact>,
        events: &mut EventQueue,
    ) -> usize {
        let Some(edges) = colliders.get(collider).map(|c| c.contacts.clone()) else {
            return 0;
        };
        let table = Arc::clone(&self.table);
        let table = table.read();
        edges
            .into_iter()
            .filter(|&handle| self.destroy_contact(handle, &table, colliders, contacts, events))
            .count()
    }

    fn filter_pair(
        &self,
        pair: Pair,
        table: &CollisionTable,
        ctx: &CollisionContext<'_>,
    ) -> Option<NarrowJob> {
        let a = ctx.colliders.get(pair.0)?;
        let b = ctx.colliders.get(pair.1)?;
        if a.is_pending_delete() || b.is_pending_delete() {
            return None;
        }
        if !is_active(ctx.bodies, a) && !is_active(ctx.bodies, b) {
            return None;
        }
        if self.pair_filters.contains(&ordered_pair(pair.0, pair.1)) {
            return None;
        }
        let tops = (
            a.body().map(|h| top_level_body(ctx.bodies, h)),
            b.body().map(|h| top_level_body(ctx.bodies, h)),
        );
        if tops.0.is_some() && tops.0 == tops.1 {
            return None;
        }
        let jointed = a.joint_edges().iter().any(|&j| {
            ctx.joints
                .get(j)
                .is_some_and(|joint| joint.valid && !joint.collide_connected && joint.connects(pair.1))
        });
        if jointed {
            return None;
        }

        let filter = table.evaluate(a.group, b.group).with_ghosts(a.ghost, b.ghost);
        if filter.skip_detection {
            return None;
        }
        Some(NarrowJob { pair, filter })
    }

    #[cfg(not(feature = "parallel"))]
    fn narrow_phase(
        &self,
        jobs: &[NarrowJob],
        colliders: &Arena<ColliderHandle, Collider>,
    ) -> Vec<Option<Manifold>> {
        jobs.iter()
            .map(|job| collide_pair(&self.dispatch, colliders, job.pair))
            .collect()
    }

    /// Results come back in job order, matching the sequential path.
    #[cfg(feature = "parallel")]
    fn narrow_phase(
        &self,
        jobs: &[NarrowJob],
        colliders: &Arena<ColliderHandle, Collider>,
    ) -> Vec<Option<Manifold>> {
        let dispatch = &*self.dispatch;
        jobs.par_iter()
            .map(|job| collide_pair(dispatch, colliders, job.pair))
            .collect()
    }

    /// Creates or refreshes the contact for a touching pair. Returns `true` for a new contact.
    fn refresh_contact(
        &mut self,
        job: NarrowJob,
        manifold: Manifold,
        table: &CollisionTable,
        ctx: &mut CollisionContext<'_>,
    ) -> bool {
        let (Some(a), Some(b)) = (ctx.colliders.get(job.pair.0), ctx.colliders.get(job.pair.1)) else {
            return false;
        };
        let ghost = a.ghost || b.ghost;
        let groups = [a.group, b.group];
        let existing = self
            .contact_index
            .get(&job.pair)
            .copied()
            .filter(|&h| ctx.contacts.contains(h));

        let (handle, created) = match existing {
            Some(handle) => (handle, false),
            None => {
                let mut contact = Contact::new(
                    [job.pair.0, job.pair.1],
                    [a.body(), b.body()],
                    Material::combine_pair(&a.material, &b.material),
                    job.filter.clone(),
                );
                contact.ghost = ghost;
                let handle = ctx.contacts.insert(contact);
                self.contact_index.insert(job.pair, handle);
                for collider in [job.pair.0, job.pair.1] {
                    if let Some(collider) = ctx.colliders.get_mut(collider) {
                        collider.contacts.push(handle);
                    }
                }
                (handle, true)
            }
        };

        let Some(contact) = ctx.contacts.get_mut(handle) else {
            return false;
        };
        contact.ghost = ghost;
        contact.skip_resolution = job.filter.skip_resolution;
        contact.filter = job.filter;
        contact.update_manifold(manifold);

        let pair = PairEvent {
            colliders: contact.colliders,
            groups,
            normal: contact.normal,
            point: deepest_point(contact),
        };
        let kind = if contact.is_new {
            contact.is_new = false;
            FilterBlockKind::Started
        } else {
            FilterBlockKind::Persisted
        };
        let resolvable = contact.is_resolvable();
        let filter = contact.filter.clone();
        ctx.events.emit_collision(table, &filter, kind, &pair);
        if resolvable {
            ctx.events.emit_collision(table, &filter, FilterBlockKind::PreSolve, &pair);
        }
        created
    }

    /// Ends contacts the narrow phase no longer reports. Contacts whose colliders are both
    /// inactive (asleep or static) stay frozen so their island can wake as a whole.
    fn retire_contacts(
        &mut self,
        seen: &HashSet<Pair>,
        table: &CollisionTable,
        ctx: &mut CollisionContext<'_>,
    ) -> usize {
        let stale: Vec<ContactHandle> = ctx
            .contacts
            .iter()
            .filter(|(_, contact)| !seen.contains(&(contact.colliders[0], contact.colliders[1])))
            .filter(|(_, contact)| {
                let active = contact
                    .colliders
                    .iter()
                    .filter_map(|&c| ctx.colliders.get(c))
                    .any(|c| is_active(ctx.bodies, c));
                let filtered = self.is_pair_filtered(contact.colliders[0], contact.colliders[1]);
                active || filtered || !contact.valid
            })
            .map(|(handle, _)| handle)
            .collect();

        stale
            .into_iter()
            .filter(|&handle| {
                self.destroy_contact(handle, table, ctx.colliders, ctx.contacts, ctx.events)
            })
            .count()
    }

    fn destroy_contact(
        &mut self,
        handle: ContactHandle,
        table: &CollisionTable,
        colliders: &mut Arena<ColliderHandle, Collider>,
        contacts: &mut Arena<ContactHandle, Contact>,
        events: &mut EventQueue,
    ) -> bool {
        let Some(contact) = contacts.remove(handle) else {
            return false;
        };
        let pair = (contact.colliders[0], contact.colliders[1]);
        if self.contact_index.get(&pair) == Some(&handle) {
            self.contact_index.remove(&pair);
        }

        let mut groups = [Default::default(); 2];
        for (slot, collider) in contact.colliders.iter().enumerate() {
            if let Some(collider) = colliders.get_mut(*collider) {
                collider.remove_contact_edge(handle);
                groups[slot] = collider.group;
            }
        }
        let event = PairEvent {
            colliders: contact.colliders,
            groups,
            normal: glam::Vec3::ZERO,
            point: deepest_point(&contact),
        };
        events.emit_collision(table, &contact.filter, FilterBlockKind::Ended, &event);
        true
    }
}

fn ordered_pair(a: ColliderHandle, b: ColliderHandle) -> Pair {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// A collider takes part in detection when it moves: an awake dynamic body or a kinematic one.
fn is_active(bodies: &Arena<BodyHandle, RigidBody>, collider: &Collider) -> bool {
    collider
        .body()
        .map(|handle| top_level_body(bodies, handle))
        .and_then(|handle| bodies.get(handle))
        .is_some_and(|body| (body.is_dynamic() && body.is_awake()) || body.is_kinematic())
}

fn collide_pair(
    dispatch: &ShapeDispatchTable,
    colliders: &Arena<ColliderHandle, Collider>,
    pair: Pair,
) -> Option<Manifold> {
    let a = colliders.get(pair.0)?;
    let b = colliders.get(pair.1)?;
    dispatch.collide(&ShapeInstance::from_collider(a), &ShapeInstance::from_collider(b))
}

fn deepest_point(contact: &Contact) -> glam::Vec3 {
    contact
        .points
        .iter()
        .max_by(|a, b| a.penetration.total_cmp(&b.penetration))
        .map_or(glam::Vec3::ZERO, |p| p.position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::filter::{CollisionFilter, GroupId};
    use crate::core::{collider::ColliderShape, types::Transform};
    use crate::world::events::PhysicsEvent;
    use glam::Vec3;

    struct Scene {
        bodies: Arena<BodyHandle, RigidBody>,
        colliders: Arena<ColliderHandle, Collider>,
        contacts: Arena<ContactHandle, Contact>,
        joints: Arena<JointHandle, Joint>,
        events: EventQueue,
    }

    impl Scene {
        fn new() -> Self {
            Self {
                bodies: Arena::new(),
                colliders: Arena::new(),
                contacts: Arena::new(),
                joints: Arena::new(),
                events: EventQueue::new(),
            }
        }

        fn sphere(&mut self, position: Vec3, body: Option<RigidBody>) -> ColliderHandle {
            let mut collider = Collider::new(ColliderShape::sphere(0.5));
            collider.update_world(&Transform::from_position(position));
            if let Some(body) = body {
                let handle = self.bodies.insert(body);
                collider.body = Some(handle);
                let collider = self.colliders.insert(collider);
                if let Some(body) = self.bodies.get_mut(handle) {
                    body.colliders.push(collider);
                }
                return collider;
            }
            self.colliders.insert(collider)
        }

        fn update(&mut self, manager: &mut CollisionManager, pairs: Vec<Pair>) -> CollisionStepStats {
            let mut ctx = CollisionContext {
                bodies: &self.bodies,
                colliders: &mut self.colliders,
                contacts: &mut self.contacts,
                joints: &self.joints,
                events: &mut self.events,
            };
            manager.update(pairs, &mut ctx)
        }

        fn moved(&mut self, collider: ColliderHandle, position: Vec3) {
            if let Some(c) = self.colliders.get_mut(collider) {
                c.update_world(&Transform::from_position(position));
            }
        }
    }

    #[test]
    fn touching_pair_creates_then_keeps_one_contact() {
        let mut scene = Scene::new();
        let ground = scene.sphere(Vec3::ZERO, None);
        let ball = scene.sphere(Vec3::new(0.0, 0.9, 0.0), Some(RigidBody::dynamic()));
        let mut manager = CollisionManager::new();

        let stats = scene.update(&mut manager, vec![(ground, ball)]);
        assert_eq!(stats.started, 1);
        let stats = scene.update(&mut manager, vec![(ground, ball)]);
        assert_eq!(stats.started, 0);
        assert_eq!(scene.contacts.len(), 1);

        let events = scene.events.drain();
        assert!(matches!(events.first(), Some(PhysicsEvent::CollisionStarted(_))));
        assert!(matches!(events.last(), Some(PhysicsEvent::CollisionPersisted(_))));
        let edges = scene.colliders.get(ball).map(|c| c.contact_edges().len());
        assert_eq!(edges, Some(1));
    }

    #[test]
    fn separated_pair_ends_its_contact() {
        let mut scene = Scene::new();
        let ground = scene.sphere(Vec3::ZERO, None);
        let ball = scene.sphere(Vec3::new(0.0, 0.9, 0.0), Some(RigidBody::dynamic()));
        let mut manager = CollisionManager::new();
        scene.update(&mut manager, vec![(ground, ball)]);

        scene.moved(ball, Vec3::new(0.0, 5.0, 0.0));
        let stats = scene.update(&mut manager, vec![(ground, ball)]);
        assert_eq!(stats.ended, 1);
        assert!(scene.contacts.is_empty());
        assert_eq!(manager.contact_between(ground, ball), None);
        assert!(scene
            .events
            .drain()
            .iter()
            .any(|e| matches!(e, PhysicsEvent::CollisionEnded(_))));
        let edges = scene.colliders.get(ground).map(|c| c.contact_edges().len());
        assert_eq!(edges, Some(0));
    }

    #[test]
    fn sleeping_contacts_stay_frozen() {
        let mut scene = Scene::new();
        let ground = scene.sphere(Vec3::ZERO, None);
        let ball = scene.sphere(Vec3::new(0.0, 0.9, 0.0), Some(RigidBody::dynamic()));
        let mut manager = CollisionManager::new();
        scene.update(&mut manager, vec![(ground, ball)]);

        for body in scene.bodies.iter_mut().map(|(_, b)| b) {
            body.put_to_sleep();
        }
        let stats = scene.update(&mut manager, vec![(ground, ball)]);
        assert_eq!(stats.ended, 0);
        assert_eq!(scene.contacts.len(), 1);
    }

    #[test]
    fn pair_filters_and_group_filters_skip_detection() {
        let mut scene = Scene::new();
        let ground = scene.sphere(Vec3::ZERO, None);
        let ball = scene.sphere(Vec3::new(0.0, 0.9, 0.0), Some(RigidBody::dynamic()));
        let mut manager = CollisionManager::new();

        assert!(manager.add_pair_filter(ball, ground));
        let stats = scene.update(&mut manager, vec![(ground, ball)]);
        assert_eq!(stats.filtered_pairs, 1);
        assert!(manager.remove_pair_filter(ground, ball));

        let table = manager.table();
        let debris = table.write().register_group("debris").unwrap();
        table
            .write()
            .add_filter(CollisionFilter::new(debris, GroupId::DEFAULT).skipping_detection())
            .unwrap();
        if let Some(c) = scene.colliders.get_mut(ball) {
            c.group = debris;
        }
        let stats = scene.update(&mut manager, vec![(ground, ball)]);
        assert_eq!(stats.filtered_pairs, 1);
        assert!(scene.contacts.is_empty());
    }

    #[test]
    fn ghosts_are_detected_but_not_resolved() {
        let mut scene = Scene::new();
        let sensor = scene.sphere(Vec3::ZERO, None);
        if let Some(c) = scene.colliders.get_mut(sensor) {
            c.ghost = true;
        }
        let ball = scene.sphere(Vec3::new(0.0, 0.9, 0.0), Some(RigidBody::dynamic()));
        let mut manager = CollisionManager::new();
        scene.update(&mut manager, vec![(sensor, ball)]);

        let contact = manager
            .contact_between(sensor, ball)
            .and_then(|h| scene.contacts.get(h));
        assert!(contact.is_some_and(|c| c.ghost && !c.is_resolvable()));
    }

    #[test]
    fn static_pairs_are_never_dispatched() {
        let mut scene = Scene::new();
        let a = scene.sphere(Vec3::ZERO, None);
        let b = scene.sphere(Vec3::new(0.0, 0.5, 0.0), Some(RigidBody::fixed()));
        let mut manager = CollisionManager::new();
        let stats = scene.update(&mut manager, vec![(a, b)]);
        assert_eq!(stats.manifolds, 0);
        assert_eq!(stats.filtered_pairs, 1);
    }

    #[test]
    fn reversed_and_repeated_pairs_share_one_contact() {
        let mut scene = Scene::new();
        let ground = scene.sphere(Vec3::ZERO, None);
        let ball = scene.sphere(Vec3::new(0.0, 0.9, 0.0), Some(RigidBody::dynamic()));
        let mut manager = CollisionManager::new();

        let stats = scene.update(&mut manager, vec![(ball, ground), (ground, ball), (ball, ball)]);
        assert_eq!(stats.started, 1);
        assert_eq!(stats.manifolds, 1);
        let handle = manager.contact_between(ground, ball);
        assert!(handle.is_some());
        assert_eq!(manager.contact_between(ball, ground), handle);

        let stats = scene.update(&mut manager, vec![(ball, ground)]);
        assert_eq!(stats.started, 0);
        assert_eq!(stats.ended, 0);
        assert_eq!(scene.contacts.len(), 1);
        assert_eq!(manager.contact_between(ground, ball), handle);
    }
}
