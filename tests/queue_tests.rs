use std::sync::Arc;

use parking_lot::Mutex;
use rigid_core::{
    collision::broadphase::{ProxyInsert, ProxyUpdate},
    world::{BroadPhaseOp, QueueAction},
    BroadPhase, BroadPhasePartition, CastShape, Collider, ColliderHandle, ColliderShape,
    PhysicsConfig, PhysicsWorld, RigidBody, Transform, Vec3,
};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Create(BroadPhasePartition, Vec<ColliderHandle>),
    Update(BroadPhasePartition, Vec<ColliderHandle>),
    Remove(BroadPhasePartition, Vec<ColliderHandle>),
    Construct,
}

/// Broad-phase that only records what the node manager asks of it.
struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl BroadPhase for Recorder {
    fn create_proxies(&mut self, partition: BroadPhasePartition, proxies: &[ProxyInsert]) {
        let handles = proxies.iter().map(|p| p.collider).collect();
        self.calls.lock().push(Call::Create(partition, handles));
    }

    fn update_proxies(&mut self, partition: BroadPhasePartition, proxies: &[ProxyUpdate]) {
        let handles = proxies.iter().map(|p| p.collider).collect();
        self.calls.lock().push(Call::Update(partition, handles));
    }

    fn remove_proxies(&mut self, partition: BroadPhasePartition, colliders: &[ColliderHandle]) {
        self.calls.lock().push(Call::Remove(partition, colliders.to_vec()));
    }

    fn construct(&mut self) {
        self.calls.lock().push(Call::Construct);
    }

    fn query(&self, _cast: &CastShape) -> Vec<ColliderHandle> {
        Vec::new()
    }

    fn candidate_pairs(&mut self) -> Vec<(ColliderHandle, ColliderHandle)> {
        Vec::new()
    }
}

fn recording_world() -> (PhysicsWorld, Arc<Mutex<Vec<Call>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorder = Recorder {
        calls: Arc::clone(&calls),
    };
    let world = PhysicsWorld::with_broadphase(PhysicsConfig::default(), Box::new(recorder));
    (world, calls)
}

fn at(x: f32, y: f32, z: f32) -> Transform {
    Transform::from_position(Vec3::new(x, y, z))
}

#[test]
fn insert_then_remove_never_reaches_the_broadphase() {
    let (mut world, calls) = recording_world();
    let node = world.create_node(None, Transform::IDENTITY).unwrap();
    let collider = world
        .add_collider(node, Collider::new(ColliderShape::sphere(1.0)))
        .unwrap();
    world
        .queue(node, QueueAction::BroadPhase(BroadPhasePartition::Static, BroadPhaseOp::Remove))
        .unwrap();

    world.flush();
    assert!(calls.lock().is_empty(), "unexpected calls: {:?}", calls.lock());
    assert_eq!(world.collider(collider).and_then(Collider::membership), None);
}

#[test]
fn inserting_into_the_other_partition_cancels_the_first_insert() {
    let (mut world, calls) = recording_world();
    let node = world.create_node(None, Transform::IDENTITY).unwrap();
    let collider = world
        .add_collider(node, Collider::new(ColliderShape::sphere(1.0)))
        .unwrap();
    world
        .queue(node, QueueAction::BroadPhase(BroadPhasePartition::Dynamic, BroadPhaseOp::Insert))
        .unwrap();

    world.flush();
    assert_eq!(
        *calls.lock(),
        vec![Call::Create(BroadPhasePartition::Dynamic, vec![collider])]
    );
}

#[test]
fn static_colliders_are_batched_with_one_construct() {
    let (mut world, calls) = recording_world();
    let mut handles = Vec::new();
    for i in 0..3 {
        let node = world.create_node(None, at(i as f32 * 3.0, 0.0, 0.0)).unwrap();
        handles.push(
            world
                .add_collider(node, Collider::new(ColliderShape::cuboid(Vec3::ONE)))
                .unwrap(),
        );
    }

    let report = world.flush().clone();
    assert_eq!(report.inserted, [3, 0]);
    assert!(report.constructed);
    assert_eq!(
        *calls.lock(),
        vec![
            Call::Create(BroadPhasePartition::Static, handles),
            Call::Construct
        ]
    );
}

#[test]
fn attaching_a_body_moves_the_collider_to_the_dynamic_partition() {
    let (mut world, calls) = recording_world();
    let node = world.create_node(None, Transform::IDENTITY).unwrap();
    let collider = world
        .add_collider(node, Collider::new(ColliderShape::sphere(0.5)))
        .unwrap();
    world.flush();
    calls.lock().clear();

    world.add_body(node, RigidBody::dynamic()).unwrap();
    world.flush();
    assert_eq!(
        *calls.lock(),
        vec![
            Call::Remove(BroadPhasePartition::Static, vec![collider]),
            Call::Create(BroadPhasePartition::Dynamic, vec![collider]),
            Call::Construct,
        ]
    );
    assert_eq!(
        world.collider(collider).and_then(Collider::membership),
        Some(BroadPhasePartition::Dynamic)
    );
}

#[test]
fn flush_commits_root_before_grandchild_through_an_unqueued_child() {
    let mut world = PhysicsWorld::default();
    let root = world.create_node(None, Transform::IDENTITY).unwrap();
    let child = world.create_node(Some(root), at(0.0, 1.0, 0.0)).unwrap();
    let grandchild = world.create_node(Some(child), at(0.0, 1.0, 0.0)).unwrap();
    world.flush();

    world.set_local_transform(grandchild, at(2.0, 0.0, 0.0)).unwrap();
    world.set_local_transform(root, at(0.0, 0.0, 5.0)).unwrap();
    let report = world.flush().clone();

    assert_eq!(report.order, vec![root, grandchild]);
    let position = world.node(grandchild).map(|n| n.world_transform().position);
    assert_eq!(position, Some(Vec3::new(2.0, 1.0, 5.0)));
    assert_eq!(
        world.node(child).map(|n| n.world_transform().position),
        Some(Vec3::new(0.0, 1.0, 5.0))
    );
}

#[test]
fn queued_moves_update_member_proxies() {
    let (mut world, calls) = recording_world();
    let node = world.create_node(None, Transform::IDENTITY).unwrap();
    world.add_body(node, RigidBody::kinematic()).unwrap();
    let collider = world
        .add_collider(node, Collider::new(ColliderShape::sphere(0.5)))
        .unwrap();
    world.flush();
    calls.lock().clear();

    world.set_local_transform(node, at(1.0, 0.0, 0.0)).unwrap();
    world.flush();
    assert_eq!(
        *calls.lock(),
        vec![Call::Update(BroadPhasePartition::Dynamic, vec![collider])]
    );
    let center = world.collider(collider).map(|c| c.world_aabb().center());
    assert_eq!(center, Some(Vec3::new(1.0, 0.0, 0.0)));
}
