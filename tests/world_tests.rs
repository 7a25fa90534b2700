use approx::assert_relative_eq;
use std::time::{Duration, Instant};

use rigid_core::{
    core::{ConvexMesh, HeightField},
    world::EventRecipient, BodyHandle, Collider, ColliderShape, Joint, PhysicsConfig,
    PhysicsError, PhysicsEvent, PhysicsWorld, RigidBody, Transform, Velocity, Vec3,
};

fn at(x: f32, y: f32, z: f32) -> Transform {
    Transform::from_position(Vec3::new(x, y, z))
}

fn add_ground(world: &mut PhysicsWorld) -> rigid_core::ColliderHandle {
    let ground = world.create_node(None, at(0.0, -0.5, 0.0)).unwrap();
    world
        .add_collider(ground, Collider::new(ColliderShape::cuboid(Vec3::new(10.0, 0.5, 10.0))))
        .unwrap()
}

fn add_ball(world: &mut PhysicsWorld, position: Transform, body: RigidBody) -> BodyHandle {
    let node = world.create_node(None, position).unwrap();
    let handle = world.add_body(node, body).unwrap();
    world
        .add_collider(node, Collider::new(ColliderShape::sphere(0.5)))
        .unwrap();
    handle
}

#[test]
fn sphere_dropped_on_static_ground_comes_to_rest_and_sleeps() {
    let mut world = PhysicsWorld::default();
    let ground = add_ground(&mut world);
    let ball = add_ball(&mut world, at(0.0, 2.0, 0.0), RigidBody::dynamic());

    let mut slept_after = None;
    for step in 0..600 {
        world.step(1.0 / 60.0);
        if world.body(ball).is_some_and(RigidBody::is_asleep) {
            slept_after = Some(step);
            break;
        }
    }
    assert!(slept_after.is_some(), "ball never fell asleep");

    let Some(body) = world.body(ball) else {
        panic!("ball missing");
    };
    assert_relative_eq!(body.position().y, 0.5, epsilon = 0.05);
    assert_eq!(body.linear_velocity(), Vec3::ZERO);

    let ball_collider = body.colliders()[0];
    let Some(contact) = world.contact_between(ground, ball_collider) else {
        panic!("resting contact missing");
    };
    assert!(contact.valid);
    assert!(contact.normal.y > 0.99, "normal {:?}", contact.normal);
}

#[test]
fn collisions_are_reported_to_the_space_by_default() {
    let mut world = PhysicsWorld::default();
    add_ground(&mut world);
    let ball = add_ball(&mut world, at(0.0, 0.6, 0.0), RigidBody::dynamic());

    let mut events = Vec::new();
    for _ in 0..200 {
        world.step(1.0 / 60.0);
        events.extend(world.drain_events());
    }

    let started: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PhysicsEvent::CollisionStarted(event) => Some(event),
            _ => None,
        })
        .collect();
    assert!(!started.is_empty());
    for event in started {
        assert_eq!(event.recipient, EventRecipient::Space);
        assert_eq!(&*event.name, "CollisionStarted");
    }
    assert!(events.contains(&PhysicsEvent::BodySlept(ball)));
}

#[test]
fn a_spinning_neighbour_keeps_a_resting_body_awake() {
    let mut world = PhysicsWorld::new(PhysicsConfig::default().with_gravity(Vec3::ZERO));
    let resting = add_ball(&mut world, at(0.0, 0.0, 0.0), RigidBody::dynamic());
    // Spinning about the line through both centres leaves the contact point still.
    let spinning = add_ball(
        &mut world,
        at(0.995, 0.0, 0.0),
        RigidBody::dynamic().with_velocity(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)),
    );

    for _ in 0..90 {
        world.step(1.0 / 60.0);
    }
    let Some(body) = world.body(resting) else {
        panic!("body missing");
    };
    assert!(body.sleep_timer() >= world.config().time_to_sleep);
    assert!(body.is_awake());
    assert!(world.body(spinning).is_some_and(RigidBody::is_awake));

    if let Some(body) = world.body_mut(spinning) {
        body.set_velocity(Velocity::ZERO);
    }
    let mut slept = false;
    for _ in 0..120 {
        world.step(1.0 / 60.0);
        let states = [resting, spinning].map(|h| world.body(h).is_some_and(RigidBody::is_asleep));
        assert_eq!(states[0], states[1], "the pair must fall asleep together");
        if states[0] {
            slept = true;
            break;
        }
    }
    assert!(slept);
}

#[test]
fn joints_between_coincident_anchors_use_the_up_axis() {
    let mut world = PhysicsWorld::default();
    let a = world.create_node(None, at(1.0, 2.0, 3.0)).unwrap();
    let b = world.create_node(None, at(1.0, 2.0, 3.0)).unwrap();
    let collider_a = world.add_collider(a, Collider::new(ColliderShape::sphere(0.5))).unwrap();
    let collider_b = world.add_collider(b, Collider::new(ColliderShape::sphere(0.5))).unwrap();

    let joint = world
        .add_joint(Joint::position(collider_a, Some(collider_b), Vec3::ZERO, Vec3::ZERO))
        .unwrap();
    assert_eq!(world.joint(joint).map(Joint::axis), Some(Vec3::Y));
    assert_eq!(
        world.collider(collider_a).map(|c| c.joint_edges().to_vec()),
        Some(vec![joint])
    );

    world.remove_collider(collider_b).unwrap();
    assert_eq!(world.joint(joint).map(|j| j.valid), Some(false));
    assert!(world.remove_joint(joint).is_ok());
    assert!(world
        .collider(collider_a)
        .is_some_and(|c| c.joint_edges().is_empty()));
}

#[test]
fn pair_filters_stop_two_colliders_from_touching() {
    let mut world = PhysicsWorld::new(PhysicsConfig::default().with_gravity(Vec3::ZERO));
    let a = add_ball(&mut world, at(0.0, 0.0, 0.0), RigidBody::dynamic());
    let b = add_ball(&mut world, at(0.9, 0.0, 0.0), RigidBody::dynamic());
    let collider_a = world.body(a).map(|body| body.colliders()[0]).unwrap();
    let collider_b = world.body(b).map(|body| body.colliders()[0]).unwrap();

    assert_eq!(world.add_pair_filter(collider_a, collider_b), Ok(true));
    world.step(1.0 / 60.0);
    assert!(world.contact_between(collider_a, collider_b).is_none());

    assert!(world.remove_pair_filter(collider_a, collider_b));
    world.step(1.0 / 60.0);
    assert!(world.contact_between(collider_a, collider_b).is_some());
}

#[test]
fn kinematic_parents_carry_their_children() {
    let mut world = PhysicsWorld::new(PhysicsConfig::default().with_gravity(Vec3::ZERO));
    let platform = world.create_node(None, Transform::IDENTITY).unwrap();
    world.add_body(platform, RigidBody::kinematic()).unwrap();
    let rider = world.create_node(Some(platform), at(0.0, 1.0, 0.0)).unwrap();
    let rider_body = world.add_body(rider, RigidBody::kinematic()).unwrap();
    world.step(1.0 / 60.0);

    world.set_local_transform(platform, at(3.0, 0.0, 0.0)).unwrap();
    world.step(1.0 / 60.0);
    assert_eq!(
        world.body(rider_body).map(RigidBody::position),
        Some(Vec3::new(3.0, 1.0, 0.0))
    );
    let platform_body = world.node(platform).and_then(|n| n.body());
    assert_eq!(world.body(rider_body).and_then(RigidBody::parent), platform_body);
}

fn add_wall(world: &mut PhysicsWorld, x: f32) -> rigid_core::ColliderHandle {
    let node = world.create_node(None, at(x, 0.0, 0.0)).unwrap();
    world
        .add_collider(node, Collider::new(ColliderShape::cuboid(Vec3::new(0.05, 2.0, 2.0))))
        .unwrap()
}

fn fire_bullet(ccd: bool) -> (f32, f32) {
    let mut world = PhysicsWorld::new(PhysicsConfig::default().with_gravity(Vec3::ZERO));
    add_wall(&mut world, 0.0);
    let node = world.create_node(None, at(-5.0, 0.0, 0.0)).unwrap();
    let bullet = world
        .add_body(
            node,
            RigidBody::dynamic()
                .with_ccd(ccd)
                .with_velocity(Vec3::new(600.0, 0.0, 0.0), Vec3::ZERO),
        )
        .unwrap();
    world
        .add_collider(node, Collider::new(ColliderShape::sphere(0.1)))
        .unwrap();

    world.step(1.0 / 60.0);
    let Some(body) = world.body(bullet) else {
        panic!("bullet missing");
    };
    (body.position().x, body.linear_velocity().x)
}

#[test]
fn fast_bodies_tunnel_through_thin_walls_without_ccd() {
    let (x, vx) = fire_bullet(false);
    assert!(x > 4.0, "bullet stopped at x={x}");
    assert_relative_eq!(vx, 600.0, epsilon = 1e-3);
}

#[test]
fn ccd_bodies_stop_at_the_first_thin_wall() {
    let (x, vx) = fire_bullet(true);
    assert_relative_eq!(x, -0.15, epsilon = 0.01);
    assert!(vx.abs() < 1e-3, "velocity into the wall was {vx}");
}

#[test]
fn disabling_ccd_on_the_world_lets_flagged_bodies_tunnel() {
    let mut world = PhysicsWorld::new(PhysicsConfig::default().with_gravity(Vec3::ZERO));
    world.set_ccd_enabled(false);
    add_wall(&mut world, 0.0);
    let node = world.create_node(None, at(-5.0, 0.0, 0.0)).unwrap();
    let bullet = world
        .add_body(
            node,
            RigidBody::dynamic()
                .with_ccd(true)
                .with_velocity(Vec3::new(600.0, 0.0, 0.0), Vec3::ZERO),
        )
        .unwrap();
    world
        .add_collider(node, Collider::new(ColliderShape::sphere(0.1)))
        .unwrap();
    world.step(1.0 / 60.0);
    assert!(world.body(bullet).is_some_and(|b| b.position().x > 4.0));
}

#[test]
fn sweeps_report_every_wall_in_time_order() {
    let mut world = PhysicsWorld::default();
    let near = add_wall(&mut world, 0.0);
    let far = add_wall(&mut world, 2.0);
    let node = world.create_node(None, at(-5.0, 0.0, 0.0)).unwrap();
    let ball = world
        .add_collider(node, Collider::new(ColliderShape::sphere(0.5)))
        .unwrap();
    world.flush();

    let hits = world.sweep_collider(ball, Vec3::new(10.0, 0.0, 0.0), 1.0).unwrap();
    let order: Vec<_> = hits.iter().map(|h| h.collider).collect();
    assert_eq!(order, vec![near, far]);
    assert_relative_eq!(hits[0].time, 0.445, epsilon = 2e-3);
    assert_relative_eq!(hits[1].time, 0.645, epsilon = 2e-3);
    assert!(hits.iter().all(|h| h.normal.x < -0.99 && h.penetration >= 0.0));

    assert!(world
        .sweep_collider(ball, Vec3::new(0.0, 10.0, 0.0), 1.0)
        .unwrap()
        .is_empty());

    world.remove_collider(ball).unwrap();
    world.flush();
    assert!(matches!(
        world.sweep_collider(ball, Vec3::X, 1.0),
        Err(PhysicsError::ColliderNotFound(_))
    ));
}

#[test]
fn deeply_overlapping_ellipsoids_separate_within_one_step() {
    let mut world = PhysicsWorld::new(PhysicsConfig::default().with_gravity(Vec3::ZERO));
    let mut bodies = Vec::new();
    for x in [0.0, 0.25] {
        let node = world.create_node(None, at(x, 0.0, 0.0)).unwrap();
        bodies.push(world.add_body(node, RigidBody::dynamic()).unwrap());
        world
            .add_collider(node, Collider::new(ColliderShape::ellipsoid(Vec3::ONE)))
            .unwrap();
    }

    let started = Instant::now();
    world.step(1.0 / 60.0);
    assert!(started.elapsed() < Duration::from_secs(2));

    let x: Vec<f32> = bodies
        .iter()
        .map(|&b| world.body(b).map_or(f32::NAN, |body| body.position().x))
        .collect();
    assert!(x.iter().all(|v| v.is_finite()));
    assert!(x[0] < 0.0 && x[1] > 0.25, "positions were {x:?}");
}

#[test]
fn hull_settles_on_a_height_field() {
    let mut world = PhysicsWorld::default();
    let ground = world.create_node(None, Transform::IDENTITY).unwrap();
    let field = ColliderShape::HeightField(HeightField::flat(9, 9, 1.0));
    world.add_collider(ground, Collider::new(field)).unwrap();
    let node = world.create_node(None, at(0.1, 1.0, -0.2)).unwrap();
    let hull = world.add_body(node, RigidBody::dynamic()).unwrap();
    let shape = ColliderShape::ConvexMesh(ConvexMesh::cuboid(Vec3::ZERO, Vec3::splat(0.25)));
    world.add_collider(node, Collider::new(shape)).unwrap();

    let started = Instant::now();
    for _ in 0..180 {
        world.step(1.0 / 60.0);
    }
    assert!(started.elapsed() < Duration::from_secs(20));

    let Some(body) = world.body(hull) else {
        panic!("hull missing");
    };
    let (position, velocity) = (body.position(), body.linear_velocity());
    assert!(position.y > 0.1 && position.y < 0.45, "hull at {position:?}");
    assert!(velocity.length() < 0.5, "still moving at {velocity:?}");
}
