use approx::assert_relative_eq;
use rigid_core::{
    dynamics::{integrate_position, integrate_velocity},
    Collider, ColliderShape, DragForce, PhysicsConfig, PhysicsEngine, PhysicsWorld, RigidBody,
    Transform, Vec3,
};

#[test]
fn integrating_without_input_changes_nothing() {
    let mut body = RigidBody::dynamic();
    let pose = body.pose();
    let velocity = body.velocity();
    for _ in 0..100 {
        integrate_velocity(&mut body, 1.0 / 60.0);
        integrate_position(&mut body, 1.0 / 60.0);
    }
    assert_eq!(body.pose(), pose);
    assert_eq!(body.velocity(), velocity);
}

#[test]
fn constant_velocity_is_integrated_exactly() {
    let mut body = RigidBody::dynamic().with_velocity(Vec3::new(2.0, 0.0, -1.0), Vec3::ZERO);
    for _ in 0..10 {
        integrate_velocity(&mut body, 0.1);
        integrate_position(&mut body, 0.1);
    }
    assert_relative_eq!(body.position().x, 2.0, epsilon = 1e-5);
    assert_relative_eq!(body.position().z, -1.0, epsilon = 1e-5);
}

#[test]
fn drag_slows_a_free_body() {
    let mut world = PhysicsWorld::new(PhysicsConfig::default().with_gravity(Vec3::ZERO));
    let node = world.create_node(None, Transform::IDENTITY).unwrap();
    let body = world
        .add_body(node, RigidBody::dynamic().with_velocity(Vec3::new(10.0, 0.0, 0.0), Vec3::ZERO))
        .unwrap();
    world
        .add_collider(node, Collider::new(ColliderShape::sphere(0.5)))
        .unwrap();
    world.forces_mut().add_force(DragForce {
        drag_coefficient: 0.5,
    });

    world.step(1.0 / 60.0);
    let speed = world.body(body).map_or(0.0, |b| b.linear_velocity().x);
    assert!(speed < 10.0 && speed > 0.0, "speed {speed}");
}

#[test]
fn sub_steps_split_the_frame() {
    let config = PhysicsConfig::default().with_sub_steps(4);
    let mut world = PhysicsWorld::new(config);
    let node = world
        .create_node(None, Transform::from_position(Vec3::new(0.0, 10.0, 0.0)))
        .unwrap();
    let body = world.add_body(node, RigidBody::dynamic()).unwrap();

    world.step(0.4);
    let velocity = world.body(body).map_or(0.0, |b| b.linear_velocity().y);
    assert_relative_eq!(velocity, -9.81 * 0.4, epsilon = 1e-4);
    let position = world.body(body).map_or(0.0, |b| b.position().y);
    assert_relative_eq!(position, 10.0 - 0.5 * 9.81 * 0.4 * 0.4, epsilon = 1e-3);
}

#[test]
fn engine_runs_whole_fixed_steps() {
    let mut engine = PhysicsEngine::new(PhysicsConfig::default(), 0.01);
    assert_eq!(engine.advance(0.035), 3);
    assert_relative_eq!(engine.alpha(), 0.5, epsilon = 1e-3);
    assert_eq!(engine.advance(0.006), 1);
    assert_eq!(engine.advance(-1.0), 0);
}
