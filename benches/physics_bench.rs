use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rigid_core::{collision::shapes::ShapeInstance, core::mesh::TriangleMesh, *};
use std::hint::black_box;

const DT: f32 = 1.0 / 60.0;

/// A static floor with `body_count` spheres stacked in loose columns above it.
fn prepare_world(body_count: usize) -> PhysicsWorld {
    let mut world = PhysicsWorld::default();
    let Ok(floor) = world.create_node(None, Transform::from_position(Vec3::new(0.0, -0.5, 0.0)))
    else {
        return world;
    };
    let _ = world.add_collider(floor, Collider::new(ColliderShape::cuboid(Vec3::new(50.0, 0.5, 50.0))));

    let side = (body_count as f32).sqrt().ceil() as usize;
    for i in 0..body_count {
        let position = Vec3::new(
            (i % side) as f32 * 1.1 - side as f32 * 0.55,
            1.0 + (i / (side * side)) as f32 * 1.1,
            ((i / side) % side) as f32 * 1.1 - side as f32 * 0.55,
        );
        let Ok(node) = world.create_node(None, Transform::from_position(position)) else {
            continue;
        };
        let _ = world.add_body(node, RigidBody::dynamic());
        let _ = world.add_collider(node, Collider::new(ColliderShape::sphere(0.5)));
    }
    world.flush();
    world
}

fn bench_world_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");
    for &count in &[128usize, 512, 2048] {
        group.bench_with_input(BenchmarkId::new("spheres", count), &count, |b, &count| {
            let mut world = prepare_world(count);
            b.iter(|| world.step(black_box(DT)))
        });
    }
    group.finish();
}

fn generate_grid_mesh(resolution: usize) -> (Vec<Vec3>, Vec<[u32; 3]>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    for y in 0..=resolution {
        for x in 0..=resolution {
            vertices.push(Vec3::new(x as f32, 0.0, y as f32));
        }
    }
    let width = resolution + 1;
    for y in 0..resolution {
        for x in 0..resolution {
            let i = y * width + x;
            let a = i as u32;
            let b = (i + 1) as u32;
            let c = (i + width) as u32;
            let d = (i + width + 1) as u32;
            indices.push([a, b, c]);
            indices.push([b, d, c]);
        }
    }
    (vertices, indices)
}

fn bench_mesh_builder(c: &mut Criterion) {
    let mut group = c.benchmark_group("mesh_builder");
    for &res in &[16usize, 32, 64] {
        group.bench_with_input(BenchmarkId::new("build", res), &res, |b, &res| {
            let (vertices, indices) = generate_grid_mesh(res);
            b.iter(|| {
                let mesh = TriangleMesh::builder(vertices.clone(), indices.clone())
                    .weld_vertices(0.001)
                    .build();
                black_box(mesh)
            })
        });
    }
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_collide");
    let table = ShapeDispatchTable::shared();
    let pairs = [
        ("sphere_sphere", ColliderShape::sphere(0.5), ColliderShape::sphere(0.5)),
        (
            "box_box",
            ColliderShape::cuboid(Vec3::splat(0.5)),
            ColliderShape::cuboid(Vec3::splat(0.5)),
        ),
        (
            "capsule_cylinder",
            ColliderShape::capsule(0.3, 0.5),
            ColliderShape::cylinder(0.4, 0.5),
        ),
    ];
    let offset = Transform::from_position(Vec3::new(0.8, 0.1, 0.0));
    for (name, a, b) in &pairs {
        let instance_a = ShapeInstance::new(a, Transform::IDENTITY);
        let instance_b = ShapeInstance::new(b, offset);
        group.bench_function(*name, |bench| {
            bench.iter(|| black_box(table.collide(&instance_a, &instance_b)))
        });
    }

    let (vertices, indices) = generate_grid_mesh(64);
    let mesh = ColliderShape::mesh(vertices, indices);
    let instance = ShapeInstance::new(&mesh, Transform::IDENTITY);
    let ray = CastShape::Ray(Ray::new(Vec3::new(31.3, 10.0, 17.7), Vec3::NEG_Y));
    group.bench_function("ray_mesh", |bench| {
        bench.iter(|| black_box(table.cast(&ray, &instance)))
    });
    group.finish();
}

criterion_group!(benches, bench_world_step, bench_mesh_builder, bench_dispatch);
criterion_main!(benches);
