//! Cast routines: a query volume tested against one placed shape.

use glam::Vec3;

use super::{
    gjk,
    primitives::{CastHit, CastShape},
    shapes::{ConvexPiece, ShapeInstance},
};
use crate::core::{collider::ColliderShape, mesh::Aabb};

/// Signature shared by every cast routine.
pub type CastFn = fn(&CastShape, &ShapeInstance) -> Option<CastHit>;

/// Line cast expressed in the shape's local frame.
struct LocalLine {
    origin: Vec3,
    direction: Vec3,
    max_t: f32,
}

fn local_line(cast: &CastShape, instance: &ShapeInstance) -> Option<LocalLine> {
    let (origin, direction, max_t) = cast.line()?;
    Some(LocalLine {
        origin: instance.transform.inverse_transform_point(origin),
        direction: instance.transform.inverse_transform_vector(direction),
        max_t,
    })
}

/// Converts a local hit back to world space.
fn world_hit(cast: &CastShape, instance: &ShapeInstance, t: f32, local_normal: Vec3) -> Option<CastHit> {
    let (origin, direction, _) = cast.line()?;
    Some(CastHit {
        distance: t,
        point: origin + direction * t,
        normal: instance.transform.transform_vector(local_normal),
    })
}

fn pick(best: &mut Option<(f32, Vec3)>, t: f32, normal: Vec3) {
    if best.map_or(true, |(best_t, _)| t < best_t) {
        *best = Some((t, normal));
    }
}

/// Entry parameter of a line against a sphere at `center`; zero when starting inside.
fn line_sphere(line: &LocalLine, center: Vec3, radius: f32) -> Option<(f32, Vec3)> {
    let offset = line.origin - center;
    let b = offset.dot(line.direction);
    let c = offset.length_squared() - radius * radius;
    if c <= 0.0 {
        return Some((0.0, -line.direction));
    }
    if b > 0.0 {
        return None;
    }
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let t = -b - discriminant.sqrt();
    if t > line.max_t {
        return None;
    }
    let normal = (offset + line.direction * t).normalize_or_zero();
    Some((t, normal))
}

/// Side wall of an infinite Y-aligned cylinder, limited to `|y| <= half_height`.
fn line_cylinder_wall(line: &LocalLine, radius: f32, half_height: f32) -> Option<(f32, Vec3)> {
    let (o, d) = (line.origin, line.direction);
    let a = d.x * d.x + d.z * d.z;
    if a < 1e-10 {
        return None;
    }
    let b = o.x * d.x + o.z * d.z;
    let c = o.x * o.x + o.z * o.z - radius * radius;
    let discriminant = b * b - a * c;
    if discriminant < 0.0 {
        return None;
    }
    let t = (-b - discriminant.sqrt()) / a;
    if t < 0.0 || t > line.max_t {
        return None;
    }
    let p = o + d * t;
    if p.y.abs() > half_height {
        return None;
    }
    Some((t, Vec3::new(p.x, 0.0, p.z) / radius))
}

pub fn line_sphere_shape(cast: &CastShape, instance: &ShapeInstance) -> Option<CastHit> {
    let ColliderShape::Sphere { radius } = instance.shape else {
        return None;
    };
    let line = local_line(cast, instance)?;
    let (t, normal) = line_sphere(&line, Vec3::ZERO, *radius)?;
    world_hit(cast, instance, t, normal)
}

pub fn line_box(cast: &CastShape, instance: &ShapeInstance) -> Option<CastHit> {
    let ColliderShape::Box { half_extents } = instance.shape else {
        return None;
    };
    let line = local_line(cast, instance)?;
    let (o, d) = (line.origin, line.direction);
    let mut t_min = 0.0_f32;
    let mut t_max = line.max_t;
    let mut normal = -d;
    for axis in 0..3 {
        if d[axis].abs() < 1e-8 {
            if o[axis].abs() > half_extents[axis] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d[axis];
        let mut near = (-half_extents[axis] - o[axis]) * inv;
        let mut far = (half_extents[axis] - o[axis]) * inv;
        let mut face = -1.0;
        if near > far {
            std::mem::swap(&mut near, &mut far);
            face = 1.0;
        }
        if near > t_min {
            t_min = near;
            normal = Vec3::ZERO;
            normal[axis] = face;
        }
        t_max = t_max.min(far);
        if t_min > t_max {
            return None;
        }
    }
    world_hit(cast, instance, t_min, normal)
}

pub fn line_capsule(cast: &CastShape, instance: &ShapeInstance) -> Option<CastHit> {
    let ColliderShape::Capsule {
        radius,
        half_height,
    } = instance.shape
    else {
        return None;
    };
    let line = local_line(cast, instance)?;
    let top = Vec3::new(0.0, *half_height, 0.0);
    let axis_point = crate::utils::math::closest_point_on_segment(line.origin, -top, top);
    if axis_point.distance_squared(line.origin) <= radius * radius {
        return world_hit(cast, instance, 0.0, -line.direction);
    }
    let mut best = None;
    if let Some((t, n)) = line_cylinder_wall(&line, *radius, *half_height) {
        pick(&mut best, t, n);
    }
    for cap in [top, -top] {
        if let Some((t, n)) = line_sphere(&line, cap, *radius) {
            pick(&mut best, t, n);
        }
    }
    let (t, normal) = best?;
    world_hit(cast, instance, t, normal)
}

pub fn line_cylinder(cast: &CastShape, instance: &ShapeInstance) -> Option<CastHit> {
    let ColliderShape::Cylinder {
        radius,
        half_height,
    } = instance.shape
    else {
        return None;
    };
    let line = local_line(cast, instance)?;
    let (o, d) = (line.origin, line.direction);
    if o.y.abs() <= *half_height && o.x * o.x + o.z * o.z <= radius * radius {
        return world_hit(cast, instance, 0.0, -d);
    }
    let mut best = line_cylinder_wall(&line, *radius, *half_height);
    if d.y.abs() > 1e-8 {
        for side in [1.0_f32, -1.0] {
            let t = (side * half_height - o.y) / d.y;
            if t < 0.0 || t > line.max_t {
                continue;
            }
            let p = o + d * t;
            if p.x * p.x + p.z * p.z <= radius * radius {
                pick(&mut best, t, Vec3::new(0.0, side, 0.0));
            }
        }
    }
    let (t, normal) = best?;
    world_hit(cast, instance, t, normal)
}

pub fn line_ellipsoid(cast: &CastShape, instance: &ShapeInstance) -> Option<CastHit> {
    let ColliderShape::Ellipsoid { radii } = instance.shape else {
        return None;
    };
    let line = local_line(cast, instance)?;
    let o = line.origin / *radii;
    let d = line.direction / *radii;
    let a = d.length_squared();
    let b = o.dot(d);
    let c = o.length_squared() - 1.0;
    if c <= 0.0 {
        return world_hit(cast, instance, 0.0, -line.direction);
    }
    let discriminant = b * b - a * c;
    if b > 0.0 || discriminant < 0.0 {
        return None;
    }
    let t = (-b - discriminant.sqrt()) / a;
    if t > line.max_t {
        return None;
    }
    let p = line.origin + line.direction * t;
    let normal = (p / (*radii * *radii)).normalize_or_zero();
    world_hit(cast, instance, t, normal)
}

/// Hulls, multi-hulls, triangle meshes and height fields: each answers in its local frame.
pub fn line_complex(cast: &CastShape, instance: &ShapeInstance) -> Option<CastHit> {
    let line = local_line(cast, instance)?;
    let (o, d, max_t) = (line.origin, line.direction, line.max_t);
    let (t, normal) = match instance.shape {
        ColliderShape::ConvexMesh(hull) => hull.cast_ray(o, d, max_t),
        ColliderShape::MultiConvexMesh(multi) => multi.cast_ray(o, d, max_t),
        ColliderShape::TriangleMesh(mesh) => mesh.cast_ray(o, d, max_t),
        ColliderShape::HeightField(field) => field.cast_ray(o, d, max_t),
        _ => None,
    }?;
    world_hit(cast, instance, t, normal)
}

fn volume_piece(cast: &CastShape) -> Option<ConvexPiece<'static>> {
    match cast {
        CastShape::Aabb(aabb) => Some(ConvexPiece::Box {
            transform: crate::core::types::Transform::from_position(aabb.center()),
            half_extents: aabb.extent(),
        }),
        CastShape::Sphere(sphere) => Some(ConvexPiece::Sphere {
            center: sphere.center,
            radius: sphere.radius,
        }),
        _ => None,
    }
}

fn volume_bounds(cast: &CastShape) -> Option<Aabb> {
    match cast {
        CastShape::Aabb(aabb) => Some(*aabb),
        CastShape::Sphere(sphere) => Some(sphere.aabb()),
        _ => None,
    }
}

/// Box or sphere volume against any shape, decomposing complex shapes into pieces.
pub fn volume_overlap(cast: &CastShape, instance: &ShapeInstance) -> Option<CastHit> {
    let volume = volume_piece(cast)?;
    let bounds = volume_bounds(cast)?;
    if !bounds.overlaps(&instance.aabb) {
        return None;
    }
    instance
        .pieces_overlapping(&bounds)
        .iter()
        .any(|piece| gjk::intersects(&volume, piece))
        .then(|| CastHit::overlap(instance.transform.position))
}

pub fn frustum_sphere(cast: &CastShape, instance: &ShapeInstance) -> Option<CastHit> {
    let (CastShape::Frustum(frustum), ColliderShape::Sphere { radius }) = (cast, instance.shape) else {
        return None;
    };
    frustum
        .intersects_sphere(instance.transform.position, *radius)
        .then(|| CastHit::overlap(instance.transform.position))
}

pub fn frustum_box(cast: &CastShape, instance: &ShapeInstance) -> Option<CastHit> {
    let (CastShape::Frustum(frustum), ColliderShape::Box { half_extents }) = (cast, instance.shape) else {
        return None;
    };
    let rotation = instance.transform.rotation;
    let axes = [rotation * Vec3::X, rotation * Vec3::Y, rotation * Vec3::Z];
    frustum
        .intersects_obb(instance.transform.position, axes, *half_extents)
        .then(|| CastHit::overlap(instance.transform.position))
}

pub fn frustum_hull(cast: &CastShape, instance: &ShapeInstance) -> Option<CastHit> {
    let CastShape::Frustum(frustum) = cast else {
        return None;
    };
    let transform = instance.transform;
    let hull_hit = |vertices: &[Vec3]| {
        frustum.intersects_points(vertices.iter().map(|v| transform.transform_point(*v)))
    };
    let hit = match instance.shape {
        ColliderShape::ConvexMesh(hull) => hull_hit(&hull.vertices),
        ColliderShape::MultiConvexMesh(multi) => {
            multi.hulls.iter().any(|hull| hull_hit(&hull.vertices))
        }
        _ => false,
    };
    hit.then(|| CastHit::overlap(transform.position))
}

/// Fallback tier: the query is tested against the shape's world bounds only.
pub fn aabb_fallback(cast: &CastShape, instance: &ShapeInstance) -> Option<CastHit> {
    let t = cast.test_aabb(&instance.aabb)?;
    match cast.line() {
        Some((origin, direction, _)) => {
            let point = origin + direction * t;
            Some(CastHit {
                distance: t,
                point,
                normal: aabb_face_normal(&instance.aabb, point),
            })
        }
        None => Some(CastHit::overlap(instance.aabb.center())),
    }
}

fn aabb_face_normal(aabb: &Aabb, point: Vec3) -> Vec3 {
    let extent = aabb.extent().max(Vec3::splat(1e-6));
    let local = (point - aabb.center()) / extent;
    let abs = local.abs();
    let mut normal = Vec3::ZERO;
    let axis = if abs.x >= abs.y && abs.x >= abs.z {
        0
    } else if abs.y >= abs.z {
        1
    } else {
        2
    };
    normal[axis] = local[axis].signum();
    normal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::primitives::{BoundingSphere, Frustum, Ray, Segment};
    use crate::core::{types::Transform, HeightField};
    use glam::Quat;

    fn place(shape: &ColliderShape, position: Vec3) -> ShapeInstance<'_> {
        ShapeInstance::new(shape, Transform::from_position(position))
    }

    fn down_ray(x: f32, z: f32) -> CastShape {
        CastShape::Ray(Ray::new(Vec3::new(x, 10.0, z), Vec3::NEG_Y))
    }

    #[test]
    fn ray_hits_sphere_top() {
        let shape = ColliderShape::sphere(1.0);
        let hit = line_sphere_shape(&down_ray(0.0, 0.0), &place(&shape, Vec3::ZERO))
            .expect("ray must hit");
        assert!((hit.distance - 9.0).abs() < 1e-4);
        assert!((hit.normal - Vec3::Y).length() < 1e-4);
    }

    #[test]
    fn ray_hits_rotated_box_face() {
        let shape = ColliderShape::cuboid(Vec3::new(1.0, 2.0, 1.0));
        let instance = ShapeInstance::new(
            &shape,
            Transform::new(Vec3::ZERO, Quat::from_rotation_z(std::f32::consts::FRAC_PI_2)),
        );
        let hit = line_box(&down_ray(0.0, 0.0), &instance).expect("ray must hit");
        assert!((hit.distance - 9.0).abs() < 1e-4, "distance was {}", hit.distance);
        assert!(hit.normal.y > 0.99);
    }

    #[test]
    fn segment_stops_short() {
        let shape = ColliderShape::sphere(1.0);
        let cast = CastShape::Segment(Segment::new(Vec3::new(0.0, 10.0, 0.0), Vec3::new(0.0, 5.0, 0.0)));
        assert!(line_sphere_shape(&cast, &place(&shape, Vec3::ZERO)).is_none());
    }

    #[test]
    fn ray_hits_capsule_cap_and_wall() {
        let shape = ColliderShape::capsule(0.5, 1.0);
        let instance = place(&shape, Vec3::ZERO);
        let cap = line_capsule(&down_ray(0.0, 0.0), &instance).expect("cap hit");
        assert!((cap.distance - 8.5).abs() < 1e-4);
        let side = CastShape::Ray(Ray::new(Vec3::new(-5.0, 0.2, 0.0), Vec3::X));
        let wall = line_capsule(&side, &instance).expect("wall hit");
        assert!((wall.distance - 4.5).abs() < 1e-4);
        assert!(wall.normal.x < -0.99);
    }

    #[test]
    fn ray_hits_cylinder_cap() {
        let shape = ColliderShape::cylinder(1.0, 0.5);
        let hit = line_cylinder(&down_ray(0.3, 0.3), &place(&shape, Vec3::ZERO)).expect("cap hit");
        assert!((hit.distance - 9.5).abs() < 1e-4);
        assert!(hit.normal.y > 0.99);
    }

    #[test]
    fn ray_hits_ellipsoid() {
        let shape = ColliderShape::ellipsoid(Vec3::new(2.0, 3.0, 1.0));
        let hit = line_ellipsoid(&down_ray(0.0, 0.0), &place(&shape, Vec3::ZERO)).expect("hit");
        assert!((hit.distance - 7.0).abs() < 1e-4);
    }

    #[test]
    fn ray_hits_height_field() {
        let shape = ColliderShape::HeightField(HeightField::flat(5, 5, 1.0));
        let hit = line_complex(&down_ray(0.3, 0.6), &place(&shape, Vec3::new(0.0, 1.0, 0.0)))
            .expect("hit");
        assert!((hit.distance - 9.0).abs() < 1e-4);
    }

    #[test]
    fn sphere_volume_overlaps_box() {
        let shape = ColliderShape::cuboid(Vec3::ONE);
        let instance = place(&shape, Vec3::ZERO);
        let near = CastShape::Sphere(BoundingSphere::new(Vec3::new(1.4, 0.0, 0.0), 0.5));
        let far = CastShape::Sphere(BoundingSphere::new(Vec3::new(1.6, 0.0, 0.0), 0.5));
        assert!(volume_overlap(&near, &instance).is_some());
        assert!(volume_overlap(&far, &instance).is_none());
    }

    #[test]
    fn frustum_falls_back_to_bounds() {
        let shape = ColliderShape::capsule(0.5, 1.0);
        let frustum = Frustum::from_aabb(&Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)));
        let cast = CastShape::Frustum(frustum);
        assert!(aabb_fallback(&cast, &place(&shape, Vec3::new(1.2, 0.0, 0.0))).is_some());
        assert!(aabb_fallback(&cast, &place(&shape, Vec3::new(3.0, 0.0, 0.0))).is_none());
    }
}
