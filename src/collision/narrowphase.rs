//! Collide routines. Every routine takes its two shapes in the order it was registered
//! for and returns a manifold whose normals point from the first towards the second.

use glam::Vec3;

use super::{
    clipping::{clip_polygon, rectangle_planes},
    edges::correct_internal_edges,
    gjk,
    manifold::Manifold,
    shapes::{ConvexPiece, ShapeInstance},
};
use crate::core::types::Transform;
use crate::utils::math::{
    closest_point_on_segment, closest_point_on_triangle, closest_points_between_segments,
};

/// Signature shared by every collide routine.
pub type CollideFn = fn(&ShapeInstance, &ShapeInstance) -> Option<Manifold>;

const PARALLEL_EPSILON: f32 = 0.99;

fn sign(x: f32) -> f32 {
    if x >= 0.0 {
        1.0
    } else {
        -1.0
    }
}

fn sphere_of(instance: &ShapeInstance) -> Option<(Vec3, f32)> {
    match instance.as_convex()? {
        ConvexPiece::Sphere { center, radius } => Some((center, radius)),
        _ => None,
    }
}

fn box_of(instance: &ShapeInstance) -> Option<(Transform, Vec3)> {
    match instance.as_convex()? {
        ConvexPiece::Box {
            transform,
            half_extents,
        } => Some((transform, half_extents)),
        _ => None,
    }
}

fn capsule_of(instance: &ShapeInstance) -> Option<(Vec3, Vec3, f32)> {
    match instance.as_convex()? {
        ConvexPiece::Capsule { a, b, radius } => Some((a, b, radius)),
        _ => None,
    }
}

pub fn sphere_sphere(a: &ShapeInstance, b: &ShapeInstance) -> Option<Manifold> {
    let (ca, ra) = sphere_of(a)?;
    let (cb, rb) = sphere_of(b)?;
    spheres(ca, ra, cb, rb)
}

pub fn sphere_box(a: &ShapeInstance, b: &ShapeInstance) -> Option<Manifold> {
    let (center, radius) = sphere_of(a)?;
    let (transform, half_extents) = box_of(b)?;
    sphere_obb(center, radius, &transform, half_extents)
}

pub fn sphere_capsule(a: &ShapeInstance, b: &ShapeInstance) -> Option<Manifold> {
    let (center, radius) = sphere_of(a)?;
    let (b0, b1, capsule_radius) = capsule_of(b)?;
    let closest = closest_point_on_segment(center, b0, b1);
    spheres(center, radius, closest, capsule_radius)
}

pub fn capsule_capsule(a: &ShapeInstance, b: &ShapeInstance) -> Option<Manifold> {
    let (a0, a1, ra) = capsule_of(a)?;
    let (b0, b1, rb) = capsule_of(b)?;
    capsules(a0, a1, ra, b0, b1, rb)
}

pub fn capsule_box(a: &ShapeInstance, b: &ShapeInstance) -> Option<Manifold> {
    let capsule = a.as_convex()?;
    let (a0, a1, radius) = capsule_of(a)?;
    let (transform, half_extents) = box_of(b)?;
    let obb = b.as_convex()?;
    capsule_obb(&capsule, a0, a1, radius, &obb, &transform, half_extents)
}

pub fn box_box(a: &ShapeInstance, b: &ShapeInstance) -> Option<Manifold> {
    let (ta, ha) = box_of(a)?;
    let (tb, hb) = box_of(b)?;
    boxes(&ta, ha, &tb, hb)
}

/// Any pair of convex shapes.
pub fn convex_convex(a: &ShapeInstance, b: &ShapeInstance) -> Option<Manifold> {
    let pa = a.as_convex()?;
    let pb = b.as_convex()?;
    collide_pieces(&pa, &pb)
}

/// Complex `a` against convex `b`: each overlapping piece of `a` is tested separately.
/// Triangle contacts on flat or concave seams are corrected to the face normal.
pub fn complex_convex(a: &ShapeInstance, b: &ShapeInstance) -> Option<Manifold> {
    let convex = b.as_convex()?;
    let mut manifold: Option<Manifold> = None;
    if let Some(triangles) = a.triangles_with_edges(&b.aabb) {
        for (triangle, angles) in triangles {
            if let Some(mut found) = collide_pieces(&ConvexPiece::Triangle(triangle), &convex) {
                correct_internal_edges(&mut found, &triangle, &angles);
                accumulate(&mut manifold, found);
            }
        }
        return finish(manifold);
    }
    for piece in a.pieces_overlapping(&b.aabb) {
        if let Some(found) = collide_pieces(&piece, &convex) {
            accumulate(&mut manifold, found);
        }
    }
    finish(manifold)
}

/// Complex against complex, pairing pieces whose bounds overlap.
pub fn complex_complex(a: &ShapeInstance, b: &ShapeInstance) -> Option<Manifold> {
    let pieces_a = a.pieces_overlapping(&b.aabb);
    if pieces_a.is_empty() {
        return None;
    }
    let pieces_b: Vec<_> = b
        .pieces_overlapping(&a.aabb)
        .into_iter()
        .map(|piece| (piece.bounds(), piece))
        .collect();

    let mut manifold: Option<Manifold> = None;
    for piece_a in &pieces_a {
        let bounds_a = piece_a.bounds();
        for (bounds_b, piece_b) in &pieces_b {
            if !bounds_a.overlaps(bounds_b) {
                continue;
            }
            if let Some(found) = collide_pieces(piece_a, piece_b) {
                accumulate(&mut manifold, found);
            }
        }
    }
    finish(manifold)
}

/// Coarsest tier: overlapping world bounds produce a single point along the axis of least
/// overlap.
pub fn aabb_proxy(a: &ShapeInstance, b: &ShapeInstance) -> Option<Manifold> {
    let overlap = a.aabb.max.min(b.aabb.max) - a.aabb.min.max(b.aabb.min);
    if overlap.min_element() < 0.0 {
        return None;
    }
    let axis = if overlap.x <= overlap.y && overlap.x <= overlap.z {
        0
    } else if overlap.y <= overlap.z {
        1
    } else {
        2
    };
    let mut normal = Vec3::ZERO;
    normal[axis] = sign(b.aabb.center()[axis] - a.aabb.center()[axis]);
    let center = (a.aabb.max.min(b.aabb.max) + a.aabb.min.max(b.aabb.min)) * 0.5;
    Some(Manifold::single(center, normal, overlap[axis]))
}

fn accumulate(target: &mut Option<Manifold>, found: Manifold) {
    match target {
        Some(manifold) => manifold.merge(found),
        None => *target = Some(found),
    }
}

fn finish(manifold: Option<Manifold>) -> Option<Manifold> {
    let mut manifold = manifold?;
    manifold.reduce();
    (!manifold.is_empty()).then_some(manifold)
}

/// Pairwise piece test, picking an analytic path where one exists.
pub fn collide_pieces(a: &ConvexPiece, b: &ConvexPiece) -> Option<Manifold> {
    use ConvexPiece as P;
    match (a, b) {
        (P::Sphere { center: ca, radius: ra }, P::Sphere { center: cb, radius: rb }) => {
            spheres(*ca, *ra, *cb, *rb)
        }
        (P::Sphere { center, radius }, P::Box { transform, half_extents }) => {
            sphere_obb(*center, *radius, transform, *half_extents)
        }
        (P::Box { transform, half_extents }, P::Sphere { center, radius }) => {
            sphere_obb(*center, *radius, transform, *half_extents).map(Manifold::flipped)
        }
        (P::Sphere { center, radius }, P::Triangle(triangle)) => {
            sphere_triangle(*center, *radius, triangle)
        }
        (P::Triangle(triangle), P::Sphere { center, radius }) => {
            sphere_triangle(*center, *radius, triangle).map(Manifold::flipped)
        }
        (P::Sphere { center, radius }, P::Capsule { a: b0, b: b1, radius: rb }) => {
            spheres(*center, *radius, closest_point_on_segment(*center, *b0, *b1), *rb)
        }
        (P::Capsule { a: a0, b: a1, radius: ra }, P::Sphere { center, radius }) => {
            spheres(closest_point_on_segment(*center, *a0, *a1), *ra, *center, *radius)
        }
        (P::Capsule { a: a0, b: a1, radius: ra }, P::Capsule { a: b0, b: b1, radius: rb }) => {
            capsules(*a0, *a1, *ra, *b0, *b1, *rb)
        }
        (P::Capsule { a: a0, b: a1, radius }, P::Triangle(triangle)) => {
            capsule_triangle(a, *a0, *a1, *radius, b, triangle)
        }
        (P::Triangle(triangle), P::Capsule { a: b0, b: b1, radius }) => {
            capsule_triangle(b, *b0, *b1, *radius, a, triangle).map(Manifold::flipped)
        }
        (P::Capsule { a: a0, b: a1, radius }, P::Box { transform, half_extents }) => {
            capsule_obb(a, *a0, *a1, *radius, b, transform, *half_extents)
        }
        (P::Box { transform, half_extents }, P::Capsule { a: b0, b: b1, radius }) => {
            capsule_obb(b, *b0, *b1, *radius, a, transform, *half_extents).map(Manifold::flipped)
        }
        (
            P::Box { transform: ta, half_extents: ha },
            P::Box { transform: tb, half_extents: hb },
        ) => boxes(ta, *ha, tb, *hb),
        _ => general(a, b),
    }
}

fn general(a: &ConvexPiece, b: &ConvexPiece) -> Option<Manifold> {
    let result = gjk::penetration(a, b)?;
    Some(Manifold::single(result.midpoint(), result.normal, result.depth))
}

fn spheres(ca: Vec3, ra: f32, cb: Vec3, rb: f32) -> Option<Manifold> {
    let delta = cb - ca;
    let distance_sq = delta.length_squared();
    let radii = ra + rb;
    if distance_sq > radii * radii {
        return None;
    }
    let distance = distance_sq.sqrt();
    let normal = if distance > f32::EPSILON {
        delta / distance
    } else {
        Vec3::Y
    };
    let penetration = radii - distance;
    let position = ca + normal * (ra - penetration * 0.5);
    Some(Manifold::single(position, normal, penetration))
}

fn sphere_obb(center: Vec3, radius: f32, transform: &Transform, half_extents: Vec3) -> Option<Manifold> {
    let local = transform.inverse_transform_point(center);
    let clamped = local.clamp(-half_extents, half_extents);
    let delta = local - clamped;
    let distance_sq = delta.length_squared();

    if distance_sq > f32::EPSILON {
        if distance_sq > radius * radius {
            return None;
        }
        let distance = distance_sq.sqrt();
        let outward = transform.transform_vector(delta / distance);
        let surface = transform.transform_point(clamped);
        let penetration = radius - distance;
        let deepest = center - outward * radius;
        return Some(Manifold::single((surface + deepest) * 0.5, -outward, penetration));
    }

    // Centre inside the box: push out through the nearest face.
    let gaps = half_extents - local.abs();
    let axis = if gaps.x <= gaps.y && gaps.x <= gaps.z {
        0
    } else if gaps.y <= gaps.z {
        1
    } else {
        2
    };
    let mut face = Vec3::ZERO;
    face[axis] = sign(local[axis]);
    let outward = transform.transform_vector(face);
    let mut surface_local = local;
    surface_local[axis] = face[axis] * half_extents[axis];
    let surface = transform.transform_point(surface_local);
    let penetration = radius + gaps[axis];
    Some(Manifold::single(surface, -outward, penetration))
}

fn sphere_triangle(center: Vec3, radius: f32, [a, b, c]: &[Vec3; 3]) -> Option<Manifold> {
    let closest = closest_point_on_triangle(center, *a, *b, *c);
    let delta = closest - center;
    let distance_sq = delta.length_squared();
    if distance_sq > radius * radius {
        return None;
    }
    let distance = distance_sq.sqrt();
    let normal = if distance > 1e-5 {
        delta / distance
    } else {
        let mut face = (*b - *a).cross(*c - *a).normalize_or_zero();
        if face.dot(center - *a) < 0.0 {
            face = -face;
        }
        -face
    };
    let penetration = radius - distance;
    let deepest = center + normal * radius;
    Some(Manifold::single((closest + deepest) * 0.5, normal, penetration))
}

fn capsules(a0: Vec3, a1: Vec3, ra: f32, b0: Vec3, b1: Vec3, rb: f32) -> Option<Manifold> {
    let dir_a = (a1 - a0).normalize_or_zero();
    let dir_b = (b1 - b0).normalize_or_zero();
    let parallel = dir_a != Vec3::ZERO
        && dir_b != Vec3::ZERO
        && dir_a.dot(dir_b).abs() > PARALLEL_EPSILON;

    if !parallel {
        let (p, q) = closest_points_between_segments(a0, a1, b0, b1);
        return spheres(p, ra, q, rb);
    }

    // Side-by-side capsules rest on two points: test every endpoint against the other axis.
    let mut manifold: Option<Manifold> = None;
    let candidates = [
        (closest_point_on_segment(b0, a0, a1), b0),
        (closest_point_on_segment(b1, a0, a1), b1),
        (a0, closest_point_on_segment(a0, b0, b1)),
        (a1, closest_point_on_segment(a1, b0, b1)),
    ];
    for (p, q) in candidates {
        let Some(found) = spheres(p, ra, q, rb) else {
            continue;
        };
        let duplicate = manifold.as_ref().is_some_and(|m| {
            m.points
                .iter()
                .any(|existing| existing.position.distance_squared(found.points[0].position) < 1e-6)
        });
        if !duplicate {
            accumulate(&mut manifold, found);
        }
    }
    manifold
}

fn capsule_obb(
    capsule: &ConvexPiece,
    a0: Vec3,
    a1: Vec3,
    radius: f32,
    obb: &ConvexPiece,
    transform: &Transform,
    half_extents: Vec3,
) -> Option<Manifold> {
    let mut manifold: Option<Manifold> = None;
    for end in [a0, a1] {
        if let Some(found) = sphere_obb(end, radius, transform, half_extents) {
            accumulate(&mut manifold, found);
        }
    }
    // The shaft may cut an edge deeper than either end cap.
    let deepest_end = manifold.as_ref().map_or(0.0, Manifold::max_penetration);
    if let Some(shaft) = general(capsule, obb) {
        if manifold.is_none() || shaft.max_penetration() > deepest_end + 1e-3 {
            accumulate(&mut manifold, shaft);
        }
    }
    manifold
}

fn capsule_triangle(
    capsule: &ConvexPiece,
    a0: Vec3,
    a1: Vec3,
    radius: f32,
    triangle_piece: &ConvexPiece,
    triangle: &[Vec3; 3],
) -> Option<Manifold> {
    let mut manifold: Option<Manifold> = None;
    for end in [a0, a1] {
        if let Some(found) = sphere_triangle(end, radius, triangle) {
            accumulate(&mut manifold, found);
        }
    }
    if manifold.is_none() {
        return general(capsule, triangle_piece);
    }
    manifold
}

#[derive(Debug, Clone, Copy)]
enum SeparatingAxis {
    FaceA(usize),
    FaceB(usize),
    Edge(usize, usize),
}

fn project_radius(axes: &[Vec3; 3], half_extents: Vec3, axis: Vec3) -> f32 {
    axes[0].dot(axis).abs() * half_extents.x
        + axes[1].dot(axis).abs() * half_extents.y
        + axes[2].dot(axis).abs() * half_extents.z
}

fn box_axes(transform: &Transform) -> [Vec3; 3] {
    [
        transform.rotation * Vec3::X,
        transform.rotation * Vec3::Y,
        transform.rotation * Vec3::Z,
    ]
}

/// Separating-axis test with face clipping for oriented boxes.
fn boxes(ta: &Transform, ha: Vec3, tb: &Transform, hb: Vec3) -> Option<Manifold> {
    let axes_a = box_axes(ta);
    let axes_b = box_axes(tb);
    let offset = tb.position - ta.position;

    // Returns the overlap and the axis oriented from A to B, or `None` when separated.
    let test = |axis: Vec3| -> Option<(f32, Vec3)> {
        let distance = offset.dot(axis);
        let overlap = project_radius(&axes_a, ha, axis) + project_radius(&axes_b, hb, axis)
            - distance.abs();
        (overlap >= 0.0).then(|| (overlap, axis * sign(distance)))
    };

    let mut face_a = (f32::MAX, Vec3::ZERO, 0);
    for (i, axis) in axes_a.iter().enumerate() {
        let (overlap, normal) = test(*axis)?;
        if overlap < face_a.0 {
            face_a = (overlap, normal, i);
        }
    }
    let mut face_b = (f32::MAX, Vec3::ZERO, 0);
    for (i, axis) in axes_b.iter().enumerate() {
        let (overlap, normal) = test(*axis)?;
        if overlap < face_b.0 {
            face_b = (overlap, normal, i);
        }
    }
    let mut edge = (f32::MAX, Vec3::ZERO, 0, 0);
    for (i, axis_a) in axes_a.iter().enumerate() {
        for (j, axis_b) in axes_b.iter().enumerate() {
            let Some(axis) = axis_a.cross(*axis_b).try_normalize() else {
                continue;
            };
            let (overlap, normal) = test(axis)?;
            if overlap < edge.0 {
                edge = (overlap, normal, i, j);
            }
        }
    }

    // Face axes are preferred unless clearly worse; keeps resting contacts stable.
    let (mut depth, mut normal, mut kind) = (face_a.0, face_a.1, SeparatingAxis::FaceA(face_a.2));
    if face_b.0 < 0.95 * depth - 1e-3 {
        (depth, normal, kind) = (face_b.0, face_b.1, SeparatingAxis::FaceB(face_b.2));
    }
    if edge.0 < 0.95 * depth - 1e-3 {
        (depth, normal, kind) = (edge.0, edge.1, SeparatingAxis::Edge(edge.2, edge.3));
    }

    let manifold = match kind {
        SeparatingAxis::FaceA(i) => face_contact(ta, &axes_a, ha, i, normal, tb, &axes_b, hb, normal),
        SeparatingAxis::FaceB(i) => {
            face_contact(tb, &axes_b, hb, i, -normal, ta, &axes_a, ha, normal)
        }
        SeparatingAxis::Edge(i, j) => Some(edge_contact(
            ta, &axes_a, ha, i, tb, &axes_b, hb, j, normal, depth,
        )),
    };
    manifold.or_else(|| {
        general(
            &ConvexPiece::Box {
                transform: *ta,
                half_extents: ha,
            },
            &ConvexPiece::Box {
                transform: *tb,
                half_extents: hb,
            },
        )
    })
}

/// Clips the incident face against the reference face. `face_normal` is the reference
/// face's outward normal; `normal` is the manifold normal (A to B).
#[allow(clippy::too_many_arguments)]
fn face_contact(
    reference: &Transform,
    ref_axes: &[Vec3; 3],
    ref_half: Vec3,
    ref_axis: usize,
    face_normal: Vec3,
    incident: &Transform,
    inc_axes: &[Vec3; 3],
    inc_half: Vec3,
    normal: Vec3,
) -> Option<Manifold> {
    let u_axis = (ref_axis + 1) % 3;
    let v_axis = (ref_axis + 2) % 3;
    let ref_center = reference.position + face_normal * ref_half[ref_axis];
    let planes = rectangle_planes(
        ref_center,
        ref_axes[u_axis],
        ref_axes[v_axis],
        ref_half[u_axis],
        ref_half[v_axis],
    );

    let mut inc_axis = 0;
    let mut best = f32::NEG_INFINITY;
    for (k, axis) in inc_axes.iter().enumerate() {
        let alignment = axis.dot(face_normal).abs();
        if alignment > best {
            best = alignment;
            inc_axis = k;
        }
    }
    let inc_normal = inc_axes[inc_axis] * -sign(inc_axes[inc_axis].dot(face_normal));
    let inc_center = incident.position + inc_normal * inc_half[inc_axis];
    let u = inc_axes[(inc_axis + 1) % 3] * inc_half[(inc_axis + 1) % 3];
    let v = inc_axes[(inc_axis + 2) % 3] * inc_half[(inc_axis + 2) % 3];
    let polygon = [
        inc_center + u + v,
        inc_center - u + v,
        inc_center - u - v,
        inc_center + u - v,
    ];

    let mut manifold = Manifold::new(normal);
    for point in clip_polygon(&polygon, &planes) {
        let separation = face_normal.dot(point - ref_center);
        if separation <= 0.0 {
            let depth = -separation;
            manifold.push(point + face_normal * (depth * 0.5), normal, depth);
        }
    }
    manifold.reduce();
    (!manifold.is_empty()).then_some(manifold)
}

#[allow(clippy::too_many_arguments)]
fn edge_contact(
    ta: &Transform,
    axes_a: &[Vec3; 3],
    ha: Vec3,
    i: usize,
    tb: &Transform,
    axes_b: &[Vec3; 3],
    hb: Vec3,
    j: usize,
    normal: Vec3,
    depth: f32,
) -> Manifold {
    let support_edge = |position: Vec3, axes: &[Vec3; 3], half: Vec3, along: usize, toward: Vec3| {
        let mut center = position;
        for k in 0..3 {
            if k != along {
                center += axes[k] * half[k] * sign(axes[k].dot(toward));
            }
        }
        (center - axes[along] * half[along], center + axes[along] * half[along])
    };
    let (p0, p1) = support_edge(ta.position, axes_a, ha, i, normal);
    let (q0, q1) = support_edge(tb.position, axes_b, hb, j, -normal);
    let (p, q) = closest_points_between_segments(p0, p1, q0, q1);
    Manifold::single((p + q) * 0.5, normal, depth)
}
