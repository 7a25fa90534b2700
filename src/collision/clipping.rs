use glam::Vec3;

use super::primitives::Plane;

const EPSILON: f32 = 1e-4;

/// Clips a convex polygon against inward-facing planes (Sutherland-Hodgman).
pub fn clip_polygon(vertices: &[Vec3], planes: &[Plane]) -> Vec<Vec3> {
    let mut output = vertices.to_vec();
    for plane in planes {
        output = clip_against_plane(&output, plane);
        if output.is_empty() {
            break;
        }
    }
    output
}

fn clip_against_plane(vertices: &[Vec3], plane: &Plane) -> Vec<Vec3> {
    if vertices.is_empty() {
        return Vec::new();
    }

    let mut clipped = Vec::with_capacity(vertices.len() + 1);
    for i in 0..vertices.len() {
        let current = vertices[i];
        let next = vertices[(i + 1) % vertices.len()];

        let current_dist = plane.signed_distance(current);
        let next_dist = plane.signed_distance(next);

        let current_inside = current_dist >= -EPSILON;
        let next_inside = next_dist >= -EPSILON;

        match (current_inside, next_inside) {
            (true, true) => clipped.push(next),
            (true, false) => {
                if let Some(hit) = line_plane_intersection(current, next, current_dist, next_dist) {
                    clipped.push(hit);
                }
            }
            (false, true) => {
                if let Some(hit) = line_plane_intersection(current, next, current_dist, next_dist) {
                    clipped.push(hit);
                }
                clipped.push(next);
            }
            (false, false) => {}
        }
    }

    clipped
}

fn line_plane_intersection(start: Vec3, end: Vec3, start_dist: f32, end_dist: f32) -> Option<Vec3> {
    let denom = start_dist - end_dist;
    if denom.abs() <= f32::EPSILON {
        return None;
    }
    let t = start_dist / denom;
    Some(start + (end - start) * t)
}

/// Four inward planes bounding a rectangle with the given tangents and half extents.
pub fn rectangle_planes(
    center: Vec3,
    tangent_u: Vec3,
    tangent_v: Vec3,
    half_u: f32,
    half_v: f32,
) -> [Plane; 4] {
    [
        Plane::from_point_normal(center + tangent_u * half_u, -tangent_u),
        Plane::from_point_normal(center - tangent_u * half_u, tangent_u),
        Plane::from_point_normal(center + tangent_v * half_v, -tangent_v),
        Plane::from_point_normal(center - tangent_v * half_v, tangent_v),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_clipped_by_smaller_rectangle() {
        let square = [
            Vec3::new(-2.0, 0.0, -2.0),
            Vec3::new(2.0, 0.0, -2.0),
            Vec3::new(2.0, 0.0, 2.0),
            Vec3::new(-2.0, 0.0, 2.0),
        ];
        let planes = rectangle_planes(Vec3::ZERO, Vec3::X, Vec3::Z, 1.0, 1.0);
        let clipped = clip_polygon(&square, &planes);
        assert_eq!(clipped.len(), 4);
        for point in clipped {
            assert!(point.x.abs() <= 1.0 + 1e-4 && point.z.abs() <= 1.0 + 1e-4);
        }
    }

    #[test]
    fn disjoint_polygon_clips_to_nothing() {
        let far = [
            Vec3::new(5.0, 0.0, 5.0),
            Vec3::new(6.0, 0.0, 5.0),
            Vec3::new(6.0, 0.0, 6.0),
        ];
        let planes = rectangle_planes(Vec3::ZERO, Vec3::X, Vec3::Z, 1.0, 1.0);
        assert!(clip_polygon(&far, &planes).is_empty());
    }
}
