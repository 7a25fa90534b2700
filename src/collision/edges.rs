//! Internal-edge correction for contacts against triangle meshes and height fields.
//!
//! A convex shape sliding across a flat or concave seam between two triangles can touch the
//! seam edge before the neighbouring face, which yields a tilted normal and a visible bump.
//! Contacts on such edges are snapped back to the face normal. Edges that fold away from the
//! face (convex) or sit on the rim of the surface keep the normal the collide routine produced.

use glam::Vec3;

use super::manifold::Manifold;
use crate::utils::math::{closest_point_on_segment, closest_point_on_triangle};

/// Radians. Convex folds at or below this are treated as flat.
pub const CONVEX_EDGE_THRESHOLD: f32 = 0.05;

const FEATURE_TOLERANCE: f32 = 1e-3;
const ALIGNED: f32 = 1.0 - 1e-4;

/// Rewrites the normals of `manifold` that came from an inactive edge of `triangle`.
/// Normals point from the triangle towards the other shape; `angles` are the dihedral angles
/// across the triangle's edges, edge `k` running from vertex `k` to vertex `k + 1`.
pub fn correct_internal_edges(manifold: &mut Manifold, triangle: &[Vec3; 3], angles: &[f32; 3]) {
    let [a, b, c] = *triangle;
    let face = (b - a).cross(c - a).normalize_or_zero();
    if face == Vec3::ZERO {
        return;
    }

    let mut corrected = false;
    for point in &mut manifold.points {
        let alignment = point.normal.dot(face);
        // Back-face contacts and face contacts are left alone.
        if alignment <= 0.0 || alignment >= ALIGNED {
            continue;
        }
        let on_surface = closest_point_on_triangle(point.position, a, b, c);
        let tolerance = 0.5 * point.penetration.abs() + FEATURE_TOLERANCE;
        let mut touched = false;
        let mut active = false;
        for edge in 0..3 {
            let (p, q) = (triangle[edge], triangle[(edge + 1) % 3]);
            if closest_point_on_segment(on_surface, p, q).distance(on_surface) <= tolerance {
                touched = true;
                active |= angles[edge] > CONVEX_EDGE_THRESHOLD;
            }
        }
        if touched && !active {
            point.normal = face;
            corrected = true;
        }
    }

    if corrected {
        if let Some(deepest) = manifold
            .points
            .iter()
            .max_by(|x, y| x.penetration.total_cmp(&y.penetration))
        {
            manifold.normal = deepest.normal;
        }
        log::trace!("internal edge contact snapped to face normal {face}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh::BOUNDARY_EDGE_ANGLE;

    const TRIANGLE: [Vec3; 3] = [
        Vec3::new(-1.0, 0.0, -1.0),
        Vec3::new(-1.0, 0.0, 1.0),
        Vec3::new(1.0, 0.0, 1.0),
    ];

    /// Contact on the diagonal edge (vertex 2 to vertex 0) tilted towards +X.
    fn diagonal_contact() -> Manifold {
        let tilted = Vec3::new(0.3, 0.9, -0.3).normalize();
        Manifold::single(Vec3::new(0.0, 0.01, 0.0) + tilted * 0.01, tilted, 0.02)
    }

    #[test]
    fn flat_seams_use_the_face_normal() {
        let mut manifold = diagonal_contact();
        let angles = [BOUNDARY_EDGE_ANGLE, BOUNDARY_EDGE_ANGLE, 0.0];
        correct_internal_edges(&mut manifold, &TRIANGLE, &angles);
        assert!(manifold.normal.y > 0.9999, "normal was {:?}", manifold.normal);
        assert!(manifold.points[0].normal.y > 0.9999);
        assert!((manifold.points[0].penetration - 0.02).abs() < 1e-6);
    }

    #[test]
    fn concave_seams_use_the_face_normal() {
        let mut manifold = diagonal_contact();
        correct_internal_edges(&mut manifold, &TRIANGLE, &[0.0, 0.0, -0.4]);
        assert!(manifold.normal.y > 0.9999);
    }

    #[test]
    fn convex_and_rim_edges_keep_their_normal() {
        let before = diagonal_contact();
        for angles in [[0.0, 0.0, 0.6], [0.0, 0.0, BOUNDARY_EDGE_ANGLE]] {
            let mut manifold = before.clone();
            correct_internal_edges(&mut manifold, &TRIANGLE, &angles);
            assert_eq!(manifold, before);
        }
    }

    #[test]
    fn interior_points_are_untouched() {
        let tilted = Vec3::new(0.3, 0.9, 0.0).normalize();
        let before = Manifold::single(Vec3::new(-0.5, 0.0, 0.4), tilted, 0.01);
        let mut manifold = before.clone();
        correct_internal_edges(&mut manifold, &TRIANGLE, &[0.0; 3]);
        assert_eq!(manifold, before);
    }
}
