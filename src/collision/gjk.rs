//! Gilbert-Johnson-Keerthi intersection test with Expanding Polytope penetration depth.

use glam::Vec3;

use super::shapes::SupportMap;

const MAX_ITERATIONS: usize = 32;
const EPA_MAX_ITERATIONS: usize = 64;
const EPA_MAX_FACES: usize = 256;
const EPSILON: f32 = 1e-6;
const EPA_TOLERANCE: f32 = 1e-4;

/// Minkowski-difference vertex remembering the support point on A that produced it.
#[derive(Debug, Clone, Copy)]
struct Vertex {
    point: Vec3,
    support_a: Vec3,
}

fn support<A: SupportMap + ?Sized, B: SupportMap + ?Sized>(a: &A, b: &B, direction: Vec3) -> Vertex {
    let support_a = a.support(direction);
    let support_b = b.support(-direction);
    Vertex {
        point: support_a - support_b,
        support_a,
    }
}

/// Penetration between two overlapping convex shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penetration {
    /// Unit normal pointing from A towards B.
    pub normal: Vec3,
    pub depth: f32,
    /// Deepest point of A inside B.
    pub point_a: Vec3,
    /// Deepest point of B inside A.
    pub point_b: Vec3,
}

impl Penetration {
    pub fn midpoint(&self) -> Vec3 {
        (self.point_a + self.point_b) * 0.5
    }
}

/// Boolean overlap test.
pub fn intersects<A: SupportMap + ?Sized, B: SupportMap + ?Sized>(a: &A, b: &B) -> bool {
    run_gjk(a, b).is_some()
}

/// Penetration depth and normal, or `None` when the shapes are separated.
pub fn penetration<A: SupportMap + ?Sized, B: SupportMap + ?Sized>(a: &A, b: &B) -> Option<Penetration> {
    let mut simplex = run_gjk(a, b)?;
    if !complete_simplex(a, b, &mut simplex) {
        return Some(fallback(a, b));
    }
    Some(
        Epa::new(&simplex)
            .and_then(|epa| epa.solve(a, b))
            .unwrap_or_else(|| fallback(a, b)),
    )
}

/// Returns the terminating simplex (newest vertex first) when the origin is enclosed.
fn run_gjk<A: SupportMap + ?Sized, B: SupportMap + ?Sized>(a: &A, b: &B) -> Option<Vec<Vertex>> {
    let mut direction = b.center() - a.center();
    if direction.length_squared() < EPSILON {
        direction = Vec3::X;
    }
    let first = support(a, b, direction);
    let mut simplex = vec![first];
    direction = -first.point;

    for _ in 0..MAX_ITERATIONS {
        if direction.length_squared() < EPSILON * EPSILON {
            // Origin lies on the current simplex: touching contact.
            return Some(simplex);
        }
        let vertex = support(a, b, direction);
        if vertex.point.dot(direction) < 0.0 {
            return None;
        }
        simplex.insert(0, vertex);
        if next_simplex(&mut simplex, &mut direction) {
            return Some(simplex);
        }
    }
    // Did not converge; treat as a grazing contact.
    Some(simplex)
}

fn same_direction(a: Vec3, b: Vec3) -> bool {
    a.dot(b) > 0.0
}

fn next_simplex(simplex: &mut Vec<Vertex>, direction: &mut Vec3) -> bool {
    match simplex.len() {
        2 => line_case(simplex, direction),
        3 => triangle_case(simplex, direction),
        4 => tetrahedron_case(simplex, direction),
        _ => false,
    }
}

fn line_case(simplex: &mut Vec<Vertex>, direction: &mut Vec3) -> bool {
    let a = simplex[0].point;
    let b = simplex[1].point;
    let ab = b - a;
    let ao = -a;
    if same_direction(ab, ao) {
        let perpendicular = ab.cross(ao).cross(ab);
        if perpendicular.length_squared() < EPSILON * EPSILON {
            // Origin on the segment.
            *direction = Vec3::ZERO;
            return false;
        }
        *direction = perpendicular;
    } else {
        simplex.truncate(1);
        *direction = ao;
    }
    false
}

fn triangle_case(simplex: &mut Vec<Vertex>, direction: &mut Vec3) -> bool {
    let (a, b, c) = (simplex[0], simplex[1], simplex[2]);
    let ab = b.point - a.point;
    let ac = c.point - a.point;
    let ao = -a.point;
    let abc = ab.cross(ac);

    if same_direction(abc.cross(ac), ao) {
        if same_direction(ac, ao) {
            *simplex = vec![a, c];
            *direction = ac.cross(ao).cross(ac);
            return false;
        }
        *simplex = vec![a, b];
        return line_case(simplex, direction);
    }
    if same_direction(ab.cross(abc), ao) {
        *simplex = vec![a, b];
        return line_case(simplex, direction);
    }
    let offset = abc.dot(ao);
    if offset.abs() < EPSILON {
        // Origin in the triangle plane.
        *direction = Vec3::ZERO;
    } else if offset > 0.0 {
        *direction = abc;
    } else {
        *simplex = vec![a, c, b];
        *direction = -abc;
    }
    false
}

fn tetrahedron_case(simplex: &mut Vec<Vertex>, direction: &mut Vec3) -> bool {
    let (a, b, c, d) = (simplex[0], simplex[1], simplex[2], simplex[3]);
    let ab = b.point - a.point;
    let ac = c.point - a.point;
    let ad = d.point - a.point;
    let ao = -a.point;

    if same_direction(ab.cross(ac), ao) {
        *simplex = vec![a, b, c];
        return triangle_case(simplex, direction);
    }
    if same_direction(ac.cross(ad), ao) {
        *simplex = vec![a, c, d];
        return triangle_case(simplex, direction);
    }
    if same_direction(ad.cross(ab), ao) {
        *simplex = vec![a, d, b];
        return triangle_case(simplex, direction);
    }
    true
}

/// Grows a touching simplex into a tetrahedron with volume so EPA can start.
fn complete_simplex<A: SupportMap + ?Sized, B: SupportMap + ?Sized>(
    a: &A,
    b: &B,
    simplex: &mut Vec<Vertex>,
) -> bool {
    const AXES: [Vec3; 6] = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];

    if simplex.len() == 4 && tetrahedron_volume(simplex) > EPSILON {
        return true;
    }
    simplex.truncate(3);

    if simplex.len() == 1 {
        for axis in AXES {
            let vertex = support(a, b, axis);
            if vertex.point.distance_squared(simplex[0].point) > EPSILON {
                simplex.push(vertex);
                break;
            }
        }
    }
    if simplex.len() == 2 {
        let line = simplex[1].point - simplex[0].point;
        let (u, v) = crate::utils::math::orthonormal_basis(line.normalize_or_zero());
        for direction in [u, -u, v, -v] {
            let vertex = support(a, b, direction);
            if (vertex.point - simplex[0].point).cross(line).length_squared() > EPSILON {
                simplex.push(vertex);
                break;
            }
        }
    }
    if simplex.len() == 3 {
        let normal = (simplex[1].point - simplex[0].point).cross(simplex[2].point - simplex[0].point);
        for direction in [normal, -normal] {
            let vertex = support(a, b, direction);
            let candidate = [simplex[0], simplex[1], simplex[2], vertex];
            if tetrahedron_volume(&candidate) > EPSILON {
                simplex.push(vertex);
                break;
            }
        }
    }
    simplex.len() == 4 && tetrahedron_volume(simplex) > EPSILON
}

fn tetrahedron_volume(simplex: &[Vertex]) -> f32 {
    let a = simplex[0].point;
    (simplex[1].point - a)
        .cross(simplex[2].point - a)
        .dot(simplex[3].point - a)
        .abs()
        / 6.0
}

/// Centre-to-centre estimate used when the polytope degenerates.
fn fallback<A: SupportMap + ?Sized, B: SupportMap + ?Sized>(a: &A, b: &B) -> Penetration {
    let normal = (b.center() - a.center())
        .try_normalize()
        .unwrap_or(Vec3::Y);
    let point_a = a.support(normal);
    let point_b = b.support(-normal);
    Penetration {
        normal,
        depth: (point_a - point_b).dot(normal).max(0.0),
        point_a,
        point_b,
    }
}

#[derive(Debug, Clone, Copy)]
struct Face {
    indices: [usize; 3],
    normal: Vec3,
    distance: f32,
}

/// Expanding polytope over the Minkowski difference.
///
/// Faces are wound counter-clockwise seen from outside, so an edge shared by two faces
/// appears once in each direction.
struct Epa {
    vertices: Vec<Vertex>,
    faces: Vec<Face>,
    /// Centroid of the starting tetrahedron; stays inside the polytope as it grows.
    interior: Vec3,
}

impl Epa {
    /// `None` when the starting tetrahedron has a degenerate face.
    fn new(simplex: &[Vertex]) -> Option<Self> {
        let interior = simplex.iter().map(|v| v.point).sum::<Vec3>() / simplex.len() as f32;
        let mut epa = Self {
            vertices: simplex.to_vec(),
            faces: Vec::with_capacity(EPA_MAX_FACES),
            interior,
        };
        for indices in [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]] {
            if !epa.push_face(indices) {
                return None;
            }
        }
        Some(epa)
    }

    /// Adds the face wound so its normal points away from the interior.
    fn push_face(&mut self, [i, j, k]: [usize; 3]) -> bool {
        let a = self.vertices[i].point;
        let b = self.vertices[j].point;
        let c = self.vertices[k].point;
        let Some(mut normal) = (b - a).cross(c - a).try_normalize() else {
            return false;
        };
        let mut indices = [i, j, k];
        if normal.dot(a - self.interior) < 0.0 {
            normal = -normal;
            indices.swap(1, 2);
        }
        self.faces.push(Face {
            indices,
            normal,
            distance: normal.dot(a),
        });
        true
    }

    fn closest_face(&self) -> Option<Face> {
        self.faces
            .iter()
            .copied()
            .min_by(|x, y| x.distance.total_cmp(&y.distance))
    }

    fn solve<A: SupportMap + ?Sized, B: SupportMap + ?Sized>(mut self, a: &A, b: &B) -> Option<Penetration> {
        for _ in 0..EPA_MAX_ITERATIONS {
            let face = self.closest_face()?;
            let vertex = support(a, b, face.normal);
            let gain = vertex.point.dot(face.normal) - face.distance;
            if gain < EPA_TOLERANCE * face.distance.abs().max(1.0) {
                return Some(self.resolve(&face));
            }
            if self.faces.len() >= EPA_MAX_FACES {
                break;
            }
            if !self.expand(vertex) {
                return None;
            }
        }
        let face = self.closest_face()?;
        Some(self.resolve(&face))
    }

    /// Replaces every face the new vertex can see with a fan around the horizon.
    /// Returns `false` when the polytope degenerates.
    fn expand(&mut self, vertex: Vertex) -> bool {
        let new_index = self.vertices.len();
        self.vertices.push(vertex);

        let mut horizon: Vec<(usize, usize)> = Vec::new();
        let mut i = 0;
        while i < self.faces.len() {
            let face = self.faces[i];
            let anchor = self.vertices[face.indices[0]].point;
            if face.normal.dot(vertex.point - anchor) > EPSILON {
                let [p, q, r] = face.indices;
                for edge in [(p, q), (q, r), (r, p)] {
                    if let Some(pos) = horizon.iter().position(|&e| e == (edge.1, edge.0)) {
                        horizon.swap_remove(pos);
                    } else {
                        horizon.push(edge);
                    }
                }
                self.faces.swap_remove(i);
            } else {
                i += 1;
            }
        }
        if horizon.len() < 3 {
            return false;
        }
        horizon
            .into_iter()
            .all(|(u, v)| self.push_face([u, v, new_index]))
    }

    fn resolve(&self, face: &Face) -> Penetration {
        let [i, j, k] = face.indices;
        let depth = face.distance.max(0.0);
        let projected = face.normal * depth;
        let (u, v, w) = barycentric(
            projected,
            self.vertices[i].point,
            self.vertices[j].point,
            self.vertices[k].point,
        );
        let point_a = self.vertices[i].support_a * u
            + self.vertices[j].support_a * v
            + self.vertices[k].support_a * w;
        Penetration {
            normal: face.normal,
            depth,
            point_a,
            point_b: point_a - face.normal * depth,
        }
    }
}

fn barycentric(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> (f32, f32, f32) {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < EPSILON {
        return (1.0, 0.0, 0.0);
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    (1.0 - v - w, v, w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::ConvexPiece;
    use crate::core::types::Transform;

    fn sphere(x: f32) -> ConvexPiece<'static> {
        ConvexPiece::Sphere {
            center: Vec3::new(x, 0.0, 0.0),
            radius: 1.0,
        }
    }

    #[test]
    fn separated_spheres_do_not_intersect() {
        assert!(!intersects(&sphere(0.0), &sphere(3.0)));
        assert!(penetration(&sphere(0.0), &sphere(3.0)).is_none());
    }

    #[test]
    fn overlapping_spheres_report_depth_and_normal() {
        let result = penetration(&sphere(0.0), &sphere(1.5)).expect("spheres overlap");
        assert!((result.depth - 0.5).abs() < 0.05, "depth was {}", result.depth);
        assert!(result.normal.x > 0.95, "normal was {:?}", result.normal);
    }

    #[test]
    fn deep_sphere_overlap() {
        let result = penetration(&sphere(0.0), &sphere(0.5)).expect("spheres overlap");
        assert!((result.depth - 1.5).abs() < 0.05, "depth was {}", result.depth);
    }

    #[test]
    fn box_resting_on_box_pushes_up() {
        let ground = ConvexPiece::Box {
            transform: Transform::IDENTITY,
            half_extents: Vec3::new(5.0, 0.5, 5.0),
        };
        let crate_box = ConvexPiece::Box {
            transform: Transform::from_position(Vec3::new(0.2, 0.9, -0.1)),
            half_extents: Vec3::splat(0.5),
        };
        let result = penetration(&ground, &crate_box).expect("boxes overlap");
        assert!(result.normal.y > 0.99, "normal was {:?}", result.normal);
        assert!((result.depth - 0.1).abs() < 1e-3, "depth was {}", result.depth);
    }

    #[test]
    fn deep_curved_overlaps_finish_quickly() {
        let ellipsoid = |x: f32| ConvexPiece::Ellipsoid {
            transform: Transform::from_position(Vec3::new(x, 0.0, 0.0)),
            radii: Vec3::ONE,
        };
        let cylinder = |x: f32| ConvexPiece::Cylinder {
            transform: Transform::from_position(Vec3::new(x, 0.0, 0.0)),
            radius: 1.0,
            half_height: 1.0,
        };
        let cases: [(ConvexPiece<'static>, ConvexPiece<'static>, f32); 4] = [
            (sphere(0.0), sphere(0.1), 1.9),
            (ellipsoid(0.0), ellipsoid(0.25), 1.75),
            (cylinder(0.0), cylinder(0.25), 1.75),
            (sphere(0.0), sphere(0.0), 2.0),
        ];

        let start = std::time::Instant::now();
        for (a, b, expected) in cases {
            let result = penetration(&a, &b).expect("shapes overlap");
            assert!(result.normal.is_normalized(), "normal was {:?}", result.normal);
            assert!(result.depth >= 0.0);
            assert!((result.depth - expected).abs() < 0.1, "depth was {}", result.depth);
        }
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn polytope_never_grows_past_its_face_cap() {
        let mut simplex = run_gjk(&sphere(0.0), &sphere(0.3)).expect("spheres overlap");
        assert!(complete_simplex(&sphere(0.0), &sphere(0.3), &mut simplex));
        let mut epa = Epa::new(&simplex).expect("tetrahedron has volume");
        for _ in 0..EPA_MAX_ITERATIONS {
            let Some(face) = epa.closest_face() else {
                break;
            };
            let vertex = support(&sphere(0.0), &sphere(0.3), face.normal);
            if vertex.point.dot(face.normal) - face.distance < EPSILON || !epa.expand(vertex) {
                break;
            }
            // A closed triangulated hull over V vertices has at most 2V - 4 faces.
            assert!(epa.faces.len() <= 2 * epa.vertices.len() - 4);
        }
    }
}
