use std::collections::HashMap;
use std::hash::Hash;

use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

use super::types::{InertiaTensorExt, MassProperties, Transform};
use crate::utils::math::ray_triangle;

/// Axis-aligned bounding box used for shape bounds, broad-phase proxies and BVH nodes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        let mut bounds = Self::empty();
        for &p in points {
            bounds.extend(p);
        }
        bounds
    }

    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn expanded(&self, margin: f32) -> Aabb {
        Aabb {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half extents.
    pub fn extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn radius(&self) -> f32 {
        self.extent().length()
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Bounds of this box after applying `transform`.
    pub fn transformed(&self, transform: &Transform) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let rotation = Mat3::from_quat(transform.rotation);
        let abs = Mat3::from_cols(
            rotation.x_axis.abs(),
            rotation.y_axis.abs(),
            rotation.z_axis.abs(),
        );
        let center = transform.transform_point(self.center());
        let half = abs * self.extent();
        Aabb::from_center_half_extents(center, half)
    }

    /// Slab test; returns the entry parameter clamped to zero when the origin is inside.
    pub fn ray_intersection(&self, origin: Vec3, direction: Vec3, max_t: f32) -> Option<f32> {
        let mut t_min = 0.0_f32;
        let mut t_max = max_t;
        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            if d.abs() < 1e-8 {
                if o < self.min[axis] || o > self.max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t1 = (self.min[axis] - o) * inv;
            let mut t2 = (self.max[axis] - o) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

/// Node of a triangle mesh bounding volume hierarchy. Leaves own `count` triangles starting at `start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshBvhNode {
    pub bounds: Aabb,
    pub left: Option<usize>,
    pub right: Option<usize>,
    pub start: usize,
    pub count: usize,
}

impl MeshBvhNode {
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Median-split BVH over the triangles of a [`TriangleMesh`]; node 0 is the root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshBvh {
    pub nodes: Vec<MeshBvhNode>,
}

impl MeshBvh {
    const LEAF_SIZE: usize = 4;

    /// Builds the hierarchy, reordering `indices` so every leaf covers a contiguous range.
    fn build(vertices: &[Vec3], indices: &mut [[u32; 3]]) -> Self {
        let mut bvh = MeshBvh { nodes: Vec::new() };
        if indices.is_empty() {
            return bvh;
        }
        bvh.build_node(vertices, indices, 0);
        bvh
    }

    fn build_node(&mut self, vertices: &[Vec3], indices: &mut [[u32; 3]], start: usize) -> usize {
        let triangle_bounds = |tri: &[u32; 3]| {
            Aabb::from_points(&[
                vertices[tri[0] as usize],
                vertices[tri[1] as usize],
                vertices[tri[2] as usize],
            ])
        };

        let bounds = indices
            .iter()
            .fold(Aabb::empty(), |acc, tri| acc.merged(&triangle_bounds(tri)));
        let node_index = self.nodes.len();
        self.nodes.push(MeshBvhNode {
            bounds,
            left: None,
            right: None,
            start,
            count: indices.len(),
        });

        if indices.len() <= Self::LEAF_SIZE {
            return node_index;
        }

        let size = bounds.max - bounds.min;
        let axis = if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        };
        indices.sort_by(|a, b| {
            let ca = triangle_bounds(a).center()[axis];
            let cb = triangle_bounds(b).center()[axis];
            ca.total_cmp(&cb)
        });

        let mid = indices.len() / 2;
        let (left_slice, right_slice) = indices.split_at_mut(mid);
        let left = self.build_node(vertices, left_slice, start);
        let right = self.build_node(vertices, right_slice, start + mid);
        let node = &mut self.nodes[node_index];
        node.left = Some(left);
        node.right = Some(right);
        node.count = 0;
        node_index
    }

    /// Collects triangle indices whose leaf bounds overlap `aabb`.
    pub fn query_aabb(&self, aabb: &Aabb, out: &mut Vec<usize>) {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.bounds.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                out.extend(node.start..node.start + node.count);
                continue;
            }
            stack.extend(node.right);
            stack.extend(node.left);
        }
    }

    /// Visits leaves hit by the ray, nearest bounds first. `visit` returns the hit parameter
    /// for a triangle, which tightens the search range.
    pub fn cast_ray<F>(&self, origin: Vec3, direction: Vec3, max_t: f32, mut visit: F) -> Option<(f32, usize)>
    where
        F: FnMut(usize) -> Option<f32>,
    {
        if self.nodes.is_empty() {
            return None;
        }
        let mut best: Option<(f32, usize)> = None;
        let mut limit = max_t;
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            match node.bounds.ray_intersection(origin, direction, limit) {
                Some(t) if t <= limit => {}
                _ => continue,
            }
            if node.is_leaf() {
                for triangle in node.start..node.start + node.count {
                    if let Some(t) = visit(triangle) {
                        if t <= limit {
                            limit = t;
                            best = Some((t, triangle));
                        }
                    }
                }
                continue;
            }

            let (Some(left), Some(right)) = (node.left, node.right) else {
                continue;
            };
            let t_left = self.nodes[left]
                .bounds
                .ray_intersection(origin, direction, limit);
            let t_right = self.nodes[right]
                .bounds
                .ray_intersection(origin, direction, limit);
            // Push the farther child first so the nearer one pops next.
            match (t_left, t_right) {
                (Some(l), Some(r)) if l <= r => {
                    stack.push(right);
                    stack.push(left);
                }
                (Some(_), Some(_)) => {
                    stack.push(left);
                    stack.push(right);
                }
                (Some(_), None) => stack.push(left),
                (None, Some(_)) => stack.push(right),
                (None, None) => {}
            }
        }
        best
    }
}

/// Triangle mesh collider data. Massless: intended for static geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<[u32; 3]>,
    pub bounds: Aabb,
    pub bvh: MeshBvh,
    /// Dihedral angle across each triangle edge, see [`edge_angles`].
    pub edge_angles: Vec<[f32; 3]>,
}

impl TriangleMesh {
    pub fn builder(vertices: Vec<Vec3>, indices: Vec<[u32; 3]>) -> MeshBuilder {
        MeshBuilder::new(vertices, indices)
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle(&self, index: usize) -> [Vec3; 3] {
        let [a, b, c] = self.indices[index];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }

    /// Midphase: triangles whose BVH leaves overlap a local-space box.
    pub fn triangles_overlapping(&self, local_aabb: &Aabb) -> Vec<[Vec3; 3]> {
        let mut candidates = Vec::new();
        self.bvh.query_aabb(local_aabb, &mut candidates);
        candidates
            .into_iter()
            .map(|index| self.triangle(index))
            .filter(|tri| Aabb::from_points(tri).overlaps(local_aabb))
            .collect()
    }

    /// Same as [`Self::triangles_overlapping`], paired with each triangle's edge angles.
    pub fn triangle_edges_overlapping(&self, local_aabb: &Aabb) -> Vec<([Vec3; 3], [f32; 3])> {
        let mut candidates = Vec::new();
        self.bvh.query_aabb(local_aabb, &mut candidates);
        candidates
            .into_iter()
            .map(|index| (self.triangle(index), self.edge_angles[index]))
            .filter(|(tri, _)| Aabb::from_points(tri).overlaps(local_aabb))
            .collect()
    }

    /// Local-space ray cast through the BVH. Returns the parameter and the face normal.
    pub fn cast_ray(&self, origin: Vec3, direction: Vec3, max_t: f32) -> Option<(f32, Vec3)> {
        let (t, triangle) = self.bvh.cast_ray(origin, direction, max_t, |index| {
            let [a, b, c] = self.triangle(index);
            ray_triangle(origin, direction, a, b, c)
        })?;
        let [a, b, c] = self.triangle(triangle);
        let mut normal = (b - a).cross(c - a).normalize_or_zero();
        if normal.dot(direction) > 0.0 {
            normal = -normal;
        }
        Some((t, normal))
    }

    pub fn bounding_radius(&self) -> f32 {
        self.bounds.radius()
    }
}

/// Helper used to cook triangle meshes from raw vertex/index buffers.
#[derive(Debug, Clone)]
pub struct MeshBuilder {
    vertices: Vec<Vec3>,
    indices: Vec<[u32; 3]>,
}

impl MeshBuilder {
    pub fn new(vertices: Vec<Vec3>, indices: Vec<[u32; 3]>) -> Self {
        Self { vertices, indices }
    }

    /// Deduplicates vertices using a quantized grid for stability.
    pub fn weld_vertices(mut self, epsilon: f32) -> Self {
        if epsilon <= 0.0 || self.vertices.is_empty() {
            return self;
        }

        let inv = 1.0 / epsilon;
        let mut map: HashMap<(i32, i32, i32), u32> = HashMap::new();
        let mut new_vertices: Vec<Vec3> = Vec::new();
        let mut remap: Vec<u32> = Vec::with_capacity(self.vertices.len());

        for v in &self.vertices {
            let key = (
                (v.x * inv).round() as i32,
                (v.y * inv).round() as i32,
                (v.z * inv).round() as i32,
            );
            let index = *map.entry(key).or_insert_with(|| {
                let idx = new_vertices.len() as u32;
                new_vertices.push(*v);
                idx
            });
            remap.push(index);
        }

        for tri in &mut self.indices {
            tri[0] = remap[tri[0] as usize];
            tri[1] = remap[tri[1] as usize];
            tri[2] = remap[tri[2] as usize];
        }

        self.vertices = new_vertices;
        self
    }

    /// Drops triangles that reference missing vertices or collapse to a line.
    pub fn remove_degenerate(mut self) -> Self {
        let vertex_count = self.vertices.len() as u32;
        let vertices = &self.vertices;
        self.indices.retain(|tri| {
            if tri.iter().any(|&i| i >= vertex_count) {
                return false;
            }
            let [a, b, c] = tri.map(|i| vertices[i as usize]);
            (b - a).cross(c - a).length_squared() > 1e-12
        });
        self
    }

    pub fn build(self) -> TriangleMesh {
        let mesh = self.remove_degenerate();
        let mut indices = mesh.indices;
        let bvh = MeshBvh::build(&mesh.vertices, &mut indices);
        let bounds = Aabb::from_points(&mesh.vertices);
        let triangles: Vec<[Vec3; 3]> = indices
            .iter()
            .map(|tri| tri.map(|i| mesh.vertices[i as usize]))
            .collect();
        let edge_angles = edge_angles(&triangles, &indices);
        TriangleMesh {
            vertices: mesh.vertices,
            indices,
            bounds,
            bvh,
            edge_angles,
        }
    }
}

/// Angle reported for edges that are not shared by exactly two triangles.
pub const BOUNDARY_EDGE_ANGLE: f32 = std::f32::consts::PI;

/// Signed dihedral angle across every triangle edge. Edge `k` runs from vertex `k` to vertex
/// `k + 1`. Positive where the surface folds away from the face normal (convex), negative where
/// it folds towards it (concave) and zero when flat. Triangles are matched by vertex key.
pub fn edge_angles<K: Copy + Eq + Hash + Ord>(
    triangles: &[[Vec3; 3]],
    keys: &[[K; 3]],
) -> Vec<[f32; 3]> {
    let mut shared: HashMap<(K, K), Vec<(usize, usize)>> = HashMap::new();
    for (triangle, key) in keys.iter().enumerate() {
        for edge in 0..3 {
            let (p, q) = (key[edge], key[(edge + 1) % 3]);
            shared
                .entry((p.min(q), p.max(q)))
                .or_default()
                .push((triangle, edge));
        }
    }

    let normals: Vec<Vec3> = triangles
        .iter()
        .map(|[a, b, c]| (*b - *a).cross(*c - *a).normalize_or_zero())
        .collect();
    let dihedral = |(t, e): (usize, usize), (u, f): (usize, usize)| {
        let normal = normals[t];
        let mut other = normals[u];
        if normal == Vec3::ZERO || other == Vec3::ZERO {
            return BOUNDARY_EDGE_ANGLE;
        }
        // Same edge direction in both triangles means opposite winding.
        if keys[u][f] == keys[t][e] {
            other = -other;
        }
        let origin = triangles[t][e];
        let apex = triangles[u][(f + 2) % 3];
        let scale = triangles[t][(e + 1) % 3].distance(origin).max(1e-3);
        let side = normal.dot(apex - origin);
        let angle = normal.dot(other).clamp(-1.0, 1.0).acos();
        if side > 1e-4 * scale {
            -angle
        } else if side < -1e-4 * scale {
            angle
        } else {
            0.0
        }
    };

    let mut angles = vec![[BOUNDARY_EDGE_ANGLE; 3]; triangles.len()];
    for sides in shared.values() {
        if let [first, second] = sides.as_slice() {
            angles[first.0][first.1] = dihedral(*first, *second);
            angles[second.0][second.1] = dihedral(*second, *first);
        }
    }
    angles
}

/// Closed convex hull given by its vertices and outward-wound triangles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvexMesh {
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
    pub bounds: Aabb,
}

impl ConvexMesh {
    pub fn new(vertices: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Self {
        let bounds = Aabb::from_points(&vertices);
        Self {
            vertices,
            triangles,
            bounds,
        }
    }

    /// Hull of an axis-aligned box centred at `center`.
    pub fn cuboid(center: Vec3, half_extents: Vec3) -> Self {
        let h = half_extents;
        let vertices = vec![
            center + Vec3::new(-h.x, -h.y, -h.z),
            center + Vec3::new(h.x, -h.y, -h.z),
            center + Vec3::new(h.x, h.y, -h.z),
            center + Vec3::new(-h.x, h.y, -h.z),
            center + Vec3::new(-h.x, -h.y, h.z),
            center + Vec3::new(h.x, -h.y, h.z),
            center + Vec3::new(h.x, h.y, h.z),
            center + Vec3::new(-h.x, h.y, h.z),
        ];
        let triangles = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 6, 2],
            [3, 7, 6],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        Self::new(vertices, triangles)
    }

    pub fn support_point(&self, direction: Vec3) -> Vec3 {
        let mut best = self.vertices.first().copied().unwrap_or(Vec3::ZERO);
        let mut best_dot = f32::NEG_INFINITY;
        for &v in &self.vertices {
            let d = v.dot(direction);
            if d > best_dot {
                best_dot = d;
                best = v;
            }
        }
        best
    }

    pub fn centroid(&self) -> Vec3 {
        if self.vertices.is_empty() {
            return Vec3::ZERO;
        }
        self.vertices.iter().copied().sum::<Vec3>() / self.vertices.len() as f32
    }

    /// Signed volume from tetrahedra fanned around the centroid.
    pub fn volume(&self) -> f32 {
        let origin = self.centroid();
        self.triangles
            .iter()
            .map(|[a, b, c]| {
                let a = self.vertices[*a as usize] - origin;
                let b = self.vertices[*b as usize] - origin;
                let c = self.vertices[*c as usize] - origin;
                a.dot(b.cross(c)) / 6.0
            })
            .sum::<f32>()
            .abs()
    }

    /// Exact mass with inertia approximated by the hull's bounding box.
    pub fn mass_properties(&self, density: f32) -> MassProperties {
        let mass = self.volume() * density;
        let inertia = Mat3::for_solid_box(self.bounds.extent(), mass);
        MassProperties { mass, inertia }.transformed(&Transform::from_position(self.bounds.center()))
    }

    /// Local-space ray cast against the hull faces.
    pub fn cast_ray(&self, origin: Vec3, direction: Vec3, max_t: f32) -> Option<(f32, Vec3)> {
        let mut best: Option<(f32, Vec3)> = None;
        for [a, b, c] in &self.triangles {
            let a = self.vertices[*a as usize];
            let b = self.vertices[*b as usize];
            let c = self.vertices[*c as usize];
            if let Some(t) = ray_triangle(origin, direction, a, b, c) {
                if t <= max_t && best.map_or(true, |(best_t, _)| t < best_t) {
                    let mut normal = (b - a).cross(c - a).normalize_or_zero();
                    if normal.dot(direction) > 0.0 {
                        normal = -normal;
                    }
                    best = Some((t, normal));
                }
            }
        }
        best
    }
}

/// Collection of convex hulls sharing one collider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiConvexMesh {
    pub hulls: Vec<ConvexMesh>,
    pub bounds: Aabb,
}

impl MultiConvexMesh {
    pub fn new(hulls: Vec<ConvexMesh>) -> Self {
        let bounds = hulls
            .iter()
            .fold(Aabb::empty(), |acc, hull| acc.merged(&hull.bounds));
        Self { hulls, bounds }
    }

    pub fn mass_properties(&self, density: f32) -> MassProperties {
        let mut total = MassProperties::ZERO;
        for hull in &self.hulls {
            total.accumulate(&hull.mass_properties(density));
        }
        total
    }

    pub fn cast_ray(&self, origin: Vec3, direction: Vec3, max_t: f32) -> Option<(f32, Vec3)> {
        self.hulls
            .iter()
            .filter(|hull| hull.bounds.ray_intersection(origin, direction, max_t).is_some())
            .filter_map(|hull| hull.cast_ray(origin, direction, max_t))
            .min_by(|a, b| a.0.total_cmp(&b.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_mesh(resolution: usize) -> TriangleMesh {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for z in 0..=resolution {
            for x in 0..=resolution {
                vertices.push(Vec3::new(x as f32, 0.0, z as f32));
            }
        }
        let width = resolution + 1;
        for z in 0..resolution {
            for x in 0..resolution {
                let i = (z * width + x) as u32;
                let w = width as u32;
                indices.push([i, i + w, i + 1]);
                indices.push([i + 1, i + w, i + w + 1]);
            }
        }
        TriangleMesh::builder(vertices, indices).build()
    }

    #[test]
    fn bvh_splits_large_meshes() {
        let mesh = grid_mesh(8);
        assert!(mesh.bvh.nodes.len() > 1);
        let leaves: usize = mesh
            .bvh
            .nodes
            .iter()
            .filter(|n| n.is_leaf())
            .map(|n| n.count)
            .sum();
        assert_eq!(leaves, mesh.triangle_count());
    }

    #[test]
    fn bvh_query_returns_local_triangles_only() {
        let mesh = grid_mesh(8);
        let region = Aabb::new(Vec3::new(2.2, -0.5, 2.2), Vec3::new(2.8, 0.5, 2.8));
        let tris = mesh.triangles_overlapping(&region);
        assert!(!tris.is_empty());
        assert!(tris.len() < mesh.triangle_count() / 4);
    }

    #[test]
    fn grid_edges_are_flat_inside_and_open_at_the_rim() {
        let mesh = grid_mesh(3);
        assert_eq!(mesh.edge_angles.len(), mesh.triangle_count());
        let all: Vec<f32> = mesh.edge_angles.iter().flatten().copied().collect();
        let boundary = all.iter().filter(|&&a| a == BOUNDARY_EDGE_ANGLE).count();
        assert_eq!(boundary, 12);
        assert!(all
            .iter()
            .all(|&a| a == BOUNDARY_EDGE_ANGLE || a.abs() < 1e-6));
    }

    #[test]
    fn folded_edges_carry_their_sign() {
        let fold = |height: f32| {
            let a = Vec3::new(0.0, 0.0, 0.0);
            let b = Vec3::new(1.0, height, 0.0);
            let c = Vec3::new(1.0, height, 1.0);
            let e = Vec3::new(2.0, 0.0, 0.0);
            let triangles = [[a, c, b], [b, c, e]];
            let keys = [[0u32, 2, 1], [1, 2, 3]];
            edge_angles(&triangles, &keys)
        };
        let ridge = fold(1.0);
        assert!((ridge[0][1] - std::f32::consts::FRAC_PI_2).abs() < 1e-4);
        assert!((ridge[1][0] - std::f32::consts::FRAC_PI_2).abs() < 1e-4);
        let valley = fold(-1.0);
        assert!((valley[0][1] + std::f32::consts::FRAC_PI_2).abs() < 1e-4);
        assert_eq!(valley[0][0], BOUNDARY_EDGE_ANGLE);
    }

    #[test]
    fn mesh_ray_cast_hits_surface() {
        let mesh = grid_mesh(4);
        let hit = mesh.cast_ray(Vec3::new(1.3, 5.0, 2.7), Vec3::NEG_Y, f32::INFINITY);
        let (t, normal) = hit.expect("ray straight down must hit the grid");
        assert!((t - 5.0).abs() < 1e-4, "t was {t}");
        assert!(normal.y > 0.99);
    }

    #[test]
    fn cuboid_hull_volume_matches_box() {
        let hull = ConvexMesh::cuboid(Vec3::ZERO, Vec3::new(1.0, 2.0, 0.5));
        assert!((hull.volume() - 8.0).abs() < 1e-4, "volume was {}", hull.volume());
    }

    #[test]
    fn transformed_aabb_grows_under_rotation() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let rotated = aabb.transformed(&Transform::from_position_rotation(
            Vec3::ZERO,
            glam::Quat::from_rotation_z(std::f32::consts::FRAC_PI_4),
        ));
        assert!(rotated.max.x > 1.4);
    }
}
