use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::mesh::{edge_angles, Aabb};
use crate::utils::math::ray_triangle;

/// Regular grid of heights centred on the local origin. Columns run along X, rows along Z.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeightField {
    heights: Vec<f32>,
    columns: usize,
    rows: usize,
    cell_size: f32,
    bounds: Aabb,
}

impl HeightField {
    /// `heights` is row-major with `columns * rows` samples. Missing samples read as zero.
    pub fn new(columns: usize, rows: usize, cell_size: f32, mut heights: Vec<f32>) -> Self {
        let columns = columns.max(2);
        let rows = rows.max(2);
        let cell_size = if cell_size > 0.0 { cell_size } else { 1.0 };
        heights.resize(columns * rows, 0.0);

        let (lo, hi) = heights
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &h| {
                (lo.min(h), hi.max(h))
            });
        let half_x = 0.5 * (columns - 1) as f32 * cell_size;
        let half_z = 0.5 * (rows - 1) as f32 * cell_size;
        let bounds = Aabb::new(Vec3::new(-half_x, lo, -half_z), Vec3::new(half_x, hi, half_z));

        Self {
            heights,
            columns,
            rows,
            cell_size,
            bounds,
        }
    }

    pub fn flat(columns: usize, rows: usize, cell_size: f32) -> Self {
        Self::new(columns, rows, cell_size, Vec::new())
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn height(&self, column: usize, row: usize) -> f32 {
        self.heights[row * self.columns + column]
    }

    pub fn vertex(&self, column: usize, row: usize) -> Vec3 {
        Vec3::new(
            self.bounds.min.x + column as f32 * self.cell_size,
            self.height(column, row),
            self.bounds.min.z + row as f32 * self.cell_size,
        )
    }

    /// The two triangles covering a cell.
    pub fn cell_triangles(&self, column: usize, row: usize) -> [[Vec3; 3]; 2] {
        let a = self.vertex(column, row);
        let b = self.vertex(column + 1, row);
        let c = self.vertex(column, row + 1);
        let d = self.vertex(column + 1, row + 1);
        [[a, c, b], [b, c, d]]
    }

    /// Inclusive cell range covered by a local-space box, or `None` when it misses the field.
    fn cell_range(&self, local: &Aabb) -> Option<(usize, usize, usize, usize)> {
        if !local.overlaps(&self.bounds) {
            return None;
        }
        let max_column = self.columns - 2;
        let max_row = self.rows - 2;
        let to_cell = |value: f32, origin: f32, max: usize| {
            (((value - origin) / self.cell_size).floor().max(0.0) as usize).min(max)
        };
        Some((
            to_cell(local.min.x, self.bounds.min.x, max_column),
            to_cell(local.max.x, self.bounds.min.x, max_column),
            to_cell(local.min.z, self.bounds.min.z, max_row),
            to_cell(local.max.z, self.bounds.min.z, max_row),
        ))
    }

    /// Midphase: triangles of every cell under a local-space box.
    pub fn triangles_overlapping(&self, local: &Aabb) -> Vec<[Vec3; 3]> {
        let Some((c0, c1, r0, r1)) = self.cell_range(local) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for row in r0..=r1 {
            for column in c0..=c1 {
                for tri in self.cell_triangles(column, row) {
                    if Aabb::from_points(&tri).overlaps(local) {
                        out.push(tri);
                    }
                }
            }
        }
        out
    }

    /// Triangles under a local-space box with the dihedral angle across each of their edges.
    /// Neighbouring cells one ring out are sampled so shared edges see both sides.
    pub fn triangle_edges_overlapping(&self, local: &Aabb) -> Vec<([Vec3; 3], [f32; 3])> {
        let Some((c0, c1, r0, r1)) = self.cell_range(local) else {
            return Vec::new();
        };
        let (ring_c0, ring_c1) = (c0.saturating_sub(1), (c1 + 1).min(self.columns - 2));
        let (ring_r0, ring_r1) = (r0.saturating_sub(1), (r1 + 1).min(self.rows - 2));

        let id = |column: usize, row: usize| row * self.columns + column;
        let mut triangles = Vec::new();
        let mut keys = Vec::new();
        let mut wanted = Vec::new();
        for row in ring_r0..=ring_r1 {
            for column in ring_c0..=ring_c1 {
                let (a, b) = (id(column, row), id(column + 1, row));
                let (c, d) = (id(column, row + 1), id(column + 1, row + 1));
                let inside = (c0..=c1).contains(&column) && (r0..=r1).contains(&row);
                for (tri, key) in self
                    .cell_triangles(column, row)
                    .into_iter()
                    .zip([[a, c, b], [b, c, d]])
                {
                    wanted.push(inside && Aabb::from_points(&tri).overlaps(local));
                    triangles.push(tri);
                    keys.push(key);
                }
            }
        }

        let angles = edge_angles(&triangles, &keys);
        triangles
            .into_iter()
            .zip(angles)
            .zip(wanted)
            .filter_map(|(entry, wanted)| wanted.then_some(entry))
            .collect()
    }

    /// Local-space ray cast walking the cells under the ray's footprint.
    pub fn cast_ray(&self, origin: Vec3, direction: Vec3, max_t: f32) -> Option<(f32, Vec3)> {
        let entry = self.bounds.ray_intersection(origin, direction, max_t)?;
        let exit = {
            // Furthest parameter still inside the bounds.
            let mut t_max = max_t;
            for axis in 0..3 {
                let d = direction[axis];
                if d.abs() < 1e-8 {
                    continue;
                }
                let bound = if d > 0.0 {
                    self.bounds.max[axis]
                } else {
                    self.bounds.min[axis]
                };
                t_max = t_max.min((bound - origin[axis]) / d);
            }
            t_max.max(entry)
        };
        let mut footprint = Aabb::empty();
        footprint.extend(origin + direction * entry);
        footprint.extend(origin + direction * exit);
        let footprint = Aabb::new(
            Vec3::new(footprint.min.x, self.bounds.min.y, footprint.min.z),
            Vec3::new(footprint.max.x, self.bounds.max.y, footprint.max.z),
        );
        let (c0, c1, r0, r1) = self.cell_range(&footprint)?;

        let mut best: Option<(f32, Vec3)> = None;
        for row in r0..=r1 {
            for column in c0..=c1 {
                for [a, b, c] in self.cell_triangles(column, row) {
                    let Some(t) = ray_triangle(origin, direction, a, b, c) else {
                        continue;
                    };
                    if t > max_t || best.is_some_and(|(best_t, _)| best_t <= t) {
                        continue;
                    }
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
