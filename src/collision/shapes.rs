//! World-space views of collider shapes used by the narrow-phase and casts.

use glam::Vec3;

use crate::core::{
    collider::{Collider, ColliderShape, ShapeType},
    mesh::{Aabb, ConvexMesh},
    types::Transform,
};

/// Furthest point of a convex volume along a direction.
pub trait SupportMap {
    fn support(&self, direction: Vec3) -> Vec3;

    /// Any interior point; seeds the search direction.
    fn center(&self) -> Vec3;
}

/// A convex world-space shape, or one convex part of a complex shape.
#[derive(Debug, Clone, Copy)]
pub enum ConvexPiece<'a> {
    Sphere {
        center: Vec3,
        radius: f32,
    },
    Box {
        transform: Transform,
        half_extents: Vec3,
    },
    Capsule {
        a: Vec3,
        b: Vec3,
        radius: f32,
    },
    Cylinder {
        transform: Transform,
        radius: f32,
        half_height: f32,
    },
    Ellipsoid {
        transform: Transform,
        radii: Vec3,
    },
    Hull {
        transform: Transform,
        hull: &'a ConvexMesh,
    },
    Triangle([Vec3; 3]),
}

impl SupportMap for ConvexPiece<'_> {
    fn support(&self, direction: Vec3) -> Vec3 {
        match self {
            ConvexPiece::Sphere { center, radius } => {
                *center + direction.normalize_or_zero() * *radius
            }
            ConvexPiece::Box {
                transform,
                half_extents,
            } => {
                let local = transform.inverse_transform_vector(direction);
                let corner = Vec3::new(
                    half_extents.x.copysign(local.x),
                    half_extents.y.copysign(local.y),
                    half_extents.z.copysign(local.z),
                );
                transform.transform_point(corner)
            }
            ConvexPiece::Capsule { a, b, radius } => {
                let end = if direction.dot(*b - *a) >= 0.0 { *b } else { *a };
                end + direction.normalize_or_zero() * *radius
            }
            ConvexPiece::Cylinder {
                transform,
                radius,
                half_height,
            } => {
                let local = transform.inverse_transform_vector(direction);
                let lateral = Vec3::new(local.x, 0.0, local.z).normalize_or_zero() * *radius;
                let axial = Vec3::new(0.0, half_height.copysign(local.y), 0.0);
                transform.transform_point(lateral + axial)
            }
            ConvexPiece::Ellipsoid { transform, radii } => {
                let local = transform.inverse_transform_vector(direction);
                let scaled = local * *radii;
                let length = scaled.length();
                if length <= f32::EPSILON {
                    return transform.position;
                }
                transform.transform_point(*radii * scaled / length)
            }
            ConvexPiece::Hull { transform, hull } => {
                let local = transform.inverse_transform_vector(direction);
                transform.transform_point(hull.support_point(local))
            }
            ConvexPiece::Triangle(vertices) => {
                let mut best = vertices[0];
                let mut best_dot = best.dot(direction);
                for v in &vertices[1..] {
                    let d = v.dot(direction);
                    if d > best_dot {
                        best_dot = d;
                        best = *v;
                    }
                }
                best
            }
        }
    }

    fn center(&self) -> Vec3 {
        match self {
            ConvexPiece::Sphere { center, .. } => *center,
            ConvexPiece::Capsule { a, b, .. } => (*a + *b) * 0.5,
            ConvexPiece::Box { transform, .. }
            | ConvexPiece::Cylinder { transform, .. }
            | ConvexPiece::Ellipsoid { transform, .. } => transform.position,
            ConvexPiece::Hull { transform, hull } => transform.transform_point(hull.centroid()),
            ConvexPiece::Triangle([a, b, c]) => (*a + *b + *c) / 3.0,
        }
    }
}

impl ConvexPiece<'_> {
    /// World-space bounds from the support mapping along the six axis directions.
    pub fn bounds(&self) -> Aabb {
        let max = Vec3::new(
            self.support(Vec3::X).x,
            self.support(Vec3::Y).y,
            self.support(Vec3::Z).z,
        );
        let min = Vec3::new(
            self.support(Vec3::NEG_X).x,
            self.support(Vec3::NEG_Y).y,
            self.support(Vec3::NEG_Z).z,
        );
        Aabb::new(min, max)
    }
}

/// A collider shape placed in the world.
#[derive(Debug, Clone, Copy)]
pub struct ShapeInstance<'a> {
    pub shape: &'a ColliderShape,
    pub transform: Transform,
    pub aabb: Aabb,
}

impl<'a> ShapeInstance<'a> {
    pub fn new(shape: &'a ColliderShape, transform: Transform) -> Self {
        Self {
            shape,
            aabb: shape.world_aabb(&transform),
            transform,
        }
    }

    /// Uses the collider's cached world transform and bounds.
    pub fn from_collider(collider: &'a Collider) -> Self {
        Self {
            shape: &collider.shape,
            transform: *collider.world_transform(),
            aabb: *collider.world_aabb(),
        }
    }

    pub fn shape_type(&self) -> ShapeType {
        self.shape.shape_type()
    }

    /// The whole shape as one convex piece; `None` for complex shapes.
    pub fn as_convex(&self) -> Option<ConvexPiece<'a>> {
        let transform = self.transform;
        let piece = match self.shape {
            ColliderShape::Sphere { radius } => ConvexPiece::Sphere {
                center: transform.position,
                radius: *radius,
            },
            ColliderShape::Box { half_extents } => ConvexPiece::Box {
                transform,
                half_extents: *half_extents,
            },
            ColliderShape::Capsule {
                radius,
                half_height,
            } => {
                let axis = transform.transform_vector(Vec3::Y) * *half_height;
                ConvexPiece::Capsule {
                    a: transform.position - axis,
                    b: transform.position + axis,
                    radius: *radius,
                }
            }
            ColliderShape::Cylinder {
                radius,
                half_height,
            } => ConvexPiece::Cylinder {
                transform,
                radius: *radius,
                half_height: *half_height,
            },
            ColliderShape::Ellipsoid { radii } => ConvexPiece::Ellipsoid {
                transform,
                radii: *radii,
            },
            ColliderShape::ConvexMesh(hull) => ConvexPiece::Hull { transform, hull },
            ColliderShape::MultiConvexMesh(_)
            | ColliderShape::TriangleMesh(_)
            | ColliderShape::HeightField(_) => return None,
        };
        Some(piece)
    }

    /// Convex pieces whose bounds overlap a world-space box. Convex shapes yield themselves.
    pub fn pieces_overlapping(&self, region: &Aabb) -> Vec<ConvexPiece<'a>> {
        if let Some(piece) = self.as_convex() {
            return vec![piece];
        }
        let local_region = region.transformed(&self.transform.inverse());
        let transform = self.transform;
        let to_world = |[a, b, c]: [Vec3; 3]| {
            ConvexPiece::Triangle([
                transform.transform_point(a),
                transform.transform_point(b),
                transform.transform_point(c),
            ])
        };
        match self.shape {
            ColliderShape::MultiConvexMesh(multi) => multi
                .hulls
                .iter()
                .filter(|hull| hull.bounds.overlaps(&local_region))
                .map(|hull| ConvexPiece::Hull { transform, hull })
                .collect(),
            ColliderShape::TriangleMesh(mesh) => mesh
                .triangles_overlapping(&local_region)
                .into_iter()
                .map(to_world)
                .collect(),
            ColliderShape::HeightField(field) => field
                .triangles_overlapping(&local_region)
                .into_iter()
                .map(to_world)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// World-space triangles of a mesh or height field under `region`, each paired with the
    /// dihedral angles across its edges. `None` for shapes built from anything else.
    pub fn triangles_with_edges(&self, region: &Aabb) -> Option<Vec<([Vec3; 3], [f32; 3])>> {
        let local_region = region.transformed(&self.transform.inverse());
        let local = match self.shape {
            ColliderShape::TriangleMesh(mesh) => mesh.triangle_edges_overlapping(&local_region),
            ColliderShape::HeightField(field) => field.triangle_edges_overlapping(&local_region),
            _ => return None,
        };
        let transform = self.transform;
        Some(
            local
                .into_iter()
                .map(|(tri, angles)| (tri.map(|p| transform.transform_point(p)), angles))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn rotated_box_support_follows_rotation() {
        let piece = ConvexPiece::Box {
            transform: Transform::new(Vec3::ZERO, Quat::from_rotation_z(std::f32::consts::FRAC_PI_2)),
            half_extents: Vec3::new(2.0, 1.0, 1.0),
        };
        let top = piece.support(Vec3::Y);
        assert!((top.y - 2.0).abs() < 1e-5, "top was {top:?}");
    }

    #[test]
    fn ellipsoid_support_reaches_radii() {
        let piece = ConvexPiece::Ellipsoid {
            transform: Transform::IDENTITY,
            radii: Vec3::new(3.0, 1.0, 2.0),
        };
        assert!((piece.support(Vec3::X).x - 3.0).abs() < 1e-5);
        assert!((piece.support(Vec3::NEG_Z).z + 2.0).abs() < 1e-5);
    }

    #[test]
    fn height_field_yields_triangles_near_region() {
        let shape = ColliderShape::HeightField(crate::core::HeightField::flat(5, 5, 1.0));
        let instance = ShapeInstance::new(&shape, Transform::IDENTITY);
        let region = Aabb::new(Vec3::new(-0.4, -0.5, -0.4), Vec3::new(0.4, 0.5, 0.4));
        let pieces = instance.pieces_overlapping(&region);
        assert!(!pieces.is_empty());
        assert!(pieces
            .iter()
            .all(|piece| matches!(piece, ConvexPiece::Triangle(_))));
    }
}
