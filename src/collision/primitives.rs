//! Query volumes used by scene casts and the broad-phase.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::core::mesh::Aabb;

/// Infinite ray; `direction` is kept normalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        let direction = direction.try_normalize().unwrap_or(Vec3::NEG_Y);
        Self { origin, direction }
    }

    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Vec3,
    pub end: Vec3,
}

impl Segment {
    pub fn new(start: Vec3, end: Vec3) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f32 {
        (self.end - self.start).length()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius: radius.abs(),
        }
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_center_half_extents(self.center, Vec3::splat(self.radius))
    }
}

/// Plane `normal · p = distance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let n = normal.normalize_or_zero();
        Self {
            normal: n,
            distance: n.dot(point),
        }
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }
}

/// Convex volume bounded by six inward-facing planes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Box-shaped frustum, handy for selection rectangles and tests.
    pub fn from_aabb(aabb: &Aabb) -> Self {
        Self {
            planes: [
                Plane::from_point_normal(aabb.min, Vec3::X),
                Plane::from_point_normal(aabb.max, Vec3::NEG_X),
                Plane::from_point_normal(aabb.min, Vec3::Y),
                Plane::from_point_normal(aabb.max, Vec3::NEG_Y),
                Plane::from_point_normal(aabb.min, Vec3::Z),
                Plane::from_point_normal(aabb.max, Vec3::NEG_Z),
            ],
        }
    }

    /// Perspective view volume looking along `forward`.
    pub fn perspective(
        eye: Vec3,
        forward: Vec3,
        up: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let forward = forward.normalize_or_zero();
        let right = forward.cross(up).normalize_or_zero();
        let up = right.cross(forward);
        let half_v = (fov_y * 0.5).tan();
        let half_h = half_v * aspect;

        // Edge directions of the four side planes; crossing with the opposite basis
        // vector yields inward normals.
        let right_edge = (forward + right * half_h).normalize_or_zero();
        let left_edge = (forward - right * half_h).normalize_or_zero();
        let top_edge = (forward + up * half_v).normalize_or_zero();
        let bottom_edge = (forward - up * half_v).normalize_or_zero();

        Self {
            planes: [
                Plane::from_point_normal(eye + forward * near, forward),
                Plane::from_point_normal(eye + forward * far, -forward),
                Plane::from_point_normal(eye, left_edge.cross(up)),
                Plane::from_point_normal(eye, up.cross(right_edge)),
                Plane::from_point_normal(eye, right.cross(bottom_edge)),
                Plane::from_point_normal(eye, top_edge.cross(right)),
            ],
        }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(point) >= 0.0)
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(center) >= -radius)
    }

    /// Oriented box test; `axes` are the box's unit axes.
    pub fn intersects_obb(&self, center: Vec3, axes: [Vec3; 3], half_extents: Vec3) -> bool {
        self.planes.iter().all(|plane| {
            let radius = plane.normal.dot(axes[0]).abs() * half_extents.x
                + plane.normal.dot(axes[1]).abs() * half_extents.y
                + plane.normal.dot(axes[2]).abs() * half_extents.z;
            plane.signed_distance(center) >= -radius
        })
    }

    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.intersects_obb(aabb.center(), [Vec3::X, Vec3::Y, Vec3::Z], aabb.extent())
    }

    /// Conservative test for a convex point cloud: rejects only when every point lies
    /// outside one plane.
    pub fn intersects_points(&self, points: impl Iterator<Item = Vec3> + Clone) -> bool {
        self.planes.iter().all(|plane| {
            points
                .clone()
                .any(|point| plane.signed_distance(point) >= 0.0)
        })
    }
}

/// Number of [`CastKind`]s.
pub const CAST_KIND_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CastKind {
    Ray,
    Segment,
    Aabb,
    Sphere,
    Frustum,
}

impl CastKind {
    pub const ALL: [CastKind; CAST_KIND_COUNT] = [
        CastKind::Ray,
        CastKind::Segment,
        CastKind::Aabb,
        CastKind::Sphere,
        CastKind::Frustum,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// A scene query volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CastShape {
    Ray(Ray),
    Segment(Segment),
    Aabb(Aabb),
    Sphere(BoundingSphere),
    Frustum(Frustum),
}

impl CastShape {
    pub fn kind(&self) -> CastKind {
        match self {
            CastShape::Ray(_) => CastKind::Ray,
            CastShape::Segment(_) => CastKind::Segment,
            CastShape::Aabb(_) => CastKind::Aabb,
            CastShape::Sphere(_) => CastKind::Sphere,
            CastShape::Frustum(_) => CastKind::Frustum,
        }
    }

    /// Origin, unit direction and maximum distance for line casts.
    pub fn line(&self) -> Option<(Vec3, Vec3, f32)> {
        match self {
            CastShape::Ray(ray) => Some((ray.origin, ray.direction, f32::INFINITY)),
            CastShape::Segment(segment) => {
                let delta = segment.end - segment.start;
                let length = delta.length();
                let direction = if length > f32::EPSILON {
                    delta / length
                } else {
                    Vec3::NEG_Y
                };
                Some((segment.start, direction, length))
            }
            _ => None,
        }
    }

    /// Coarse test against a bounding box, returning the entry distance (zero for volumes).
    pub fn test_aabb(&self, aabb: &Aabb) -> Option<f32> {
        match self {
            CastShape::Ray(_) | CastShape::Segment(_) => {
                let (origin, direction, max_t) = self.line()?;
                aabb.ray_intersection(origin, direction, max_t)
            }
            CastShape::Aabb(volume) => volume.overlaps(aabb).then_some(0.0),
            CastShape::Sphere(sphere) => {
                let closest = sphere.center.clamp(aabb.min, aabb.max);
                (closest.distance_squared(sphere.center) <= sphere.radius * sphere.radius)
                    .then_some(0.0)
            }
            CastShape::Frustum(frustum) => frustum.intersects_aabb(aabb).then_some(0.0),
        }
    }
}

/// Result of a cast against one collider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CastHit {
    /// Distance along the cast direction; zero for volume overlaps.
    pub distance: f32,
    pub point: Vec3,
    /// Surface normal at the hit, zero for volume overlaps.
    pub normal: Vec3,
}

impl CastHit {
    pub fn overlap(point: Vec3) -> Self {
        Self {
            distance: 0.0,
            point,
            normal: Vec3::ZERO,
        }
    }
}
