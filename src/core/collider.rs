use std::f32::consts::PI;

use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

use super::{
    handles::{BodyHandle, ContactHandle, JointHandle, NodeHandle},
    heightfield::HeightField,
    mesh::{Aabb, ConvexMesh, MultiConvexMesh, TriangleMesh},
    types::{InertiaTensorExt, MassProperties, Material, Transform},
};
use crate::collision::{broadphase::BroadPhasePartition, filter::GroupId};
use crate::utils::math::inertia_capsule;

/// Number of distinct [`ShapeType`]s.
pub const SHAPE_TYPE_COUNT: usize = 9;

/// Closed set of collider geometries. The first five are primitives, the rest are complex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShapeType {
    Sphere,
    Box,
    Capsule,
    Cylinder,
    Ellipsoid,
    ConvexMesh,
    MultiConvexMesh,
    TriangleMesh,
    HeightField,
}

impl ShapeType {
    pub const ALL: [ShapeType; SHAPE_TYPE_COUNT] = [
        ShapeType::Sphere,
        ShapeType::Box,
        ShapeType::Capsule,
        ShapeType::Cylinder,
        ShapeType::Ellipsoid,
        ShapeType::ConvexMesh,
        ShapeType::MultiConvexMesh,
        ShapeType::TriangleMesh,
        ShapeType::HeightField,
    ];

    pub const PRIMITIVES: [ShapeType; 5] = [
        ShapeType::Sphere,
        ShapeType::Box,
        ShapeType::Capsule,
        ShapeType::Cylinder,
        ShapeType::Ellipsoid,
    ];

    pub const COMPLEX: [ShapeType; 4] = [
        ShapeType::ConvexMesh,
        ShapeType::MultiConvexMesh,
        ShapeType::TriangleMesh,
        ShapeType::HeightField,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_complex(self) -> bool {
        self.index() >= ShapeType::ConvexMesh.index()
    }

    /// Complex shapes without volume: only usable as static geometry.
    pub fn is_surface(self) -> bool {
        matches!(self, ShapeType::TriangleMesh | ShapeType::HeightField)
    }
}

/// Enumeration of supported collider geometries, in the shape's local frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ColliderShape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    /// Segment from `-half_height` to `half_height` along local Y, swept by `radius`.
    Capsule { radius: f32, half_height: f32 },
    /// Axis along local Y.
    Cylinder { radius: f32, half_height: f32 },
    Ellipsoid { radii: Vec3 },
    ConvexMesh(ConvexMesh),
    MultiConvexMesh(MultiConvexMesh),
    TriangleMesh(TriangleMesh),
    HeightField(HeightField),
}

impl ColliderShape {
    pub fn sphere(radius: f32) -> Self {
        ColliderShape::Sphere { radius }
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        ColliderShape::Box { half_extents }
    }

    pub fn capsule(radius: f32, half_height: f32) -> Self {
        ColliderShape::Capsule {
            radius,
            half_height,
        }
    }

    pub fn cylinder(radius: f32, half_height: f32) -> Self {
        ColliderShape::Cylinder {
            radius,
            half_height,
        }
    }

    pub fn ellipsoid(radii: Vec3) -> Self {
        ColliderShape::Ellipsoid { radii }
    }

    pub fn mesh(vertices: Vec<Vec3>, indices: Vec<[u32; 3]>) -> Self {
        ColliderShape::TriangleMesh(TriangleMesh::builder(vertices, indices).build())
    }

    pub fn shape_type(&self) -> ShapeType {
        match self {
            ColliderShape::Sphere { .. } => ShapeType::Sphere,
            ColliderShape::Box { .. } => ShapeType::Box,
            ColliderShape::Capsule { .. } => ShapeType::Capsule,
            ColliderShape::Cylinder { .. } => ShapeType::Cylinder,
            ColliderShape::Ellipsoid { .. } => ShapeType::Ellipsoid,
            ColliderShape::ConvexMesh(_) => ShapeType::ConvexMesh,
            ColliderShape::MultiConvexMesh(_) => ShapeType::MultiConvexMesh,
            ColliderShape::TriangleMesh(_) => ShapeType::TriangleMesh,
            ColliderShape::HeightField(_) => ShapeType::HeightField,
        }
    }

    pub fn local_aabb(&self) -> Aabb {
        match self {
            ColliderShape::Sphere { radius } => {
                Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(*radius))
            }
            ColliderShape::Box { half_extents } => {
                Aabb::from_center_half_extents(Vec3::ZERO, *half_extents)
            }
            ColliderShape::Capsule {
                radius,
                half_height,
            } => Aabb::from_center_half_extents(
                Vec3::ZERO,
                Vec3::new(*radius, half_height + radius, *radius),
            ),
            ColliderShape::Cylinder {
                radius,
                half_height,
            } => Aabb::from_center_half_extents(
                Vec3::ZERO,
                Vec3::new(*radius, *half_height, *radius),
            ),
            ColliderShape::Ellipsoid { radii } => Aabb::from_center_half_extents(Vec3::ZERO, *radii),
            ColliderShape::ConvexMesh(hull) => hull.bounds,
            ColliderShape::MultiConvexMesh(multi) => multi.bounds,
            ColliderShape::TriangleMesh(mesh) => mesh.bounds,
            ColliderShape::HeightField(field) => field.bounds(),
        }
    }

    /// Bounds in world space for the given placement.
    pub fn world_aabb(&self, transform: &Transform) -> Aabb {
        match self {
            // Rotation invariant, so skip the box transform.
            ColliderShape::Sphere { radius } => {
                Aabb::from_center_half_extents(transform.position, Vec3::splat(*radius))
            }
            ColliderShape::Capsule {
                radius,
                half_height,
            } => {
                let axis = transform.rotation * Vec3::new(0.0, *half_height, 0.0);
                let mut aabb = Aabb::empty();
                aabb.extend(transform.position + axis);
                aabb.extend(transform.position - axis);
                aabb.expanded(*radius)
            }
            _ => self.local_aabb().transformed(transform),
        }
    }

    pub fn bounding_radius(&self) -> f32 {
        match self {
            ColliderShape::Sphere { radius } => *radius,
            ColliderShape::Capsule {
                radius,
                half_height,
            } => radius + half_height,
            _ => {
                let aabb = self.local_aabb();
                aabb.min.abs().max(aabb.max.abs()).length()
            }
        }
    }

    pub fn volume(&self) -> f32 {
        match self {
            ColliderShape::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
            ColliderShape::Box { half_extents } => 8.0 * half_extents.x * half_extents.y * half_extents.z,
            ColliderShape::Capsule {
                radius,
                half_height,
            } => PI * radius * radius * 2.0 * half_height + 4.0 / 3.0 * PI * radius.powi(3),
            ColliderShape::Cylinder {
                radius,
                half_height,
            } => PI * radius * radius * 2.0 * half_height,
            ColliderShape::Ellipsoid { radii } => 4.0 / 3.0 * PI * radii.x * radii.y * radii.z,
            ColliderShape::ConvexMesh(hull) => hull.volume(),
            ColliderShape::MultiConvexMesh(multi) => multi.hulls.iter().map(ConvexMesh::volume).sum(),
            ColliderShape::TriangleMesh(_) | ColliderShape::HeightField(_) => 0.0,
        }
    }

    /// Mass and inertia about the shape origin. Surfaces contribute nothing.
    pub fn mass_properties(&self, density: f32) -> MassProperties {
        let density = density.max(0.0);
        match self {
            ColliderShape::Sphere { radius } => {
                let mass = self.volume() * density;
                MassProperties::new(mass, Mat3::for_solid_sphere(*radius, mass))
            }
            ColliderShape::Box { half_extents } => {
                let mass = self.volume() * density;
                MassProperties::new(mass, Mat3::for_solid_box(*half_extents, mass))
            }
            ColliderShape::Capsule {
                radius,
                half_height,
            } => {
                let mass = self.volume() * density;
                MassProperties::new(mass, inertia_capsule(*radius, 2.0 * half_height, mass))
            }
            ColliderShape::Cylinder {
                radius,
                half_height,
            } => {
                let mass = self.volume() * density;
                MassProperties::new(mass, Mat3::for_solid_cylinder(*radius, 2.0 * half_height, mass))
            }
            ColliderShape::Ellipsoid { radii } => {
                let mass = self.volume() * density;
                MassProperties::new(mass, Mat3::for_solid_ellipsoid(*radii, mass))
            }
            ColliderShape::ConvexMesh(hull) => hull.mass_properties(density),
            ColliderShape::MultiConvexMesh(multi) => multi.mass_properties(density),
            ColliderShape::TriangleMesh(_) | ColliderShape::HeightField(_) => MassProperties::ZERO,
        }
    }
}

/// Collider component attached to a physics node.
#[derive(Debug, Clone)]
pub struct Collider {
    pub shape: ColliderShape,
    /// Placement relative to the owning node.
    pub offset: Transform,
    pub material: Material,
    pub group: GroupId,
    /// Ghost colliders (sensors) are detected but never resolved.
    pub ghost: bool,
    pub(crate) node: Option<NodeHandle>,
    pub(crate) body: Option<BodyHandle>,
    pub(crate) membership: Option<BroadPhasePartition>,
    pub(crate) contacts: Vec<ContactHandle>,
    pub(crate) joints: Vec<JointHandle>,
    pub(crate) world: Transform,
    pub(crate) aabb: Aabb,
    pub(crate) pending_delete: bool,
}

impl Default for Collider {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Collider {
    pub fn new(shape: ColliderShape) -> Self {
        Self::builder().shape(shape).build()
    }

    pub fn builder() -> ColliderBuilder {
        ColliderBuilder::new()
    }

    pub fn shape_type(&self) -> ShapeType {
        self.shape.shape_type()
    }

    pub fn node(&self) -> Option<NodeHandle> {
        self.node
    }

    pub fn body(&self) -> Option<BodyHandle> {
        self.body
    }

    pub fn membership(&self) -> Option<BroadPhasePartition> {
        self.membership
    }

    /// Partition this collider belongs in: bodies are dynamic, bodiless colliders static.
    pub fn desired_partition(&self) -> BroadPhasePartition {
        if self.body.is_some() {
            BroadPhasePartition::Dynamic
        } else {
            BroadPhasePartition::Static
        }
    }

    pub fn contact_edges(&self) -> &[ContactHandle] {
        &self.contacts
    }

    pub fn joint_edges(&self) -> &[JointHandle] {
        &self.joints
    }

    pub fn world_transform(&self) -> &Transform {
        &self.world
    }

    pub fn world_aabb(&self) -> &Aabb {
        &self.aabb
    }

    pub fn is_ghost(&self) -> bool {
        self.ghost
    }

    pub fn is_pending_delete(&self) -> bool {
        self.pending_delete
    }

    /// Refreshes the cached world transform and bounds from the owning node's world transform.
    pub(crate) fn update_world(&mut self, node_world: &Transform) {
        self.world = node_world.combine(&self.offset);
        self.aabb = self.shape.world_aabb(&self.world);
    }

    pub(crate) fn remove_contact_edge(&mut self, contact: ContactHandle) {
        self.contacts.retain(|&c| c != contact);
    }

    pub(crate) fn remove_joint_edge(&mut self, joint: JointHandle) {
        self.joints.retain(|&j| j != joint);
    }
}

pub struct ColliderBuilder {
    shape: ColliderShape,
    offset: Transform,
    material: Material,
    group: GroupId,
    ghost: bool,
}

impl Default for ColliderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ColliderBuilder {
    pub fn new() -> Self {
        Self {
            shape: ColliderShape::Sphere { radius: 0.5 },
            offset: Transform::default(),
            material: Material::default(),
            group: GroupId::DEFAULT,
            ghost: false,
        }
    }

    pub fn shape(mut self, shape: ColliderShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn sphere(self, radius: f32) -> Self {
        self.shape(ColliderShape::sphere(radius))
    }

    pub fn box_shape(self, half_extents: Vec3) -> Self {
        self.shape(ColliderShape::cuboid(half_extents))
    }

    pub fn capsule(self, radius: f32, half_height: f32) -> Self {
        self.shape(ColliderShape::capsule(radius, half_height))
    }

    pub fn cylinder(self, radius: f32, half_height: f32) -> Self {
        self.shape(ColliderShape::cylinder(radius, half_height))
    }

    pub fn ellipsoid(self, radii: Vec3) -> Self {
        self.shape(ColliderShape::ellipsoid(radii))
    }

    pub fn offset(mut self, offset: Transform) -> Self {
        self.offset = offset;
        self
    }

    pub fn material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn density(mut self, density: f32) -> Self {
        self.material.density = density;
        self
    }

    pub fn group(mut self, group: GroupId) -> Self {
        self.group = group;
        self
    }

    pub fn ghost(mut self, ghost: bool) -> Self {
        self.ghost = ghost;
        self
    }

    pub fn build(self) -> Collider {
        let aabb = self.shape.world_aabb(&self.offset);
        Collider {
            shape: self.shape,
            offset: self.offset,
            material: self.material,
            group: self.group,
            ghost: self.ghost,
            node: None,
            body: None,
            membership: None,
            contacts: Vec::new(),
            joints: Vec::new(),
            world: self.offset,
            aabb,
            pending_delete: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn shape_types_split_primitives_and_complex() {
        for ty in ShapeType::PRIMITIVES {
            assert!(!ty.is_complex(), "{ty:?}");
        }
        for ty in ShapeType::COMPLEX {
            assert!(ty.is_complex(), "{ty:?}");
        }
        assert_eq!(ShapeType::ALL.len(), SHAPE_TYPE_COUNT);
    }

    #[test]
    fn capsule_world_aabb_follows_rotation() {
        let shape = ColliderShape::capsule(0.5, 1.0);
        let lying = Transform::from_position_rotation(
            Vec3::ZERO,
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
        );
        let aabb = shape.world_aabb(&lying);
        assert!((aabb.max.x - 1.5).abs() < 1e-4, "max.x was {}", aabb.max.x);
        assert!((aabb.max.y - 0.5).abs() < 1e-4, "max.y was {}", aabb.max.y);
    }

    #[test]
    fn surfaces_are_massless() {
        let mesh = ColliderShape::mesh(
            vec![Vec3::ZERO, Vec3::X, Vec3::Z],
            vec![[0, 1, 2]],
        );
        assert_eq!(mesh.mass_properties(5.0).mass, 0.0);
        assert!(mesh.shape_type().is_surface());
    }

    #[test]
    fn unit_sphere_mass_matches_volume() {
        let props = ColliderShape::sphere(1.0).mass_properties(1.0);
        assert!((props.mass - 4.0 / 3.0 * PI).abs() < 1e-4);
    }

    #[test]
    fn update_world_applies_offset() {
        let mut collider = Collider::builder()
            .sphere(1.0)
            .offset(Transform::from_position(Vec3::new(0.0, 2.0, 0.0)))
            .build();
        collider.update_world(&Transform::from_position(Vec3::new(5.0, 0.0, 0.0)));
        assert_eq!(collider.world_transform().position, Vec3::new(5.0, 2.0, 0.0));
        assert_eq!(collider.world_aabb().min, Vec3::new(4.0, 1.0, -1.0));
    }
}
