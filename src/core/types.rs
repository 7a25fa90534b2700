use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Rigid placement of a node, body or collider: translation followed by rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self::new(position, rotation)
    }

    /// Applies another transform on top of this one, returning the composition.
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * other.position,
            rotation: (self.rotation * other.rotation).normalize(),
        }
    }

    pub fn inverse(&self) -> Transform {
        let rotation = self.rotation.conjugate();
        Transform {
            position: rotation * -self.position,
            rotation,
        }
    }

    /// Expresses `self` (a world transform) in the frame of `parent`.
    pub fn relative_to(&self, parent: &Transform) -> Transform {
        parent.inverse().combine(self)
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * point
    }

    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * vector
    }

    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation.conjugate() * (point - self.position)
    }

    pub fn inverse_transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation.conjugate() * vector
    }

    pub fn rotation_matrix(&self) -> Mat3 {
        Mat3::from_quat(self.rotation)
    }
}

/// Linear and angular velocity of a rigid body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl Velocity {
    pub const ZERO: Velocity = Velocity {
        linear: Vec3::ZERO,
        angular: Vec3::ZERO,
    };

    pub fn new(linear: Vec3, angular: Vec3) -> Self {
        Self { linear, angular }
    }

    /// Velocity of a point offset by `r` from the centre of mass.
    pub fn point_velocity(&self, r: Vec3) -> Vec3 {
        self.linear + self.angular.cross(r)
    }
}

/// Mass and inertia tensor (about the local origin) of a body or a shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f32,
    pub inertia: Mat3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            inertia: Mat3::IDENTITY,
        }
    }
}

impl MassProperties {
    pub const ZERO: MassProperties = MassProperties {
        mass: 0.0,
        inertia: Mat3::ZERO,
    };

    pub fn new(mass: f32, inertia: Mat3) -> Self {
        Self { mass, inertia }
    }

    /// Accumulates another set of properties expressed in the same frame.
    pub fn accumulate(&mut self, other: &MassProperties) {
        self.mass += other.mass;
        self.inertia += other.inertia;
    }

    pub fn scaled(&self, factor: f32) -> MassProperties {
        MassProperties {
            mass: self.mass * factor,
            inertia: self.inertia * factor,
        }
    }

    /// Moves the properties from a shape frame into its owner's frame.
    pub fn transformed(&self, offset: &Transform) -> MassProperties {
        let rotated = crate::utils::math::rotate_tensor(self.inertia, offset.rotation);
        MassProperties {
            mass: self.mass,
            inertia: rotated + crate::utils::math::parallel_axis(self.mass, offset.position),
        }
    }
}

/// Material coefficients that affect interactions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub density: f32,
    pub restitution: f32,
    pub friction: f32,
    /// How this material mixes its coefficients with another material.
    pub mixing: MaterialMixing,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            density: 1.0,
            restitution: 0.0,
            friction: 0.5,
            mixing: MaterialMixing::default(),
        }
    }
}

impl Material {
    pub fn rubber() -> Self {
        Self {
            density: 1.4,
            restitution: 0.8,
            friction: 1.0,
            mixing: MaterialMixing::default(),
        }
    }

    pub fn steel() -> Self {
        Self {
            density: 7.8,
            restitution: 0.4,
            friction: 0.45,
            mixing: MaterialMixing::default(),
        }
    }

    pub fn ice() -> Self {
        Self {
            density: 0.9,
            restitution: 0.05,
            friction: 0.03,
            mixing: MaterialMixing::default(),
        }
    }

    /// Symmetric combination of two materials.
    pub fn combine_pair(a: &Self, b: &Self) -> MaterialPairProperties {
        let friction_mode = a.mixing.friction.resolve(b.mixing.friction);
        let restitution_mode = a.mixing.restitution.resolve(b.mixing.restitution);
        MaterialPairProperties {
            friction: friction_mode.combine(a.friction, b.friction),
            restitution: restitution_mode.combine(a.restitution, b.restitution),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialMixing {
    pub friction: MixingMode,
    pub restitution: MixingMode,
}

impl MaterialMixing {
    pub fn with_friction(mut self, mode: MixingMode) -> Self {
        self.friction = mode;
        self
    }

    pub fn with_restitution(mut self, mode: MixingMode) -> Self {
        self.restitution = mode;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum MixingMode {
    #[default]
    Average,
    Min,
    Max,
    GeometricMean,
}

impl MixingMode {
    fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            MixingMode::Average => 0.5 * (a + b),
            MixingMode::Min => a.min(b),
            MixingMode::Max => a.max(b),
            MixingMode::GeometricMean => (a.abs() * b.abs()).sqrt(),
        }
    }

    // Order-independent: the "stronger" non-average mode wins.
    fn resolve(self, other: MixingMode) -> MixingMode {
        if matches!(self, MixingMode::Average) {
            other
        } else if matches!(other, MixingMode::Average) {
            self
        } else {
            self.max(other)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialPairProperties {
    pub friction: f32,
    pub restitution: f32,
}

impl Default for MaterialPairProperties {
    fn default() -> Self {
        Material::combine_pair(&Material::default(), &Material::default())
    }
}

/// Helper methods for inertia calculations.
pub trait InertiaTensorExt {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Mat3;
    fn for_solid_sphere(radius: f32, mass: f32) -> Mat3;
    fn for_solid_ellipsoid(radii: Vec3, mass: f32) -> Mat3;
    fn for_solid_cylinder(radius: f32, height: f32, mass: f32) -> Mat3;
}

impl InertiaTensorExt for Mat3 {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Mat3 {
        let lx = half_extents.x * 2.0;
        let ly = half_extents.y * 2.0;
        let lz = half_extents.z * 2.0;
        let factor = mass / 12.0;
        Mat3::from_diagonal(Vec3::new(
            factor * (ly * ly + lz * lz),
            factor * (lx * lx + lz * lz),
            factor * (lx * lx + ly * ly),
        ))
    }

    fn for_solid_sphere(radius: f32, mass: f32) -> Mat3 {
        let value = 0.4 * mass * radius * radius;
        Mat3::from_diagonal(Vec3::splat(value))
    }

    fn for_solid_ellipsoid(radii: Vec3, mass: f32) -> Mat3 {
        let r2 = radii * radii;
        Mat3::from_diagonal(
            Vec3::new(r2.y + r2.z, r2.x + r2.z, r2.x + r2.y) * (0.2 * mass),
        )
    }

    fn for_solid_cylinder(radius: f32, height: f32, mass: f32) -> Mat3 {
        let r2 = radius * radius;
        let lateral = mass * (3.0 * r2 + height * height) / 12.0;
        Mat3::from_diagonal(Vec3::new(lateral, 0.5 * mass * r2, lateral))
    }
}
