//! Core data model: handles, transforms, rigid bodies, colliders and their shapes.

pub mod collider;
pub mod handles;
pub mod heightfield;
pub mod mesh;
pub mod rigidbody;
pub mod types;

pub use collider::{Collider, ColliderBuilder, ColliderShape, ShapeType, SHAPE_TYPE_COUNT};
pub use handles::{BodyHandle, ColliderHandle, ContactHandle, JointHandle, NodeHandle};
pub use heightfield::HeightField;
pub use mesh::{Aabb, ConvexMesh, MeshBuilder, MeshBvh, MultiConvexMesh, TriangleMesh};
pub use rigidbody::{top_level_body, BodyMode, RigidBody};
pub use types::{MassProperties, Material, Transform, Velocity};
