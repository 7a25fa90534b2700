//! Collision detection: cast primitives, GJK/EPA, narrow-phase routines, the shape
//! dispatch table, group filtering, the broad-phase contract and contact edges.

pub mod broadphase;
pub mod casting;
pub mod ccd;
pub mod clipping;
pub mod contact;
pub mod dispatch;
pub mod edges;
pub mod filter;
pub mod gjk;
pub mod manifold;
pub mod narrowphase;
pub mod primitives;
pub mod shapes;

pub use broadphase::{BroadPhase, BroadPhasePartition, GridBroadPhase, ProxyInsert, ProxyUpdate};
pub use ccd::{CcdDetector, TimeOfImpact};
pub use contact::{Contact, ContactPoint};
pub use dispatch::{Accuracy, CastEntry, CollideEntry, ShapeDispatchTable};
pub use filter::{
    CollisionFilter, CollisionTable, FilterBlock, FilterBlockKind, FilterResult, GroupId,
};
pub use manifold::{Manifold, ManifoldPoint, MAX_MANIFOLD_POINTS};
pub use primitives::{
    BoundingSphere, CastHit, CastKind, CastShape, Frustum, Plane, Ray, Segment,
};
pub use shapes::{ConvexPiece, ShapeInstance, SupportMap};
