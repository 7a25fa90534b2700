//! Typed generational handles used for every cross reference in the world.

use crate::utils::allocator::arena_key;

arena_key!(
    /// Scene-graph node carrying a transform, an optional body and an optional collider.
    NodeHandle
);
arena_key!(
    /// Rigid body stored in the world's body arena.
    BodyHandle
);
arena_key!(
    /// Collider stored in the world's collider arena.
    ColliderHandle
);
arena_key!(
    /// Contact edge between two colliders.
    ContactHandle
);
arena_key!(
    /// Joint edge between one or two colliders.
    JointHandle
);
