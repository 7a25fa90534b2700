//! rigid_core – rigid-body physics core for Rust.
//!
//! The crate provides narrow-phase collision dispatch, group-based collision filtering,
//! island-based constraint solving with sleep management, deferred synchronisation of a node
//! hierarchy with bodies, colliders and the broad-phase, and rigid-body integration.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;
pub mod world;

pub use glam::{Mat3, Quat, Vec3};

pub use collision::{
    broadphase::{BroadPhase, BroadPhasePartition, GridBroadPhase},
    ccd::{CcdDetector, TimeOfImpact},
    contact::Contact,
    dispatch::{Accuracy, ShapeDispatchTable},
    filter::{CollisionFilter, CollisionTable, FilterBlock, FilterBlockKind, FilterResult, GroupId},
    primitives::{BoundingSphere, CastHit, CastKind, CastShape, Frustum, Ray, Segment},
};
pub use config::PhysicsConfig;
pub use core::{
    collider::{Collider, ColliderShape, ShapeType},
    handles::{BodyHandle, ColliderHandle, ContactHandle, JointHandle, NodeHandle},
    mesh::Aabb,
    rigidbody::{BodyMode, RigidBody},
    types::{MassProperties, Material, Transform, Velocity},
};
pub use dynamics::{
    forces::{DragForce, ForceGenerator, ForceRegistry, GravityForce, SpringForce},
    joints::{Joint, PositionJoint, WheelJoint},
    solver::{ConstraintSolver, ImpulseSolver},
};
pub use error::{PhysicsError, Result};
pub use utils::allocator::{Arena, GenerationalId};
pub use world::{CastResult, PhysicsEvent, PhysicsWorld, SweepResult};

/// High-level convenience wrapper that owns a [`PhysicsWorld`] and steps it at a fixed rate.
pub struct PhysicsEngine {
    world: PhysicsWorld,
    time_step: f32,
    time_accumulated: f32,
}

impl PhysicsEngine {
    /// Creates an engine that advances in increments of `time_step` seconds.
    pub fn new(config: PhysicsConfig, time_step: f32) -> Self {
        let time_step = if time_step > 0.0 && time_step.is_finite() {
            time_step
        } else {
            log::warn!("invalid time step {time_step}, using the default");
            config::DEFAULT_TIME_STEP
        };
        Self {
            world: PhysicsWorld::new(config),
            time_step,
            time_accumulated: 0.0,
        }
    }

    pub fn time_step(&self) -> f32 {
        self.time_step
    }

    /// Accumulates `elapsed` and runs as many fixed steps as fit. Returns the number of steps.
    pub fn advance(&mut self, elapsed: f32) -> usize {
        if elapsed.is_finite() && elapsed > 0.0 {
            self.time_accumulated += elapsed;
        }
        let mut steps = 0;
        while self.time_accumulated >= self.time_step {
            self.time_accumulated -= self.time_step;
            self.world.step(self.time_step);
            steps += 1;
        }
        steps
    }

    /// Fraction of a step left in the accumulator, for render interpolation.
    pub fn alpha(&self) -> f32 {
        self.time_accumulated / self.time_step
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.world
    }
}
