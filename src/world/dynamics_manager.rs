//! Dynamics pipeline: islands, global forces, the constraint solver and sleep bookkeeping.

use std::time::Duration;

use super::events::{EventQueue, PhysicsEvent};
use crate::collision::contact::Contact;
use crate::config::PhysicsConfig;
use crate::core::{
    collider::Collider,
    handles::{BodyHandle, ColliderHandle, ContactHandle, JointHandle},
    rigidbody::RigidBody,
    types::Velocity,
};
use crate::dynamics::{
    forces::ForceRegistry,
    island::{IslandInputs, IslandManager, SleepSettings},
    joints::Joint,
    solver::{ConstraintSolver, ImpulseSolver, SolverContext, SolverSettings},
};
use crate::utils::{allocator::Arena, math::quat_to_angular_velocity, profiling::ScopedTimer};

/// Scene state the dynamics stage reads and writes.
pub struct DynamicsContext<'a> {
    pub bodies: &'a mut Arena<BodyHandle, RigidBody>,
    pub colliders: &'a Arena<ColliderHandle, Collider>,
    pub contacts: &'a mut Arena<ContactHandle, Contact>,
    pub joints: &'a mut Arena<JointHandle, Joint>,
    pub events: &'a mut EventQueue,
}

/// Outcome of one dynamics step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicsStepReport {
    /// Bodies the solver moved; their nodes need the new pose.
    pub moved: Vec<BodyHandle>,
    pub islands: usize,
    pub slept: usize,
    pub woken: usize,
    pub island_time: Duration,
    pub solver_time: Duration,
}

pub struct DynamicsManager {
    pub islands: IslandManager,
    pub forces: ForceRegistry,
    solver: Box<dyn ConstraintSolver>,
}

impl Default for DynamicsManager {
    fn default() -> Self {
        Self::new(&PhysicsConfig::default())
    }
}

impl DynamicsManager {
    pub fn new(config: &PhysicsConfig) -> Self {
        Self::with_solver(config, Box::new(ImpulseSolver::new()))
    }

    pub fn with_solver(config: &PhysicsConfig, solver: Box<dyn ConstraintSolver>) -> Self {
        Self {
            islands: IslandManager::new(),
            forces: ForceRegistry::new(config.gravity),
            solver,
        }
    }

    pub fn set_solver(&mut self, solver: Box<dyn ConstraintSolver>) {
        self.solver = solver;
    }

    pub fn step(&mut self, dt: f32, config: &PhysicsConfig, ctx: &mut DynamicsContext<'_>) -> DynamicsStepReport {
        let mut report = DynamicsStepReport::default();

        for (_, body) in ctx.bodies.iter_mut() {
            body.reset_sleep_accumulated();
            if body.is_kinematic() {
                derive_kinematic_velocity(body, dt);
            }
        }

        let woken = {
            let _timer = ScopedTimer::new(&mut report.island_time);
            self.islands.build(IslandInputs {
                bodies: &mut *ctx.bodies,
                colliders: ctx.colliders,
                contacts: &mut *ctx.contacts,
                joints: &mut *ctx.joints,
            })
        };
        report.woken = woken.len();
        for body in woken {
            ctx.events.push(PhysicsEvent::BodyWoke(body));
        }

        let sleep = SleepSettings::from(config);
        let settings = SolverSettings::from(config);
        report.islands = self.islands.island_count();
        let mut solver_time = Duration::ZERO;
        let timer = ScopedTimer::new(&mut solver_time);
        for island in self.islands.islands_mut() {
            self.forces.apply_all(&mut *ctx.bodies, island.bodies(), dt);
            let mut solver_ctx = SolverContext {
                bodies: &mut *ctx.bodies,
                colliders: ctx.colliders,
                contacts: &mut *ctx.contacts,
                joints: &mut *ctx.joints,
                settings,
            };
            let slept = island.solve(dt, config.allow_sleep, &sleep, self.solver.as_mut(), &mut solver_ctx);
            report.moved.extend_from_slice(island.bodies());
            if slept {
                report.slept += island.bodies().len();
                for &body in island.bodies() {
                    ctx.events.push(PhysicsEvent::BodySlept(body));
                }
            }
        }
        drop(timer);
        report.solver_time = solver_time;
        report
    }
}

/// Kinematic bodies are moved by their nodes; their velocity is the motion since last step.
fn derive_kinematic_velocity(body: &mut RigidBody, dt: f32) {
    let pose = body.pose();
    let velocity = match body.kinematic_previous {
        Some(previous) if dt > 0.0 => Velocity::new(
            (pose.position - previous.position) / dt,
            quat_to_angular_velocity(pose.rotation * previous.rotation.inverse(), dt),
        ),
        _ => Velocity::ZERO,
    };
    body.set_velocity(velocity);
    body.kinematic_previous = Some(pose);
}
