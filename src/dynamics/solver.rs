//! Constraint solver contract and the sequential-impulse reference solver.

use std::collections::HashMap;

use glam::{Quat, Vec3};

use super::joints::{Joint, JointEndpoint, RowBuilder};
use super::molecule::{ConstraintMolecule, Jacobian, Softness, SolverMass};
use crate::collision::contact::Contact;
use crate::config::PhysicsConfig;
use crate::core::{
    collider::Collider,
    handles::{BodyHandle, ColliderHandle, ContactHandle, JointHandle},
    rigidbody::{top_level_body, RigidBody},
    types::{Transform, Velocity},
};
use crate::utils::{
    allocator::Arena,
    math::{angular_velocity_to_quat, orthonormal_basis},
};

/// Approach speed above which restitution applies.
const RESTITUTION_THRESHOLD: f32 = 1.0;

/// Largest positional correction applied to one contact point per iteration.
const MAX_POSITION_CORRECTION: f32 = 0.2;

/// Iteration counts and error feedback shared by every island in a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub baumgarte: f32,
    pub slop: f32,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self::from(&PhysicsConfig::default())
    }
}

impl From<&PhysicsConfig> for SolverSettings {
    fn from(config: &PhysicsConfig) -> Self {
        Self {
            velocity_iterations: config.velocity_iterations.max(1),
            position_iterations: config.position_iterations,
            baumgarte: config.baumgarte,
            slop: config.slop,
        }
    }
}

/// World state the solver reads and writes while solving one island.
pub struct SolverContext<'a> {
    pub bodies: &'a mut Arena<BodyHandle, RigidBody>,
    pub colliders: &'a Arena<ColliderHandle, Collider>,
    pub contacts: &'a mut Arena<ContactHandle, Contact>,
    pub joints: &'a mut Arena<JointHandle, Joint>,
    pub settings: SolverSettings,
}

/// Numerical kernel an island hands its constraints to.
pub trait ConstraintSolver: Send {
    fn add_contacts(&mut self, contacts: &[ContactHandle]);
    fn add_joints(&mut self, joints: &[JointHandle]);
    /// Solves velocities and commits impulses and body velocities.
    fn solve(&mut self, dt: f32, ctx: &mut SolverContext<'_>);
    /// Removes remaining penetration after positions were integrated.
    fn solve_positions(&mut self, ctx: &mut SolverContext<'_>);
    fn clear(&mut self);
}

/// Totals accumulated by the solver since the last reset.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SolverStepMetrics {
    pub islands_solved: usize,
    pub contacts_solved: usize,
    pub joints_solved: usize,
    pub rows_solved: usize,
    pub normal_impulse_sum: f32,
    pub tangent_impulse_sum: f32,
}

impl SolverStepMetrics {
    pub fn merge(&mut self, other: &Self) {
        self.islands_solved += other.islands_solved;
        self.contacts_solved += other.contacts_solved;
        self.joints_solved += other.joints_solved;
        self.rows_solved += other.rows_solved;
        self.normal_impulse_sum += other.normal_impulse_sum;
        self.tangent_impulse_sum += other.tangent_impulse_sum;
    }
}

/// Dense copy of one body for the duration of a solve. Slot 0 is the immovable world.
#[derive(Debug, Clone, Copy)]
struct SolverBody {
    handle: Option<BodyHandle>,
    velocity: Velocity,
    mass: SolverMass,
    position: Vec3,
    rotation: Quat,
    /// Dynamic bodies get their velocity and pose written back.
    writable: bool,
    planar: bool,
}

impl SolverBody {
    const WORLD: SolverBody = SolverBody {
        handle: None,
        velocity: Velocity::ZERO,
        mass: SolverMass::INFINITE,
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        writable: false,
        planar: false,
    };

    fn pose(&self) -> Transform {
        Transform::new(self.position, self.rotation)
    }
}

/// Rows `[normal, tangent, bitangent]` per point of one contact.
#[derive(Debug, Clone, Copy)]
struct ContactBlock {
    handle: ContactHandle,
    start: usize,
    points: usize,
    friction: f32,
}

#[derive(Debug, Clone, Copy)]
struct JointBlock {
    handle: JointHandle,
    start: usize,
    len: usize,
}

/// Contact point stored in each body's frame for position correction.
#[derive(Debug, Clone, Copy)]
struct PositionPoint {
    body_a: usize,
    body_b: usize,
    local_a: Vec3,
    local_b: Vec3,
    normal: Vec3,
}

/// Sequential impulses with warm starting, Coulomb friction, Baumgarte feedback and a
/// separate pseudo-velocity position pass.
#[derive(Debug, Default)]
pub struct ImpulseSolver {
    contacts: Vec<ContactHandle>,
    joints: Vec<JointHandle>,
    bodies: Vec<SolverBody>,
    body_index: HashMap<BodyHandle, usize>,
    molecules: Vec<ConstraintMolecule>,
    contact_blocks: Vec<ContactBlock>,
    joint_blocks: Vec<JointBlock>,
    position_points: Vec<PositionPoint>,
    metrics: SolverStepMetrics,
}

impl ImpulseSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> SolverStepMetrics {
        self.metrics
    }

    pub fn reset_metrics(&mut self) {
        self.metrics = SolverStepMetrics::default();
    }

    fn reset_bodies(&mut self) {
        self.bodies.clear();
        self.body_index.clear();
        self.bodies.push(SolverBody::WORLD);
    }

    /// Dense slot of the body that moves `collider`, the world slot for static geometry.
    fn slot_for_collider(&mut self, ctx: &SolverContext<'_>, collider: ColliderHandle) -> usize {
        let Some(body) = ctx.colliders.get(collider).and_then(Collider::body) else {
            return 0;
        };
        let body = top_level_body(&*ctx.bodies, body);
        if let Some(&slot) = self.body_index.get(&body) {
            return slot;
        }
        let Some(rigid) = ctx.bodies.get(body) else {
            return 0;
        };
        if rigid.is_static() {
            return 0;
        }
        let slot = self.bodies.len();
        self.bodies.push(SolverBody {
            handle: Some(body),
            velocity: rigid.velocity(),
            mass: SolverMass {
                inverse_mass: rigid.inverse_mass(),
                inverse_inertia: rigid.inverse_inertia_world(),
            },
            position: rigid.position(),
            rotation: rigid.rotation(),
            writable: rigid.is_dynamic(),
            planar: rigid.mode_2d,
        });
        self.body_index.insert(body, slot);
        slot
    }

    fn build_contact_rows(&mut self, dt: f32, ctx: &mut SolverContext<'_>) {
        let settings = ctx.settings;
        let handles = std::mem::take(&mut self.contacts);
        for &handle in &handles {
            let Some((colliders, normal_fallback, resolvable)) = ctx
                .contacts
                .get(handle)
                .map(|c| (c.colliders, c.normal, c.is_resolvable()))
            else {
                continue;
            };
            if !resolvable {
                continue;
            }
            let a = self.slot_for_collider(ctx, colliders[0]);
            let b = self.slot_for_collider(ctx, colliders[1]);
            if a == b {
                continue;
            }
            let (body_a, body_b) = (self.bodies[a], self.bodies[b]);
            if body_a.mass.inverse_mass == 0.0 && body_b.mass.inverse_mass == 0.0 {
                continue;
            }
            let Some(contact) = ctx.contacts.get(handle) else {
                continue;
            };

            let start = self.molecules.len();
            for point in &contact.points {
                let normal = if point.normal == Vec3::ZERO {
                    normal_fallback
                } else {
                    point.normal
                };
                let r_a = point.position - body_a.position;
                let r_b = point.position - body_b.position;

                let mut row = ConstraintMolecule::new(a, b, Jacobian::linear(normal, r_a, r_b), 0)
                    .with_bounds(0.0, f32::INFINITY);
                let approach = row.jacobian.velocity(&body_a.velocity, &body_b.velocity);
                let mut bias = if point.penetration > settings.slop {
                    -settings.baumgarte / dt * (point.penetration - settings.slop)
                } else if point.penetration < 0.0 {
                    // Speculative: allow closing the gap this step.
                    -point.penetration / dt
                } else {
                    0.0
                };
                if contact.material.restitution > 0.0 && approach < -RESTITUTION_THRESHOLD {
                    bias = bias.min(contact.material.restitution * approach);
                }
                row.bias = bias;
                row.impulse = point.normal_impulse;
                row.compute_mass(&body_a.mass, &body_b.mass, Softness::RIGID);
                self.molecules.push(row);

                let (t1, t2) = orthonormal_basis(normal);
                for (atom, tangent) in [(1u8, t1), (2u8, t2)] {
                    let mut row =
                        ConstraintMolecule::new(a, b, Jacobian::linear(tangent, r_a, r_b), atom);
                    row.impulse = point.tangent_impulse[atom as usize - 1];
                    row.compute_mass(&body_a.mass, &body_b.mass, Softness::RIGID);
                    self.molecules.push(row);
                }

                let (pose_a, pose_b) = (body_a.pose(), body_b.pose());
                let half = normal * (point.penetration.max(0.0) * 0.5);
                self.position_points.push(PositionPoint {
                    body_a: a,
                    body_b: b,
                    local_a: pose_a.inverse_transform_point(point.position + half),
                    local_b: pose_b.inverse_transform_point(point.position - half),
                    normal,
                });
            }
            self.contact_blocks.push(ContactBlock {
                handle,
                start,
                points: contact.points.len(),
                friction: contact.material.friction,
            });
        }
        self.contacts = handles;
    }

    fn joint_endpoint(
        &mut self,
        ctx: &SolverContext<'_>,
        collider: Option<ColliderHandle>,
        local_frame: &Transform,
    ) -> (usize, JointEndpoint) {
        let placed = collider.and_then(|c| ctx.colliders.get(c).map(|col| (c, col.world)));
        match placed {
            Some((handle, collider_world)) => {
                let slot = self.slot_for_collider(ctx, handle);
                let frame = collider_world.combine(local_frame);
                let center = if slot == 0 {
                    frame.position
                } else {
                    self.bodies[slot].position
                };
                (slot, JointEndpoint { frame, center })
            }
            None => (
                0,
                JointEndpoint {
                    frame: *local_frame,
                    center: local_frame.position,
                },
            ),
        }
    }

    fn build_joint_rows(&mut self, dt: f32, ctx: &mut SolverContext<'_>) {
        let handles = std::mem::take(&mut self.joints);
        for &handle in &handles {
            let Some((colliders, frames)) = ctx
                .joints
                .get(handle)
                .filter(|j| j.is_solvable())
                .map(|j| (j.colliders, j.local_frames))
            else {
                continue;
            };
            let (a, endpoint_a) = self.joint_endpoint(ctx, colliders[0], &frames[0]);
            let (b, endpoint_b) = self.joint_endpoint(ctx, colliders[1], &frames[1]);
            if a == b {
                continue;
            }
            let builder = RowBuilder {
                body_a: a,
                body_b: b,
                mass_a: self.bodies[a].mass,
                mass_b: self.bodies[b].mass,
                dt,
                baumgarte: ctx.settings.baumgarte,
                max_impulse: f32::INFINITY,
            };
            let Some(joint) = ctx.joints.get(handle) else {
                continue;
            };
            let start = self.molecules.len();
            joint.compute_molecules(&builder, &endpoint_a, &endpoint_b, &mut self.molecules);
            joint.warm_start(&mut self.molecules[start..]);
            self.joint_blocks.push(JointBlock {
                handle,
                start,
                len: self.molecules.len() - start,
            });
        }
        self.joints = handles;
    }

    fn warm_start(&mut self) {
        for row in &self.molecules {
            if row.impulse == 0.0 {
                continue;
            }
            if let Some((a, b)) = pair_mut(&mut self.bodies, row.body_a, row.body_b) {
                row.apply_impulse(row.impulse, &mut a.velocity, &mut b.velocity, &a.mass, &b.mass);
            }
        }
    }

    fn iterate(&mut self) {
        for block in &self.contact_blocks {
            for point in 0..block.points {
                let base = block.start + point * 3;
                solve_row(&mut self.bodies, &mut self.molecules[base]);
                let limit = block.friction * self.molecules[base].impulse;
                for tangent in 1..3 {
                    let row = &mut self.molecules[base + tangent];
                    row.min_impulse = -limit;
                    row.max_impulse = limit;
                    solve_row(&mut self.bodies, row);
                }
            }
        }
        for block in &self.joint_blocks {
            for row in &mut self.molecules[block.start..block.start + block.len] {
                solve_row(&mut self.bodies, row);
            }
        }
    }

    fn commit(&mut self, ctx: &mut SolverContext<'_>) {
        for block in &self.contact_blocks {
            let Some(contact) = ctx.contacts.get_mut(block.handle) else {
                continue;
            };
            for (index, point) in contact.points.iter_mut().enumerate().take(block.points) {
                let base = block.start + index * 3;
                point.normal_impulse = self.molecules[base].impulse;
                point.tangent_impulse = [
                    self.molecules[base + 1].impulse,
                    self.molecules[base + 2].impulse,
                ];
                self.metrics.normal_impulse_sum += point.normal_impulse;
                self.metrics.tangent_impulse_sum +=
                    Vec3::new(point.tangent_impulse[0], point.tangent_impulse[1], 0.0).length();
            }
        }
        for block in &self.joint_blocks {
            if let Some(joint) = ctx.joints.get_mut(block.handle) {
                joint.commit(&self.molecules[block.start..block.start + block.len]);
            }
        }
        for body in self.bodies.iter().filter(|b| b.writable) {
            let Some(rigid) = body.handle.and_then(|h| ctx.bodies.get_mut(h)) else {
                continue;
            };
            let mut velocity = body.velocity;
            if body.planar {
                velocity.linear.z = 0.0;
                velocity.angular.x = 0.0;
                velocity.angular.y = 0.0;
            }
            rigid.set_velocity(velocity);
        }
    }
}

impl ConstraintSolver for ImpulseSolver {
    fn add_contacts(&mut self, contacts: &[ContactHandle]) {
        self.contacts.extend_from_slice(contacts);
    }

    fn add_joints(&mut self, joints: &[JointHandle]) {
        self.joints.extend_from_slice(joints);
    }

    fn solve(&mut self, dt: f32, ctx: &mut SolverContext<'_>) {
        if dt <= 0.0 {
            return;
        }
        self.reset_bodies();
        self.molecules.clear();
        self.contact_blocks.clear();
        self.joint_blocks.clear();
        self.position_points.clear();

        self.build_contact_rows(dt, ctx);
        self.build_joint_rows(dt, ctx);
        if self.molecules.is_empty() {
            return;
        }

        self.warm_start();
        for _ in 0..ctx.settings.velocity_iterations {
            self.iterate();
        }
        self.commit(ctx);

        self.metrics.islands_solved += 1;
        self.metrics.contacts_solved += self.contact_blocks.len();
        self.metrics.joints_solved += self.joint_blocks.len();
        self.metrics.rows_solved += self.molecules.len();
    }

    fn solve_positions(&mut self, ctx: &mut SolverContext<'_>) {
        if self.position_points.is_empty() {
            return;
        }
        for body in self.bodies.iter_mut().skip(1) {
            if let Some(rigid) = body.handle.and_then(|h| ctx.bodies.get(h)) {
                body.position = rigid.position();
                body.rotation = rigid.rotation();
            }
        }

        let settings = ctx.settings;
        for _ in 0..settings.position_iterations {
            for point in &self.position_points {
                let Some((a, b)) = pair_mut(&mut self.bodies, point.body_a, point.body_b) else {
                    continue;
                };
                let world_a = a.pose().transform_point(point.local_a);
                let world_b = b.pose().transform_point(point.local_b);
                let penetration = (world_a - world_b).dot(point.normal);
                let correction = (settings.baumgarte * (penetration - settings.slop))
                    .clamp(0.0, MAX_POSITION_CORRECTION);
                if correction <= 0.0 {
                    continue;
                }

                let r_a = world_a - a.position;
                let r_b = world_b - b.position;
                let arm_a = r_a.cross(point.normal);
                let arm_b = r_b.cross(point.normal);
                let k = a.mass.inverse_mass
                    + b.mass.inverse_mass
                    + arm_a.dot(a.mass.inverse_inertia * arm_a)
                    + arm_b.dot(b.mass.inverse_inertia * arm_b);
                if k <= f32::EPSILON {
                    continue;
                }
                let impulse = correction / k;

                if a.writable {
                    a.position -= point.normal * (impulse * a.mass.inverse_mass);
                    let turn = a.mass.inverse_inertia * arm_a * -impulse;
                    a.rotation = (angular_velocity_to_quat(turn, 1.0) * a.rotation).normalize();
                }
                if b.writable {
                    b.position += point.normal * (impulse * b.mass.inverse_mass);
                    let turn = b.mass.inverse_inertia * arm_b * impulse;
                    b.rotation = (angular_velocity_to_quat(turn, 1.0) * b.rotation).normalize();
                }
            }
        }

        for body in self.bodies.iter().filter(|b| b.writable) {
            if let Some(rigid) = body.handle.and_then(|h| ctx.bodies.get_mut(h)) {
                rigid.set_pose(&body.pose());
            }
        }
    }

    fn clear(&mut self) {
        self.contacts.clear();
        self.joints.clear();
        self.molecules.clear();
        self.contact_blocks.clear();
        self.joint_blocks.clear();
        self.position_points.clear();
        self.reset_bodies();
    }
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> Option<(&mut T, &mut T)> {
    if a == b || a >= items.len() || b >= items.len() {
        return None;
    }
    if a < b {
        let (left, right) = items.split_at_mut(b);
        Some((&mut left[a], &mut right[0]))
    } else {
        let (left, right) = items.split_at_mut(a);
        Some((&mut right[0], &mut left[b]))
    }
}

fn solve_row(bodies: &mut [SolverBody], row: &mut ConstraintMolecule) {
    if let Some((a, b)) = pair_mut(bodies, row.body_a, row.body_b) {
        row.solve(&mut a.velocity, &mut b.velocity, &a.mass, &b.mass);
    }
}
