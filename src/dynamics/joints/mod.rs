//! Joint edges between colliders and the constraint rows they feed the solver.
//!
//! A joint's degrees of freedom are *atoms*: one bit per locked axis in the joint frame.
//! Each active atom becomes one [`ConstraintMolecule`] per solve.

pub mod position;
pub mod wheel;

pub use position::PositionJoint;
pub use wheel::{Suspension, WheelJoint, WheelMotor};

use glam::Vec3;

use super::molecule::{ConstraintMolecule, Jacobian, Softness, SolverMass};
use crate::core::{handles::ColliderHandle, types::Transform};

pub const LINEAR_X: u8 = 1 << 0;
pub const LINEAR_Y: u8 = 1 << 1;
pub const LINEAR_Z: u8 = 1 << 2;
pub const ANGULAR_X: u8 = 1 << 3;
pub const ANGULAR_Y: u8 = 1 << 4;
pub const ANGULAR_Z: u8 = 1 << 5;
pub const MOTOR: u8 = 1 << 6;

pub const ALL_LINEAR: u8 = LINEAR_X | LINEAR_Y | LINEAR_Z;
pub const ALL_ANGULAR: u8 = ANGULAR_X | ANGULAR_Y | ANGULAR_Z;
pub const ALL_AXES: u8 = ALL_LINEAR | ALL_ANGULAR;

/// Atoms a joint can carry, motor included.
pub const MAX_ATOMS: usize = 7;

/// Caps the velocity a positional error may request in one step.
const MAX_BIAS_VELOCITY: f32 = 5.0;

/// Index of the atom stored in `bit`.
pub fn atom_index(bit: u8) -> u8 {
    bit.trailing_zeros() as u8
}

#[derive(Debug, Clone)]
pub enum JointKind {
    Wheel(WheelJoint),
    Position(PositionJoint),
}

impl JointKind {
    fn base_mask(&self) -> u8 {
        match self {
            JointKind::Wheel(wheel) => wheel.atom_mask(),
            JointKind::Position(_) => ALL_LINEAR,
        }
    }
}

/// World-space joint frame on one side plus the centre of mass it hangs off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointEndpoint {
    pub frame: Transform,
    pub center: Vec3,
}

impl JointEndpoint {
    /// The lever arm from the centre of mass to `point`.
    pub fn arm(&self, point: Vec3) -> Vec3 {
        point - self.center
    }
}

/// Per-solve inputs shared by every row of one joint.
#[derive(Debug, Clone, Copy)]
pub struct RowBuilder {
    pub body_a: usize,
    pub body_b: usize,
    pub mass_a: SolverMass,
    pub mass_b: SolverMass,
    pub dt: f32,
    pub baumgarte: f32,
    pub max_impulse: f32,
}

impl RowBuilder {
    fn row(&self, jacobian: Jacobian, bit: u8) -> ConstraintMolecule {
        ConstraintMolecule::new(self.body_a, self.body_b, jacobian, atom_index(bit))
            .with_bounds(-self.max_impulse, self.max_impulse)
    }

    fn error_bias(&self, factor: f32, error: f32) -> f32 {
        if self.dt <= 0.0 {
            return 0.0;
        }
        (factor / self.dt * error).clamp(-MAX_BIAS_VELOCITY, MAX_BIAS_VELOCITY)
    }

    /// Hard row driving `error` to zero with Baumgarte feedback.
    pub fn rigid(&self, jacobian: Jacobian, bit: u8, error: f32) -> ConstraintMolecule {
        let mut row = self.row(jacobian, bit).with_bias(self.error_bias(self.baumgarte, error));
        row.compute_mass(&self.mass_a, &self.mass_b, Softness::RIGID);
        row
    }

    /// Spring row; falls back to a hard row for a non-positive frequency.
    pub fn spring(
        &self,
        jacobian: Jacobian,
        bit: u8,
        error: f32,
        frequency: f32,
        damping_ratio: f32,
    ) -> ConstraintMolecule {
        let mut row = self.row(jacobian, bit);
        let k = row.inverse_effective_mass(&self.mass_a, &self.mass_b);
        let effective_mass = if k > f32::EPSILON { 1.0 / k } else { 0.0 };
        let softness = Softness::spring(frequency, damping_ratio, effective_mass, self.dt);
        if softness == Softness::RIGID {
            return self.rigid(jacobian, bit, error);
        }
        row.bias = self.error_bias(softness.beta, error);
        row.compute_mass(&self.mass_a, &self.mass_b, softness);
        row
    }

    /// One-sided row: `lower` pushes only along the positive Jacobian direction.
    pub fn limit(&self, jacobian: Jacobian, bit: u8, error: f32, lower: bool) -> ConstraintMolecule {
        let mut row = self.rigid(jacobian, bit, error);
        if lower {
            row.min_impulse = 0.0;
        } else {
            row.max_impulse = 0.0;
        }
        row
    }

    /// Velocity drive towards `target_speed`, bounded by `max_impulse` per step.
    pub fn motor(&self, jacobian: Jacobian, bit: u8, target_speed: f32, max_impulse: f32) -> ConstraintMolecule {
        let bound = max_impulse.abs().min(self.max_impulse);
        let mut row = self
            .row(jacobian, bit)
            .with_bias(-target_speed)
            .with_bounds(-bound, bound);
        row.compute_mass(&self.mass_a, &self.mass_b, Softness::RIGID);
        row
    }
}

/// Constraint edge between a collider and a second collider or the world.
#[derive(Debug, Clone)]
pub struct Joint {
    pub(crate) colliders: [Option<ColliderHandle>; 2],
    pub kind: JointKind,
    /// Anchor points in each collider's frame (world space for a missing collider).
    pub(crate) anchors: [Vec3; 2],
    /// Joint frames relative to each collider, set by the initial configuration.
    pub(crate) local_frames: [Transform; 2],
    axis: Vec3,
    atom_mask: u8,
    pub(crate) impulses: [f32; MAX_ATOMS],
    pub valid: bool,
    pub active: bool,
    pub(crate) on_island: bool,
    /// Ghost joints are tracked but never solved.
    pub ghost: bool,
    /// Lets the two colliders keep generating contacts with each other.
    pub collide_connected: bool,
    /// Bounds every row of the joint.
    pub max_impulse: f32,
}

impl Joint {
    pub fn new(
        kind: JointKind,
        collider_a: ColliderHandle,
        collider_b: Option<ColliderHandle>,
        anchor_a: Vec3,
        anchor_b: Vec3,
    ) -> Self {
        let mut joint = Self {
            colliders: [Some(collider_a), collider_b],
            kind,
            anchors: [anchor_a, anchor_b],
            local_frames: [Transform::IDENTITY; 2],
            axis: Vec3::Y,
            atom_mask: 0,
            impulses: [0.0; MAX_ATOMS],
            valid: true,
            active: true,
            on_island: false,
            ghost: false,
            collide_connected: false,
            max_impulse: f32::INFINITY,
        };
        joint.update_atoms();
        joint
    }

    pub fn wheel(
        wheel: WheelJoint,
        chassis: ColliderHandle,
        tire: Option<ColliderHandle>,
        chassis_anchor: Vec3,
        tire_anchor: Vec3,
    ) -> Self {
        Self::new(JointKind::Wheel(wheel), chassis, tire, chassis_anchor, tire_anchor)
    }

    pub fn position(
        collider_a: ColliderHandle,
        collider_b: Option<ColliderHandle>,
        anchor_a: Vec3,
        anchor_b: Vec3,
    ) -> Self {
        Self::new(
            JointKind::Position(PositionJoint::default()),
            collider_a,
            collider_b,
            anchor_a,
            anchor_b,
        )
    }

    pub fn with_max_impulse(mut self, max_impulse: f32) -> Self {
        self.max_impulse = max_impulse.abs();
        self
    }

    pub fn with_collide_connected(mut self, collide_connected: bool) -> Self {
        self.collide_connected = collide_connected;
        self
    }

    pub fn collider_a(&self) -> Option<ColliderHandle> {
        self.colliders[0]
    }

    pub fn collider_b(&self) -> Option<ColliderHandle> {
        self.colliders[1]
    }

    pub fn colliders(&self) -> [Option<ColliderHandle>; 2] {
        self.colliders
    }

    /// Whether `collider` is one of this joint's endpoints.
    pub fn connects(&self, collider: ColliderHandle) -> bool {
        self.colliders.contains(&Some(collider))
    }

    /// Primary axis derived from the anchors by the initial configuration.
    pub fn axis(&self) -> Vec3 {
        self.axis
    }

    pub fn atom_mask(&self) -> u8 {
        self.atom_mask
    }

    pub fn impulses(&self) -> &[f32; MAX_ATOMS] {
        &self.impulses
    }

    pub fn is_on_island(&self) -> bool {
        self.on_island
    }

    /// Solved at all: valid, active and not a ghost.
    pub fn is_solvable(&self) -> bool {
        self.valid && self.active && !self.ghost
    }

    pub fn local_frames(&self) -> &[Transform; 2] {
        &self.local_frames
    }

    /// Derives the joint frames from the anchors and the colliders' current placement.
    ///
    /// `world_b` is the identity for a joint to the world. Coincident anchors fall back to
    /// `+Y` as the primary axis.
    pub fn compute_initial_configuration(&mut self, world_a: &Transform, world_b: &Transform) {
        let anchor_a = world_a.transform_point(self.anchors[0]);
        let anchor_b = world_b.transform_point(self.anchors[1]);
        let axis = (anchor_b - anchor_a).normalize_or_zero();
        self.axis = if axis == Vec3::ZERO { Vec3::Y } else { axis };

        let (frame_a, frame_b) = match &mut self.kind {
            JointKind::Wheel(wheel) => wheel.configure(anchor_a, anchor_b, self.axis),
            JointKind::Position(position) => position.configure(anchor_a, anchor_b),
        };
        self.local_frames = [frame_a.relative_to(world_a), frame_b.relative_to(world_b)];
        self.impulses = [0.0; MAX_ATOMS];
        self.update_atoms();
    }

    /// Recomputes which atoms are constrained from the joint's settings.
    pub fn update_atoms(&mut self) {
        let mask = self.kind.base_mask();
        if mask != self.atom_mask {
            for (index, impulse) in self.impulses.iter_mut().enumerate() {
                if mask & (1 << index) == 0 {
                    *impulse = 0.0;
                }
            }
        }
        self.atom_mask = mask;
    }

    /// Upper bound on the rows [`Joint::compute_molecules`] emits.
    pub fn molecule_count(&self) -> usize {
        self.atom_mask.count_ones() as usize
    }

    /// Appends this joint's rows for the current endpoints to `out`.
    pub fn compute_molecules(
        &self,
        builder: &RowBuilder,
        a: &JointEndpoint,
        b: &JointEndpoint,
        out: &mut Vec<ConstraintMolecule>,
    ) {
        let builder = RowBuilder {
            max_impulse: self.max_impulse,
            ..*builder
        };
        match &self.kind {
            JointKind::Wheel(wheel) => wheel.rows(self.atom_mask, &builder, a, b, out),
            JointKind::Position(position) => position.rows(self.atom_mask, &builder, a, b, out),
        }
    }

    /// Seeds each row with the impulse its atom carried last step.
    pub fn warm_start(&self, molecules: &mut [ConstraintMolecule]) {
        for molecule in molecules {
            let cached = self
                .impulses
                .get(molecule.atom as usize)
                .copied()
                .unwrap_or(0.0);
            molecule.impulse = cached.clamp(molecule.min_impulse, molecule.max_impulse);
        }
    }

    /// Stores the rows' accumulated impulses for the next step's warm start.
    pub fn commit(&mut self, molecules: &[ConstraintMolecule]) {
        self.impulses = [0.0; MAX_ATOMS];
        for molecule in molecules {
            if let Some(slot) = self.impulses.get_mut(molecule.atom as usize) {
                *slot = molecule.impulse;
            }
        }
    }

    pub(crate) fn clear_impulses(&mut self) {
        self.impulses = [0.0; MAX_ATOMS];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Quat;

    fn builder() -> RowBuilder {
        RowBuilder {
            body_a: 0,
            body_b: 1,
            mass_a: SolverMass::INFINITE,
            mass_b: SolverMass {
                inverse_mass: 1.0,
                inverse_inertia: glam::Mat3::IDENTITY,
            },
            dt: 1.0 / 60.0,
            baumgarte: 0.2,
            max_impulse: f32::INFINITY,
        }
    }

    #[test]
    fn coincident_anchors_default_to_up_axis() {
        let mut joint = Joint::position(ColliderHandle::new(0, 0), None, Vec3::ZERO, Vec3::ZERO);
        joint.compute_initial_configuration(&Transform::IDENTITY, &Transform::IDENTITY);
        assert_eq!(joint.axis(), Vec3::Y);
    }

    #[test]
    fn axis_points_from_a_to_b() {
        let mut joint = Joint::position(
            ColliderHandle::new(0, 0),
            None,
            Vec3::ZERO,
            Vec3::new(3.0, 0.0, 0.0),
        );
        joint.compute_initial_configuration(&Transform::IDENTITY, &Transform::IDENTITY);
        assert_relative_eq!(joint.axis().x, 1.0);
    }

    #[test]
    fn initial_frames_meet_in_world_space() {
        let mut joint = Joint::position(
            ColliderHandle::new(0, 0),
            Some(ColliderHandle::new(1, 0)),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
        );
        let world_a = Transform::new(Vec3::ZERO, Quat::from_rotation_y(0.5));
        let world_b = Transform::from_position(Vec3::new(2.0, 0.0, 0.0));
        joint.compute_initial_configuration(&world_a, &world_b);
        let frames = joint.local_frames();
        let on_a = world_a.combine(&frames[0]).position;
        let on_b = world_b.combine(&frames[1]).position;
        assert!(on_a.distance(on_b) < 1e-5);
    }

    #[test]
    fn commit_and_warm_start_round_trip_by_atom() {
        let mut joint = Joint::position(ColliderHandle::new(0, 0), None, Vec3::ZERO, Vec3::ZERO);
        joint.compute_initial_configuration(&Transform::IDENTITY, &Transform::IDENTITY);
        let endpoint = JointEndpoint {
            frame: Transform::IDENTITY,
            center: Vec3::ZERO,
        };
        let mut rows = Vec::new();
        joint.compute_molecules(&builder(), &endpoint, &endpoint, &mut rows);
        assert_eq!(rows.len(), joint.molecule_count());

        rows[1].impulse = 4.0;
        joint.commit(&rows);
        assert_eq!(joint.impulses()[1], 4.0);

        let mut fresh = Vec::new();
        joint.compute_molecules(&builder(), &endpoint, &endpoint, &mut fresh);
        joint.warm_start(&mut fresh);
        assert_eq!(fresh[1].impulse, 4.0);
        assert_eq!(fresh[0].impulse, 0.0);
    }

    #[test]
    fn max_impulse_bounds_every_row() {
        let joint = Joint::position(ColliderHandle::new(0, 0), None, Vec3::ZERO, Vec3::ZERO)
            .with_max_impulse(2.0);
        let endpoint = JointEndpoint {
            frame: Transform::IDENTITY,
            center: Vec3::ZERO,
        };
        let mut rows = Vec::new();
        joint.compute_molecules(&builder(), &endpoint, &endpoint, &mut rows);
        assert!(rows.iter().all(|row| row.min_impulse == -2.0 && row.max_impulse == 2.0));
    }
}
