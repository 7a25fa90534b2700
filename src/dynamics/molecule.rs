//! Constraint molecules: single impulse-bearing rows shared by contacts and joints.

use glam::{Mat3, Vec3};

use crate::core::types::Velocity;

/// Velocity Jacobian of one constraint row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Jacobian {
    pub linear_a: Vec3,
    pub angular_a: Vec3,
    pub linear_b: Vec3,
    pub angular_b: Vec3,
}

impl Jacobian {
    /// Row along `axis` through lever arms `r_a` and `r_b` (from each centre of mass).
    pub fn linear(axis: Vec3, r_a: Vec3, r_b: Vec3) -> Self {
        Self {
            linear_a: -axis,
            angular_a: -r_a.cross(axis),
            linear_b: axis,
            angular_b: r_b.cross(axis),
        }
    }

    /// Relative rotation about `axis`.
    pub fn angular(axis: Vec3) -> Self {
        Self {
            linear_a: Vec3::ZERO,
            angular_a: -axis,
            linear_b: Vec3::ZERO,
            angular_b: axis,
        }
    }

    pub fn velocity(&self, a: &Velocity, b: &Velocity) -> f32 {
        self.linear_a.dot(a.linear)
            + self.angular_a.dot(a.angular)
            + self.linear_b.dot(b.linear)
            + self.angular_b.dot(b.angular)
    }
}

/// Inverse mass and world-space inverse inertia of one side of a constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverMass {
    pub inverse_mass: f32,
    pub inverse_inertia: Mat3,
}

impl SolverMass {
    pub const INFINITE: SolverMass = SolverMass {
        inverse_mass: 0.0,
        inverse_inertia: Mat3::ZERO,
    };
}

/// Spring parameters turned into the soft-constraint terms of a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Softness {
    /// Multiplies the accumulated impulse inside the row solve.
    pub gamma: f32,
    /// Fraction of the position error fed back per step.
    pub beta: f32,
}

impl Softness {
    pub const RIGID: Softness = Softness {
        gamma: 0.0,
        beta: 0.0,
    };

    /// Spring of `frequency` Hz and `damping_ratio` acting on `effective_mass`.
    ///
    /// Returns [`Softness::RIGID`] for a non-positive frequency.
    pub fn spring(frequency: f32, damping_ratio: f32, effective_mass: f32, dt: f32) -> Self {
        if frequency <= 0.0 || dt <= 0.0 || effective_mass <= 0.0 {
            return Softness::RIGID;
        }
        let omega = 2.0 * std::f32::consts::PI * frequency;
        let stiffness = effective_mass * omega * omega;
        let damping = 2.0 * effective_mass * damping_ratio.max(0.0) * omega;
        let denominator = damping + dt * stiffness;
        if denominator <= f32::EPSILON {
            return Softness::RIGID;
        }
        Softness {
            gamma: 1.0 / (dt * denominator),
            beta: dt * stiffness / denominator,
        }
    }
}

/// One row of the constraint system: `J v + bias + gamma * impulse = 0`, impulse clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintMolecule {
    /// Dense solver-body indices.
    pub body_a: usize,
    pub body_b: usize,
    pub jacobian: Jacobian,
    pub bias: f32,
    pub gamma: f32,
    pub min_impulse: f32,
    pub max_impulse: f32,
    pub impulse: f32,
    pub effective_mass: f32,
    /// Which atom of the owner this row solves; used when committing impulses back.
    pub atom: u8,
}

impl ConstraintMolecule {
    pub fn new(body_a: usize, body_b: usize, jacobian: Jacobian, atom: u8) -> Self {
        Self {
            body_a,
            body_b,
            jacobian,
            bias: 0.0,
            gamma: 0.0,
            min_impulse: f32::NEG_INFINITY,
            max_impulse: f32::INFINITY,
            impulse: 0.0,
            effective_mass: 0.0,
            atom,
        }
    }

    pub fn with_bias(mut self, bias: f32) -> Self {
        self.bias = bias;
        self
    }

    pub fn with_bounds(mut self, min: f32, max: f32) -> Self {
        self.min_impulse = min;
        self.max_impulse = max;
        self
    }

    /// `J M⁻¹ Jᵀ` without softness.
    pub fn inverse_effective_mass(&self, a: &SolverMass, b: &SolverMass) -> f32 {
        let j = &self.jacobian;
        a.inverse_mass * j.linear_a.length_squared()
            + j.angular_a.dot(a.inverse_inertia * j.angular_a)
            + b.inverse_mass * j.linear_b.length_squared()
            + j.angular_b.dot(b.inverse_inertia * j.angular_b)
    }

    /// Caches the softened effective mass. Rows nothing can move get zero and never act.
    pub fn compute_mass(&mut self, a: &SolverMass, b: &SolverMass, softness: Softness) {
        self.gamma = softness.gamma;
        let k = self.inverse_effective_mass(a, b) + softness.gamma;
        self.effective_mass = if k > f32::EPSILON { 1.0 / k } else { 0.0 };
    }

    pub fn apply_impulse(
        &self,
        impulse: f32,
        velocity_a: &mut Velocity,
        velocity_b: &mut Velocity,
        a: &SolverMass,
        b: &SolverMass,
    ) {
        let j = &self.jacobian;
        velocity_a.linear += j.linear_a * (a.inverse_mass * impulse);
        velocity_a.angular += a.inverse_inertia * (j.angular_a * impulse);
        velocity_b.linear += j.linear_b * (b.inverse_mass * impulse);
        velocity_b.angular += b.inverse_inertia * (j.angular_b * impulse);
    }

    /// One projected Gauss-Seidel update. Returns the applied impulse delta.
    pub fn solve(
        &mut self,
        velocity_a: &mut Velocity,
        velocity_b: &mut Velocity,
        a: &SolverMass,
        b: &SolverMass,
    ) -> f32 {
        if self.effective_mass == 0.0 {
            return 0.0;
        }
        let jv = self.jacobian.velocity(velocity_a, velocity_b);
        let lambda = -self.effective_mass * (jv + self.bias + self.gamma * self.impulse);
        let accumulated = (self.impulse + lambda).clamp(self.min_impulse, self.max_impulse);
        let delta = accumulated - self.impulse;
        self.impulse = accumulated;
        self.apply_impulse(delta, velocity_a, velocity_b, a, b);
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_mass() -> SolverMass {
        SolverMass {
            inverse_mass: 1.0,
            inverse_inertia: Mat3::IDENTITY,
        }
    }

    #[test]
    fn rigid_row_stops_relative_motion() {
        let mut row = ConstraintMolecule::new(0, 1, Jacobian::linear(Vec3::Y, Vec3::ZERO, Vec3::ZERO), 0);
        row.compute_mass(&SolverMass::INFINITE, &unit_mass(), Softness::RIGID);
        let mut ground = Velocity::ZERO;
        let mut body = Velocity::new(Vec3::new(0.0, -3.0, 0.0), Vec3::ZERO);
        row.solve(&mut ground, &mut body, &SolverMass::INFINITE, &unit_mass());
        assert!(body.linear.y.abs() < 1e-5);
        assert!((row.impulse - 3.0).abs() < 1e-5);
    }

    #[test]
    fn bounds_clamp_accumulated_impulse() {
        let mut row = ConstraintMolecule::new(0, 1, Jacobian::linear(Vec3::Y, Vec3::ZERO, Vec3::ZERO), 0)
            .with_bounds(0.0, f32::INFINITY);
        row.compute_mass(&SolverMass::INFINITE, &unit_mass(), Softness::RIGID);
        let mut ground = Velocity::ZERO;
        let mut body = Velocity::new(Vec3::new(0.0, 2.0, 0.0), Vec3::ZERO);
        row.solve(&mut ground, &mut body, &SolverMass::INFINITE, &unit_mass());
        assert_eq!(row.impulse, 0.0);
        assert_eq!(body.linear.y, 2.0);
    }

    #[test]
    fn immovable_rows_do_nothing() {
        let mut row = ConstraintMolecule::new(0, 1, Jacobian::angular(Vec3::X), 3);
        row.compute_mass(&SolverMass::INFINITE, &SolverMass::INFINITE, Softness::RIGID);
        let mut a = Velocity::ZERO;
        let mut b = Velocity::new(Vec3::ZERO, Vec3::X);
        assert_eq!(row.solve(&mut a, &mut b, &SolverMass::INFINITE, &SolverMass::INFINITE), 0.0);
    }

    #[test]
    fn zero_frequency_spring_is_rigid() {
        assert_eq!(Softness::spring(0.0, 1.0, 1.0, 1.0 / 60.0), Softness::RIGID);
        let soft = Softness::spring(5.0, 0.7, 1.0, 1.0 / 60.0);
        assert!(soft.gamma > 0.0 && soft.beta > 0.0 && soft.beta < 1.0);
    }
}
