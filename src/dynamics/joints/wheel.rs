use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{
    JointEndpoint, RowBuilder, ALL_LINEAR, ANGULAR_Y, ANGULAR_Z, LINEAR_X, LINEAR_Y, LINEAR_Z,
    MOTOR,
};
use crate::core::types::Transform;
use crate::dynamics::molecule::{ConstraintMolecule, Jacobian};
use crate::utils::math::orthonormal_basis;

/// Behaviour of the row along the shock axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Suspension {
    Rigid,
    Spring { frequency: f32, damping_ratio: f32 },
    /// Free travel between `min` and `max` along the shock axis, measured from rest.
    Limited { min: f32, max: f32 },
}

/// Drive about the axle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelMotor {
    pub target_speed: f32,
    pub max_torque: f32,
}

/// Wheel on a suspension: slides along the shock axis and spins about the axle.
///
/// The joint frame has the axle as `x`, the shock axis as `y` and `x × y` as `z`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WheelJoint {
    /// World-space shock axis; derived from the anchors when `None`.
    pub shock_axis: Option<Vec3>,
    /// World-space axle; any perpendicular of the shock axis when `None`.
    pub axle: Option<Vec3>,
    pub suspension: Suspension,
    pub motor: Option<WheelMotor>,
    rest: Vec3,
}

impl Default for WheelJoint {
    fn default() -> Self {
        Self {
            shock_axis: None,
            axle: None,
            suspension: Suspension::Spring {
                frequency: 4.0,
                damping_ratio: 0.7,
            },
            motor: None,
            rest: Vec3::ZERO,
        }
    }
}

impl WheelJoint {
    pub fn new(suspension: Suspension) -> Self {
        Self {
            suspension,
            ..Self::default()
        }
    }

    pub fn with_shock_axis(mut self, axis: Vec3) -> Self {
        self.shock_axis = Some(axis);
        self
    }

    pub fn with_axle(mut self, axle: Vec3) -> Self {
        self.axle = Some(axle);
        self
    }

    pub fn with_motor(mut self, target_speed: f32, max_torque: f32) -> Self {
        self.motor = Some(WheelMotor {
            target_speed,
            max_torque,
        });
        self
    }

    /// Anchor offset along the joint axes at configuration time.
    pub fn rest_offset(&self) -> Vec3 {
        self.rest
    }

    pub(crate) fn atom_mask(&self) -> u8 {
        let mut mask = ALL_LINEAR | ANGULAR_Y | ANGULAR_Z;
        if self.motor.is_some() {
            mask |= MOTOR;
        }
        mask
    }

    pub(crate) fn configure(&mut self, anchor_a: Vec3, anchor_b: Vec3, axis: Vec3) -> (Transform, Transform) {
        let shock = self
            .shock_axis
            .map(Vec3::normalize_or_zero)
            .filter(|v| *v != Vec3::ZERO)
            .unwrap_or(axis);
        let axle = self
            .axle
            .map(|a| (a - shock * a.dot(shock)).normalize_or_zero())
            .filter(|v| *v != Vec3::ZERO)
            .unwrap_or_else(|| orthonormal_basis(shock).0);
        let rotation = Quat::from_mat3(&Mat3::from_cols(axle, shock, axle.cross(shock))).normalize();
        self.rest = rotation.inverse() * (anchor_b - anchor_a);
        (
            Transform::new(anchor_a, rotation),
            Transform::new(anchor_b, rotation),
        )
    }

    pub(crate) fn rows(
        &self,
        mask: u8,
        builder: &RowBuilder,
        a: &JointEndpoint,
        b: &JointEndpoint,
        out: &mut Vec<ConstraintMolecule>,
    ) {
        let rotation = a.frame.rotation;
        let (x, y, z) = (rotation * Vec3::X, rotation * Vec3::Y, rotation * Vec3::Z);
        let pivot = b.frame.position;
        let d = pivot - a.frame.position;
        let offset = Vec3::new(d.dot(x), d.dot(y), d.dot(z)) - self.rest;
        let (r_a, r_b) = (a.arm(pivot), b.arm(pivot));

        if mask & LINEAR_X != 0 {
            out.push(builder.rigid(Jacobian::linear(x, r_a, r_b), LINEAR_X, offset.x));
        }
        if mask & LINEAR_Z != 0 {
            out.push(builder.rigid(Jacobian::linear(z, r_a, r_b), LINEAR_Z, offset.z));
        }
        if mask & LINEAR_Y != 0 {
            let shock = Jacobian::linear(y, r_a, r_b);
            match self.suspension {
                Suspension::Rigid => out.push(builder.rigid(shock, LINEAR_Y, offset.y)),
                Suspension::Spring {
                    frequency,
                    damping_ratio,
                } => out.push(builder.spring(shock, LINEAR_Y, offset.y, frequency, damping_ratio)),
                Suspension::Limited { min, max } => {
                    if offset.y < min {
                        out.push(builder.limit(shock, LINEAR_Y, offset.y - min, true));
                    } else if offset.y > max {
                        out.push(builder.limit(shock, LINEAR_Y, offset.y - max, false));
                    }
                }
            }
        }

        // The axle on B must stay perpendicular to A's z (steering) and y (camber).
        let axle_b = b.frame.rotation * Vec3::X;
        for (bit, perpendicular) in [(ANGULAR_Y, z), (ANGULAR_Z, y)] {
            if mask & bit == 0 {
                continue;
            }
            let arm = axle_b.cross(perpendicular);
            let jacobian = Jacobian {
                linear_a: Vec3::ZERO,
                angular_a: -arm,
                linear_b: Vec3::ZERO,
                angular_b: arm,
            };
            out.push(builder.rigid(jacobian, bit, axle_b.dot(perpendicular)));
        }

        if let (Some(motor), true) = (self.motor, mask & MOTOR != 0) {
            out.push(builder.motor(
                Jacobian::angular(x),
                MOTOR,
                motor.target_speed,
                motor.max_torque * builder.dt,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::handles::ColliderHandle;
    use crate::core::types::Velocity;
    use crate::dynamics::joints::{atom_index, Joint};
    use crate::dynamics::molecule::SolverMass;
    use approx::assert_relative_eq;

    fn builder() -> RowBuilder {
        RowBuilder {
            body_a: 0,
            body_b: 1,
            mass_a: SolverMass::INFINITE,
            mass_b: SolverMass {
                inverse_mass: 1.0,
                inverse_inertia: Mat3::IDENTITY,
            },
            dt: 1.0 / 60.0,
            baumgarte: 0.2,
            max_impulse: f32::INFINITY,
        }
    }

    fn configured(wheel: WheelJoint) -> (Joint, JointEndpoint, JointEndpoint) {
        let mut joint = Joint::wheel(
            wheel,
            ColliderHandle::new(0, 0),
            None,
            Vec3::ZERO,
            Vec3::new(0.0, -1.0, 0.0),
        );
        joint.compute_initial_configuration(&Transform::IDENTITY, &Transform::IDENTITY);
        let frames = *joint.local_frames();
        let a = JointEndpoint {
            frame: frames[0],
            center: Vec3::ZERO,
        };
        let b = JointEndpoint {
            frame: frames[1],
            center: Vec3::new(0.0, -1.0, 0.0),
        };
        (joint, a, b)
    }

    #[test]
    fn default_mask_frees_spin_about_the_axle() {
        let (joint, _, _) = configured(WheelJoint::default());
        assert_eq!(joint.atom_mask(), ALL_LINEAR | ANGULAR_Y | ANGULAR_Z);
        assert_eq!(joint.molecule_count(), 5);
    }

    #[test]
    fn shock_axis_follows_the_anchors() {
        let (joint, a, _) = configured(WheelJoint::new(Suspension::Rigid));
        assert_relative_eq!(joint.axis().y, -1.0, epsilon = 1e-6);
        let shock = a.frame.rotation * Vec3::Y;
        assert_relative_eq!(shock.y, -1.0, epsilon = 1e-5);
        let axle = a.frame.rotation * Vec3::X;
        assert!(axle.dot(shock).abs() < 1e-5);
    }

    #[test]
    fn at_rest_rows_carry_no_bias() {
        let (joint, a, b) = configured(WheelJoint::new(Suspension::Rigid));
        let mut rows = Vec::new();
        joint.compute_molecules(&builder(), &a, &b, &mut rows);
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|row| row.bias.abs() < 1e-4));
    }

    #[test]
    fn spring_suspension_is_soft() {
        let (joint, a, b) = configured(WheelJoint::default());
        let mut rows = Vec::new();
        joint.compute_molecules(&builder(), &a, &b, &mut rows);
        let shock = rows.iter().find(|row| row.atom == atom_index(LINEAR_Y));
        assert!(shock.is_some_and(|row| row.gamma > 0.0));
    }

    #[test]
    fn limits_only_act_outside_their_range() {
        let (joint, a, b) = configured(WheelJoint::new(Suspension::Limited { min: -0.1, max: 0.1 }));
        let mut rows = Vec::new();
        joint.compute_molecules(&builder(), &a, &b, &mut rows);
        assert!(rows.iter().all(|row| row.atom != atom_index(LINEAR_Y)));

        let compressed = JointEndpoint {
            frame: Transform::new(Vec3::new(0.0, -0.5, 0.0), b.frame.rotation),
            ..b
        };
        rows.clear();
        joint.compute_molecules(&builder(), &a, &compressed, &mut rows);
        let limit = rows.iter().find(|row| row.atom == atom_index(LINEAR_Y));
        assert!(limit.is_some_and(|row| row.min_impulse == 0.0 && row.bias < 0.0));
    }

    #[test]
    fn motor_drives_spin_about_the_axle() {
        let (joint, a, b) = configured(WheelJoint::new(Suspension::Rigid).with_motor(2.0, 1000.0));
        let mut rows = Vec::new();
        joint.compute_molecules(&builder(), &a, &b, &mut rows);
        let Some(mut motor) = rows.into_iter().find(|row| row.atom == atom_index(MOTOR)) else {
            panic!("motor row missing");
        };
        let mut ground = Velocity::ZERO;
        let mut wheel = Velocity::ZERO;
        motor.solve(&mut ground, &mut wheel, &SolverMass::INFINITE, &builder().mass_b);
        let axle = a.frame.rotation * Vec3::X;
        assert_relative_eq!(wheel.angular.dot(axle), 2.0, epsilon = 1e-4);
    }
}
