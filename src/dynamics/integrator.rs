//! Semi-implicit integration of rigid-body velocity and position.

use glam::{Mat3, Vec3};

use crate::core::{rigidbody::RigidBody, types::Velocity};
use crate::utils::math::{angular_velocity_to_quat, skew};

/// Determinants below this make the gyroscopic Jacobian count as singular.
const SINGULAR_EPSILON: f32 = 1e-9;

/// Applies accumulated force and torque, gyroscopic coupling and damping, then clears
/// the accumulators. Non-dynamic bodies only lose their accumulators.
pub fn integrate_velocity(body: &mut RigidBody, dt: f32) {
    body.store_previous_velocity();
    if !body.is_dynamic() || dt <= 0.0 {
        body.clear_accumulators();
        return;
    }

    let mut velocity = body.velocity();
    if body.mode_2d {
        velocity = planar(velocity);
    }

    velocity.linear += body.force() * (body.inverse_mass() * dt);

    let inverse_inertia = body.inverse_inertia_world();
    velocity.angular += inverse_inertia * body.torque() * dt;
    if let Some(inertia) = body.inertia_local() {
        velocity.angular = gyroscopic_step(velocity.angular, inertia, body.rotation(), dt);
    }

    velocity.linear *= (1.0 - body.linear_damping * dt).max(0.0);
    velocity.angular *= (1.0 - body.angular_damping * dt).max(0.0);

    if body.mode_2d {
        velocity = planar(velocity);
    }
    if body.rotation_locked() {
        velocity.angular = Vec3::ZERO;
    }

    body.set_velocity(velocity);
    body.clear_accumulators();
}

/// Advances the pose with the average of the previous and current velocities.
pub fn integrate_position(body: &mut RigidBody, dt: f32) {
    if !body.is_dynamic() || dt <= 0.0 {
        return;
    }
    let previous = body.previous_velocity();
    let current = body.velocity();
    let linear = (previous.linear + current.linear) * 0.5;
    let angular = (previous.angular + current.angular) * 0.5;

    body.position += linear * dt;
    if angular != Vec3::ZERO {
        let delta = angular_velocity_to_quat(angular, dt);
        body.rotation = (delta * body.rotation).normalize();
    }
}

/// One implicit Newton step on Euler's equation `I ω' + ω × I ω = 0`, in body space.
///
/// Returns `angular` unchanged when the Jacobian is singular.
pub fn gyroscopic_step(angular: Vec3, inertia: Mat3, rotation: glam::Quat, dt: f32) -> Vec3 {
    let local = rotation.inverse() * angular;
    let momentum = inertia * local;
    let residual = local.cross(momentum) * dt;
    let jacobian = inertia + (skew(local) * inertia - skew(momentum)) * dt;
    let determinant = jacobian.determinant();
    if !determinant.is_finite() || determinant.abs() < SINGULAR_EPSILON {
        return angular;
    }
    let corrected = local - jacobian.inverse() * residual;
    rotation * corrected
}

fn planar(velocity: Velocity) -> Velocity {
    Velocity::new(
        Vec3::new(velocity.linear.x, velocity.linear.y, 0.0),
        Vec3::new(0.0, 0.0, velocity.angular.z),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Quat;

    use crate::core::types::MassProperties;

    #[test]
    fn resting_body_does_not_move() {
        let mut body = RigidBody::dynamic();
        body.rotation = Quat::from_rotation_y(0.3);
        let before = body.pose();
        for dt in [1.0 / 60.0, 0.5, 3.0] {
            integrate_velocity(&mut body, dt);
            integrate_position(&mut body, dt);
        }
        assert_eq!(body.pose(), before);
    }

    #[test]
    fn force_accelerates_and_is_cleared() {
        let mut body = RigidBody::dynamic();
        body.set_mass_properties(MassProperties::new(2.0, Mat3::IDENTITY));
        body.apply_force(Vec3::new(4.0, 0.0, 0.0));
        integrate_velocity(&mut body, 0.5);
        assert_relative_eq!(body.linear_velocity().x, 1.0, epsilon = 1e-6);
        assert_eq!(body.force(), Vec3::ZERO);

        integrate_position(&mut body, 0.5);
        // Trapezoidal: average of 0 and 1 over half a second.
        assert_relative_eq!(body.position().x, 0.25, epsilon = 1e-6);
    }

    #[test]
    fn planar_bodies_lose_out_of_plane_motion() {
        let mut body = RigidBody::dynamic().with_velocity(Vec3::new(1.0, 2.0, 3.0), Vec3::ONE);
        body.mode_2d = true;
        integrate_velocity(&mut body, 0.1);
        assert_eq!(body.linear_velocity().z, 0.0);
        assert_eq!(body.angular_velocity().x, 0.0);
        assert_eq!(body.angular_velocity().y, 0.0);
    }

    #[test]
    fn gyroscopic_step_keeps_symmetric_spin() {
        let spin = Vec3::new(0.0, 5.0, 0.0);
        let corrected = gyroscopic_step(spin, Mat3::IDENTITY, Quat::IDENTITY, 1.0 / 60.0);
        assert_relative_eq!(corrected.y, 5.0, epsilon = 1e-5);
    }

    #[test]
    fn singular_inertia_gives_no_correction() {
        let spin = Vec3::new(1.0, 2.0, 3.0);
        let corrected = gyroscopic_step(spin, Mat3::ZERO, Quat::IDENTITY, 1.0 / 60.0);
        assert_eq!(corrected, spin);
    }

    #[test]
    fn asymmetric_spin_energy_does_not_grow() {
        let inertia = Mat3::from_diagonal(Vec3::new(1.0, 2.0, 3.0));
        let mut angular = Vec3::new(0.1, 10.0, 0.1);
        let energy = |w: Vec3| w.dot(inertia * w);
        let initial = energy(angular);
        for _ in 0..600 {
            angular = gyroscopic_step(angular, inertia, Quat::IDENTITY, 1.0 / 60.0);
        }
        assert!(energy(angular) <= initial * 1.001);
    }
}
