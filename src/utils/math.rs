//! Additional math helpers layered on top of `glam`.

use glam::{Mat3, Quat, Vec3};

/// Converts angular velocity vector (radians/sec) into a quaternion delta.
pub fn angular_velocity_to_quat(angular: Vec3, dt: f32) -> Quat {
    let angle = angular.length() * dt;
    if angle.abs() < 1e-6 {
        return Quat::IDENTITY;
    }
    let axis = angular.normalize();
    Quat::from_axis_angle(axis, angle)
}

/// Inverse of [`angular_velocity_to_quat`]: the angular velocity that produces `delta` over `dt`.
pub fn quat_to_angular_velocity(delta: Quat, dt: f32) -> Vec3 {
    if dt <= 0.0 {
        return Vec3::ZERO;
    }
    // Shortest arc.
    let delta = if delta.w < 0.0 { -delta } else { delta };
    let (axis, angle) = delta.to_axis_angle();
    if angle.abs() < 1e-6 {
        return Vec3::ZERO;
    }
    axis * (angle / dt)
}

/// Cross-product matrix: `skew(a) * b == a.cross(b)`.
pub fn skew(v: Vec3) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(0.0, v.z, -v.y),
        Vec3::new(-v.z, 0.0, v.x),
        Vec3::new(v.y, -v.x, 0.0),
    )
}

/// Rotates a body-space tensor into the frame described by `rotation`.
pub fn rotate_tensor(tensor: Mat3, rotation: Quat) -> Mat3 {
    let r = Mat3::from_quat(rotation);
    r * tensor * r.transpose()
}

/// Parallel axis term for a point mass at `offset`.
pub fn parallel_axis(mass: f32, offset: Vec3) -> Mat3 {
    let d2 = offset.length_squared();
    mass * (Mat3::from_diagonal(Vec3::splat(d2))
        - Mat3::from_cols(offset * offset.x, offset * offset.y, offset * offset.z))
}

/// Two unit vectors completing `n` into a right-handed orthonormal basis.
pub fn orthonormal_basis(n: Vec3) -> (Vec3, Vec3) {
    let t1 = n.any_orthonormal_vector();
    let t2 = n.cross(t1);
    (t1, t2)
}

/// Clamps the magnitude of `v`, returning the clamped value and whether it was clamped.
pub fn clamp_length(v: Vec3, max: f32) -> (Vec3, bool) {
    let len_sq = v.length_squared();
    if len_sq > max * max && len_sq.is_finite() {
        (v * (max / len_sq.sqrt()), true)
    } else if !len_sq.is_finite() {
        (Vec3::ZERO, true)
    } else {
        (v, false)
    }
}

/// Closest point on segment `[a, b]` to `p`.
pub fn closest_point_on_segment(p: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Closest points between segments `[p1, q1]` and `[p2, q2]`.
pub fn closest_points_between_segments(p1: Vec3, q1: Vec3, p2: Vec3, q2: Vec3) -> (Vec3, Vec3) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);

    if a <= f32::EPSILON && e <= f32::EPSILON {
        return (p1, p2);
    }

    let (s, t) = if a <= f32::EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= f32::EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s = if denom.abs() > f32::EPSILON {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };

    (p1 + d1 * s, p2 + d2 * t)
}

/// Two-sided Möller–Trumbore test. Returns the ray parameter of the hit.
pub fn ray_triangle(origin: Vec3, direction: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    const EPSILON: f32 = 1e-7;
    let edge1 = b - a;
    let edge2 = c - a;
    let p = direction.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = edge2.dot(q) * inv_det;
    (t >= 0.0).then_some(t)
}

/// Closest point on triangle `abc` to `p` (Ericson, Real-Time Collision Detection 5.1.5).
pub fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// Builds an inertia tensor for a solid capsule aligned along Y.
pub fn inertia_capsule(radius: f32, height: f32, mass: f32) -> Mat3 {
    let cylinder_volume = std::f32::consts::PI * radius * radius * height;
    let sphere_volume = 4.0 / 3.0 * std::f32::consts::PI * radius.powi(3);
    let total = cylinder_volume + sphere_volume;
    if total <= f32::EPSILON {
        return Mat3::ZERO;
    }
    let cylinder_mass = mass * cylinder_volume / total;
    let hemisphere_mass = 0.5 * (mass - cylinder_mass);

    let half = 0.5 * height;
    let r2 = radius * radius;
    let axial = 0.5 * cylinder_mass * r2 + 2.0 * hemisphere_mass * 0.4 * r2;
    let lateral = cylinder_mass * (3.0 * r2 + height * height) / 12.0
        + 2.0 * hemisphere_mass * (0.4 * r2 + half * half + 0.375 * radius * height);

    Mat3::from_diagonal(Vec3::new(lateral, axial, lateral))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn skew_matches_cross_product() {
        let a = Vec3::new(1.0, -2.0, 0.5);
        let b = Vec3::new(0.3, 4.0, -1.0);
        let via_matrix = skew(a) * b;
        let direct = a.cross(b);
        assert_abs_diff_eq!(via_matrix.x, direct.x, epsilon = 1e-5);
        assert_abs_diff_eq!(via_matrix.y, direct.y, epsilon = 1e-5);
        assert_abs_diff_eq!(via_matrix.z, direct.z, epsilon = 1e-5);
    }

    #[test]
    fn angular_velocity_round_trips_through_quaternion() {
        let omega = Vec3::new(0.0, 2.0, 0.0);
        let q = angular_velocity_to_quat(omega, 0.1);
        let back = quat_to_angular_velocity(q, 0.1);
        assert_abs_diff_eq!(back.y, 2.0, epsilon = 1e-4);
    }

    #[test]
    fn segment_closest_points_for_crossing_segments() {
        let (a, b) = closest_points_between_segments(
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, -1.0),
            Vec3::new(0.0, 1.0, 1.0),
        );
        assert_abs_diff_eq!(a.distance(Vec3::ZERO), 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(b.distance(Vec3::Y), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn clamp_length_flags_clamped_vectors() {
        let (v, clamped) = clamp_length(Vec3::new(3.0, 4.0, 0.0), 1.0);
        assert!(clamped);
        assert_abs_diff_eq!(v.length(), 1.0, epsilon = 1e-5);
        let (_, clamped) = clamp_length(Vec3::X, 2.0);
        assert!(!clamped);
    }
}
