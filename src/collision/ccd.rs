//! Continuous collision: linear time-of-impact sweeps for fast bodies.
//!
//! A sweep translates the moving shape along its motion, sampling at steps no longer than half
//! its thinnest dimension inside the interval where the bounds can meet, then bisects between
//! the last free sample and the first touching one. Rotation over the motion is ignored.

use glam::Vec3;

use super::{dispatch::ShapeDispatchTable, manifold::Manifold, shapes::ShapeInstance};
use crate::core::{mesh::Aabb, types::Transform};

/// Most samples taken along one sweep before bisection.
pub const MAX_SWEEP_SAMPLES: usize = 256;

const MAX_BISECTIONS: usize = 24;
const MIN_STEP: f32 = 1e-3;

/// First contact found along a sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeOfImpact {
    /// Fraction of the motion travelled at first contact, in `[0, 1]`.
    pub fraction: f32,
    /// World-space contact point at that fraction.
    pub point: Vec3,
    /// Unit normal from the obstacle towards the moving shape.
    pub normal: Vec3,
    pub penetration: f32,
}

/// Sweep settings and the trigger deciding which motions need one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CcdDetector {
    pub enabled: bool,
    /// Motions longer than this fraction of the shape's thinnest half extent are swept.
    pub motion_threshold: f32,
    /// Bisection stops once the bracket is shorter than this distance.
    pub tolerance: f32,
}

impl Default for CcdDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl CcdDetector {
    pub fn new() -> Self {
        Self {
            enabled: true,
            motion_threshold: 0.5,
            tolerance: 1e-3,
        }
    }

    /// Whether `motion` could carry a shape with these bounds through something thin.
    pub fn needs_sweep(&self, motion: Vec3, bounds: &Aabb) -> bool {
        self.enabled && motion.length() > self.motion_threshold * bounds.extent().min_element()
    }

    /// Earliest contact between `moving`, translated by `motion`, and the fixed `other`.
    /// Shapes already touching at the start report a zero fraction.
    pub fn time_of_impact(
        &self,
        dispatch: &ShapeDispatchTable,
        moving: &ShapeInstance,
        motion: Vec3,
        other: &ShapeInstance,
    ) -> Option<TimeOfImpact> {
        let at = |fraction: f32| {
            let mut transform: Transform = moving.transform;
            transform.position += motion * fraction;
            dispatch.collide(&ShapeInstance::new(moving.shape, transform), other)
        };

        if let Some(manifold) = at(0.0) {
            return Some(impact(0.0, &manifold));
        }
        let distance = motion.length();
        if distance <= f32::EPSILON {
            return None;
        }

        let half = moving.aabb.extent();
        let reach = Aabb::new(other.aabb.min - half, other.aabb.max + half);
        let (enter, exit) = slab_interval(&reach, moving.aabb.center(), motion)?;

        let step = (half.min_element() * 0.5).max(MIN_STEP);
        let samples =
            (((exit - enter) * distance / step).ceil() as usize).clamp(1, MAX_SWEEP_SAMPLES);
        let mut free = enter;
        for sample in 0..=samples {
            let fraction = enter + (exit - enter) * sample as f32 / samples as f32;
            if fraction <= 0.0 {
                continue;
            }
            let Some(mut manifold) = at(fraction) else {
                free = fraction;
                continue;
            };

            let mut hit = fraction;
            for _ in 0..MAX_BISECTIONS {
                if (hit - free) * distance <= self.tolerance {
                    break;
                }
                let middle = 0.5 * (free + hit);
                match at(middle) {
                    Some(found) => {
                        hit = middle;
                        manifold = found;
                    }
                    None => free = middle,
                }
            }
            log::trace!("sweep hit at {hit:.4} of {distance:.3} after {sample} samples");
            return Some(impact(hit, &manifold));
        }
        None
    }
}

fn impact(fraction: f32, manifold: &Manifold) -> TimeOfImpact {
    let deepest = manifold
        .points
        .iter()
        .max_by(|a, b| a.penetration.total_cmp(&b.penetration));
    TimeOfImpact {
        fraction,
        point: deepest.map_or(Vec3::ZERO, |p| p.position),
        normal: -manifold.normal,
        penetration: manifold.max_penetration(),
    }
}

/// Parameter range in `[0, 1]` over which `origin + motion * t` lies inside `bounds`.
fn slab_interval(bounds: &Aabb, origin: Vec3, motion: Vec3) -> Option<(f32, f32)> {
    let mut enter = 0.0_f32;
    let mut exit = 1.0_f32;
    for axis in 0..3 {
        let (o, d) = (origin[axis], motion[axis]);
        if d.abs() < 1e-8 {
            if o < bounds.min[axis] || o > bounds.max[axis] {
                return None;
            }
            continue;
        }
        let (mut t1, mut t2) = ((bounds.min[axis] - o) / d, (bounds.max[axis] - o) / d);
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        enter = enter.max(t1);
        exit = exit.min(t2);
        if enter > exit {
            return None;
        }
    }
    Some((enter, exit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{collider::ColliderShape, HeightField};

    fn at(shape: &ColliderShape, position: Vec3) -> ShapeInstance<'_> {
        ShapeInstance::new(shape, Transform::from_position(position))
    }

    #[test]
    fn fast_sphere_stops_at_a_thin_wall() {
        let dispatch = ShapeDispatchTable::shared();
        let ball = ColliderShape::sphere(0.1);
        let wall = ColliderShape::cuboid(Vec3::new(0.05, 2.0, 2.0));
        let moving = at(&ball, Vec3::new(-5.0, 0.0, 0.0));
        let other = at(&wall, Vec3::ZERO);

        let motion = Vec3::new(10.0, 0.0, 0.0);
        assert!(dispatch.collide(&at(&ball, Vec3::new(5.0, 0.0, 0.0)), &other).is_none());

        let toi = CcdDetector::new()
            .time_of_impact(&dispatch, &moving, motion, &other)
            .expect("sweep crosses the wall");
        let contact_x = -5.0 + 10.0 * toi.fraction;
        assert!((contact_x + 0.15).abs() < 0.01, "stopped at x={contact_x}");
        assert!(toi.normal.x < -0.99, "normal was {:?}", toi.normal);
        assert!(toi.penetration >= 0.0);
    }

    #[test]
    fn sweeps_that_miss_report_nothing() {
        let dispatch = ShapeDispatchTable::shared();
        let ball = ColliderShape::sphere(0.25);
        let post = ColliderShape::cuboid(Vec3::splat(0.5));
        let moving = at(&ball, Vec3::new(-5.0, 2.0, 0.0));
        let other = at(&post, Vec3::ZERO);
        let detector = CcdDetector::new();
        assert!(detector
            .time_of_impact(&dispatch, &moving, Vec3::new(10.0, 0.0, 0.0), &other)
            .is_none());
    }

    #[test]
    fn overlapping_start_reports_zero() {
        let dispatch = ShapeDispatchTable::shared();
        let ball = ColliderShape::sphere(0.5);
        let moving = at(&ball, Vec3::ZERO);
        let other = at(&ball, Vec3::new(0.8, 0.0, 0.0));
        let toi = CcdDetector::new()
            .time_of_impact(&dispatch, &moving, Vec3::X, &other)
            .expect("already touching");
        assert_eq!(toi.fraction, 0.0);
        assert!(toi.normal.x < -0.99);
    }

    #[test]
    fn falling_box_meets_a_height_field() {
        let dispatch = ShapeDispatchTable::shared();
        let crate_shape = ColliderShape::cuboid(Vec3::splat(0.2));
        let field = ColliderShape::HeightField(HeightField::flat(8, 8, 1.0));
        let moving = at(&crate_shape, Vec3::new(0.0, 10.0, 0.1));
        let other = at(&field, Vec3::ZERO);
        let toi = CcdDetector::new()
            .time_of_impact(&dispatch, &moving, Vec3::new(0.0, -20.0, 0.0), &other)
            .expect("box lands on the field");
        let bottom = 10.0 - 20.0 * toi.fraction - 0.2;
        assert!(bottom.abs() < 0.01, "bottom face at y={bottom}");
        assert!(toi.normal.y > 0.99);
    }

    #[test]
    fn slow_motions_are_not_swept() {
        let detector = CcdDetector::new();
        let bounds = Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5));
        assert!(!detector.needs_sweep(Vec3::new(0.1, 0.0, 0.0), &bounds));
        assert!(detector.needs_sweep(Vec3::new(0.0, -3.0, 0.0), &bounds));
        let disabled = CcdDetector {
            enabled: false,
            ..CcdDetector::new()
        };
        assert!(!disabled.needs_sweep(Vec3::new(0.0, -3.0, 0.0), &bounds));
    }
}
