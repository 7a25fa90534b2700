//! Global effects: force generators applied to every awake dynamic body before solving.

use glam::Vec3;

use crate::core::{handles::BodyHandle, rigidbody::RigidBody};
use crate::utils::allocator::Arena;

/// External force source evaluated once per step for each awake dynamic body.
pub trait ForceGenerator: Send + Sync {
    fn apply(&self, body: &mut RigidBody, dt: f32);
}

/// Constant acceleration scaled by each body's gravity scale.
#[derive(Debug, Clone, Copy)]
pub struct GravityForce {
    pub gravity: Vec3,
}

impl GravityForce {
    pub fn new(gravity: Vec3) -> Self {
        Self { gravity }
    }
}

impl ForceGenerator for GravityForce {
    fn apply(&self, body: &mut RigidBody, _dt: f32) {
        let force = self.gravity * body.mass() * body.gravity_scale;
        body.apply_force(force);
    }
}

/// Quadratic drag resisting the direction of motion.
#[derive(Debug, Clone, Copy)]
pub struct DragForce {
    pub drag_coefficient: f32,
}

impl ForceGenerator for DragForce {
    fn apply(&self, body: &mut RigidBody, _dt: f32) {
        let velocity = body.linear_velocity();
        let speed = velocity.length();
        if speed < 1e-6 {
            return;
        }
        body.apply_force(-velocity / speed * speed * speed * self.drag_coefficient);
    }
}

/// Hookean spring pulling a single body towards a fixed anchor.
#[derive(Debug, Clone, Copy)]
pub struct SpringForce {
    pub body: BodyHandle,
    pub anchor: Vec3,
    pub rest_length: f32,
    pub spring_constant: f32,
    pub damping: f32,
}

impl ForceGenerator for SpringForce {
    fn apply(&self, body: &mut RigidBody, _dt: f32) {
        let displacement = body.position() - self.anchor;
        let distance = displacement.length();
        if distance < 1e-6 {
            return;
        }
        let extension = distance - self.rest_length;
        let spring = -self.spring_constant * extension * (displacement / distance);
        let damping = -self.damping * body.linear_velocity();
        body.apply_force(spring + damping);
    }
}

/// Ordered list of force generators plus the world gravity.
pub struct ForceRegistry {
    gravity: GravityForce,
    forces: Vec<Box<dyn ForceGenerator>>,
    targeted: Vec<SpringForce>,
}

impl Default for ForceRegistry {
    fn default() -> Self {
        Self::new(Vec3::from_array(crate::config::DEFAULT_GRAVITY))
    }
}

impl ForceRegistry {
    pub fn new(gravity: Vec3) -> Self {
        Self {
            gravity: GravityForce::new(gravity),
            forces: Vec::new(),
            targeted: Vec::new(),
        }
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity.gravity = gravity;
    }

    pub fn add_force<F: ForceGenerator + 'static>(&mut self, force: F) {
        self.forces.push(Box::new(force));
    }

    /// Springs only act on the body they name.
    pub fn add_spring(&mut self, spring: SpringForce) {
        self.targeted.push(spring);
    }

    pub fn force_count(&self) -> usize {
        self.forces.len() + self.targeted.len() + 1
    }

    pub fn clear(&mut self) {
        self.forces.clear();
        self.targeted.clear();
    }

    /// Applies every generator to the awake dynamic bodies among `handles`.
    pub fn apply_all(&self, bodies: &mut Arena<BodyHandle, RigidBody>, handles: &[BodyHandle], dt: f32) {
        for &handle in handles {
            let Some(body) = bodies.get_mut(handle) else {
                continue;
            };
            if !body.is_dynamic() || body.is_asleep() {
                continue;
            }
            self.gravity.apply(body, dt);
            for force in &self.forces {
                force.apply(body, dt);
            }
            for spring in self.targeted.iter().filter(|s| s.body == handle) {
                spring.apply(body, dt);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn gravity_respects_scale_and_skips_sleepers() {
        let mut bodies: Arena<BodyHandle, RigidBody> = Arena::new();
        let full = bodies.insert(RigidBody::dynamic());
        let half = bodies.insert(RigidBody::dynamic().with_gravity_scale(0.5));
        let mut sleeper = RigidBody::dynamic();
        sleeper.put_to_sleep();
        let sleeper = bodies.insert(sleeper);
        let fixed = bodies.insert(RigidBody::fixed());

        let registry = ForceRegistry::new(Vec3::new(0.0, -10.0, 0.0));
        registry.apply_all(&mut bodies, &[full, half, sleeper, fixed], 1.0 / 60.0);

        assert_relative_eq!(bodies.get(full).map_or(0.0, |b| b.force().y), -10.0);
        assert_relative_eq!(bodies.get(half).map_or(0.0, |b| b.force().y), -5.0);
        assert_eq!(bodies.get(sleeper).map(RigidBody::force), Some(Vec3::ZERO));
        assert_eq!(bodies.get(fixed).map(RigidBody::force), Some(Vec3::ZERO));
    }

    #[test]
    fn drag_opposes_motion() {
        let mut body = RigidBody::dynamic().with_velocity(Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO);
        DragForce { drag_coefficient: 0.5 }.apply(&mut body, 0.1);
        assert_relative_eq!(body.force().x, -2.0);
    }

    #[test]
    fn springs_only_touch_their_body() {
        let mut bodies: Arena<BodyHandle, RigidBody> = Arena::new();
        let mut stretched = RigidBody::dynamic();
        stretched.position = Vec3::new(3.0, 0.0, 0.0);
        let a = bodies.insert(stretched);
        let b = bodies.insert(RigidBody::dynamic());

        let mut registry = ForceRegistry::new(Vec3::ZERO);
        registry.add_spring(SpringForce {
            body: a,
            anchor: Vec3::ZERO,
            rest_length: 1.0,
            spring_constant: 4.0,
            damping: 0.0,
        });
        registry.apply_all(&mut bodies, &[a, b], 0.1);

        assert_relative_eq!(bodies.get(a).map_or(0.0, |b| b.force().x), -8.0);
        assert_eq!(bodies.get(b).map(RigidBody::force), Some(Vec3::ZERO));
    }
}
