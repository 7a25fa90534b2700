use std::collections::HashSet;

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::handles::{BodyHandle, ColliderHandle, NodeHandle};
use super::types::{MassProperties, Transform, Velocity};
use crate::config::{DEFAULT_MAX_VELOCITY, MIN_MASS};
use crate::utils::{
    allocator::Arena,
    logging::WarnOnce,
    math::{clamp_length, rotate_tensor},
};

static VELOCITY_CLAMP_WARNING: WarnOnce = WarnOnce::new();

/// How a body participates in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BodyMode {
    #[default]
    Dynamic,
    /// Never moves; infinite mass.
    Static,
    /// Moved by its node; infinite mass, velocity derived from motion.
    Kinematic,
}

/// Core rigid body description storing kinematic state and properties.
///
/// The body's position is its centre of mass and coincides with its node's world position.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub(crate) position: Vec3,
    pub(crate) rotation: Quat,
    velocity: Velocity,
    previous_velocity: Velocity,
    force: Vec3,
    torque: Vec3,
    mass_properties: MassProperties,
    inverse_mass: f32,
    inverse_inertia_local: Mat3,
    /// Replaces the mass computed from colliders, inertia scaled to match.
    pub mass_override: Option<f32>,
    mode: BodyMode,
    pub gravity_scale: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub mode_2d: bool,
    rotation_locked: bool,
    pub allow_sleep: bool,
    /// Sweeps the body's motion each step so it cannot pass through thin static geometry.
    pub ccd: bool,
    pub(crate) max_velocity: f32,
    asleep: bool,
    sleep_timer: f32,
    sleep_accumulated: bool,
    pub(crate) parent: Option<BodyHandle>,
    pub(crate) node: Option<NodeHandle>,
    pub(crate) colliders: Vec<ColliderHandle>,
    pub(crate) kinematic_previous: Option<Transform>,
}

impl Default for RigidBody {
    fn default() -> Self {
        let mut body = Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            velocity: Velocity::ZERO,
            previous_velocity: Velocity::ZERO,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            mass_properties: MassProperties::default(),
            inverse_mass: 1.0,
            inverse_inertia_local: Mat3::IDENTITY,
            mass_override: None,
            mode: BodyMode::Dynamic,
            gravity_scale: 1.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            mode_2d: false,
            rotation_locked: false,
            allow_sleep: true,
            ccd: false,
            max_velocity: DEFAULT_MAX_VELOCITY,
            asleep: false,
            sleep_timer: 0.0,
            sleep_accumulated: false,
            parent: None,
            node: None,
            colliders: Vec::new(),
            kinematic_previous: None,
        };
        body.set_mass_properties(MassProperties::default());
        body
    }
}

impl RigidBody {
    pub fn new(mode: BodyMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn dynamic() -> Self {
        Self::new(BodyMode::Dynamic)
    }

    pub fn kinematic() -> Self {
        Self::new(BodyMode::Kinematic)
    }

    pub fn fixed() -> Self {
        Self::new(BodyMode::Static)
    }

    pub fn with_velocity(mut self, linear: Vec3, angular: Vec3) -> Self {
        self.set_velocity(Velocity::new(linear, angular));
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass_override = Some(mass);
        let scale = mass / self.mass_properties.mass.max(MIN_MASS);
        let props = self.mass_properties.scaled(scale);
        self.set_mass_properties(props);
        self
    }

    pub fn with_gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear.max(0.0);
        self.angular_damping = angular.max(0.0);
        self
    }

    pub fn with_sleep(mut self, allow_sleep: bool) -> Self {
        self.allow_sleep = allow_sleep;
        self
    }

    pub fn with_ccd(mut self, ccd: bool) -> Self {
        self.ccd = ccd;
        self
    }

    pub fn mode(&self) -> BodyMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: BodyMode) {
        self.mode = mode;
        if mode != BodyMode::Dynamic {
            self.asleep = false;
            self.sleep_timer = 0.0;
        }
        if mode == BodyMode::Static {
            self.velocity = Velocity::ZERO;
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.mode == BodyMode::Dynamic
    }

    pub fn is_static(&self) -> bool {
        self.mode == BodyMode::Static
    }

    pub fn is_kinematic(&self) -> bool {
        self.mode == BodyMode::Kinematic
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn pose(&self) -> Transform {
        Transform::new(self.position, self.rotation)
    }

    pub fn node(&self) -> Option<NodeHandle> {
        self.node
    }

    pub fn parent(&self) -> Option<BodyHandle> {
        self.parent
    }

    pub fn colliders(&self) -> &[ColliderHandle] {
        &self.colliders
    }

    pub fn velocity(&self) -> Velocity {
        self.velocity
    }

    pub fn linear_velocity(&self) -> Vec3 {
        self.velocity.linear
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.velocity.angular
    }

    pub fn previous_velocity(&self) -> Velocity {
        self.previous_velocity
    }

    /// Sets both velocities, clamping each to the body's maximum speed.
    pub fn set_velocity(&mut self, velocity: Velocity) {
        let (linear, clamped_linear) = clamp_length(velocity.linear, self.max_velocity);
        let (angular, clamped_angular) = clamp_length(velocity.angular, self.max_velocity);
        if (clamped_linear || clamped_angular) && VELOCITY_CLAMP_WARNING.first() {
            log::warn!(
                "body velocity exceeded the maximum of {} and was clamped",
                self.max_velocity
            );
        }
        self.velocity = Velocity::new(linear, angular);
    }

    pub fn set_linear_velocity(&mut self, linear: Vec3) {
        self.set_velocity(Velocity::new(linear, self.velocity.angular));
    }

    pub fn set_angular_velocity(&mut self, angular: Vec3) {
        self.set_velocity(Velocity::new(self.velocity.linear, angular));
    }

    pub(crate) fn store_previous_velocity(&mut self) {
        self.previous_velocity = self.velocity;
    }

    pub fn force(&self) -> Vec3 {
        self.force
    }

    pub fn torque(&self) -> Vec3 {
        self.torque
    }

    pub fn apply_force(&mut self, force: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.force += force;
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.torque += torque;
    }

    pub fn apply_force_at_point(&mut self, force: Vec3, point: Vec3) {
        self.apply_force(force);
        self.apply_torque((point - self.position).cross(force));
    }

    /// Instantaneous change of momentum through `point` (world space).
    pub fn apply_impulse_at_point(&mut self, impulse: Vec3, point: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        let linear = self.velocity.linear + impulse * self.inverse_mass;
        let torque = (point - self.position).cross(impulse);
        let angular = self.velocity.angular + self.inverse_inertia_world() * torque;
        self.set_velocity(Velocity::new(linear, angular));
        self.wake_up();
    }

    pub(crate) fn clear_accumulators(&mut self) {
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }

    pub fn mass_properties(&self) -> MassProperties {
        self.mass_properties
    }

    pub fn mass(&self) -> f32 {
        self.mass_properties.mass
    }

    /// Zero for anything but a dynamic body.
    pub fn inverse_mass(&self) -> f32 {
        if self.is_dynamic() {
            self.inverse_mass
        } else {
            0.0
        }
    }

    pub fn inverse_inertia_local(&self) -> Mat3 {
        if self.is_dynamic() && !self.rotation_locked {
            self.inverse_inertia_local
        } else {
            Mat3::ZERO
        }
    }

    pub fn inverse_inertia_world(&self) -> Mat3 {
        rotate_tensor(self.inverse_inertia_local(), self.rotation)
    }

    /// Body-space inertia, `None` when rotation is locked or the body has infinite mass.
    pub fn inertia_local(&self) -> Option<Mat3> {
        if !self.is_dynamic() || self.rotation_locked {
            return None;
        }
        Some(self.mass_properties.inertia)
    }

    pub fn set_rotation_locked(&mut self, locked: bool) {
        self.rotation_locked = locked;
        if locked {
            self.velocity.angular = Vec3::ZERO;
        }
    }

    pub fn rotation_locked(&self) -> bool {
        self.rotation_locked
    }

    /// Installs new mass properties. Malformed values are clamped with a warning.
    pub fn set_mass_properties(&mut self, props: MassProperties) {
        let mut props = props;
        if !props.mass.is_finite() || props.mass < MIN_MASS {
            log::warn!("rigid body mass {} clamped to {}", props.mass, MIN_MASS);
            let scale = if props.mass.is_finite() && props.mass > 0.0 {
                MIN_MASS / props.mass
            } else {
                0.0
            };
            props = MassProperties::new(MIN_MASS, props.inertia * scale);
        }

        let determinant = props.inertia.determinant();
        let inertia_ok = props.inertia.is_finite()
            && determinant > 0.0
            && props.inertia.x_axis.x > 0.0
            && props.inertia.y_axis.y > 0.0
            && props.inertia.z_axis.z > 0.0;
        if !inertia_ok {
            if props.inertia != Mat3::ZERO {
                log::warn!("rigid body inertia was degenerate and has been replaced");
            }
            // Solid unit-diameter sphere of the same mass.
            props.inertia = Mat3::from_diagonal(Vec3::splat(0.1 * props.mass));
        }

        self.mass_properties = props;
        self.inverse_mass = 1.0 / props.mass;
        self.inverse_inertia_local = props.inertia.inverse();
    }

    pub fn is_asleep(&self) -> bool {
        self.asleep
    }

    pub fn is_awake(&self) -> bool {
        !self.asleep
    }

    pub fn sleep_timer(&self) -> f32 {
        self.sleep_timer
    }

    pub fn wake_up(&mut self) {
        self.asleep = false;
        self.sleep_timer = 0.0;
    }

    /// Zeroes velocities and accumulators and marks the body asleep.
    pub fn put_to_sleep(&mut self) {
        if !self.is_dynamic() {
            return;
        }
        self.asleep = true;
        self.velocity = Velocity::ZERO;
        self.previous_velocity = Velocity::ZERO;
        self.clear_accumulators();
    }

    /// Advances the resting timer at most once per step and returns it.
    pub(crate) fn update_sleep_timer(&mut self, dt: f32, linear_epsilon: f32, angular_epsilon: f32) -> f32 {
        if self.sleep_accumulated {
            return self.sleep_timer;
        }
        self.sleep_accumulated = true;

        if !self.allow_sleep || !self.is_dynamic() {
            self.sleep_timer = 0.0;
            return self.sleep_timer;
        }

        let resting = self.velocity.linear.length_squared() < linear_epsilon
            && self.velocity.angular.length_squared() < angular_epsilon;
        if resting {
            self.sleep_timer += dt;
        } else {
            self.sleep_timer = 0.0;
        }
        self.sleep_timer
    }

    pub(crate) fn reset_sleep_accumulated(&mut self) {
        self.sleep_accumulated = false;
    }

    pub(crate) fn set_pose(&mut self, pose: &Transform) {
        self.position = pose.position;
        self.rotation = pose.rotation;
    }
}

/// Resolves the body that actually moves `handle`: walks up through non-dynamic parents.
///
/// A child kinematic body riding on a dynamic parent resolves to the parent. Cycles in the
/// parent chain are cut by a visited set, returning the last body reached.
pub fn top_level_body(bodies: &Arena<BodyHandle, RigidBody>, handle: BodyHandle) -> BodyHandle {
    let mut current = handle;
    let mut seen = HashSet::new();
    seen.insert(current);
    loop {
        let Some(body) = bodies.get(current) else {
            return current;
        };
        if body.is_dynamic() {
            return current;
        }
        match body.parent {
            Some(parent) if bodies.contains(parent) && seen.insert(parent) => current = parent,
            _ => return current,
        }
    }
}
