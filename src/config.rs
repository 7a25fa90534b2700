//! Global configuration constants and the serializable world configuration.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Default gravity vector applied in the physics world (Y-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -9.81, 0.0];

/// Default integration timestep (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 60.0;

/// Number of velocity iterations performed per step.
pub const DEFAULT_VELOCITY_ITERATIONS: u32 = 8;

/// Number of position correction iterations performed per step.
pub const DEFAULT_POSITION_ITERATIONS: u32 = 2;

/// Baumgarte factor used for positional error feedback.
pub const DEFAULT_BAUMGARTE: f32 = 0.2;

/// Penetration allowed before position correction kicks in.
pub const DEFAULT_SLOP: f32 = 0.01;

/// Largest linear or angular speed a body may reach.
pub const DEFAULT_MAX_VELOCITY: f32 = 1e10;

/// Squared-speed thresholds below which a body counts as resting.
pub const DEFAULT_LINEAR_SLEEP_EPSILON: f32 = 0.16;
pub const DEFAULT_ANGULAR_SLEEP_EPSILON: f32 = 0.16;

/// Seconds a body must rest before its island may sleep.
pub const DEFAULT_TIME_TO_SLEEP: f32 = 1.0;

/// Default cell size for the static broad-phase uniform grid.
pub const DEFAULT_BROADPHASE_CELL_SIZE: f32 = 4.0;

/// Upper bound on sub steps per frame.
pub const MAX_SUB_STEPS: u32 = 50;

/// Smallest mass a dynamic body is allowed to carry.
pub const MIN_MASS: f32 = 1e-4;

/// World-level simulation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub gravity: Vec3,
    pub sub_steps: u32,
    pub allow_sleep: bool,
    /// Restricts every body to the XY plane.
    pub mode_2d: bool,
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub baumgarte: f32,
    pub slop: f32,
    pub max_velocity: f32,
    pub linear_sleep_epsilon: f32,
    pub angular_sleep_epsilon: f32,
    pub time_to_sleep: f32,
    pub broadphase_cell_size: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// Master switch for sweeping bodies flagged with `ccd`.
    pub ccd_enabled: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::from_array(DEFAULT_GRAVITY),
            sub_steps: 1,
            allow_sleep: true,
            mode_2d: false,
            velocity_iterations: DEFAULT_VELOCITY_ITERATIONS,
            position_iterations: DEFAULT_POSITION_ITERATIONS,
            baumgarte: DEFAULT_BAUMGARTE,
            slop: DEFAULT_SLOP,
            max_velocity: DEFAULT_MAX_VELOCITY,
            linear_sleep_epsilon: DEFAULT_LINEAR_SLEEP_EPSILON,
            angular_sleep_epsilon: DEFAULT_ANGULAR_SLEEP_EPSILON,
            time_to_sleep: DEFAULT_TIME_TO_SLEEP,
            broadphase_cell_size: DEFAULT_BROADPHASE_CELL_SIZE,
            linear_damping: 0.0,
            angular_damping: 0.0,
            ccd_enabled: true,
        }
    }
}

impl PhysicsConfig {
    /// Planar preset: every body constrained to the XY plane.
    pub fn planar() -> Self {
        Self {
            mode_2d: true,
            ..Self::default()
        }
    }

    /// Higher iteration counts for stacking-heavy scenes.
    pub fn high_accuracy() -> Self {
        Self {
            velocity_iterations: 16,
            position_iterations: 4,
            sub_steps: 2,
            ..Self::default()
        }
    }

    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_sub_steps(mut self, sub_steps: u32) -> Self {
        self.set_sub_steps(sub_steps);
        self
    }

    pub fn with_sleep(mut self, allow_sleep: bool) -> Self {
        self.allow_sleep = allow_sleep;
        self
    }

    pub fn with_mode_2d(mut self, mode_2d: bool) -> Self {
        self.mode_2d = mode_2d;
        self
    }

    pub fn with_iterations(mut self, velocity: u32, position: u32) -> Self {
        self.velocity_iterations = velocity.max(1);
        self.position_iterations = position;
        self
    }

    pub fn with_max_velocity(mut self, max_velocity: f32) -> Self {
        self.max_velocity = max_velocity.abs();
        self
    }

    /// Clamps the sub step count into `1..=MAX_SUB_STEPS`.
    pub fn set_sub_steps(&mut self, sub_steps: u32) {
        let clamped = sub_steps.clamp(1, MAX_SUB_STEPS);
        if clamped != sub_steps {
            log::warn!("sub step count {sub_steps} clamped to {clamped}");
        }
        self.sub_steps = clamped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_steps_are_clamped() {
        let config = PhysicsConfig::default().with_sub_steps(500);
        assert_eq!(config.sub_steps, MAX_SUB_STEPS);
        let config = PhysicsConfig::default().with_sub_steps(0);
        assert_eq!(config.sub_steps, 1);
    }

    #[test]
    fn presets_keep_defaults_they_do_not_touch() {
        let planar = PhysicsConfig::planar();
        assert!(planar.mode_2d);
        assert_eq!(planar.time_to_sleep, DEFAULT_TIME_TO_SLEEP);
    }
}
