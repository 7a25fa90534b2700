use glam::Vec3;

use super::{filter::FilterResult, manifold::Manifold};
use crate::core::{
    handles::{BodyHandle, ColliderHandle},
    types::MaterialPairProperties,
};

/// New points within this distance of an old one inherit its impulses.
pub const WARM_START_MATCH_DISTANCE: f32 = 0.05;

/// One manifold point plus the impulses the solver accumulated on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    pub position: Vec3,
    /// Unit normal from A towards B.
    pub normal: Vec3,
    pub penetration: f32,
    pub normal_impulse: f32,
    pub tangent_impulse: [f32; 2],
}

/// Persistent contact edge between two colliders.
#[derive(Debug, Clone)]
pub struct Contact {
    pub(crate) colliders: [ColliderHandle; 2],
    pub(crate) bodies: [Option<BodyHandle>; 2],
    pub normal: Vec3,
    pub points: Vec<ContactPoint>,
    pub material: MaterialPairProperties,
    pub(crate) filter: FilterResult,
    /// At least one side is a sensor.
    pub ghost: bool,
    pub skip_resolution: bool,
    /// Cleared when the narrow phase stops reporting the pair.
    pub valid: bool,
    pub(crate) on_island: bool,
    /// Set on the step the contact was created, cleared once its start was reported.
    pub(crate) is_new: bool,
}

impl Contact {
    pub(crate) fn new(
        colliders: [ColliderHandle; 2],
        bodies: [Option<BodyHandle>; 2],
        material: MaterialPairProperties,
        filter: FilterResult,
    ) -> Self {
        Self {
            colliders,
            bodies,
            normal: Vec3::ZERO,
            points: Vec::new(),
            material,
            ghost: false,
            skip_resolution: filter.skip_resolution,
            filter,
            valid: true,
            on_island: false,
            is_new: true,
        }
    }

    pub fn collider_a(&self) -> ColliderHandle {
        self.colliders[0]
    }

    pub fn collider_b(&self) -> ColliderHandle {
        self.colliders[1]
    }

    pub fn body_a(&self) -> Option<BodyHandle> {
        self.bodies[0]
    }

    pub fn body_b(&self) -> Option<BodyHandle> {
        self.bodies[1]
    }

    pub fn filter(&self) -> &FilterResult {
        &self.filter
    }

    pub fn is_on_island(&self) -> bool {
        self.on_island
    }

    /// The other endpoint, or `None` if `collider` is not on this edge.
    pub fn other(&self, collider: ColliderHandle) -> Option<ColliderHandle> {
        if self.colliders[0] == collider {
            Some(self.colliders[1])
        } else if self.colliders[1] == collider {
            Some(self.colliders[0])
        } else {
            None
        }
    }

    /// Takes the solver's view of the pair: contacts it should push apart.
    pub fn is_resolvable(&self) -> bool {
        self.valid && !self.ghost && !self.skip_resolution && !self.points.is_empty()
    }

    pub fn max_penetration(&self) -> f32 {
        self.points
            .iter()
            .map(|p| p.penetration)
            .fold(0.0, f32::max)
    }

    pub fn total_normal_impulse(&self) -> f32 {
        self.points.iter().map(|p| p.normal_impulse).sum()
    }

    /// Replaces the points with a fresh manifold, carrying impulses over from the nearest
    /// previous point.
    pub fn update_manifold(&mut self, manifold: Manifold) {
        let previous = std::mem::take(&mut self.points);
        self.normal = manifold.normal;
        let max_distance_sq = WARM_START_MATCH_DISTANCE * WARM_START_MATCH_DISTANCE;
        self.points = manifold
            .points
            .into_iter()
            .map(|point| {
                let matched = previous
                    .iter()
                    .map(|old| (old, old.position.distance_squared(point.position)))
                    .filter(|(_, d)| *d <= max_distance_sq)
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(old, _)| old);
                ContactPoint {
                    position: point.position,
                    normal: point.normal,
                    penetration: point.penetration,
                    normal_impulse: matched.map_or(0.0, |old| old.normal_impulse),
                    tangent_impulse: matched.map_or([0.0; 2], |old| old.tangent_impulse),
                }
            })
            .collect();
        self.valid = true;
    }

    pub(crate) fn clear_impulses(&mut self) {
        for point in &mut self.points {
            point.normal_impulse = 0.0;
            point.tangent_impulse = [0.0; 2];
        }
    }
}
