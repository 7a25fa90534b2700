use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{JointEndpoint, RowBuilder, LINEAR_X, LINEAR_Y, LINEAR_Z};
use crate::core::types::Transform;
use crate::dynamics::molecule::{ConstraintMolecule, Jacobian};

/// Ball-and-socket joint: the two anchors are pinned together, rotation is free.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionJoint;

impl PositionJoint {
    /// Both frames start at the anchors' midpoint.
    pub(crate) fn configure(&mut self, anchor_a: Vec3, anchor_b: Vec3) -> (Transform, Transform) {
        let pivot = Transform::new((anchor_a + anchor_b) * 0.5, Quat::IDENTITY);
        (pivot, pivot)
    }

    pub(crate) fn rows(
        &self,
        mask: u8,
        builder: &RowBuilder,
        a: &JointEndpoint,
        b: &JointEndpoint,
        out: &mut Vec<ConstraintMolecule>,
    ) {
        let pivot_a = a.frame.position;
        let pivot_b = b.frame.position;
        let separation = pivot_b - pivot_a;
        let (r_a, r_b) = (a.arm(pivot_a), b.arm(pivot_b));
        for (bit, axis) in [(LINEAR_X, Vec3::X), (LINEAR_Y, Vec3::Y), (LINEAR_Z, Vec3::Z)] {
            if mask & bit == 0 {
                continue;
            }
            out.push(builder.rigid(Jacobian::linear(axis, r_a, r_b), bit, separation.dot(axis)));
        }
    }
}
