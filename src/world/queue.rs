//! Deferred per-node state changes, coalesced until the next flush.

use std::ops::{BitOr, BitOrAssign};

use crate::collision::broadphase::BroadPhasePartition;

/// Which transform work a node needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct TransformAction(u8);

impl TransformAction {
    pub const NONE: TransformAction = TransformAction(0);
    /// Recompute the world transform from the local one.
    pub const FULL: TransformAction = TransformAction(1 << 0);
    /// The world transform was already written from the body; refresh dependents only.
    pub const INTEGRATION: TransformAction = TransformAction(1 << 1);

    pub fn contains(self, other: TransformAction) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for TransformAction {
    type Output = TransformAction;

    fn bitor(self, rhs: Self) -> Self {
        TransformAction(self.0 | rhs.0)
    }
}

impl BitOrAssign for TransformAction {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Which mass work a node needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct MassAction(u8);

impl MassAction {
    pub const NONE: MassAction = MassAction(0);
    /// Re-sum the body's mass properties from its colliders.
    pub const RECOMPUTE: MassAction = MassAction(1 << 0);

    pub fn contains(self, other: MassAction) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for MassAction {
    type Output = MassAction;

    fn bitor(self, rhs: Self) -> Self {
        MassAction(self.0 | rhs.0)
    }
}

impl BitOrAssign for MassAction {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Pending broad-phase call for one partition after coalescing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum BroadPhaseState {
    #[default]
    Empty,
    Inserted,
    Removed,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BroadPhaseOp {
    Insert,
    Remove,
    Update,
}

impl BroadPhaseState {
    /// Folds one more request into the pending state.
    pub fn apply(self, op: BroadPhaseOp) -> BroadPhaseState {
        use BroadPhaseOp as Op;
        use BroadPhaseState as S;
        match (self, op) {
            (S::Empty, Op::Insert) => S::Inserted,
            (S::Empty, Op::Remove) => S::Removed,
            (S::Empty, Op::Update) => S::Updated,
            (S::Inserted, Op::Insert) => S::Inserted,
            (S::Inserted, Op::Remove) => S::Empty,
            (S::Inserted, Op::Update) => S::Inserted,
            (S::Removed, Op::Insert) => S::Empty,
            (S::Removed, Op::Remove) => S::Removed,
            (S::Removed, Op::Update) => S::Removed,
            (S::Updated, Op::Insert) => S::Inserted,
            (S::Updated, Op::Remove) => S::Removed,
            (S::Updated, Op::Update) => S::Updated,
        }
    }
}

/// Pending broad-phase state for both partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct BroadPhaseAction {
    states: [BroadPhaseState; 2],
}

impl BroadPhaseAction {
    pub fn state(&self, partition: BroadPhasePartition) -> BroadPhaseState {
        self.states[partition.index()]
    }

    /// Inserting into one partition drops a pending insert into the other.
    pub fn apply(&mut self, partition: BroadPhasePartition, op: BroadPhaseOp) {
        let index = partition.index();
        self.states[index] = self.states[index].apply(op);
        if op == BroadPhaseOp::Insert {
            let other = partition.other().index();
            if self.states[other] == BroadPhaseState::Inserted {
                self.states[other] = BroadPhaseState::Empty;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.states.iter().all(|s| *s == BroadPhaseState::Empty)
    }
}

/// Everything queued on one node since the last flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhysicsQueue {
    pub transform: TransformAction,
    pub mass: MassAction,
    pub broadphase: BroadPhaseAction,
}

impl PhysicsQueue {
    pub fn push(&mut self, action: QueueAction) {
        match action {
            QueueAction::Transform(transform) => self.transform |= transform,
            QueueAction::Mass(mass) => self.mass |= mass,
            QueueAction::BroadPhase(partition, op) => self.broadphase.apply(partition, op),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transform.is_empty() && self.mass.is_empty() && self.broadphase.is_empty()
    }

    pub fn take(&mut self) -> PhysicsQueue {
        std::mem::take(self)
    }
}

/// One request to [`crate::world::node_manager::PhysicsNodeManager::queue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    Transform(TransformAction),
    Mass(MassAction),
    BroadPhase(BroadPhasePartition, BroadPhaseOp),
}
