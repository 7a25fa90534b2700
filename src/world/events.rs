//! Events raised during a step and drained by the caller afterwards.

use std::sync::Arc;

use glam::Vec3;

use crate::collision::filter::{CollisionTable, FilterBlockKind, FilterResult, GroupId};
use crate::core::handles::{BodyHandle, ColliderHandle};

/// Who an event is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventRecipient {
    /// The world-level listener.
    Space,
    Collider(ColliderHandle),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollisionEvent {
    pub collider_a: ColliderHandle,
    pub collider_b: ColliderHandle,
    /// Contact normal from A towards B; zero once the pair separated.
    pub normal: Vec3,
    pub point: Vec3,
    /// The filter block's event name, or the stage name for default events.
    pub name: Arc<str>,
    pub recipient: EventRecipient,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PhysicsEvent {
    CollisionStarted(CollisionEvent),
    CollisionPersisted(CollisionEvent),
    CollisionEnded(CollisionEvent),
    PreSolve(CollisionEvent),
    BodySlept(BodyHandle),
    BodyWoke(BodyHandle),
}

impl PhysicsEvent {
    pub fn collision(&self) -> Option<&CollisionEvent> {
        match self {
            PhysicsEvent::CollisionStarted(event)
            | PhysicsEvent::CollisionPersisted(event)
            | PhysicsEvent::CollisionEnded(event)
            | PhysicsEvent::PreSolve(event) => Some(event),
            PhysicsEvent::BodySlept(_) | PhysicsEvent::BodyWoke(_) => None,
        }
    }

    fn wrap(kind: FilterBlockKind, event: CollisionEvent) -> Self {
        match kind {
            FilterBlockKind::Started => PhysicsEvent::CollisionStarted(event),
            FilterBlockKind::Persisted => PhysicsEvent::CollisionPersisted(event),
            FilterBlockKind::Ended => PhysicsEvent::CollisionEnded(event),
            FilterBlockKind::PreSolve => PhysicsEvent::PreSolve(event),
        }
    }
}

/// Geometry and groups of one touching (or separating) pair.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PairEvent {
    pub colliders: [ColliderHandle; 2],
    pub groups: [GroupId; 2],
    pub normal: Vec3,
    pub point: Vec3,
}

/// Events of the current step in emission order.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<PhysicsEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: PhysicsEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PhysicsEvent> + '_ {
        self.events.iter()
    }

    pub fn drain(&mut self) -> Vec<PhysicsEvent> {
        std::mem::take(&mut self.events)
    }

    /// Emits the collision events a filter asks for at `kind`.
    ///
    /// Without blocks of that kind a single default event goes to the space; pre-solve
    /// events are only ever sent by blocks.
    pub(crate) fn emit_collision(
        &mut self,
        table: &CollisionTable,
        filter: &FilterResult,
        kind: FilterBlockKind,
        pair: &PairEvent,
    ) {
        let event = |name: Arc<str>, recipient| CollisionEvent {
            collider_a: pair.colliders[0],
            collider_b: pair.colliders[1],
            normal: pair.normal,
            point: pair.point,
            name,
            recipient,
        };

        let mut any_block = false;
        for block in filter.blocks(kind) {
            any_block = true;
            for (collider, group) in pair.colliders.into_iter().zip(pair.groups) {
                let group = table.resolve(group);
                let addressed = (block.send_to_a && group == filter.groups.0)
                    || (block.send_to_b && group == filter.groups.1);
                if addressed {
                    let recipient = EventRecipient::Collider(collider);
                    self.push(PhysicsEvent::wrap(kind, event(block.event_name.clone(), recipient)));
                }
            }
            if block.send_to_space {
                self.push(PhysicsEvent::wrap(
                    kind,
                    event(block.event_name.clone(), EventRecipient::Space),
                ));
            }
        }

        if !any_block && kind != FilterBlockKind::PreSolve {
            let name: Arc<str> = Arc::from(default_name(kind));
            self.push(PhysicsEvent::wrap(kind, event(name, EventRecipient::Space)));
        }
    }
}

fn default_name(kind: FilterBlockKind) -> &'static str {
    match kind {
        FilterBlockKind::Started => "CollisionStarted",
        FilterBlockKind::Persisted => "CollisionPersisted",
        FilterBlockKind::Ended => "CollisionEnded",
        FilterBlockKind::PreSolve => "PreSolve",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::filter::{CollisionFilter, FilterBlock};

    fn pair(groups: [GroupId; 2]) -> PairEvent {
        PairEvent {
            colliders: [ColliderHandle::new(0, 0), ColliderHandle::new(1, 0)],
            groups,
            normal: Vec3::Y,
            point: Vec3::ZERO,
        }
    }

    #[test]
    fn unfiltered_pairs_send_one_default_event() {
        let table = CollisionTable::new();
        let filter = table.evaluate(GroupId::DEFAULT, GroupId::DEFAULT);
        let mut queue = EventQueue::new();
        let pair = pair([GroupId::DEFAULT; 2]);
        queue.emit_collision(&table, &filter, FilterBlockKind::Started, &pair);
        queue.emit_collision(&table, &filter, FilterBlockKind::PreSolve, &pair);

        let events = queue.drain();
        assert_eq!(events.len(), 1);
        let Some(PhysicsEvent::CollisionStarted(event)) = events.first() else {
            panic!("expected a start event, got {events:?}");
        };
        assert_eq!(event.recipient, EventRecipient::Space);
        assert_eq!(&*event.name, "CollisionStarted");
        assert!(queue.is_empty());
    }

    #[test]
    fn blocks_replace_the_default_and_keep_their_order() {
        let mut table = CollisionTable::new();
        let player = table.register_group("player").unwrap();
        let pickup = table.register_group("pickup").unwrap();
        table
            .add_filter(
                CollisionFilter::new(pickup, player)
                    .with_block(FilterBlock::new(FilterBlockKind::Started, "touch").to_space_only())
                    .with_block(FilterBlock {
                        send_to_space: false,
                        send_to_b: false,
                        ..FilterBlock::new(FilterBlockKind::Started, "collect")
                    }),
            )
            .unwrap();

        let filter = table.evaluate(player, pickup);
        let mut queue = EventQueue::new();
        queue.emit_collision(&table, &filter, FilterBlockKind::Started, &pair([player, pickup]));
        let events = queue.drain();
        let names: Vec<(&str, EventRecipient)> = events
            .iter()
            .filter_map(PhysicsEvent::collision)
            .map(|e| (&*e.name, e.recipient))
            .collect();

        // The filter stores the smaller id first, so `send_to_a` addresses the player.
        assert_eq!(
            names,
            vec![
                ("touch", EventRecipient::Space),
                ("collect", EventRecipient::Collider(ColliderHandle::new(0, 0))),
            ]
        );
    }
}
