//! Group-based pair filtering: which collider groups detect each other, which resolve,
//! and which events a touching pair reports.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};

/// Most groups a table can register; each owns one bit of a `u32` mask.
pub const MAX_COLLISION_GROUPS: usize = 32;

/// Stable identifier of a collision group.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct GroupId(pub u32);

impl GroupId {
    pub const DEFAULT: GroupId = GroupId(0);
}

/// Which stage of a pair's lifetime a block reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterBlockKind {
    Started,
    Persisted,
    Ended,
    PreSolve,
}

impl FilterBlockKind {
    fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// An event a filter sends when its pair reaches the block's stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterBlock {
    pub kind: FilterBlockKind,
    /// Report to colliders of the filter's first group.
    pub send_to_a: bool,
    /// Report to colliders of the filter's second group.
    pub send_to_b: bool,
    /// Report to the world event queue.
    pub send_to_space: bool,
    pub event_name: Arc<str>,
}

impl FilterBlock {
    pub fn new(kind: FilterBlockKind, event_name: &str) -> Self {
        Self {
            kind,
            send_to_a: true,
            send_to_b: true,
            send_to_space: true,
            event_name: Arc::from(event_name),
        }
    }

    pub fn to_space_only(mut self) -> Self {
        self.send_to_a = false;
        self.send_to_b = false;
        self.send_to_space = true;
        self
    }
}

/// Pair rule between two groups. Stored with the smaller id first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionFilter {
    pair: (GroupId, GroupId),
    pub skip_detection: bool,
    pub skip_resolution: bool,
    blocks: Vec<FilterBlock>,
    #[serde(skip)]
    event_bits: u8,
}

impl CollisionFilter {
    pub fn new(a: GroupId, b: GroupId) -> Self {
        Self {
            pair: canonical(a, b),
            skip_detection: false,
            skip_resolution: false,
            blocks: Vec::new(),
            event_bits: 0,
        }
    }

    pub fn skipping_detection(mut self) -> Self {
        self.skip_detection = true;
        self
    }

    pub fn skipping_resolution(mut self) -> Self {
        self.skip_resolution = true;
        self
    }

    pub fn with_block(mut self, block: FilterBlock) -> Self {
        self.blocks.push(block);
        self.refresh_bits();
        self
    }

    pub fn pair(&self) -> (GroupId, GroupId) {
        self.pair
    }

    pub fn blocks(&self) -> &[FilterBlock] {
        &self.blocks
    }

    pub fn sends(&self, kind: FilterBlockKind) -> bool {
        self.event_bits & kind.bit() != 0
    }

    fn refresh_bits(&mut self) {
        self.event_bits = self.blocks.iter().fold(0, |bits, b| bits | b.kind.bit());
    }
}

fn canonical(a: GroupId, b: GroupId) -> (GroupId, GroupId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Outcome of filtering one pair of groups.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    /// Contacts between the pair are handed to the solver.
    pub resolve: bool,
    pub skip_detection: bool,
    pub skip_resolution: bool,
    /// The filter's groups in stored order; `send_to_a` refers to `groups.0`.
    pub groups: (GroupId, GroupId),
    /// Event blocks in the order they were added.
    pub events: Option<Arc<[FilterBlock]>>,
}

impl FilterResult {
    pub fn unfiltered(a: GroupId, b: GroupId) -> Self {
        Self {
            resolve: true,
            skip_detection: false,
            skip_resolution: false,
            groups: canonical(a, b),
            events: None,
        }
    }

    /// Sensors are detected but never resolved.
    pub fn with_ghosts(mut self, ghost_a: bool, ghost_b: bool) -> Self {
        if ghost_a || ghost_b {
            self.skip_resolution = true;
            self.resolve = false;
        }
        self
    }

    pub fn blocks(&self, kind: FilterBlockKind) -> impl Iterator<Item = &FilterBlock> {
        self.events
            .iter()
            .flat_map(|blocks| blocks.iter())
            .filter(move |block| block.kind == kind)
    }
}

#[derive(Debug, Clone)]
struct GroupEntry {
    id: GroupId,
    name: String,
    bit: u32,
    detection_mask: u32,
    resolution_mask: u32,
}

/// Registered groups and the filters between them.
#[derive(Debug, Clone)]
pub struct CollisionTable {
    groups: Vec<GroupEntry>,
    filters: Vec<CollisionFilter>,
    filter_index: HashMap<(GroupId, GroupId), usize>,
    events: HashMap<(GroupId, GroupId), Arc<[FilterBlock]>>,
    next_id: u32,
}

impl Default for CollisionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CollisionTable {
    pub fn new() -> Self {
        let mut table = Self {
            groups: Vec::new(),
            filters: Vec::new(),
            filter_index: HashMap::new(),
            events: HashMap::new(),
            next_id: 1,
        };
        table.groups.push(GroupEntry {
            id: GroupId::DEFAULT,
            name: "Default".to_string(),
            bit: 1,
            detection_mask: u32::MAX,
            resolution_mask: u32::MAX,
        });
        table
    }

    /// Registers a group by name, returning the existing id when the name is known.
    pub fn register_group(&mut self, name: &str) -> Result<GroupId> {
        if let Some(group) = self.groups.iter().find(|g| g.name == name) {
            return Ok(group.id);
        }
        if self.groups.len() >= MAX_COLLISION_GROUPS {
            log::error!("collision group limit of {MAX_COLLISION_GROUPS} reached; '{name}' not registered");
            return Err(PhysicsError::GroupLimitReached {
                max: MAX_COLLISION_GROUPS,
            });
        }
        let id = GroupId(self.next_id);
        self.next_id += 1;
        self.groups.push(GroupEntry {
            id,
            name: name.to_string(),
            bit: 0,
            detection_mask: u32::MAX,
            resolution_mask: u32::MAX,
        });
        self.reconfigure();
        Ok(id)
    }

    /// Removes a group and every filter that mentions it. The default group stays.
    pub fn unregister_group(&mut self, id: GroupId) -> Result<()> {
        if id == GroupId::DEFAULT || !self.is_registered(id) {
            return Err(PhysicsError::UnknownGroup(id));
        }
        self.groups.retain(|g| g.id != id);
        self.filters.retain(|f| f.pair.0 != id && f.pair.1 != id);
        self.reconfigure();
        Ok(())
    }

    pub fn is_registered(&self, id: GroupId) -> bool {
        self.groups.iter().any(|g| g.id == id)
    }

    pub fn group_name(&self, id: GroupId) -> Option<&str> {
        self.groups
            .iter()
            .find(|g| g.id == id)
            .map(|g| g.name.as_str())
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn filters(&self) -> &[CollisionFilter] {
        &self.filters
    }

    pub fn find_filter(&self, a: GroupId, b: GroupId) -> Option<&CollisionFilter> {
        self.filter_index
            .get(&canonical(a, b))
            .map(|&index| &self.filters[index])
    }

    /// Adds or replaces the filter for its pair of groups.
    pub fn add_filter(&mut self, mut filter: CollisionFilter) -> Result<()> {
        for id in [filter.pair.0, filter.pair.1] {
            if !self.is_registered(id) {
                return Err(PhysicsError::UnknownGroup(id));
            }
        }
        filter.refresh_bits();
        match self.filter_index.get(&filter.pair) {
            Some(&index) => self.filters[index] = filter,
            None => self.filters.push(filter),
        }
        self.reconfigure();
        Ok(())
    }

    pub fn remove_filter(&mut self, a: GroupId, b: GroupId) -> Option<CollisionFilter> {
        let index = *self.filter_index.get(&canonical(a, b))?;
        let removed = self.filters.remove(index);
        self.reconfigure();
        Some(removed)
    }

    /// Appends an event block, creating an empty filter for the pair when needed.
    pub fn add_block(&mut self, a: GroupId, b: GroupId, block: FilterBlock) -> Result<()> {
        let key = canonical(a, b);
        if self.filter_index.contains_key(&key) {
            let index = self.filter_index[&key];
            self.filters[index].blocks.push(block);
            self.filters[index].refresh_bits();
            self.reconfigure();
            Ok(())
        } else {
            self.add_filter(CollisionFilter::new(a, b).with_block(block))
        }
    }

    pub fn remove_block(&mut self, a: GroupId, b: GroupId, index: usize) -> Result<FilterBlock> {
        let key = canonical(a, b);
        let not_found = PhysicsError::BlockNotFound { a, b, index };
        let filter_index = *self.filter_index.get(&key).ok_or_else(|| not_found.clone())?;
        let filter = &mut self.filters[filter_index];
        if index >= filter.blocks.len() {
            return Err(not_found);
        }
        let block = filter.blocks.remove(index);
        filter.refresh_bits();
        self.reconfigure();
        Ok(block)
    }

    /// Re-derives group bits, masks and lookup indices from the registered groups and
    /// filters, in registration and insertion order.
    fn reconfigure(&mut self) {
        for (index, group) in self.groups.iter_mut().enumerate() {
            group.bit = 1 << index;
            group.detection_mask = u32::MAX;
            group.resolution_mask = u32::MAX;
        }

        self.filter_index.clear();
        self.events.clear();
        for (index, filter) in self.filters.iter().enumerate() {
            let (Some(ia), Some(ib)) = (self.slot(filter.pair.0), self.slot(filter.pair.1)) else {
                continue;
            };
            let (bit_a, bit_b) = (self.groups[ia].bit, self.groups[ib].bit);
            if filter.skip_detection {
                self.groups[ia].detection_mask &= !bit_b;
                self.groups[ib].detection_mask &= !bit_a;
            } else {
                self.groups[ia].detection_mask |= bit_b;
                self.groups[ib].detection_mask |= bit_a;
            }
            if filter.skip_resolution {
                self.groups[ia].resolution_mask &= !bit_b;
                self.groups[ib].resolution_mask &= !bit_a;
            } else {
                self.groups[ia].resolution_mask |= bit_b;
                self.groups[ib].resolution_mask |= bit_a;
            }
            self.filter_index.insert(filter.pair, index);
            if !filter.blocks.is_empty() {
                self.events
                    .insert(filter.pair, Arc::from(filter.blocks.clone()));
            }
        }
    }

    fn slot(&self, id: GroupId) -> Option<usize> {
        self.groups.iter().position(|g| g.id == id)
    }

    /// Unknown groups behave as the default group.
    fn entry(&self, id: GroupId) -> &GroupEntry {
        self.groups
            .iter()
            .find(|g| g.id == id)
            .unwrap_or(&self.groups[0])
    }

    /// The id a group evaluates as: itself when registered, otherwise the default group.
    pub fn resolve(&self, id: GroupId) -> GroupId {
        self.entry(id).id
    }

    pub fn evaluate(&self, a: GroupId, b: GroupId) -> FilterResult {
        let entry_a = self.entry(a);
        let entry_b = self.entry(b);
        let detects = entry_a.detection_mask & entry_b.bit != 0
            && entry_b.detection_mask & entry_a.bit != 0;
        let resolves = entry_a.resolution_mask & entry_b.bit != 0
            && entry_b.resolution_mask & entry_a.bit != 0;
        let groups = canonical(entry_a.id, entry_b.id);
        FilterResult {
            resolve: detects && resolves,
            skip_detection: !detects,
            skip_resolution: !resolves,
            groups,
            events: self.events.get(&groups).cloned(),
        }
    }
}
