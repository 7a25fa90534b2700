//! Broad-phase contract and the grid/sweep reference implementation.

use std::collections::{BTreeMap, HashMap};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::primitives::CastShape;
use crate::core::{handles::ColliderHandle, mesh::Aabb};

/// Which half of the broad-phase a proxy lives in. Static proxies never pair with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BroadPhasePartition {
    Static,
    Dynamic,
}

impl BroadPhasePartition {
    pub const ALL: [BroadPhasePartition; 2] =
        [BroadPhasePartition::Static, BroadPhasePartition::Dynamic];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn other(self) -> BroadPhasePartition {
        match self {
            BroadPhasePartition::Static => BroadPhasePartition::Dynamic,
            BroadPhasePartition::Dynamic => BroadPhasePartition::Static,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProxyInsert {
    pub collider: ColliderHandle,
    pub aabb: Aabb,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProxyUpdate {
    pub collider: ColliderHandle,
    pub aabb: Aabb,
}

/// Spatial index over collider bounds, driven in batches by the node manager.
pub trait BroadPhase: Send + Sync {
    fn create_proxies(&mut self, partition: BroadPhasePartition, proxies: &[ProxyInsert]);

    fn update_proxies(&mut self, partition: BroadPhasePartition, proxies: &[ProxyUpdate]);

    fn remove_proxies(&mut self, partition: BroadPhasePartition, colliders: &[ColliderHandle]);

    /// Rebuilds acceleration structures after the static partition changed.
    fn construct(&mut self);

    /// Colliders whose bounds the cast touches, in handle order.
    fn query(&self, cast: &CastShape) -> Vec<ColliderHandle>;

    /// Overlapping pairs with at least one dynamic member, each `(smaller, larger)`, sorted.
    fn candidate_pairs(&mut self) -> Vec<(ColliderHandle, ColliderHandle)>;
}

type Cell = (i32, i32, i32);

/// Uniform hash grid over static proxies.
#[derive(Debug, Default)]
struct SpatialGrid {
    cell_size: f32,
    cells: HashMap<Cell, Vec<ColliderHandle>>,
    /// Proxies too large to bucket; always tested.
    oversized: Vec<ColliderHandle>,
}

/// More cells than this per proxy and it goes into the oversized list instead.
const MAX_CELLS_PER_PROXY: i64 = 4096;

impl SpatialGrid {
    fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(1e-3),
            cells: HashMap::new(),
            oversized: Vec::new(),
        }
    }

    fn world_to_grid(&self, position: Vec3) -> Cell {
        (
            (position.x / self.cell_size).floor() as i32,
            (position.y / self.cell_size).floor() as i32,
            (position.z / self.cell_size).floor() as i32,
        )
    }

    fn cell_range(&self, aabb: &Aabb) -> Option<(Cell, Cell)> {
        if !aabb.min.is_finite() || !aabb.max.is_finite() {
            return None;
        }
        let min = self.world_to_grid(aabb.min);
        let max = self.world_to_grid(aabb.max);
        let count = (max.0 as i64 - min.0 as i64 + 1)
            * (max.1 as i64 - min.1 as i64 + 1)
            * (max.2 as i64 - min.2 as i64 + 1);
        (count <= MAX_CELLS_PER_PROXY).then_some((min, max))
    }

    fn rebuild(&mut self, proxies: &BTreeMap<ColliderHandle, Aabb>) {
        self.cells.clear();
        self.oversized.clear();
        for (&collider, aabb) in proxies {
            let Some((min, max)) = self.cell_range(aabb) else {
                self.oversized.push(collider);
                continue;
            };
            for x in min.0..=max.0 {
                for y in min.1..=max.1 {
                    for z in min.2..=max.2 {
                        self.cells.entry((x, y, z)).or_default().push(collider);
                    }
                }
            }
        }
    }

    /// Candidates near `aabb`, sorted and deduplicated. `None` when the box is too large to walk.
    fn query(&self, aabb: &Aabb) -> Option<Vec<ColliderHandle>> {
        let (min, max) = self.cell_range(aabb)?;
        let mut results = self.oversized.clone();
        for x in min.0..=max.0 {
            for y in min.1..=max.1 {
                for z in min.2..=max.2 {
                    if let Some(colliders) = self.cells.get(&(x, y, z)) {
                        results.extend(colliders);
                    }
                }
            }
        }
        results.sort();
        results.dedup();
        Some(results)
    }
}

/// Reference broad-phase: sort-and-sweep along X for dynamic proxies, a uniform grid for
/// static ones. The grid only changes on [`BroadPhase::construct`].
#[derive(Debug)]
pub struct GridBroadPhase {
    proxies: [BTreeMap<ColliderHandle, Aabb>; 2],
    grid: SpatialGrid,
    grid_dirty: bool,
}

impl Default for GridBroadPhase {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_BROADPHASE_CELL_SIZE)
    }
}

impl GridBroadPhase {
    pub fn new(cell_size: f32) -> Self {
        Self {
            proxies: [BTreeMap::new(), BTreeMap::new()],
            grid: SpatialGrid::new(cell_size),
            grid_dirty: false,
        }
    }

    pub fn proxy_count(&self, partition: BroadPhasePartition) -> usize {
        self.proxies[partition.index()].len()
    }

    pub fn contains(&self, partition: BroadPhasePartition, collider: ColliderHandle) -> bool {
        self.proxies[partition.index()].contains_key(&collider)
    }

    pub fn proxy_aabb(&self, collider: ColliderHandle) -> Option<&Aabb> {
        self.proxies.iter().find_map(|p| p.get(&collider))
    }

    fn statics_near(&self, aabb: &Aabb) -> Vec<ColliderHandle> {
        let statics = &self.proxies[BroadPhasePartition::Static.index()];
        if self.grid_dirty {
            return statics.keys().copied().collect();
        }
        self.grid
            .query(aabb)
            .unwrap_or_else(|| statics.keys().copied().collect())
    }
}

impl BroadPhase for GridBroadPhase {
    fn create_proxies(&mut self, partition: BroadPhasePartition, proxies: &[ProxyInsert]) {
        let map = &mut self.proxies[partition.index()];
        for proxy in proxies {
            map.insert(proxy.collider, proxy.aabb);
        }
        if partition == BroadPhasePartition::Static && !proxies.is_empty() {
            self.grid_dirty = true;
        }
    }

    fn update_proxies(&mut self, partition: BroadPhasePartition, proxies: &[ProxyUpdate]) {
        let map = &mut self.proxies[partition.index()];
        for proxy in proxies {
            match map.get_mut(&proxy.collider) {
                Some(aabb) => *aabb = proxy.aabb,
                None => log::warn!("update for unknown {partition:?} proxy {:?}", proxy.collider),
            }
        }
        if partition == BroadPhasePartition::Static && !proxies.is_empty() {
            self.grid_dirty = true;
        }
    }

    fn remove_proxies(&mut self, partition: BroadPhasePartition, colliders: &[ColliderHandle]) {
        let map = &mut self.proxies[partition.index()];
        for collider in colliders {
            map.remove(collider);
        }
        if partition == BroadPhasePartition::Static && !colliders.is_empty() {
            self.grid_dirty = true;
        }
    }

    fn construct(&mut self) {
        self.grid
            .rebuild(&self.proxies[BroadPhasePartition::Static.index()]);
        self.grid_dirty = false;
    }

    fn query(&self, cast: &CastShape) -> Vec<ColliderHandle> {
        let bounded = match cast {
            CastShape::Aabb(aabb) => Some(*aabb),
            CastShape::Sphere(sphere) => Some(sphere.aabb()),
            CastShape::Segment(segment) => {
                Some(Aabb::from_points(&[segment.start, segment.end]))
            }
            CastShape::Ray(_) | CastShape::Frustum(_) => None,
        };
        let statics = &self.proxies[BroadPhasePartition::Static.index()];
        let static_candidates: Vec<ColliderHandle> = match bounded {
            Some(aabb) => self.statics_near(&aabb),
            None => statics.keys().copied().collect(),
        };

        let mut results: Vec<ColliderHandle> = static_candidates
            .into_iter()
            .filter(|c| statics.get(c).is_some_and(|aabb| cast.test_aabb(aabb).is_some()))
            .collect();
        results.extend(
            self.proxies[BroadPhasePartition::Dynamic.index()]
                .iter()
                .filter(|(_, aabb)| cast.test_aabb(aabb).is_some())
                .map(|(&collider, _)| collider),
        );
        results.sort();
        results.dedup();
        results
    }

    fn candidate_pairs(&mut self) -> Vec<(ColliderHandle, ColliderHandle)> {
        if self.grid_dirty {
            self.construct();
        }
        let dynamic = &self.proxies[BroadPhasePartition::Dynamic.index()];
        let statics = &self.proxies[BroadPhasePartition::Static.index()];

        let mut sorted: Vec<(ColliderHandle, &Aabb)> =
            dynamic.iter().map(|(&c, aabb)| (c, aabb)).collect();
        sorted.sort_by(|a, b| a.1.min.x.total_cmp(&b.1.min.x).then(a.0.cmp(&b.0)));

        let mut pairs = Vec::new();
        for (i, (collider, aabb)) in sorted.iter().enumerate() {
            for (other, other_aabb) in &sorted[i + 1..] {
                if other_aabb.min.x > aabb.max.x {
                    break;
                }
                if aabb.overlaps(other_aabb) {
                    pairs.push(ordered(*collider, *other));
                }
            }
            for other in self.statics_near(aabb) {
                if statics.get(&other).is_some_and(|s| s.overlaps(aabb)) {
                    pairs.push(ordered(*collider, other));
                }
            }
        }
        pairs.sort();
        pairs.dedup();
        pairs
    }
}

fn ordered(a: ColliderHandle, b: ColliderHandle) -> (ColliderHandle, ColliderHandle) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::primitives::Ray;

    fn boxed(center: Vec3) -> Aabb {
        Aabb::from_center_half_extents(center, Vec3::splat(0.5))
    }

    fn insert(
        broadphase: &mut GridBroadPhase,
        partition: BroadPhasePartition,
        index: usize,
        center: Vec3,
    ) -> ColliderHandle {
        let collider = ColliderHandle::new(index, 0);
        broadphase.create_proxies(
            partition,
            &[ProxyInsert {
                collider,
                aabb: boxed(center),
            }],
        );
        collider
    }

    #[test]
    fn static_pairs_are_never_reported() {
        let mut bp = GridBroadPhase::new(2.0);
        insert(&mut bp, BroadPhasePartition::Static, 0, Vec3::ZERO);
        insert(&mut bp, BroadPhasePartition::Static, 1, Vec3::new(0.5, 0.0, 0.0));
        bp.construct();
        assert!(bp.candidate_pairs().is_empty());
    }

    #[test]
    fn dynamic_pairs_with_both_partitions() {
        let mut bp = GridBroadPhase::new(2.0);
        let ground = insert(&mut bp, BroadPhasePartition::Static, 0, Vec3::ZERO);
        let a = insert(&mut bp, BroadPhasePartition::Dynamic, 1, Vec3::new(0.0, 0.8, 0.0));
        let b = insert(&mut bp, BroadPhasePartition::Dynamic, 2, Vec3::new(0.0, 1.6, 0.0));
        let far = insert(&mut bp, BroadPhasePartition::Dynamic, 3, Vec3::new(50.0, 0.0, 0.0));
        bp.construct();

        let pairs = bp.candidate_pairs();
        assert_eq!(pairs, vec![(ground, a), (a, b)]);
        assert!(pairs.iter().all(|&(x, y)| x != far && y != far));
    }

    #[test]
    fn update_and_remove_move_proxies() {
        let mut bp = GridBroadPhase::new(2.0);
        let a = insert(&mut bp, BroadPhasePartition::Dynamic, 0, Vec3::ZERO);
        let b = insert(&mut bp, BroadPhasePartition::Dynamic, 1, Vec3::new(10.0, 0.0, 0.0));
        assert!(bp.candidate_pairs().is_empty());

        bp.update_proxies(
            BroadPhasePartition::Dynamic,
            &[ProxyUpdate {
                collider: b,
                aabb: boxed(Vec3::new(0.5, 0.0, 0.0)),
            }],
        );
        assert_eq!(bp.candidate_pairs(), vec![(a, b)]);

        bp.remove_proxies(BroadPhasePartition::Dynamic, &[a]);
        assert!(bp.candidate_pairs().is_empty());
        assert_eq!(bp.proxy_count(BroadPhasePartition::Dynamic), 1);
    }

    #[test]
    fn ray_query_hits_both_partitions() {
        let mut bp = GridBroadPhase::new(2.0);
        let ground = insert(&mut bp, BroadPhasePartition::Static, 0, Vec3::ZERO);
        let body = insert(&mut bp, BroadPhasePartition::Dynamic, 1, Vec3::new(0.0, 3.0, 0.0));
        insert(&mut bp, BroadPhasePartition::Dynamic, 2, Vec3::new(5.0, 3.0, 0.0));
        bp.construct();

        let ray = CastShape::Ray(Ray::new(Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y));
        assert_eq!(bp.query(&ray), vec![ground, body]);
    }
}
