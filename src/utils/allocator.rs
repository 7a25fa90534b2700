use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Unique identifier with generation tracking to prevent stale references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct GenerationalId {
    pub index: usize,
    pub generation: u32,
}

impl GenerationalId {
    pub fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// Typed key for an [`Arena`]. Implemented by the handle newtypes declared with
/// [`arena_key!`].
pub trait ArenaKey: Copy + Eq + Ord + Hash + fmt::Debug {
    fn from_id(id: GenerationalId) -> Self;
    fn id(self) -> GenerationalId;

    fn index(self) -> usize {
        self.id().index
    }

    fn generation(self) -> u32 {
        self.id().generation
    }
}

/// Declares a handle newtype over [`GenerationalId`].
macro_rules! arena_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize,
        )]
        pub struct $name(pub $crate::utils::allocator::GenerationalId);

        impl $name {
            pub fn new(index: usize, generation: u32) -> Self {
                Self($crate::utils::allocator::GenerationalId::new(index, generation))
            }
        }

        impl $crate::utils::allocator::ArenaKey for $name {
            fn from_id(id: $crate::utils::allocator::GenerationalId) -> Self {
                Self(id)
            }

            fn id(self) -> $crate::utils::allocator::GenerationalId {
                self.0
            }
        }
    };
}

pub(crate) use arena_key;

/// Generational arena that hands out stable typed handles while preventing use-after-free.
///
/// Iteration always walks slots in index order, so two arenas that saw the same
/// sequence of inserts and removes iterate identically.
pub struct Arena<K, T> {
    items: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: VecDeque<usize>,
    len: usize,
    _key: PhantomData<fn() -> K>,
}

impl<K: ArenaKey, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ArenaKey, T: fmt::Debug> fmt::Debug for Arena<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: ArenaKey, T> Arena<K, T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            generations: Vec::new(),
            free_list: VecDeque::new(),
            len: 0,
            _key: PhantomData,
        }
    }

    pub fn insert(&mut self, item: T) -> K {
        self.len += 1;
        if let Some(index) = self.free_list.pop_front() {
            let generation = self.generations[index];
            self.items[index] = Some(item);
            return K::from_id(GenerationalId::new(index, generation));
        }

        let index = self.items.len();
        self.items.push(Some(item));
        self.generations.push(0);
        K::from_id(GenerationalId::new(index, 0))
    }

    /// Inserts a value built from its own handle.
    pub fn insert_with(&mut self, build: impl FnOnce(K) -> T) -> K {
        let (index, generation) = match self.free_list.front() {
            Some(&index) => (index, self.generations[index]),
            None => (self.items.len(), 0),
        };
        let key = K::from_id(GenerationalId::new(index, generation));
        let inserted = self.insert(build(key));
        debug_assert_eq!(inserted, key);
        inserted
    }

    pub fn get(&self, key: K) -> Option<&T> {
        if self.is_valid(key) {
            self.items.get(key.index()).and_then(|slot| slot.as_ref())
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        if self.is_valid(key) {
            self.items.get_mut(key.index()).and_then(|slot| slot.as_mut())
        } else {
            None
        }
    }

    pub fn get2_mut(&mut self, key_a: K, key_b: K) -> Option<(&mut T, &mut T)> {
        if key_a.index() == key_b.index() {
            return None;
        }

        if !self.is_valid(key_a) || !self.is_valid(key_b) {
            return None;
        }

        let (first, second, flipped) = if key_a.index() < key_b.index() {
            (key_a, key_b, false)
        } else {
            (key_b, key_a, true)
        };

        let second_index = second.index();
        if second_index >= self.items.len() {
            return None;
        }

        let (left, right) = self.items.split_at_mut(second_index);
        let first_slot = left
            .get_mut(first.index())
            .and_then(|slot| slot.as_mut())?;
        let second_slot = right.get_mut(0).and_then(|slot| slot.as_mut())?;

        if flipped {
            Some((second_slot, first_slot))
        } else {
            Some((first_slot, second_slot))
        }
    }

    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: K) -> Option<T> {
        if !self.is_valid(key) {
            return None;
        }
        let slot = self.items.get_mut(key.index())?;
        let item = slot.take()?;
        self.generations[key.index()] = self.generations[key.index()].wrapping_add(1);
        self.free_list.push_back(key.index());
        self.len -= 1;
        Some(item)
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> + '_ {
        self.items.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref().map(|item| {
                (
                    K::from_id(GenerationalId::new(index, self.generations[index])),
                    item,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut T)> + '_ {
        let generations = &self.generations;
        self.items
            .iter_mut()
            .enumerate()
            .filter_map(move |(index, slot)| {
                slot.as_mut().map(|item| {
                    (
                        K::from_id(GenerationalId::new(index, generations[index])),
                        item,
                    )
                })
            })
    }

    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter().filter_map(|slot| slot.as_ref())
    }

    pub fn ids(&self) -> impl Iterator<Item = K> + '_ {
        self.iter().map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn is_valid(&self, key: K) -> bool {
        self.generations
            .get(key.index())
            .copied()
            .map(|gen| gen == key.generation())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    arena_key!(TestKey);

    #[test]
    fn stale_handles_do_not_resolve_after_slot_reuse() {
        let mut arena: Arena<TestKey, &str> = Arena::new();
        let first = arena.insert("first");
        assert_eq!(arena.remove(first), Some("first"));

        let second = arena.insert("second");
        assert_eq!(second.index(), first.index());
        assert_ne!(second.generation(), first.generation());
        assert!(arena.get(first).is_none());
        assert_eq!(arena.get(second), Some(&"second"));
        assert!(arena.remove(first).is_none(), "stale remove must be rejected");
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn get2_mut_returns_requested_order() {
        let mut arena: Arena<TestKey, i32> = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);

        let (vb, va) = arena.get2_mut(b, a).expect("distinct live keys");
        *vb += 10;
        *va += 20;
        assert_eq!(arena.get(a), Some(&21));
        assert_eq!(arena.get(b), Some(&12));
        assert!(arena.get2_mut(a, a).is_none());
    }

    #[test]
    fn insert_with_sees_its_own_key() {
        let mut arena: Arena<TestKey, TestKey> = Arena::new();
        let dead = arena.insert_with(|key| key);
        arena.remove(dead);
        let key = arena.insert_with(|key| key);
        assert_eq!(arena.get(key), Some(&key));
    }

    #[test]
    fn iteration_follows_slot_order() {
        let mut arena: Arena<TestKey, u32> = Arena::new();
        let keys: Vec<_> = (0..4).map(|i| arena.insert(i)).collect();
        arena.remove(keys[1]);
        let values: Vec<u32> = arena.values().copied().collect();
        assert_eq!(values, vec![0, 2, 3]);
        let ids: Vec<_> = arena.ids().collect();
        assert_eq!(ids, vec![keys[0], keys[2], keys[3]]);
    }
}
