use crate::SmallKeyHashMap;

use core::hash::Hash;
use slab::Slab;
use std::collections::hash_map;

/// The residency of one cache entry. A key that is not tracked at all is "unlinked".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Residency<V> {
    /// The payload is in memory.
    Resident(V),
    /// The payload was dropped to save memory, but the key is still linked into the owning structure and can be reloaded.
    Evicted,
}

impl<V> Residency<V> {
    #[inline]
    pub fn resident(self) -> Option<V> {
        match self {
            Self::Resident(v) => Some(v),
            Self::Evicted => None,
        }
    }

    #[inline]
    pub fn is_evicted(&self) -> bool {
        matches!(self, Self::Evicted)
    }
}

/// A least-recently-used cache with an explicit "evicted but still linked" state.
///
/// Texture tiles are the main user: a tile in the quadtree keeps its place even after its image is evicted, so a later lookup
/// can tell "reload this" (`Some(Residency::Evicted)`) apart from "this tile doesn't exist" (`None`).
///
/// LRU order is only updated by `insert` and `touch`. Eviction never happens implicitly; callers decide when to call
/// `evict_lru`, usually while over a memory budget.
#[derive(Clone, Debug)]
pub struct TileCache<K, V> {
    entries: SmallKeyHashMap<K, Entry<V>>,
    order: RecencyList<K>,
    num_evicted: usize,
}

#[derive(Clone, Debug)]
enum Entry<V> {
    Resident { value: V, slot: usize },
    Evicted,
}

impl<K, V> Default for TileCache<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self {
            entries: Default::default(),
            order: RecencyList::default(),
            num_evicted: 0,
        }
    }
}

impl<K, V> TileCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Looks up `key` without changing the LRU order.
    pub fn get(&self, key: &K) -> Option<Residency<&V>> {
        self.entries.get(key).map(|e| match e {
            Entry::Resident { value, .. } => Residency::Resident(value),
            Entry::Evicted => Residency::Evicted,
        })
    }

    pub fn get_mut(&mut self, key: &K) -> Option<Residency<&mut V>> {
        self.entries.get_mut(key).map(|e| match e {
            Entry::Resident { value, .. } => Residency::Resident(value),
            Entry::Evicted => Residency::Evicted,
        })
    }

    /// Makes `value` resident for `key` and marks it most recently used. Returns the previous entry.
    pub fn insert(&mut self, key: K, value: V) -> Option<Residency<V>> {
        match self.entries.entry(key.clone()) {
            hash_map::Entry::Occupied(mut occupied) => {
                let old = match occupied.get_mut() {
                    Entry::Resident { value: old, slot } => {
                        self.order.move_to_front(*slot);
                        return Some(Residency::Resident(std::mem::replace(old, value)));
                    }
                    Entry::Evicted => Residency::Evicted,
                };
                let slot = self.order.push_front(key);
                occupied.insert(Entry::Resident { value, slot });
                self.num_evicted -= 1;

                Some(old)
            }
            hash_map::Entry::Vacant(vacant) => {
                let slot = self.order.push_front(key);
                vacant.insert(Entry::Resident { value, slot });

                None
            }
        }
    }

    /// Marks `key` most recently used. Returns `true` iff the entry is resident.
    pub fn touch(&mut self, key: &K) -> bool {
        match self.entries.get(key) {
            Some(Entry::Resident { slot, .. }) => {
                self.order.move_to_front(*slot);
                true
            }
            _ => false,
        }
    }

    /// Drops the payload for `key` but keeps it linked. Has no effect on an unlinked key.
    pub fn evict(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.get_mut(key)?;
        match std::mem::replace(entry, Entry::Evicted) {
            Entry::Resident { value, slot } => {
                self.order.remove(slot);
                self.num_evicted += 1;

                Some(value)
            }
            Entry::Evicted => None,
        }
    }

    /// Evicts the least recently used resident entry.
    pub fn evict_lru(&mut self) -> Option<(K, V)> {
        let key = self.order.back()?.clone();
        let value = self.evict(&key)?;

        Some((key, value))
    }

    /// Forgets `key` entirely, so later lookups return `None`.
    pub fn remove(&mut self, key: &K) -> Option<Residency<V>> {
        self.entries.remove(key).map(|entry| match entry {
            Entry::Resident { value, slot } => {
                self.order.remove(slot);
                Residency::Resident(value)
            }
            Entry::Evicted => {
                self.num_evicted -= 1;
                Residency::Evicted
            }
        })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order = RecencyList::default();
        self.num_evicted = 0;
    }

    #[inline]
    pub fn len_resident(&self) -> usize {
        self.entries.len() - self.num_evicted
    }

    #[inline]
    pub fn len_evicted(&self) -> usize {
        self.num_evicted
    }

    /// Resident keys from least to most recently used.
    pub fn keys_lru_first(&self) -> impl Iterator<Item = &K> + '_ {
        self.order.iter_from_back()
    }
}

/// A doubly-linked recency list whose nodes live in a `Slab`.
#[derive(Clone, Debug)]
struct RecencyList<K> {
    nodes: Slab<ListNode<K>>,
    head: Option<usize>,
    tail: Option<usize>,
}

#[derive(Clone, Debug)]
struct ListNode<K> {
    key: K,
    prev: Option<usize>,
    next: Option<usize>,
}

impl<K> Default for RecencyList<K> {
    fn default() -> Self {
        Self {
            nodes: Slab::new(),
            head: None,
            tail: None,
        }
    }
}

impl<K> RecencyList<K> {
    fn push_front(&mut self, key: K) -> usize {
        let slot = self.nodes.insert(ListNode {
            key,
            prev: None,
            next: None,
        });
        self.link_front(slot);

        slot
    }

    fn link_front(&mut self, slot: usize) {
        self.nodes[slot].prev = None;
        self.nodes[slot].next = self.head;
        if let Some(h) = self.head {
            self.nodes[h].prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
    }

    fn move_to_front(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.link_front(slot);
    }

    fn remove(&mut self, slot: usize) -> K {
        self.unlink(slot);

        self.nodes.remove(slot).key
    }

    fn back(&self) -> Option<&K> {
        self.tail.map(|t| &self.nodes[t].key)
    }

    fn iter_from_back(&self) -> impl Iterator<Item = &K> + '_ {
        let mut cursor = self.tail;
        std::iter::from_fn(move || {
            let slot = cursor?;
            let node = &self.nodes[slot];
            cursor = node.prev;

            Some(&node.key)
        })
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
