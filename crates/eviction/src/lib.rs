//! Per-shard replacement structures for the page cache.
//!
//! Each shard owns one [`EvictionIndex`]: a map from [`PageId`] to
//! [`CacheEntry`] that also decides which resident page to evict when the
//! shard is full. Three policies are provided:
//!
//! - **LRU**: evicts the least recently used page (the default)
//! - **MRU**: evicts the most recently used page
//! - **LFU**: evicts the least frequently used page, breaking frequency
//!   ties toward the least recently used
//!
//! The index tracks residency, recency, and the dirty flag only; page bytes
//! live in the staging store and writeback is the engine's job.


use common::{PageId, PageIndex, ReplacementPolicy};
use hashbrown::HashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Record held in the eviction index for one resident page.
///
/// Carries everything writeback needs to address the backing file; recency
/// metadata belongs to the replacement structure, not the entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    /// Backing file this page belongs to.
    pub path: PathBuf,
    /// Page index within that file.
    pub page_index: PageIndex,
    /// Clean = populated from backing, dirty = contains unflushed writes.
    pub dirty: bool,
}

impl CacheEntry {
    pub fn new(path: impl Into<PathBuf>, page_index: PageIndex, dirty: bool) -> Self {
        Self {
            path: path.into(),
            page_index,
            dirty,
        }
    }
}

/// Capability set of a shard's replacement structure.
///
/// `insert` requires `!contains(id)` and `len() < capacity()`; the engine
/// evicts before inserting into a full shard. `set_dirty` and `clear_dirty`
/// must not disturb recency. `ids` returns a snapshot of the resident keys
/// for cross-cutting scans (flush, truncate); its order is policy-defined.
pub trait EvictionIndex {
    fn contains(&self, id: &PageId) -> bool;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn capacity(&self) -> usize;
    /// Record an access; on recency-based policies this moves the page to
    /// the most-recently-used position.
    fn touch(&mut self, id: &PageId);
    /// Establish the entry as most recently used.
    fn insert(&mut self, id: PageId, entry: CacheEntry);
    fn set_dirty(&mut self, id: &PageId);
    fn clear_dirty(&mut self, id: &PageId);
    fn entry(&self, id: &PageId) -> Option<&CacheEntry>;
    /// Remove a specific page, returning its entry if it was resident.
    fn remove(&mut self, id: &PageId) -> Option<CacheEntry>;
    /// Remove and return the victim chosen by the policy.
    fn evict(&mut self) -> Option<(PageId, CacheEntry)>;
    fn ids(&self) -> Vec<PageId>;
}

/// Build the index for a configured shard.
///
/// # Panics
///
/// Panics if `capacity` is 0; config validation rejects zero-sized shards
/// before an index is ever built.
pub fn build_index(policy: ReplacementPolicy, capacity: usize) -> Box<dyn EvictionIndex> {
    match policy {
        ReplacementPolicy::Lru => Box::new(LruIndex::new(capacity)),
        ReplacementPolicy::Lfu => Box::new(LfuIndex::new(capacity)),
        ReplacementPolicy::Mru => Box::new(MruIndex::new(capacity)),
    }
}

/// Least-recently-used index backed by `lru::LruCache`.
pub struct LruIndex {
    cache: LruCache<PageId, CacheEntry>,
}

impl LruIndex {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap()),
        }
    }
}

impl EvictionIndex for LruIndex {
    fn contains(&self, id: &PageId) -> bool {
        self.cache.contains(id)
    }

    fn len(&self) -> usize {
        self.cache.len()
    }

    fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    fn touch(&mut self, id: &PageId) {
        self.cache.promote(id);
    }

    fn insert(&mut self, id: PageId, entry: CacheEntry) {
        debug_assert!(self.cache.len() < self.capacity(), "insert into full shard");
        debug_assert!(!self.cache.contains(&id), "insert of resident page");
        self.cache.push(id, entry);
    }

    fn set_dirty(&mut self, id: &PageId) {
        // peek_mut leaves the recency order untouched
        if let Some(entry) = self.cache.peek_mut(id) {
            entry.dirty = true;
        }
    }

    fn clear_dirty(&mut self, id: &PageId) {
        if let Some(entry) = self.cache.peek_mut(id) {
            entry.dirty = false;
        }
    }

    fn entry(&self, id: &PageId) -> Option<&CacheEntry> {
        self.cache.peek(id)
    }

    fn remove(&mut self, id: &PageId) -> Option<CacheEntry> {
        self.cache.pop(id)
    }

    fn evict(&mut self) -> Option<(PageId, CacheEntry)> {
        self.cache.pop_lru()
    }

    fn ids(&self) -> Vec<PageId> {
        // most recently used first
        self.cache.iter().map(|(id, _)| id.clone()).collect()
    }
}

/// Most-recently-used index: identical bookkeeping to [`LruIndex`] but the
/// victim is taken from the most-recently-used end.
pub struct MruIndex {
    inner: LruIndex,
}

impl MruIndex {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: LruIndex::new(capacity),
        }
    }
}

impl EvictionIndex for MruIndex {
    fn contains(&self, id: &PageId) -> bool {
        self.inner.contains(id)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn touch(&mut self, id: &PageId) {
        self.inner.touch(id);
    }

    fn insert(&mut self, id: PageId, entry: CacheEntry) {
        self.inner.insert(id, entry);
    }

    fn set_dirty(&mut self, id: &PageId) {
        self.inner.set_dirty(id);
    }

    fn clear_dirty(&mut self, id: &PageId) {
        self.inner.clear_dirty(id);
    }

    fn entry(&self, id: &PageId) -> Option<&CacheEntry> {
        self.inner.entry(id)
    }

    fn remove(&mut self, id: &PageId) -> Option<CacheEntry> {
        self.inner.remove(id)
    }

    fn evict(&mut self) -> Option<(PageId, CacheEntry)> {
        let id = self.inner.cache.iter().next().map(|(id, _)| id.clone())?;
        let entry = self.inner.cache.pop(&id)?;
        Some((id, entry))
    }

    fn ids(&self) -> Vec<PageId> {
        self.inner.ids()
    }
}

struct LfuSlot {
    entry: CacheEntry,
    hits: u64,
    stamp: u64,
}

/// Least-frequently-used index.
///
/// Hit counts decide the victim; ties break toward the smaller logical
/// timestamp, i.e. the least recently used of the tied pages. Eviction scans
/// the resident set, which is fine at per-shard capacities.
pub struct LfuIndex {
    slots: HashMap<PageId, LfuSlot>,
    capacity: usize,
    clock: u64,
}

impl LfuIndex {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            slots: HashMap::new(),
            capacity,
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

impl EvictionIndex for LfuIndex {
    fn contains(&self, id: &PageId) -> bool {
        self.slots.contains_key(id)
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn touch(&mut self, id: &PageId) {
        let stamp = self.tick();
        if let Some(slot) = self.slots.get_mut(id) {
            slot.hits += 1;
            slot.stamp = stamp;
        }
    }

    fn insert(&mut self, id: PageId, entry: CacheEntry) {
        debug_assert!(self.slots.len() < self.capacity, "insert into full shard");
        debug_assert!(!self.slots.contains_key(&id), "insert of resident page");
        let stamp = self.tick();
        self.slots.insert(
            id,
            LfuSlot {
                entry,
                hits: 1,
                stamp,
            },
        );
    }

    fn set_dirty(&mut self, id: &PageId) {
        if let Some(slot) = self.slots.get_mut(id) {
            slot.entry.dirty = true;
        }
    }

    fn clear_dirty(&mut self, id: &PageId) {
        if let Some(slot) = self.slots.get_mut(id) {
            slot.entry.dirty = false;
        }
    }

    fn entry(&self, id: &PageId) -> Option<&CacheEntry> {
        self.slots.get(id).map(|slot| &slot.entry)
    }

    fn remove(&mut self, id: &PageId) -> Option<CacheEntry> {
        self.slots.remove(id).map(|slot| slot.entry)
    }

    fn evict(&mut self) -> Option<(PageId, CacheEntry)> {
        let id = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| (slot.hits, slot.stamp))
            .map(|(id, _)| id.clone())?;
        let slot = self.slots.remove(&id)?;
        Some((id, slot.entry))
    }

    fn ids(&self) -> Vec<PageId> {
        self.slots.keys().cloned().collect()
    }
}
