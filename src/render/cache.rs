use std::num::NonZeroUsize;

use lru::LruCache;

use crate::backend::RgbaFrame;

const DEFAULT_MEMORY_BUDGET_BYTES: usize = 512 * 1024 * 1024;
const DEFAULT_MAX_ENTRIES: usize = 128;

/// Cache key for a delivered page bitmap.
///
/// The epoch is part of the key: a rotation or theme change makes every
/// previously rendered bitmap undisplayable, so entries from older epochs
/// can only ever be purged, never served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderedPageKey {
    pub doc_id: u64,
    pub page: usize,
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// LRU cache of delivered frames under entry and memory budgets.
#[derive(Debug)]
pub struct RenderedPageCache {
    max_entries: usize,
    memory_budget_bytes: usize,
    memory_bytes: usize,
    entries: LruCache<RenderedPageKey, RgbaFrame>,
    counters: CacheCounters,
}

impl Default for RenderedPageCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_MEMORY_BUDGET_BYTES)
    }
}

impl RenderedPageCache {
    pub fn new(max_entries: usize, memory_budget_bytes: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            max_entries,
            memory_budget_bytes: memory_budget_bytes.max(1),
            memory_bytes: 0,
            entries: LruCache::new(NonZeroUsize::new(max_entries).expect("max entries is non-zero")),
            counters: CacheCounters::default(),
        }
    }

    pub fn get(&mut self, key: &RenderedPageKey) -> Option<&RgbaFrame> {
        if self.entries.peek(key).is_some() {
            self.counters.hits += 1;
            return self.entries.get(key);
        }

        self.counters.misses += 1;
        None
    }

    pub fn get_cloned(&mut self, key: &RenderedPageKey) -> Option<RgbaFrame> {
        self.get(key).cloned()
    }

    /// Inserts a frame, evicting LRU entries as needed. Frames larger than
    /// the whole budget are rejected rather than cached.
    pub fn insert(&mut self, key: RenderedPageKey, frame: RgbaFrame) -> bool {
        let frame_bytes = frame.byte_len();
        if frame_bytes > self.memory_budget_bytes {
            return false;
        }

        if let Some(prev) = self.entries.pop(&key) {
            self.memory_bytes = self.memory_bytes.saturating_sub(prev.byte_len());
        }

        let implicit_evicted_bytes = if self.entries.len() >= self.max_entries {
            self.entries.peek_lru().map(|(_key, frame)| frame.byte_len())
        } else {
            None
        };

        self.memory_bytes += frame_bytes;
        self.entries.put(key, frame);
        if let Some(evicted_bytes) = implicit_evicted_bytes {
            self.memory_bytes = self.memory_bytes.saturating_sub(evicted_bytes);
            self.counters.evictions += 1;
        }
        self.evict_while_needed();
        true
    }

    /// Drops every entry of `doc_id` whose epoch is not `current_epoch`.
    pub fn purge_stale(&mut self, doc_id: u64, current_epoch: u64) {
        let doomed: Vec<_> = self
            .entries
            .iter()
            .filter_map(|(key, _)| {
                (key.doc_id == doc_id && key.epoch != current_epoch).then_some(*key)
            })
            .collect();

        for key in doomed {
            self.remove(&key);
        }
    }

    pub fn remove_doc(&mut self, doc_id: u64) {
        let doomed: Vec<_> = self
            .entries
            .iter()
            .filter_map(|(key, _)| (key.doc_id == doc_id).then_some(*key))
            .collect();

        for key in doomed {
            self.remove(&key);
        }
    }

    pub fn remove(&mut self, key: &RenderedPageKey) {
        if let Some(frame) = self.entries.pop(key) {
            self.memory_bytes = self.memory_bytes.saturating_sub(frame.byte_len());
            self.counters.evictions += 1;
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.memory_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &RenderedPageKey) -> bool {
        self.entries.peek(key).is_some()
    }

    pub fn memory_bytes(&self) -> usize {
        self.memory_bytes
    }

    pub fn counters(&self) -> CacheCounters {
        self.counters
    }

    pub fn hit_rate(&self) -> f64 {
        let lookups = self.counters.hits + self.counters.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.counters.hits as f64 / lookups as f64
    }

    fn evict_while_needed(&mut self) {
        while self.entries.len() > self.max_entries || self.memory_bytes > self.memory_budget_bytes
        {
            let Some((_key, frame)) = self.entries.pop_lru() else {
                break;
            };
            self.memory_bytes = self.memory_bytes.saturating_sub(frame.byte_len());
            self.counters.evictions += 1;
        }
    }
}
