//! Three-tier record cache
//!
//! - L1: full records by id
//! - L2: index entries by id
//! - L3: search result lists by normalized query
//!
//! All tiers sit behind one mutex. Callers never hold it across an await;
//! every method locks, does its O(1) work and returns.
//!
//! Values read from the stores enter the cache through a [`Fill`] ticket
//! taken before the read. Every mutation bumps a generation counter, and a
//! fill whose ticket predates a mutation of the same id (or any mutation,
//! for L3) is dropped instead of resurrecting replaced or deleted data.

use crate::cache::{LruCache, TierStats};
use clipnote_common::{CacheConfig, IndexEntry, Record, RecordId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Statistics for all three tiers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub records: TierStats,
    pub entries: TierStats,
    pub searches: TierStats,
}

struct Tiers<R> {
    records: LruCache<RecordId, R>,
    entries: LruCache<RecordId, IndexEntry>,
    searches: LruCache<String, Arc<Vec<IndexEntry>>>,
    /// Bumped by every mutation
    generation: u64,
    /// Generation of the last mutation per id; only kept while fills run
    touched: HashMap<RecordId, u64>,
    /// Generation of the last full clear
    cleared: u64,
    /// Generation of the last search invalidation
    searches_dropped: u64,
    /// Fill tickets outstanding
    fills: usize,
}

impl<R> Tiers<R> {
    fn bump(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn touch(&mut self, id: RecordId) {
        let generation = self.bump();
        if self.fills > 0 {
            self.touched.insert(id, generation);
        }
        self.searches_dropped = generation;
        self.searches.clear();
    }

    fn id_is_current(&self, id: &RecordId, ticket: u64) -> bool {
        self.cleared <= ticket && self.touched.get(id).is_none_or(|g| *g <= ticket)
    }
}

/// Multi-level LRU cache for one record kind
pub struct CacheManager<R> {
    tiers: Mutex<Tiers<R>>,
}

impl<R: Record> CacheManager<R> {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            tiers: Mutex::new(Tiers {
                records: LruCache::new(config.records),
                entries: LruCache::new(config.entries),
                searches: LruCache::new(config.searches),
                generation: 0,
                touched: HashMap::new(),
                cleared: 0,
                searches_dropped: 0,
                fills: 0,
            }),
        }
    }

    /// L1 lookup
    pub fn record(&self, id: &RecordId) -> Option<R> {
        self.tiers.lock().records.get(id).cloned()
    }

    /// L2 lookup
    pub fn entry(&self, id: &RecordId) -> Option<IndexEntry> {
        self.tiers.lock().entries.get(id).cloned()
    }

    /// L3 lookup by normalized query
    pub fn search(&self, key: &str) -> Option<Arc<Vec<IndexEntry>>> {
        self.tiers.lock().searches.get(key).cloned()
    }

    /// Take a ticket for filling the cache with values about to be read
    /// from the stores. Take it before the read starts.
    pub fn begin_fill(&self) -> Fill<'_, R> {
        let mut tiers = self.tiers.lock();
        tiers.fills += 1;
        Fill {
            cache: self,
            ticket: tiers.generation,
        }
    }

    /// Replace a written record: drops every search result, then caches the
    /// record and its index entry.
    pub fn refresh(&self, record: &R) {
        let entry = record.to_index_entry();
        let mut tiers = self.tiers.lock();
        tiers.touch(record.id());
        tiers.records.insert(record.id(), record.clone());
        tiers.entries.insert(entry.id, entry);
        trace!("Cache refreshed for {} {}", R::KIND, record.id());
    }

    /// Drop an id from L1 and L2 and every search result
    pub fn invalidate(&self, id: &RecordId) {
        let mut tiers = self.tiers.lock();
        tiers.touch(*id);
        tiers.records.remove(id);
        tiers.entries.remove(id);
    }

    /// Drop every cached search result
    pub fn invalidate_searches(&self) {
        let mut tiers = self.tiers.lock();
        tiers.searches_dropped = tiers.bump();
        tiers.searches.clear();
    }

    /// Empty every tier
    pub fn clear(&self) {
        let mut tiers = self.tiers.lock();
        let generation = tiers.bump();
        tiers.cleared = generation;
        tiers.searches_dropped = generation;
        tiers.records.clear();
        tiers.entries.clear();
        tiers.searches.clear();
    }

    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        let tiers = self.tiers.lock();
        CacheStatsSnapshot {
            records: tiers.records.stats(),
            entries: tiers.entries.stats(),
            searches: tiers.searches.stats(),
        }
    }

    /// L2 capacity
    #[must_use]
    pub fn entries_capacity(&self) -> usize {
        self.tiers.lock().entries.capacity()
    }
}

/// Ticket for caching store reads; see [`CacheManager::begin_fill`].
///
/// Inserts made through a ticket are skipped when a mutation that could make
/// them stale happened after the ticket was taken.
pub struct Fill<'a, R> {
    cache: &'a CacheManager<R>,
    ticket: u64,
}

impl<R: Record> Fill<'_, R> {
    /// Fill L1; returns false when the record was skipped as stale
    pub fn put_record(&self, record: R) -> bool {
        let mut tiers = self.cache.tiers.lock();
        let id = record.id();
        if !tiers.id_is_current(&id, self.ticket) {
            trace!("Skipping stale cache fill for {} {}", R::KIND, id);
            return false;
        }
        tiers.records.insert(id, record);
        true
    }

    /// Fill L2; returns false when the entry was skipped as stale
    pub fn put_entry(&self, entry: IndexEntry) -> bool {
        self.put_entries([&entry]) == 1
    }

    /// Fill L2 under one lock; returns how many entries were cached
    pub fn put_entries<'e>(&self, entries: impl IntoIterator<Item = &'e IndexEntry>) -> usize {
        let mut tiers = self.cache.tiers.lock();
        let mut cached = 0;
        for entry in entries {
            if tiers.id_is_current(&entry.id, self.ticket) {
                tiers.entries.insert(entry.id, entry.clone());
                cached += 1;
            }
        }
        cached
    }

    /// Fill L3; returns false when any mutation happened since the ticket
    pub fn put_search(&self, key: String, results: Arc<Vec<IndexEntry>>) -> bool {
        let mut tiers = self.cache.tiers.lock();
        if tiers.searches_dropped > self.ticket {
            trace!("Skipping stale search fill for {:?}", key);
            return false;
        }
        tiers.searches.insert(key, results);
        true
    }
}

impl<R> Drop for Fill<'_, R> {
    fn drop(&mut self) {
        let mut tiers = self.cache.tiers.lock();
        tiers.fills -= 1;
        if tiers.fills == 0 {
            tiers.touched.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipnote_common::Note;

    fn note(title: &str) -> Note {
        Note::new(RecordId::new(), title, "body")
    }

    #[test]
    fn test_default_capacities() {
        let cache: CacheManager<Note> = CacheManager::new(CacheConfig::default());
        let stats = cache.stats();
        assert_eq!(stats.records.capacity, 10);
        assert_eq!(stats.entries.capacity, 100);
        assert_eq!(stats.searches.capacity, 50);
        assert_eq!(cache.entries_capacity(), 100);
    }

    #[test]
    fn test_refresh_populates_l1_l2_and_drops_searches() {
        let cache: CacheManager<Note> = CacheManager::new(CacheConfig::default());
        let n = note("cached");
        cache
            .begin_fill()
            .put_search("cached".into(), Arc::new(vec![n.to_index_entry()]));

        cache.refresh(&n);
        assert_eq!(cache.record(&n.id), Some(n.clone()));
        assert_eq!(cache.entry(&n.id), Some(n.to_index_entry()));
        assert!(cache.search("cached").is_none());
    }

    #[test]
    fn test_invalidate() {
        let cache: CacheManager<Note> = CacheManager::new(CacheConfig::default());
        let keep = note("keep");
        let drop = note("drop");
        cache.refresh(&keep);
        cache.refresh(&drop);
        cache
            .begin_fill()
            .put_search("drop".into(), Arc::new(vec![drop.to_index_entry()]));

        cache.invalidate(&drop.id);
        assert!(cache.record(&drop.id).is_none());
        assert!(cache.entry(&drop.id).is_none());
        assert!(cache.search("drop").is_none());
        assert!(cache.record(&keep.id).is_some());
    }

    #[test]
    fn test_l1_eviction() {
        let cache: CacheManager<Note> = CacheManager::new(CacheConfig::default());
        let notes: Vec<Note> = (0..11).map(|i| note(&format!("n{i}"))).collect();
        let fill = cache.begin_fill();
        for n in &notes {
            assert!(fill.put_record(n.clone()));
        }

        assert!(cache.record(&notes[0].id).is_none());
        assert!(cache.record(&notes[10].id).is_some());
        let stats = cache.stats();
        assert_eq!(stats.records.evictions, 1);
        assert_eq!(stats.records.len, 10);
        assert_eq!(stats.records.misses, 1);
        assert_eq!(stats.records.hits, 1);
    }

    #[test]
    fn test_put_entries_and_clear() {
        let cache: CacheManager<Note> = CacheManager::new(CacheConfig {
            records: 2,
            entries: 3,
            searches: 1,
        });
        let entries: Vec<IndexEntry> = (0..5).map(|i| note(&format!("n{i}")).to_index_entry()).collect();
        assert_eq!(cache.begin_fill().put_entries(&entries), 5);
        assert_eq!(cache.stats().entries.len, 3);
        assert!(cache.entry(&entries[4].id).is_some());
        assert!(cache.entry(&entries[0].id).is_none());

        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.records.len + stats.entries.len + stats.searches.len, 0);
    }

    #[test]
    fn test_fill_after_delete_is_dropped() {
        let cache: CacheManager<Note> = CacheManager::new(CacheConfig::default());
        let n = note("old");
        let fill = cache.begin_fill();

        // Deleted while the read was in flight
        cache.invalidate(&n.id);
        assert!(!fill.put_record(n.clone()));
        assert!(!fill.put_entry(n.to_index_entry()));
        assert!(cache.record(&n.id).is_none());
        assert!(cache.entry(&n.id).is_none());
    }

    #[test]
    fn test_fill_after_update_keeps_new_value() {
        let cache: CacheManager<Note> = CacheManager::new(CacheConfig::default());
        let old = note("v1");
        let mut new = old.clone();
        new.title = "v2".into();
        let fill = cache.begin_fill();

        cache.refresh(&new);
        assert!(!fill.put_record(old.clone()));
        assert_eq!(cache.record(&old.id), Some(new));
    }

    #[test]
    fn test_fill_of_other_ids_still_cached() {
        let cache: CacheManager<Note> = CacheManager::new(CacheConfig::default());
        let touched = note("touched");
        let other = note("other");
        let fill = cache.begin_fill();

        cache.invalidate(&touched.id);
        assert!(fill.put_record(other.clone()));
        assert_eq!(cache.record(&other.id), Some(other));
    }

    #[test]
    fn test_search_fill_after_mutation_is_dropped() {
        let cache: CacheManager<Note> = CacheManager::new(CacheConfig::default());
        let n = note("query");
        let fill = cache.begin_fill();

        cache.refresh(&note("unrelated"));
        assert!(!fill.put_search("query".into(), Arc::new(vec![n.to_index_entry()])));
        assert!(cache.search("query").is_none());

        let fill = cache.begin_fill();
        cache.invalidate_searches();
        assert!(!fill.put_search("query".into(), Arc::new(Vec::new())));

        assert!(cache.begin_fill().put_search("query".into(), Arc::new(Vec::new())));
        assert!(cache.search("query").is_some());
    }

    #[test]
    fn test_fill_after_clear_is_dropped() {
        let cache: CacheManager<Note> = CacheManager::new(CacheConfig::default());
        let n = note("cleared");
        let fill = cache.begin_fill();

        cache.clear();
        assert!(!fill.put_record(n.clone()));
        assert_eq!(fill.put_entries([&n.to_index_entry()]), 0);
        drop(fill);

        assert!(cache.begin_fill().put_record(n));
    }

    #[test]
    fn test_touched_ids_released_with_last_fill() {
        let cache: CacheManager<Note> = CacheManager::new(CacheConfig::default());
        let n = note("tracked");
        let first = cache.begin_fill();
        let second = cache.begin_fill();
        cache.invalidate(&n.id);
        assert_eq!(cache.tiers.lock().touched.len(), 1);

        drop(first);
        assert_eq!(cache.tiers.lock().touched.len(), 1);
        drop(second);
        assert!(cache.tiers.lock().touched.is_empty());

        // Mutations with no fill in flight are not tracked
        cache.invalidate(&n.id);
        assert!(cache.tiers.lock().touched.is_empty());
    }
}
