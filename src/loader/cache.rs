use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::geo::TileCoord;

/// Decompressed, cache-resident form of a tile. Owned exclusively by the
/// memory cache; eviction destroys it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorTile {
    pub data: Vec<u8>,
    pub extent: u32,
}

impl VectorTile {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, extent: 4096 }
    }
}

#[derive(Debug)]
struct CacheEntry {
    tile: VectorTile,
    inserted_at: Instant,
    last_used_tick: u64,
}

/// Bounded, time-expiring tile cache. Accesses refresh recency; when full,
/// the least recently used entry is evicted (ties broken by key order so
/// eviction is deterministic).
#[derive(Debug)]
pub struct TileMemoryCache {
    entries: HashMap<TileCoord, CacheEntry>,
    capacity: usize,
    ttl: Duration,
    tick: u64,
}

impl TileMemoryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            ttl,
            tick: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size_bytes(&self) -> u64 {
        self.entries
            .values()
            .map(|e| e.tile.data.len() as u64)
            .sum()
    }

    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.entries
            .get(coord)
            .is_some_and(|e| e.inserted_at.elapsed() <= self.ttl)
    }

    /// Fetch a tile, refreshing its recency. Expired entries are pruned and
    /// report as misses.
    pub fn get(&mut self, coord: &TileCoord) -> Option<VectorTile> {
        let expired = self
            .entries
            .get(coord)
            .is_some_and(|e| e.inserted_at.elapsed() > self.ttl);
        if expired {
            self.entries.remove(coord);
            return None;
        }
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(coord).map(|entry| {
            entry.last_used_tick = tick;
            entry.tile.clone()
        })
    }

    pub fn insert(&mut self, coord: TileCoord, tile: VectorTile) {
        self.tick += 1;
        if !self.entries.contains_key(&coord) && self.entries.len() >= self.capacity {
            self.evict_one();
        }
        self.entries.insert(
            coord,
            CacheEntry {
                tile,
                inserted_at: Instant::now(),
                last_used_tick: self.tick,
            },
        );
    }

    fn evict_one(&mut self) {
        // Expired entries go first; otherwise LRU with key-order tie-break.
        if let Some(expired) = self
            .entries
            .iter()
            .filter(|(_, e)| e.inserted_at.elapsed() > self.ttl)
            .map(|(k, _)| *k)
            .min()
        {
            self.entries.remove(&expired);
            return;
        }
        if let Some(oldest) = self
            .entries
            .iter()
            .min_by(|(ka, ea), (kb, eb)| {
                ea.last_used_tick
                    .cmp(&eb.last_used_tick)
                    .then_with(|| ka.cmp(kb))
            })
            .map(|(k, _)| *k)
        {
            self.entries.remove(&oldest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(x: u32) -> TileCoord {
        TileCoord::new(10, x, 0)
    }

    fn payload(len: usize) -> VectorTile {
        VectorTile::new(vec![0u8; len])
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut cache = TileMemoryCache::new(3, Duration::from_secs(300));
        for x in 0..10 {
            cache.insert(tile(x), payload(8));
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn access_refreshes_recency() {
        let mut cache = TileMemoryCache::new(2, Duration::from_secs(300));
        cache.insert(tile(1), payload(8));
        cache.insert(tile(2), payload(8));
        // Touch tile 1 so tile 2 becomes the LRU victim.
        cache.get(&tile(1)).expect("hit");
        cache.insert(tile(3), payload(8));
        assert!(cache.contains(&tile(1)));
        assert!(!cache.contains(&tile(2)));
        assert!(cache.contains(&tile(3)));
    }

    #[test]
    fn expired_entries_read_as_misses() {
        let mut cache = TileMemoryCache::new(4, Duration::ZERO);
        cache.insert(tile(1), payload(8));
        std::thread::sleep(Duration::from_millis(2));
        assert!(!cache.contains(&tile(1)));
        assert!(cache.get(&tile(1)).is_none());
        // The miss pruned the stale entry.
        assert!(cache.is_empty());
    }

    #[test]
    fn size_bytes_tracks_payloads() {
        let mut cache = TileMemoryCache::new(4, Duration::from_secs(300));
        cache.insert(tile(1), payload(100));
        cache.insert(tile(2), payload(50));
        assert_eq!(cache.size_bytes(), 150);
    }
}
