//! Read-ahead byte cache contract.
//!
//! The muxer core never reads the source file directly — it asks a cache
//! for bytes at `(pid, offset)` and either gets a contiguous window back or
//! is told to suspend (see [`crate::muxer::ProcessOutcome::NeedMoreData`]).
//! This module defines the contract and an in-memory implementation used
//! by the crate's own tests.

use std::collections::HashMap;

use bytes::Bytes;
use dashmap::DashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// A contiguous window of bytes starting at the requested offset. May
    /// be shorter than what the caller ultimately needs; the muxer core
    /// takes `min(frame_remaining, hit.len())` and asks again later.
    Hit(Bytes),
    /// No bytes are available yet at this offset.
    Miss,
}

/// Byte-range cache contract the muxer core is generic over.
pub trait ReadCache {
    fn get(&mut self, pid: u16, offset: u64) -> CacheLookup;
}

/// An in-memory stand-in for a real prefetching segment-byte cache.
///
/// Each PID's backing bytes are supplied up front (as they would be by an
/// upstream MP4 parse reading from disk or network); `chunk_size` bounds
/// how many bytes a single lookup returns, to exercise the muxer's
/// suspend/resume path the same way a real bounded read-ahead window would.
/// An optional `available_len` per PID caps how many bytes have arrived so
/// far, to simulate a source that is still being read.
pub struct InMemoryReadCache {
    sources: HashMap<u16, Bytes>,
    available_len: HashMap<u16, u64>,
    chunk_size: usize,
    windows: Mutex<LruCache<(u16, u64), Bytes>>,
    stats: DashMap<u16, CacheStats>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl InMemoryReadCache {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            sources: HashMap::new(),
            available_len: HashMap::new(),
            chunk_size,
            windows: Mutex::new(LruCache::new(NonZeroUsize::new(64).unwrap())),
            stats: DashMap::new(),
        }
    }

    /// Register the full backing bytes for a PID, all of it immediately
    /// "available".
    pub fn add_source(&mut self, pid: u16, data: Bytes) {
        let len = data.len() as u64;
        self.sources.insert(pid, data);
        self.available_len.insert(pid, len);
    }

    /// Limit how many bytes of a PID's source are visible to lookups,
    /// simulating a source that has not fully arrived yet.
    pub fn truncate_available(&mut self, pid: u16, available_len: u64) {
        self.available_len.insert(pid, available_len);
    }

    pub fn stats(&self, pid: u16) -> CacheStats {
        self.stats.get(&pid).map(|s| *s).unwrap_or_default()
    }

    fn record(&self, pid: u16, hit: bool) {
        let mut entry = self.stats.entry(pid).or_default();
        if hit {
            entry.hits += 1;
        } else {
            entry.misses += 1;
        }
    }
}

impl ReadCache for InMemoryReadCache {
    fn get(&mut self, pid: u16, offset: u64) -> CacheLookup {
        let Some(source) = self.sources.get(&pid) else {
            self.record(pid, false);
            return CacheLookup::Miss;
        };
        let available = *self.available_len.get(&pid).unwrap_or(&0);
        if offset >= available {
            self.record(pid, false);
            return CacheLookup::Miss;
        }

        if let Some(window) = self.windows.lock().unwrap().get(&(pid, offset)) {
            self.record(pid, true);
            return CacheLookup::Hit(window.clone());
        }

        let start = offset as usize;
        let end = (start + self.chunk_size).min(available as usize).min(source.len());
        if start >= end {
            self.record(pid, false);
            return CacheLookup::Miss;
        }
        let window = source.slice(start..end);
        self.windows
            .lock()
            .unwrap()
            .put((pid, offset), window.clone());
        self.record(pid, true);
        CacheLookup::Hit(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_within_available_range() {
        let mut cache = InMemoryReadCache::new(4);
        cache.add_source(0x100, Bytes::from_static(b"abcdefgh"));

        match cache.get(0x100, 0) {
            CacheLookup::Hit(bytes) => assert_eq!(&bytes[..], b"abcd"),
            CacheLookup::Miss => panic!("expected hit"),
        }
    }

    #[test]
    fn test_miss_beyond_available_range() {
        let mut cache = InMemoryReadCache::new(4);
        cache.add_source(0x100, Bytes::from_static(b"abcdefgh"));
        cache.truncate_available(0x100, 2);

        assert!(matches!(cache.get(0x100, 2), CacheLookup::Miss));
    }

    #[test]
    fn test_miss_for_unknown_pid() {
        let mut cache = InMemoryReadCache::new(4);
        assert!(matches!(cache.get(0x200, 0), CacheLookup::Miss));
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let mut cache = InMemoryReadCache::new(4);
        cache.add_source(0x100, Bytes::from_static(b"abcdefgh"));
        let _ = cache.get(0x100, 0);
        let _ = cache.get(0x100, 100);

        let stats = cache.stats(0x100);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
