//! # In-Memory Cache Store
//!
//! The local tier: a bounded, order-tracked cache with per-entry TTL and
//! least-recently-used eviction. Every read or write moves the key to the
//! most-recently-used end; eviction removes from the other end.
//!
//! All state lives behind one mutex so the entry map, the recency order and
//! the byte count always change together.

use super::CacheEntry;
use crate::core::clock::Clock;
use crate::core::error::{CacheError, CacheResult};
use crate::core::types::{CacheKey, Record};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Local tier statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalCacheStats {
    pub entries: usize,
    pub size_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired: u64,
}

#[derive(Debug, Default)]
struct LocalState {
    /// key -> (entry, recency tick)
    entries: HashMap<CacheKey, (CacheEntry, u64)>,
    /// recency tick -> key, oldest first
    order: BTreeMap<u64, CacheKey>,
    next_tick: u64,
    size_bytes: usize,
}

impl LocalState {
    fn touch(&mut self, key: &CacheKey) {
        let tick = self.next_tick;
        if let Some((_, current)) = self.entries.get_mut(key) {
            self.order.remove(current);
            *current = tick;
            self.order.insert(tick, key.clone());
            self.next_tick += 1;
        }
    }

    fn insert(&mut self, entry: CacheEntry) {
        let tick = self.next_tick;
        self.next_tick += 1;
        self.size_bytes += entry.size_bytes;
        self.order.insert(tick, entry.key.clone());
        self.entries.insert(entry.key.clone(), (entry, tick));
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let (entry, tick) = self.entries.remove(key)?;
        self.order.remove(&tick);
        self.size_bytes = self.size_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn pop_oldest(&mut self) -> Option<CacheEntry> {
        let (_, key) = self.order.pop_first()?;
        let (entry, _) = self.entries.remove(&key)?;
        self.size_bytes = self.size_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }
}

/// Bounded local cache
pub struct LocalCache {
    capacity: usize,
    max_bytes: usize,
    clock: Arc<dyn Clock>,
    state: Mutex<LocalState>,

    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired: AtomicU64,
}

impl LocalCache {
    /// Create a local cache holding at most `capacity` entries and `max_bytes` of payload
    pub fn new(capacity: usize, max_bytes: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity: capacity.max(1),
            max_bytes,
            clock,
            state: Mutex::new(LocalState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Look up a key, dropping it if its TTL has elapsed
    pub fn get(&self, key: &CacheKey) -> Option<Vec<Record>> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let Some(expired) = state.entries.get(key).map(|(entry, _)| entry.is_expired(now)) else {
            drop(state);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if expired {
            state.remove(key);
            drop(state);
            self.expired.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Local entry expired on read");
            return None;
        }

        state.touch(key);
        let value = state.entries.get_mut(key).map(|(entry, _)| {
            entry.mark_accessed(now);
            entry.value.clone()
        });
        drop(state);

        self.hits.fetch_add(1, Ordering::Relaxed);
        value
    }

    /// Full entry metadata without touching recency or counters
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.state.lock().entries.get(key).map(|(entry, _)| entry.clone())
    }

    /// Insert or overwrite an entry, evicting least-recently-used entries first.
    ///
    /// Returns the number of entries evicted to make room. An entry larger
    /// than the byte budget is rejected and any previous value for its key
    /// is dropped.
    pub fn set(&self, key: CacheKey, value: Vec<Record>, ttl_seconds: u64) -> CacheResult<usize> {
        let entry = CacheEntry::new(key, value, ttl_seconds, self.clock.now());

        if entry.size_bytes > self.max_bytes {
            if self.state.lock().remove(&entry.key).is_some() {
                debug!(key = %entry.key, "Dropped stale local entry replaced by an oversized write");
            }
            return Err(CacheError::store(format!(
                "Entry of {} bytes exceeds local budget of {} bytes",
                entry.size_bytes, self.max_bytes
            )));
        }

        let mut state = self.state.lock();
        state.remove(&entry.key);

        let mut evicted = 0;
        while !state.entries.is_empty()
            && (state.entries.len() >= self.capacity || state.size_bytes + entry.size_bytes > self.max_bytes)
        {
            match state.pop_oldest() {
                Some(old) => {
                    debug!(key = %old.key, "Evicted least recently used local entry");
                    evicted += 1;
                }
                None => break,
            }
        }

        state.insert(entry);
        drop(state);

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        }
        Ok(evicted)
    }

    /// Remove a single key
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// Remove every key matching `predicate`, returning the removed keys
    pub fn remove_matching<F>(&self, predicate: F) -> Vec<CacheKey>
    where
        F: Fn(&CacheKey) -> bool,
    {
        let mut state = self.state.lock();
        let doomed: Vec<CacheKey> = state.entries.keys().filter(|key| predicate(key)).cloned().collect();
        for key in &doomed {
            state.remove(key);
        }
        doomed
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let doomed: Vec<CacheKey> = state
            .entries
            .values()
            .filter(|(entry, _)| entry.is_expired(now))
            .map(|(entry, _)| entry.key.clone())
            .collect();
        for key in &doomed {
            state.remove(key);
        }
        drop(state);

        if !doomed.is_empty() {
            self.expired.fetch_add(doomed.len() as u64, Ordering::Relaxed);
            debug!(count = doomed.len(), "Purged expired local entries");
        }
        doomed.len()
    }

    /// Keys from least to most recently used
    pub fn keys(&self) -> Vec<CacheKey> {
        self.state.lock().order.values().cloned().collect()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_bytes(&self) -> usize {
        self.state.lock().size_bytes
    }

    /// Remove all entries; counters are kept
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.entries.len();
        *state = LocalState::default();
        count
    }

    pub fn stats(&self) -> LocalCacheStats {
        let (entries, size_bytes) = {
            let state = self.state.lock();
            (state.entries.len(), state.size_bytes)
        };
        LocalCacheStats {
            entries,
            size_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("capacity", &self.capacity)
            .field("max_bytes", &self.max_bytes)
            .field("entries", &self.len())
            .finish()
    }
}
