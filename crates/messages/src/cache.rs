//! Bounded LRU cache of decrypted message bodies.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
};

#[cfg(feature = "metrics")]
use murmur_metrics::{cache as cache_metrics, counter, gauge};

/// Default number of plaintexts kept in memory.
pub const DEFAULT_CAPACITY: usize = 500;

/// Maps record id to its last decrypted plaintext.
///
/// Holds plaintext only, never ciphertext, and only for the life of the
/// process. `get` hits and every `put` refresh recency; overflow evicts the
/// least recently used entry. One mutex guards the map and the recency order
/// together.
///
/// [`evict_all`](Self::evict_all) starts a new generation. A reader takes
/// [`generation`](Self::generation) before fetching rows and passes it to
/// [`put`](Self::put); plaintext decrypted from rows fetched before an
/// eviction is dropped instead of cached.
pub struct DecryptCache {
    capacity: usize,
    inner: Mutex<Lru>,
}

#[derive(Default)]
struct Lru {
    entries: HashMap<i64, Entry>,
    /// Recency tick -> id. The first key is the least recently used.
    order: BTreeMap<u64, i64>,
    tick: u64,
    generation: u64,
}

struct Entry {
    plaintext: String,
    tick: u64,
}

impl Lru {
    fn touch(&mut self, id: i64) -> u64 {
        self.tick += 1;
        self.order.insert(self.tick, id);
        self.tick
    }
}

impl DecryptCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Lru::default()),
        }
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).generation
    }

    pub fn get(&self, id: i64) -> Option<String> {
        let mut lru = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let Some(old_tick) = lru.entries.get(&id).map(|e| e.tick) else {
            #[cfg(feature = "metrics")]
            counter!(cache_metrics::MISSES_TOTAL).increment(1);
            return None;
        };

        lru.order.remove(&old_tick);
        let tick = lru.touch(id);
        let entry = lru.entries.get_mut(&id)?;
        entry.tick = tick;

        #[cfg(feature = "metrics")]
        counter!(cache_metrics::HITS_TOTAL).increment(1);

        Some(entry.plaintext.clone())
    }

    /// Cache `plaintext` for `id` unless the cache was evicted since
    /// `generation` was taken. Returns whether the entry was stored.
    pub fn put(&self, generation: u64, id: i64, plaintext: String) -> bool {
        let mut lru = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if lru.generation != generation {
            return false;
        }

        if let Some(old_tick) = lru.entries.get(&id).map(|e| e.tick) {
            lru.order.remove(&old_tick);
        }
        let tick = lru.touch(id);
        lru.entries.insert(id, Entry { plaintext, tick });

        while lru.entries.len() > self.capacity {
            let Some((_, evicted)) = lru.order.pop_first() else {
                break;
            };
            lru.entries.remove(&evicted);

            #[cfg(feature = "metrics")]
            counter!(cache_metrics::EVICTIONS_TOTAL).increment(1);
        }

        #[cfg(feature = "metrics")]
        gauge!(cache_metrics::ENTRIES).set(lru.entries.len() as f64);

        true
    }

    /// Whether `id` is resident, without refreshing its recency.
    pub fn contains(&self, id: i64) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .contains_key(&id)
    }

    pub fn evict_all(&self) {
        let mut lru = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        lru.entries.clear();
        lru.order.clear();
        lru.generation = lru.generation.wrapping_add(1);

        #[cfg(feature = "metrics")]
        gauge!(cache_metrics::ENTRIES).set(0.0);
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DecryptCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
