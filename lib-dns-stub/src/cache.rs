use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::answer::{Answer, CacheKey};

const MUTEX_POISON_MESSAGE: &str =
    "[INTERNAL ERROR] cache mutex poisoned, cannot recover from this - aborting";

/// How often, at most, the unbounded cache walks its entries to discard
/// expired ones.
pub const DEFAULT_CLEANING_INTERVAL: Duration = Duration::from_secs(300);

/// The cache operations the resolution driver needs.  Implementations are
/// shared between callers, so everything takes `&self` and locks
/// internally; nothing may block on I/O under the lock.
pub trait AnswerCache: Send + Sync {
    /// Get an unexpired answer, or nothing.
    fn get(&self, key: &CacheKey) -> Option<Answer>;

    /// Store an answer, replacing any prior value for the key.
    fn put(&self, key: CacheKey, answer: Answer);

    /// Remove a single key, or everything.
    fn flush(&self, key: Option<&CacheKey>);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    answer: Answer,
    hits: u64,
    inserted_at: Instant,
}

/// An unbounded answer cache.
///
/// Expired entries are removed lazily when read, and a sweep over the whole
/// table runs at most once per cleaning interval, piggybacking on whatever
/// `get` or `put` happens to trigger it.
///
/// You probably want to use `SharedCache` instead.
#[derive(Debug, Clone)]
pub struct Cache {
    entries: HashMap<CacheKey, CacheEntry>,
    cleaning_interval: Duration,
    next_cleaning: Instant,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    pub fn new() -> Self {
        Self::with_cleaning_interval(DEFAULT_CLEANING_INTERVAL)
    }

    pub fn with_cleaning_interval(cleaning_interval: Duration) -> Self {
        Cache {
            entries: HashMap::new(),
            cleaning_interval,
            next_cleaning: Instant::now() + cleaning_interval,
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<Answer> {
        let now = Instant::now();
        self.maybe_sweep(now);

        match self.entries.get_mut(key) {
            None => return None,
            Some(entry) => {
                if !entry.answer.is_expired(now) {
                    entry.hits += 1;
                    return Some(entry.answer.clone());
                }
            }
        }

        self.entries.remove(key);
        None
    }

    pub fn put(&mut self, key: CacheKey, answer: Answer) {
        let now = Instant::now();
        self.maybe_sweep(now);

        self.entries.insert(
            key,
            CacheEntry {
                answer,
                hits: 0,
                inserted_at: now,
            },
        );
    }

    pub fn flush(&mut self, key: Option<&CacheKey>) {
        match key {
            Some(key) => {
                self.entries.remove(key);
            }
            None => self.entries.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How often the entry at `key` has been read since insertion.
    pub fn hits(&self, key: &CacheKey) -> Option<u64> {
        self.entries.get(key).map(|entry| entry.hits)
    }

    /// When the entry at `key` was stored.
    pub fn inserted_at(&self, key: &CacheKey) -> Option<Instant> {
        self.entries.get(key).map(|entry| entry.inserted_at)
    }

    fn maybe_sweep(&mut self, now: Instant) {
        if now < self.next_cleaning {
            return;
        }

        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.answer.is_expired(now));
        tracing::debug!(
            swept = before - self.entries.len(),
            remaining = self.entries.len(),
            "cache sweep"
        );
        self.next_cleaning = now + self.cleaning_interval;
    }
}

/// A convenience wrapper around a `Cache` which lets it be shared between
/// threads.
///
/// Invoking `clone` on a `SharedCache` gives a new instance which refers to
/// the same underlying `Cache` object.
#[derive(Debug, Clone, Default)]
pub struct SharedCache {
    cache: Arc<Mutex<Cache>>,
}

impl SharedCache {
    pub fn new() -> Self {
        SharedCache {
            cache: Arc::new(Mutex::new(Cache::new())),
        }
    }

    pub fn with_cleaning_interval(cleaning_interval: Duration) -> Self {
        SharedCache {
            cache: Arc::new(Mutex::new(Cache::with_cleaning_interval(cleaning_interval))),
        }
    }
}

impl AnswerCache for SharedCache {
    fn get(&self, key: &CacheKey) -> Option<Answer> {
        self.cache.lock().expect(MUTEX_POISON_MESSAGE).get(key)
    }

    fn put(&self, key: CacheKey, answer: Answer) {
        self.cache.lock().expect(MUTEX_POISON_MESSAGE).put(key, answer);
    }

    fn flush(&self, key: Option<&CacheKey>) {
        self.cache.lock().expect(MUTEX_POISON_MESSAGE).flush(key);
    }
}

const NIL: usize = usize::MAX;

#[derive(Debug, Clone)]
struct Slot {
    key: CacheKey,
    entry: CacheEntry,
    prev: usize,
    next: usize,
}

/// A bounded answer cache with least-recently-used eviction.
///
/// Recency is a doubly-linked list threaded through a slab of slots by
/// index, so `get` and `put` stay O(1) without any unsafe pointer juggling.
/// Freed slots go on a free list and are reused by later insertions.
///
/// You probably want to use `SharedLruCache` instead.
#[derive(Debug, Clone)]
pub struct LruCache {
    max_size: usize,
    map: HashMap<CacheKey, usize>,
    slots: Vec<Slot>,
    free: Vec<usize>,
    /// Most recently used.
    head: usize,
    /// Least recently used.
    tail: usize,
}

impl LruCache {
    /// Create a cache holding at most `max_size` answers.
    ///
    /// # Panics
    ///
    /// If called with a `max_size` of 0.
    pub fn new(max_size: usize) -> Self {
        assert!(max_size >= 1, "cannot create a zero-size cache");

        LruCache {
            max_size,
            map: HashMap::with_capacity(max_size),
            slots: Vec::with_capacity(max_size),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<Answer> {
        let now = Instant::now();
        let index = *self.map.get(key)?;

        if self.slots[index].entry.answer.is_expired(now) {
            self.remove_index(index);
            return None;
        }

        self.unlink(index);
        self.push_front(index);
        self.slots[index].entry.hits += 1;
        Some(self.slots[index].entry.answer.clone())
    }

    pub fn put(&mut self, key: CacheKey, answer: Answer) {
        let now = Instant::now();
        let entry = CacheEntry {
            answer,
            hits: 0,
            inserted_at: now,
        };

        if let Some(&index) = self.map.get(&key) {
            self.slots[index].entry = entry;
            self.unlink(index);
            self.push_front(index);
            return;
        }

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Slot {
                    key: key.clone(),
                    entry,
                    prev: NIL,
                    next: NIL,
                };
                index
            }
            None => {
                self.slots.push(Slot {
                    key: key.clone(),
                    entry,
                    prev: NIL,
                    next: NIL,
                });
                self.slots.len() - 1
            }
        };

        self.map.insert(key, index);
        self.push_front(index);

        if self.map.len() > self.max_size {
            let tail = self.tail;
            if tail != NIL {
                self.remove_index(tail);
            }
        }
    }

    pub fn flush(&mut self, key: Option<&CacheKey>) {
        match key {
            Some(key) => {
                if let Some(&index) = self.map.get(key) {
                    self.remove_index(index);
                }
            }
            None => {
                self.map.clear();
                self.slots.clear();
                self.free.clear();
                self.head = NIL;
                self.tail = NIL;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// How often the entry at `key` has been read since insertion.
    pub fn hits(&self, key: &CacheKey) -> Option<u64> {
        self.map.get(key).map(|&index| self.slots[index].entry.hits)
    }

    fn remove_index(&mut self, index: usize) {
        self.unlink(index);
        let key = self.slots[index].key.clone();
        self.map.remove(&key);
        self.free.push(index);
    }

    fn unlink(&mut self, index: usize) {
        let prev = self.slots[index].prev;
        let next = self.slots[index].next;

        if prev == NIL {
            self.head = next;
        } else {
            self.slots[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slots[next].prev = prev;
        }

        self.slots[index].prev = NIL;
        self.slots[index].next = NIL;
    }

    fn push_front(&mut self, index: usize) {
        self.slots[index].prev = NIL;
        self.slots[index].next = self.head;
        if self.head != NIL {
            self.slots[self.head].prev = index;
        }
        self.head = index;
        if self.tail == NIL {
            self.tail = index;
        }
    }
}

/// A convenience wrapper around an `LruCache` which lets it be shared
/// between threads, like `SharedCache`.
#[derive(Debug, Clone)]
pub struct SharedLruCache {
    cache: Arc<Mutex<LruCache>>,
}

impl SharedLruCache {
    /// # Panics
    ///
    /// If called with a `max_size` of 0.
    pub fn new(max_size: usize) -> Self {
        SharedLruCache {
            cache: Arc::new(Mutex::new(LruCache::new(max_size))),
        }
    }
}

impl AnswerCache for SharedLruCache {
    fn get(&self, key: &CacheKey) -> Option<Answer> {
        self.cache.lock().expect(MUTEX_POISON_MESSAGE).get(key)
    }

    fn put(&self, key: CacheKey, answer: Answer) {
        self.cache.lock().expect(MUTEX_POISON_MESSAGE).put(key, answer);
    }

    fn flush(&self, key: Option<&CacheKey>) {
        self.cache.lock().expect(MUTEX_POISON_MESSAGE).flush(key);
    }
}
