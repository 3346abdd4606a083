//! Bounded, generation-stamped deduplication cache
//!
//! Turns a raw feed — delivered newest-first, where items may be edited in
//! place (their revision changes, sometimes shifting their position) or
//! deleted — into an exact "what's new since last call" stream using
//! constant memory.
//!
//! Each invocation of [`DedupCache::fresh`] increments a generation
//! counter and scans the feed in order, stopping at the first item that a
//! *previous* invocation already reported. Items are keyed by the
//! composite (stable id, revision) pair, so an item edited in place counts
//! as a different key than its prior version. Pinned items are always
//! re-emitted and never touch the cache. Once more items have been
//! classified new in a single call than the cache can hold, the remainder
//! of that call conservatively assumes everything is new — possible
//! over-reporting, never silent loss.
//!
//! Guarantee: no item that newly appeared since the previous invocation is
//! ever omitted. Under extreme churn (more genuinely-new items per poll
//! than the capacity, repeatedly) an already-seen item may occasionally be
//! re-emitted.

use std::num::NonZeroUsize;

use lru::LruCache;

/// Minimal shape a feed item must expose for deduplication
pub trait FeedEntry {
    /// Stable identity, constant across edits
    fn id(&self) -> &str;

    /// Revision / update timestamp; changes when the item is edited
    fn revision(&self) -> i64;

    /// Pinned items are reported on every poll regardless of position
    fn is_pinned(&self) -> bool;
}

/// Composite cache key: (stable identity, revision)
type ItemKey = (String, i64);

/// Bounded new-item filter over a mutable, reverse-chronological feed
///
/// Not designed for concurrent callers; use one instance per distinct feed
/// being polled.
pub struct DedupCache {
    // key → generation first seen, LRU-evicted at capacity
    entries: LruCache<ItemKey, u64>,
    generation: u64,
}

impl DedupCache {
    /// Create a cache holding at most `capacity` item keys
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            generation: 0,
        }
    }

    /// The generation counter, incremented once per [`fresh`](Self::fresh)
    /// call
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of keys currently cached
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Filter a newest-first feed down to the items not reported by any
    /// previous call, in feed order
    ///
    /// Stops scanning at the first ordinary item a previous call already
    /// reported; feed items past that point are not consumed.
    pub fn fresh<T, I>(&mut self, feed: I) -> Vec<T>
    where
        T: FeedEntry,
        I: IntoIterator<Item = T>,
    {
        self.generation += 1;
        let generation = self.generation;
        let capacity = self.entries.cap().get();
        let mut new_count = 0usize;
        let mut emitted = Vec::new();

        for item in feed {
            if item.is_pinned() {
                // always reported, never cached
                emitted.push(item);
                continue;
            }

            if new_count >= capacity {
                // This call alone may have evicted the entries needed to
                // classify anything further; assume new rather than risk
                // dropping an item.
                new_count += 1;
                emitted.push(item);
                continue;
            }

            let key = (item.id().to_owned(), item.revision());
            match self.entries.get(&key) {
                Some(&seen) if seen < generation => break,
                Some(_) => {
                    // same key earlier in this same invocation
                    new_count += 1;
                    emitted.push(item);
                }
                None => {
                    self.entries.put(key, generation);
                    new_count += 1;
                    emitted.push(item);
                }
            }
        }

        emitted
    }
}
