//! Membership changes tied to a write transaction.
//!
//! Insertions are applied to the cache immediately, so concurrent readers
//! never see "absent" for a key that is about to commit, and retracted on
//! drop unless the transaction committed. Removals and resets are held back
//! and only applied by [`PendingCacheOps::committed`], so the cache never says
//! "absent" for a key the store still holds.

use crate::cache::MembershipCache;
use bloomkv_common::types::KeyDisplay;
use tracing::warn;

pub struct PendingCacheOps<'a> {
    cache: &'a MembershipCache,
    inserted: Vec<Vec<u8>>,
    removed: Vec<Vec<u8>>,
    reset: bool,
    done: bool,
}

impl<'a> PendingCacheOps<'a> {
    pub const fn new(cache: &'a MembershipCache) -> Self {
        Self {
            cache,
            inserted: Vec::new(),
            removed: Vec::new(),
            reset: false,
            done: false,
        }
    }

    /// Key became present in this transaction
    pub fn insert(&mut self, key: &[u8]) {
        self.cache.add(key);
        self.inserted.push(key.to_vec());
    }

    /// Key was removed in this transaction
    pub fn remove(&mut self, key: &[u8]) {
        self.removed.push(key.to_vec());
    }

    /// Whole bucket was dropped in this transaction
    pub fn reset(&mut self) {
        self.reset = true;
    }

    /// Apply the deferred changes; call only after the commit succeeded.
    pub fn committed(mut self) {
        for key in &self.removed {
            self.cache.remove(key);
        }
        if self.reset {
            self.cache.reset();
        }
        self.done = true;
    }
}

impl Drop for PendingCacheOps<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        for key in &self.inserted {
            warn!("Write of key '{}' did not commit, retracting cache entry", KeyDisplay(key));
            self.cache.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloomkv_common::config::FilterConfig;

    fn cache() -> MembershipCache {
        MembershipCache::new(&FilterConfig::new(100, 0.01))
    }

    #[test]
    fn test_insert_visible_before_commit() {
        let cache = cache();
        let mut ops = PendingCacheOps::new(&cache);
        ops.insert(b"k");
        assert!(cache.test(b"k"));
        ops.committed();
        assert!(cache.test(b"k"));
    }

    #[test]
    fn test_insert_retracted_without_commit() {
        let cache = cache();
        {
            let mut ops = PendingCacheOps::new(&cache);
            ops.insert(b"k");
        }
        assert!(!cache.test(b"k"));
    }

    #[test]
    fn test_remove_deferred_until_commit() {
        let cache = cache();
        cache.add(b"k");

        {
            let mut ops = PendingCacheOps::new(&cache);
            ops.remove(b"k");
            assert!(cache.test(b"k"));
        }
        assert!(cache.test(b"k"), "aborted removal must not apply");

        let mut ops = PendingCacheOps::new(&cache);
        ops.remove(b"k");
        ops.committed();
        assert!(!cache.test(b"k"));
    }

    #[test]
    fn test_reset_deferred_until_commit() {
        let cache = cache();
        cache.add(b"a");

        {
            let mut ops = PendingCacheOps::new(&cache);
            ops.reset();
        }
        assert!(cache.test(b"a"));

        let mut ops = PendingCacheOps::new(&cache);
        ops.reset();
        ops.committed();
        assert!(!cache.test(b"a"));
    }
}
