//! Per-bucket membership cache
//!
//! A [`CountingBloomFilter`] behind a reader/writer lock. `test` calls share
//! the read lock; `add`, `remove` and `reset` take the write lock.
//!
//! Only negative answers are authoritative: `test` returning `false` means
//! the key is not stored in the bucket, `true` means it may be.

use crate::filter::CountingBloomFilter;
use bloomkv_common::config::FilterConfig;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Approximate set of the keys present in one bucket
#[derive(Debug)]
pub struct MembershipCache {
    filter: RwLock<CountingBloomFilter>,
    counters: CacheCounters,
}

#[derive(Debug, Default)]
struct CacheCounters {
    tests: AtomicU64,
    negatives: AtomicU64,
    adds: AtomicU64,
    removes: AtomicU64,
    resets: AtomicU64,
}

/// Point-in-time counters of a [`MembershipCache`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Total `test` calls
    pub tests: u64,
    /// `test` calls answered "definitely absent"
    pub negatives: u64,
    pub adds: u64,
    pub removes: u64,
    pub resets: u64,
    /// Filter counters currently non-zero
    pub occupied_slots: usize,
    /// Filter size in counters
    pub slots: usize,
}

impl MembershipCache {
    /// Create an empty cache sized by `config`
    #[must_use]
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            filter: RwLock::new(CountingBloomFilter::with_rate(
                config.max_keys_per_bucket,
                config.false_positive_rate,
            )),
            counters: CacheCounters::default(),
        }
    }

    pub fn add(&self, key: &[u8]) {
        self.filter.write().add(key);
        self.counters.adds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn remove(&self, key: &[u8]) {
        self.filter.write().remove(key);
        self.counters.removes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.filter.write().clear();
        self.counters.resets.fetch_add(1, Ordering::Relaxed);
    }

    /// `false` only if `key` is certainly absent
    #[must_use]
    pub fn test(&self, key: &[u8]) -> bool {
        let present = self.filter.read().contains(key);
        self.counters.tests.fetch_add(1, Ordering::Relaxed);
        if !present {
            self.counters.negatives.fetch_add(1, Ordering::Relaxed);
        }
        present
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let filter = self.filter.read();
        CacheStats {
            tests: self.counters.tests.load(Ordering::Relaxed),
            negatives: self.counters.negatives.load(Ordering::Relaxed),
            adds: self.counters.adds.load(Ordering::Relaxed),
            removes: self.counters.removes.load(Ordering::Relaxed),
            resets: self.counters.resets.load(Ordering::Relaxed),
            occupied_slots: filter.occupied(),
            slots: filter.slots(),
        }
    }
}
