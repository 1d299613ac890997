//! Bucket name to membership cache mapping
//!
//! Caches are created on first reference and live as long as the registry.

use crate::cache::MembershipCache;
use crate::error::StoreResult;
use bloomkv_common::config::FilterConfig;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Owned registry of the caches of every bucket touched by a backend
#[derive(Debug)]
pub struct BucketRegistry {
    caches: DashMap<String, Arc<MembershipCache>>,
    filter: FilterConfig,
}

impl BucketRegistry {
    #[must_use]
    pub fn new(filter: FilterConfig) -> Self {
        Self {
            caches: DashMap::new(),
            filter,
        }
    }

    /// Return the cache of `bucket`, creating it if needed.
    ///
    /// `populate` runs once, on the freshly created cache, while the map entry
    /// is held; concurrent callers for the same bucket wait and then observe
    /// the same instance. If `populate` fails nothing is registered.
    pub fn get_or_create<F>(&self, bucket: &str, populate: F) -> StoreResult<Arc<MembershipCache>>
    where
        F: FnOnce(&MembershipCache) -> StoreResult<()>,
    {
        if let Some(cache) = self.caches.get(bucket) {
            return Ok(Arc::clone(cache.value()));
        }
        match self.caches.entry(bucket.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let cache = MembershipCache::new(&self.filter);
                populate(&cache)?;
                Ok(Arc::clone(entry.insert(Arc::new(cache)).value()))
            }
        }
    }

    #[must_use]
    pub fn get(&self, bucket: &str) -> Option<Arc<MembershipCache>> {
        self.caches.get(bucket).map(|c| Arc::clone(c.value()))
    }

    #[must_use]
    pub fn contains(&self, bucket: &str) -> bool {
        self.caches.contains_key(bucket)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// Names of all registered buckets, sorted
    #[must_use]
    pub fn bucket_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    #[must_use]
    pub const fn filter_config(&self) -> &FilterConfig {
        &self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn registry() -> BucketRegistry {
        BucketRegistry::new(FilterConfig::new(100, 0.01))
    }

    #[test]
    fn test_get_or_create_is_lazy_and_stable() {
        let registry = registry();
        assert!(registry.is_empty());
        assert!(registry.get("a").is_none());

        let first = registry.get_or_create("a", |_| Ok(())).unwrap();
        let second = registry.get_or_create("a", |_| panic!("populated twice")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("a"));
    }

    #[test]
    fn test_populate_runs_on_new_cache() {
        let registry = registry();
        let cache = registry
            .get_or_create("users", |cache| {
                cache.add(b"alice");
                Ok(())
            })
            .unwrap();
        assert!(cache.test(b"alice"));
    }

    #[test]
    fn test_failed_populate_registers_nothing() {
        let registry = registry();
        let result = registry.get_or_create("broken", |_| {
            Err(StoreError::Initialization("scan failed".into()))
        });
        assert!(result.is_err());
        assert!(!registry.contains("broken"));
    }

    #[test]
    fn test_concurrent_creation_builds_one_instance() {
        let registry = Arc::new(registry());
        let builds = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let builds = Arc::clone(&builds);
                thread::spawn(move || {
                    registry
                        .get_or_create("shared", |_| {
                            builds.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap()
                })
            })
            .collect();
        let caches: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(caches.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_bucket_names_sorted() {
        let registry = registry();
        for name in ["zeta", "alpha", "mid"] {
            registry.get_or_create(name, |_| Ok(())).unwrap();
        }
        assert_eq!(registry.bucket_names(), vec!["alpha", "mid", "zeta"]);
    }
}
