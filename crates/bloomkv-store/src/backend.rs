//! Storage backend: memcached-style operations over redb buckets.
//!
//! Every bucket is a redb table. The active bucket's [`MembershipCache`] is
//! consulted before touching the store so that the common "new key" paths
//! (add of a fresh key, get of a missing key) skip the authoritative read.
//!
//! Update transactions are serialized by `write_lock`, which is held from
//! `begin_write` until the cache has been brought in line with the commit.
//! Cache insertions happen before commit and are undone if the transaction
//! does not commit; removals and resets only after commit (see
//! [`PendingCacheOps`]). Reads run on redb snapshots without the lock.

use crate::cache::{CacheStats, MembershipCache};
use crate::error::{StoreError, StoreResult};
use crate::pending::PendingCacheOps;
use crate::registry::BucketRegistry;
use crate::tables;
use bloomkv_common::config::{Config, FilterConfig};
use bloomkv_common::types::{BucketName, KeyDisplay};
use parking_lot::{Mutex, RwLock};
use redb::{Database, ReadableTable, ReadableTableMetadata, WriteTransaction};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// The bucket all single-key operations target
#[derive(Clone, Debug)]
struct ActiveBucket {
    name: Arc<str>,
    cache: Arc<MembershipCache>,
}

#[derive(Debug, Default)]
struct BackendCounters {
    authoritative_reads: AtomicU64,
    short_circuits: AtomicU64,
}

/// Snapshot returned by [`StorageBackend::stats`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BackendStats {
    /// Active bucket
    pub bucket: String,
    /// Buckets with a membership cache
    pub buckets: usize,
    /// Keys stored in the active bucket
    pub keys: u64,
    /// Store reads issued because the cache said "possibly present"
    /// (or "absent" on the replace path)
    pub authoritative_reads: u64,
    /// Operations decided from the cache alone
    pub cache_short_circuits: u64,
    /// Counters of the active bucket's cache
    pub cache: CacheStats,
}

/// Caching existence index in front of a redb store
pub struct StorageBackend {
    path: PathBuf,
    db: Database,
    registry: BucketRegistry,
    active: RwLock<ActiveBucket>,
    write_lock: Mutex<()>,
    counters: BackendCounters,
}

impl StorageBackend {
    /// Open the store at `path` with `bucket` active.
    ///
    /// The bucket must already exist; its cache is rebuilt from every key
    /// stored in it. Any failure to reach the bucket, including a malformed
    /// bucket name, is reported as [`StoreError::Initialization`].
    pub fn open(path: impl AsRef<Path>, bucket: &str, filter: FilterConfig) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let bucket = BucketName::new(bucket)
            .map_err(|e| StoreError::Initialization(format!("bucket {bucket:?}: {e}")))?;

        let db = Database::create(&path).map_err(|e| {
            StoreError::Initialization(format!("cannot open store {}: {e}", path.display()))
        })?;

        let registry = BucketRegistry::new(filter);
        let cache = registry.get_or_create(bucket.as_str(), |cache| {
            let txn = db.begin_read()?;
            let Some(table) = tables::open_read(&txn, bucket.as_str())? else {
                return Err(StoreError::Initialization(format!(
                    "bucket {bucket} not found in {}",
                    path.display()
                )));
            };
            let loaded = load_keys(&table, cache)?;
            info!("Rebuilt cache for bucket '{}' from {} keys", bucket, loaded);
            Ok(())
        })?;

        info!("Opened store {} with bucket '{}'", path.display(), bucket);

        Ok(Self {
            path,
            db,
            registry,
            active: RwLock::new(ActiveBucket {
                name: Arc::from(bucket.as_str()),
                cache,
            }),
            write_lock: Mutex::new(()),
            counters: BackendCounters::default(),
        })
    }

    /// Open using the `[store]` and `[filter]` sections of `config`
    pub fn from_config(config: &Config) -> StoreResult<Self> {
        Self::open(&config.store.path, &config.store.bucket, config.filter)
    }

    /// Create the store file if needed and make sure `bucket` exists in it.
    ///
    /// Must not be called while a backend holds the same file open.
    pub fn create_bucket(path: impl AsRef<Path>, bucket: &str) -> StoreResult<()> {
        let path = path.as_ref();
        let bucket = BucketName::new(bucket)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;
        let txn = db.begin_write()?;
        {
            let _t = txn.open_table(tables::bucket(bucket.as_str()))?;
        }
        txn.commit()?;
        info!("Bucket '{}' ready in {}", bucket, path.display());
        Ok(())
    }

    /// Store unconditionally
    pub fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.put(key, value, false, true)
    }

    /// Store only if the key is not present
    pub fn add(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.put(key, value, false, false)
    }

    /// Store only if the key is already present
    pub fn replace(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.put(key, value, true, false)
    }

    /// Shared write path of set, add and replace.
    ///
    /// With `passthrough` the value is written without any existence check.
    /// Otherwise `require_existing` selects replace (true) or add (false)
    /// semantics, and the store is only read when the cache answer cannot
    /// settle the precondition.
    pub fn put(
        &self,
        key: &[u8],
        value: &[u8],
        require_existing: bool,
        passthrough: bool,
    ) -> StoreResult<()> {
        self.update(|txn, active, pending| {
            let mut table = txn.open_table(tables::bucket(&active.name))?;

            if !passthrough {
                let maybe_present = active.cache.test(key);
                if require_existing && !maybe_present {
                    self.note_authoritative_read(&active.name, key);
                    if table.get(key)?.is_none() {
                        return Err(StoreError::key_not_found(&active.name, key));
                    }
                } else if !require_existing && maybe_present {
                    self.note_authoritative_read(&active.name, key);
                    if table.get(key)?.is_some() {
                        return Err(StoreError::key_exists(&active.name, key));
                    }
                } else {
                    self.counters.short_circuits.fetch_add(1, Ordering::Relaxed);
                }
            }

            let existed = table.insert(key, value)?.is_some();

            // The cache decided the precondition without a read; the insert
            // result is the final word.
            if !passthrough && existed != require_existing {
                return Err(if require_existing {
                    StoreError::key_not_found(&active.name, key)
                } else {
                    StoreError::key_exists(&active.name, key)
                });
            }

            // A stored key the cache did not know about is registered again.
            if !existed || !active.cache.test(key) {
                pending.insert(key);
            }
            Ok(())
        })
    }

    /// Value of `key` in the active bucket
    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let active = self.active();
        if !active.cache.test(key) {
            self.counters.short_circuits.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        self.note_authoritative_read(&active.name, key);
        let txn = self.db.begin_read()?;
        let Some(table) = tables::open_read(&txn, &active.name)? else {
            return Ok(None);
        };
        Ok(table.get(key)?.map(|v| v.value().to_vec()))
    }

    /// Delete `key`. With `only_if_exists`, returns `false` and changes
    /// nothing when the key is absent; without it, deleting an absent key
    /// succeeds.
    pub fn delete(&self, key: &[u8], only_if_exists: bool) -> StoreResult<bool> {
        if only_if_exists && self.get(key)?.is_none() {
            return Ok(false);
        }

        let removed = self.update(|txn, active, pending| {
            let mut table = txn.open_table(tables::bucket(&active.name))?;
            let removed = table.remove(key)?.is_some();
            // Only keys that were stored were ever counted into the filter.
            if removed {
                pending.remove(key);
            }
            Ok(removed)
        })?;

        Ok(removed || !only_if_exists)
    }

    /// Add `delta` to the numeric value of `key` and return the new value
    pub fn increment(&self, key: &[u8], delta: u64, create_if_missing: bool) -> StoreResult<i64> {
        self.adjust(key, Delta::Up(delta), create_if_missing)
    }

    /// Subtract `delta` from the numeric value of `key`, stopping at zero
    pub fn decrement(&self, key: &[u8], delta: u64, create_if_missing: bool) -> StoreResult<i64> {
        self.adjust(key, Delta::Down(delta), create_if_missing)
    }

    fn adjust(&self, key: &[u8], delta: Delta, create_if_missing: bool) -> StoreResult<i64> {
        self.update(|txn, active, pending| {
            let mut table = txn.open_table(tables::bucket(&active.name))?;

            let current = if active.cache.test(key) {
                self.note_authoritative_read(&active.name, key);
                table.get(key)?.map(|v| v.value().to_vec())
            } else {
                self.counters.short_circuits.fetch_add(1, Ordering::Relaxed);
                None
            };

            let next = match current {
                None if !create_if_missing => {
                    return Err(StoreError::key_not_found(&active.name, key));
                }
                None => delta.apply(0),
                Some(raw) => {
                    let old = parse_counter(&raw)
                        .ok_or_else(|| StoreError::not_a_number(&active.name, key, &raw))?;
                    delta.apply(old)
                }
            };

            let existed = table.insert(key, next.to_string().as_bytes())?.is_some();
            if !existed || !active.cache.test(key) {
                pending.insert(key);
            }
            Ok(next)
        })
    }

    /// Drop every key of the active bucket; the bucket stays in place
    pub fn flush(&self) -> StoreResult<()> {
        let bucket = self.update(|txn, active, pending| {
            txn.delete_table(tables::bucket(&active.name))?;
            // The bucket itself survives, empty.
            txn.open_table(tables::bucket(&active.name))?;
            pending.reset();
            Ok(Arc::clone(&active.name))
        })?;
        info!("Flushed bucket '{}'", bucket);
        Ok(())
    }

    /// Make `name` the active bucket.
    ///
    /// A bucket seen for the first time gets a cache populated from whatever
    /// keys the store already holds for it; a bucket with no table yet starts
    /// empty. No data is moved between buckets.
    pub fn switch_bucket(&self, name: &str) -> StoreResult<()> {
        let name = BucketName::new(name)?;
        let _serial = self.write_lock.lock();

        let cache = self.registry.get_or_create(name.as_str(), |cache| {
            let txn = self.db.begin_read()?;
            let loaded = match tables::open_read(&txn, name.as_str())? {
                Some(table) => load_keys(&table, cache)?,
                None => 0,
            };
            info!("Created cache for bucket '{}' ({} keys)", name, loaded);
            Ok(())
        })?;

        *self.active.write() = ActiveBucket {
            name: Arc::from(name.as_str()),
            cache,
        };
        debug!("Active bucket is now '{}'", name);
        Ok(())
    }

    /// Counters of the backend and the active bucket
    pub fn stats(&self) -> StoreResult<BackendStats> {
        let active = self.active();
        let txn = self.db.begin_read()?;
        let keys = match tables::open_read(&txn, &active.name)? {
            Some(table) => table.len()?,
            None => 0,
        };
        Ok(BackendStats {
            bucket: active.name.to_string(),
            buckets: self.registry.len(),
            keys,
            authoritative_reads: self.counters.authoritative_reads.load(Ordering::Relaxed),
            cache_short_circuits: self.counters.short_circuits.load(Ordering::Relaxed),
            cache: active.cache.stats(),
        })
    }

    #[must_use]
    pub fn active_bucket(&self) -> String {
        self.active.read().name.to_string()
    }

    /// Buckets that have a membership cache in this process
    #[must_use]
    pub fn known_buckets(&self) -> Vec<String> {
        self.registry.bucket_names()
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.path
    }

    /// Release the store file
    pub fn close(self) {
        info!("Closing store {}", self.path.display());
    }

    fn active(&self) -> ActiveBucket {
        self.active.read().clone()
    }

    fn note_authoritative_read(&self, bucket: &str, key: &[u8]) {
        self.counters
            .authoritative_reads
            .fetch_add(1, Ordering::Relaxed);
        debug!("Reading '{}' from bucket '{}' to confirm cache answer", KeyDisplay(key), bucket);
    }

    /// Run `op` in a serialized write transaction on the active bucket.
    ///
    /// On success the transaction commits and the deferred cache changes are
    /// applied; on any error it is aborted and cache insertions are undone.
    fn update<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&WriteTransaction, &ActiveBucket, &mut PendingCacheOps<'_>) -> StoreResult<T>,
    {
        let _serial = self.write_lock.lock();
        let active = self.active();
        let mut pending = PendingCacheOps::new(&active.cache);

        let txn = self.db.begin_write()?;
        match op(&txn, &active, &mut pending) {
            Ok(out) => {
                txn.commit()?;
                pending.committed();
                Ok(out)
            }
            Err(e) => {
                if let Err(abort_err) = txn.abort() {
                    warn!("Failed to abort transaction on bucket '{}': {}", active.name, abort_err);
                }
                Err(e)
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Delta {
    Up(u64),
    Down(u64),
}

impl Delta {
    /// Saturating on overflow; decrements stop at zero.
    fn apply(self, old: i64) -> i64 {
        match self {
            Self::Up(d) => old.saturating_add(i64::try_from(d).unwrap_or(i64::MAX)),
            Self::Down(d) => old
                .saturating_sub(i64::try_from(d).unwrap_or(i64::MAX))
                .max(0),
        }
    }
}

fn parse_counter(raw: &[u8]) -> Option<i64> {
    std::str::from_utf8(raw).ok()?.parse().ok()
}

fn load_keys<T>(table: &T, cache: &MembershipCache) -> StoreResult<u64>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let mut loaded = 0;
    for entry in table.iter()? {
        let (key, _) = entry?;
        cache.add(key.value());
        loaded += 1;
    }
    Ok(loaded)
}
