//! bloomkv Store - existence-indexed key-value backend
//!
//! Memcached-style operations (set, add, replace, get, delete, incr/decr,
//! flush) over named buckets in a redb file. Each bucket carries a counting
//! Bloom filter of its keys so that reads and inserts of absent keys do not
//! need to touch the store.

pub mod backend;
pub mod cache;
pub mod error;
pub mod filter;
pub mod registry;
pub mod tables;

mod pending;

// Re-exports
pub use backend::{BackendStats, StorageBackend};
pub use cache::{CacheStats, MembershipCache};
pub use error::{StoreError, StoreResult};
pub use filter::CountingBloomFilter;
pub use registry::BucketRegistry;
