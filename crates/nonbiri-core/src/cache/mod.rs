//! Concurrent entity caches.
//!
//! One generic [`LruCache`] type, instantiated independently per entity
//! shape so unrelated workloads never evict each other.

pub mod lru;

pub use self::lru::LruCache;
