//! The three entity caches.
//!
//! Detail records, single chapters and chapter batches each get their own
//! [`LruCache`] so one workload never evicts another. All keys are
//! `(source, path)` cache keys; durable ids never appear in them.

use nonbiri_core::models::{Chapter, Manga};
use nonbiri_core::{CacheConfig, LruCache};

#[derive(Debug)]
pub struct EntityCaches {
    /// Transient detail records by manga key.
    pub manga: LruCache<Manga>,
    /// Transient chapters by chapter key.
    pub chapter: LruCache<Chapter>,
    /// Chapter listings of transient manga, by manga key.
    pub chapters: LruCache<Vec<Chapter>>,
}

impl EntityCaches {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            manga: LruCache::new(config.manga),
            chapter: LruCache::new(config.chapter),
            chapters: LruCache::new(config.chapter_batch),
        }
    }

    pub fn clear(&self) {
        self.manga.clear();
        self.chapter.clear();
        self.chapters.clear();
    }
}

impl Default for EntityCaches {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}
