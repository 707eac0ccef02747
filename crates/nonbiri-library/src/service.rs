//! Library Service
//!
//! Fetch-through read paths over the loaded extensions, and the operations
//! that move an entity from the caches into the library store:
//! - Browse: latest, search, detail, chapters, pages
//! - Library: add, remove, reading status, listing
//!
//! A fetched entity lives in a cache under its `(source, path)` key until it
//! is saved. Saving promotes it: the durable copy is written and the cached
//! transient copy is evicted, so the caches never disagree with the store
//! about an entity's identity.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use nonbiri_core::models::{
    cache_key, Chapter, FilterDescriptor, FilterValue, Identity, Manga, MangaPage, ReadingStatus,
};
use nonbiri_core::{CacheConfig, ExtensionError, ExtensionRegistry, LoadedExtension};
use nonbiri_storage::LibraryStore;

use crate::caches::EntityCaches;
use crate::error::{Error, Result};

/// One page of browse results wrapped into manga.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub entries: Vec<Manga>,
    pub has_next: bool,
}

/// Library service
pub struct Library {
    registry: Arc<ExtensionRegistry>,
    store: LibraryStore,
    caches: EntityCaches,
}

impl Library {
    pub fn new(registry: Arc<ExtensionRegistry>, store: LibraryStore, caches: &CacheConfig) -> Self {
        Self {
            registry,
            store,
            caches: EntityCaches::new(caches),
        }
    }

    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &LibraryStore {
        &self.store
    }

    pub fn caches(&self) -> &EntityCaches {
        &self.caches
    }

    fn extension(&self, source_id: &str) -> Result<Arc<LoadedExtension>> {
        self.registry
            .get(source_id)
            .ok_or_else(|| Error::Extension(ExtensionError::NotLoaded(source_id.to_string())))
    }

    // ========================================================================
    // Browse
    // ========================================================================

    /// Latest updates of a source. Entries already in the library come back
    /// as their durable copy.
    pub fn latest(&self, source_id: &str, page: u32) -> Result<Listing> {
        let ext = self.extension(source_id)?;
        let started = Instant::now();
        let result = ext.extension().latest(page)?;
        tracing::debug!(
            extension_id = %source_id,
            page,
            count = result.entries.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched latest"
        );
        self.listing(source_id, result)
    }

    pub fn search(
        &self,
        source_id: &str,
        page: u32,
        query: &str,
        filters: &[FilterValue],
    ) -> Result<Listing> {
        let ext = self.extension(source_id)?;
        let started = Instant::now();
        let result = ext.extension().search(page, query, filters)?;
        tracing::debug!(
            extension_id = %source_id,
            page,
            query,
            count = result.entries.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Searched"
        );
        self.listing(source_id, result)
    }

    fn listing(&self, source_id: &str, page: MangaPage) -> Result<Listing> {
        let mut entries = Vec::with_capacity(page.entries.len());
        for entry in page.entries {
            let durable = self.store.find_manga(source_id, &entry.path)?;
            entries.push(durable.unwrap_or_else(|| Manga::from_entry(source_id, entry)));
        }
        Ok(Listing {
            entries,
            has_next: page.has_next,
        })
    }

    /// Detail record for `(source, path)`.
    ///
    /// Lookup order: the detail cache, then the library (a durable copy wins
    /// outright), then the module. A fresh fetch is cached as transient.
    pub fn manga(&self, source_id: &str, path: &str) -> Result<Manga> {
        let key = cache_key(source_id, path);
        if let Some(cached) = self.caches.manga.get(&key) {
            return Ok(cached);
        }
        if let Some(durable) = self.store.find_manga(source_id, path)? {
            return Ok(durable);
        }

        let ext = self.extension(source_id)?;
        let started = Instant::now();
        let entry = ext.extension().manga(path)?;
        tracing::debug!(
            extension_id = %source_id,
            path,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched manga"
        );

        self.cache_manga(key, Manga::from_entry(source_id, entry))
    }

    /// Cache a freshly fetched detail record unless it was saved meanwhile.
    fn cache_manga(&self, key: String, manga: Manga) -> Result<Manga> {
        self.caches.manga.set(key.as_str(), manga.clone());
        // `add` writes before it evicts, so a save that raced the fetch is
        // visible here.
        if let Some(durable) = self.store.find_manga(&manga.source_id, &manga.path)? {
            self.caches.manga.remove(&key);
            return Ok(durable);
        }
        Ok(manga)
    }

    /// Refetch a detail record from its module, bypassing the caches. A
    /// durable record is updated in place; user state is kept.
    pub fn refresh_manga(&self, source_id: &str, path: &str) -> Result<Manga> {
        let ext = self.extension(source_id)?;
        let entry = ext.extension().manga(path)?;

        match self.store.find_manga(source_id, path)? {
            Some(mut durable) => {
                durable.apply_entry(entry);
                Ok(self.store.save_manga(&durable)?)
            }
            None => {
                let manga = Manga::from_entry(source_id, entry);
                self.cache_manga(manga.cache_key(), manga)
            }
        }
    }

    /// Chapter listing of `(source, manga_path)`.
    ///
    /// For a transient manga the listing is cached as a batch. For a durable
    /// manga a cached batch is promoted into the store; otherwise stored
    /// chapters are served, fetching and saving them on first access.
    pub fn chapters(&self, source_id: &str, manga_path: &str) -> Result<Vec<Chapter>> {
        let key = cache_key(source_id, manga_path);

        if let Some(manga_id) = self.store.find_manga_id(source_id, manga_path)? {
            if let Some(saved) = self.promote_chapters(manga_id, &key)? {
                return Ok(saved);
            }
            let stored = self.store.chapters(manga_id)?;
            if !stored.is_empty() {
                return Ok(stored);
            }
            let fetched = self.fetch_chapters(source_id, manga_path, manga_id)?;
            return Ok(self.store.save_chapters(manga_id, &fetched)?);
        }

        if let Some(batch) = self.caches.chapters.get(&key) {
            return Ok(batch);
        }
        let fetched = self.fetch_chapters(source_id, manga_path, 0)?;
        for chapter in &fetched {
            self.caches.chapter.set(chapter.cache_key(), chapter.clone());
        }
        self.caches.chapters.set(key.as_str(), fetched.clone());

        if let Some(manga_id) = self.store.find_manga_id(source_id, manga_path)? {
            return match self.promote_chapters(manga_id, &key)? {
                Some(saved) => Ok(saved),
                None => Ok(self.store.chapters(manga_id)?),
            };
        }
        Ok(fetched)
    }

    /// Refetch a chapter listing. For a durable manga new chapters are saved
    /// and existing ones keep their reading progress.
    pub fn refresh_chapters(&self, source_id: &str, manga_path: &str) -> Result<Vec<Chapter>> {
        let key = cache_key(source_id, manga_path);
        self.caches.chapters.remove(&key);

        match self.store.find_manga_id(source_id, manga_path)? {
            Some(manga_id) => {
                let fetched = self.fetch_chapters(source_id, manga_path, manga_id)?;
                self.store.save_chapters(manga_id, &fetched)?;
                Ok(self.store.chapters(manga_id)?)
            }
            None => self.chapters(source_id, manga_path),
        }
    }

    fn fetch_chapters(&self, source_id: &str, manga_path: &str, manga_id: i64) -> Result<Vec<Chapter>> {
        let ext = self.extension(source_id)?;
        let started = Instant::now();
        let entries = ext.extension().chapters(manga_path)?;
        tracing::debug!(
            extension_id = %source_id,
            path = manga_path,
            count = entries.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched chapters"
        );
        Ok(entries
            .into_iter()
            .map(|entry| Chapter::from_entry(manga_id, source_id, entry))
            .collect())
    }

    /// Write a cached batch under `manga_id` and evict it along with its
    /// single-chapter entries.
    fn promote_chapters(&self, manga_id: i64, key: &str) -> Result<Option<Vec<Chapter>>> {
        let Some(batch) = self.caches.chapters.peek(key) else {
            return Ok(None);
        };

        let saved = self.store.save_chapters(manga_id, &batch)?;
        self.caches.chapters.remove(key);
        for chapter in &batch {
            self.caches.chapter.remove(&chapter.cache_key());
        }
        tracing::debug!(manga_id, count = saved.len(), "Promoted chapter batch");
        Ok(Some(saved))
    }

    /// Page URLs of a chapter. A durable chapter records its page list.
    pub fn pages(&self, source_id: &str, chapter_path: &str) -> Result<Vec<String>> {
        let ext = self.extension(source_id)?;
        let started = Instant::now();
        let pages = ext.extension().pages(chapter_path)?;
        tracing::debug!(
            extension_id = %source_id,
            path = chapter_path,
            count = pages.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched pages"
        );

        if let Some(mut chapter) = self.store.find_chapter(source_id, chapter_path)? {
            chapter.pages = pages.clone();
            self.store.save_chapter(&chapter)?;
        } else {
            let key = cache_key(source_id, chapter_path);
            if let Some(mut chapter) = self.caches.chapter.peek(&key) {
                chapter.pages = pages.clone();
                self.caches.chapter.set(key, chapter);
            }
        }
        Ok(pages)
    }

    pub fn filters(&self, source_id: &str) -> Result<Vec<FilterDescriptor>> {
        Ok(self.extension(source_id)?.extension().filters())
    }

    pub fn preferences(&self, source_id: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.extension(source_id)?.extension().preferences())
    }

    pub fn set_preferences(
        &self,
        source_id: &str,
        values: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        Ok(self
            .extension(source_id)?
            .extension()
            .set_preferences(values)?)
    }

    // ========================================================================
    // Library
    // ========================================================================

    /// Save a manga, inserting or updating, and promote its cached state.
    pub fn add(&self, manga: &Manga) -> Result<Manga> {
        let saved = self.store.save_manga(manga)?;
        let key = saved.cache_key();
        self.caches.manga.remove(&key);
        if manga.cache_key() != key {
            self.caches.manga.remove(&manga.cache_key());
        }
        self.promote_chapters(saved.id, &key)?;

        tracing::info!(
            manga_id = saved.id,
            source = %saved.source_id,
            path = %saved.path,
            "Added manga to library"
        );
        Ok(saved)
    }

    /// Fetch (or reuse) `(source, path)` and save it.
    pub fn add_path(&self, source_id: &str, path: &str) -> Result<Manga> {
        let manga = self.manga(source_id, path)?;
        self.add(&manga)
    }

    /// Delete a saved manga and its chapters. Returns whether it existed.
    pub fn remove(&self, id: i64) -> Result<bool> {
        let existing = self.store.get_manga(id)?;
        let removed = self.store.delete_manga(id)?;
        if let Some(manga) = existing {
            self.caches.manga.remove(&manga.cache_key());
            self.caches.chapters.remove(&manga.cache_key());
            tracing::info!(manga_id = id, source = %manga.source_id, "Removed manga from library");
        }
        Ok(removed)
    }

    pub fn get(&self, id: i64) -> Result<Option<Manga>> {
        Ok(self.store.get_manga(id)?)
    }

    pub fn find(&self, source_id: &str, path: &str) -> Result<Option<Manga>> {
        Ok(self.store.find_manga(source_id, path)?)
    }

    pub fn list(&self) -> Result<Vec<Manga>> {
        Ok(self.store.list_manga()?)
    }

    /// Set the reading status, saving a transient manga first.
    pub fn set_reading_status(&self, manga: &Manga, status: ReadingStatus) -> Result<Manga> {
        let id = if manga.is_durable() && self.store.get_manga(manga.id)?.is_some() {
            manga.id
        } else {
            self.add(manga)?.id
        };
        Ok(self.store.set_reading_status(id, status)?)
    }

    /// Set the reading status of a saved manga by id.
    pub fn set_reading_status_by_id(&self, id: i64, status: ReadingStatus) -> Result<Manga> {
        match self.store.get_manga(id)? {
            Some(manga) => self.set_reading_status(&manga, status),
            None => Err(Error::MangaNotFound(id.to_string())),
        }
    }
}
