//! A source with canned data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use nonbiri_core::extension::{Extension, ExtensionError, ExtensionMetadata, Result};
use nonbiri_core::models::{
    ChapterEntry, FilterDescriptor, FilterOption, FilterValue, MangaEntry, MangaPage,
};
use parking_lot::Mutex;
use serde_json::Value;

/// Number of fetches each operation served.
#[derive(Debug, Default)]
pub struct FetchCounts {
    latest: AtomicUsize,
    search: AtomicUsize,
    manga: AtomicUsize,
    chapters: AtomicUsize,
    pages: AtomicUsize,
}

impl FetchCounts {
    pub fn latest(&self) -> usize {
        self.latest.load(Ordering::SeqCst)
    }

    pub fn search(&self) -> usize {
        self.search.load(Ordering::SeqCst)
    }

    pub fn manga(&self) -> usize {
        self.manga.load(Ordering::SeqCst)
    }

    pub fn chapters(&self) -> usize {
        self.chapters.load(Ordering::SeqCst)
    }

    pub fn pages(&self) -> usize {
        self.pages.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-process [`Extension`] serving canned entries.
pub struct MockExtension {
    meta: ExtensionMetadata,
    manga: Vec<MangaEntry>,
    chapters: HashMap<String, Vec<ChapterEntry>>,
    pages: HashMap<String, Vec<String>>,
    preferences: Mutex<Value>,
    counts: Arc<FetchCounts>,
    manga_gate: Mutex<Option<Arc<Barrier>>>,
}

impl MockExtension {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            meta: ExtensionMetadata::new(id, id.to_uppercase(), version)
                .with_base_url(format!("https://{}.example", id)),
            manga: Vec::new(),
            chapters: HashMap::new(),
            pages: HashMap::new(),
            preferences: Mutex::new(serde_json::json!({ "quality": "high" })),
            counts: Arc::default(),
            manga_gate: Mutex::new(None),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.meta.name = name.to_string();
        self
    }

    pub fn with_manga(mut self, entry: MangaEntry) -> Self {
        self.manga.push(entry);
        self
    }

    pub fn with_chapters(mut self, manga_path: &str, chapters: Vec<ChapterEntry>) -> Self {
        self.chapters.insert(manga_path.to_string(), chapters);
        self
    }

    pub fn with_pages(mut self, chapter_path: &str, pages: Vec<String>) -> Self {
        self.pages.insert(chapter_path.to_string(), pages);
        self
    }

    /// Share fetch counters with the caller.
    pub fn with_counts(mut self, counts: Arc<FetchCounts>) -> Self {
        self.counts = counts;
        self
    }

    /// Make the next `manga()` call wait on `gate` twice: once on entry,
    /// once before it returns. Later calls run freely.
    pub fn with_manga_gate(self, gate: Arc<Barrier>) -> Self {
        *self.manga_gate.lock() = Some(gate);
        self
    }

    pub fn counts(&self) -> Arc<FetchCounts> {
        Arc::clone(&self.counts)
    }
}

impl Extension for MockExtension {
    fn metadata(&self) -> &ExtensionMetadata {
        &self.meta
    }

    fn latest(&self, page: u32) -> Result<MangaPage> {
        FetchCounts::bump(&self.counts.latest);
        let entries = if page <= 1 { self.manga.clone() } else { Vec::new() };
        Ok(MangaPage {
            entries,
            has_next: false,
        })
    }

    fn search(&self, page: u32, query: &str, filters: &[FilterValue]) -> Result<MangaPage> {
        FetchCounts::bump(&self.counts.search);
        if page > 1 {
            return Ok(MangaPage::default());
        }

        let query = query.to_lowercase();
        let entries = self
            .manga
            .iter()
            .filter(|m| m.title.to_lowercase().contains(&query))
            .filter(|m| {
                filters.iter().all(|f| {
                    f.key != "genre" || m.genres.iter().any(|g| g.eq_ignore_ascii_case(&f.value))
                })
            })
            .cloned()
            .collect();
        Ok(MangaPage {
            entries,
            has_next: false,
        })
    }

    fn manga(&self, path: &str) -> Result<MangaEntry> {
        FetchCounts::bump(&self.counts.manga);
        let gate = self.manga_gate.lock().take();
        if let Some(gate) = gate {
            gate.wait();
            gate.wait();
        }
        self.manga
            .iter()
            .find(|m| m.path == path)
            .cloned()
            .ok_or_else(|| ExtensionError::Fetch(format!("no manga at {}", path)))
    }

    fn chapters(&self, path: &str) -> Result<Vec<ChapterEntry>> {
        FetchCounts::bump(&self.counts.chapters);
        Ok(self.chapters.get(path).cloned().unwrap_or_default())
    }

    fn pages(&self, path: &str) -> Result<Vec<String>> {
        FetchCounts::bump(&self.counts.pages);
        self.pages
            .get(path)
            .cloned()
            .ok_or_else(|| ExtensionError::Fetch(format!("no chapter at {}", path)))
    }

    fn filters(&self) -> Vec<FilterDescriptor> {
        vec![FilterDescriptor {
            key: "genre".into(),
            name: "Genre".into(),
            options: vec![
                FilterOption {
                    key: "action".into(),
                    value: "Action".into(),
                },
                FilterOption {
                    key: "romance".into(),
                    value: "Romance".into(),
                },
            ],
            multiple: true,
            hidden: false,
        }]
    }

    fn preferences(&self) -> Option<Value> {
        Some(self.preferences.lock().clone())
    }

    fn set_preferences(&self, values: &Value) -> Result<Value> {
        let mut current = self.preferences.lock();
        match (current.as_object_mut(), values.as_object()) {
            (Some(current), Some(values)) => {
                for (k, v) in values {
                    current.insert(k.clone(), v.clone());
                }
            }
            _ => {
                return Err(ExtensionError::InvalidFormat(
                    "preferences must be an object".into(),
                ))
            }
        }
        Ok(current.clone())
    }
}
