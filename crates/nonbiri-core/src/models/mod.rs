//! Domain entities shared by the registry, the caches and the library store.
//!
//! Modules hand back plain *entries* ([`MangaEntry`], [`ChapterEntry`]) that
//! only know their source-relative path. The host wraps them into
//! [`Manga`] and [`Chapter`], which additionally carry an identity state:
//! transient (`id == 0`) until the library store assigns a durable id.

pub mod chapter;
pub mod manga;

pub use chapter::{Chapter, ChapterEntry};
pub use manga::{Manga, MangaEntry, MangaPage, MangaStatus, ReadingStatus};

use serde::{Deserialize, Serialize};

/// Identifier value of an entity that has not been persisted yet.
pub const TRANSIENT_ID: i64 = 0;

const KEY_SEPARATOR: char = '\u{1f}';

/// Build the cache key for an entity addressed by `(source, path)`.
///
/// Durable ids never appear in cache keys; they do not exist until the
/// entity has been persisted.
pub fn cache_key(source_id: &str, path: &str) -> String {
    let mut key = String::with_capacity(source_id.len() + path.len() + 1);
    key.push_str(source_id);
    key.push(KEY_SEPARATOR);
    key.push_str(path);
    key
}

/// Identity shared by detail records and sub-records.
pub trait Identity {
    fn id(&self) -> i64;
    fn source_id(&self) -> &str;
    fn path(&self) -> &str;

    fn is_durable(&self) -> bool {
        self.id() > TRANSIENT_ID
    }

    fn cache_key(&self) -> String {
        cache_key(self.source_id(), self.path())
    }

    /// Same durable id, or same `(source, path)` when either side is transient.
    fn same_identity(&self, other: &dyn Identity) -> bool {
        if self.is_durable() && other.is_durable() {
            return self.id() == other.id();
        }
        self.source_id() == other.source_id() && self.path() == other.path()
    }
}

/// A search filter a module understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDescriptor {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub options: Vec<FilterOption>,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOption {
    pub key: String,
    pub value: String,
}

/// A filter key/value pair passed to a module's search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterValue {
    pub key: String,
    pub value: String,
}

impl FilterValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
