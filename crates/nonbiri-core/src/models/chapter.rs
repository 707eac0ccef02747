//! Sub-records.

use serde::{Deserialize, Serialize};

use super::{Identity, TRANSIENT_ID};

/// A chapter as produced by a module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterEntry {
    pub path: String,
    #[serde(default)]
    pub url: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<i64>,
    /// Scanlation groups credited for the chapter.
    #[serde(default)]
    pub groups: Vec<String>,
}

impl ChapterEntry {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A chapter owned by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    #[serde(default)]
    pub id: i64,
    /// Durable id of the owning manga, `0` while the manga is transient.
    #[serde(default)]
    pub manga_id: i64,
    pub source_id: String,
    pub path: String,
    #[serde(default)]
    pub url: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<i64>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub pages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_read_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_page_read: Option<u32>,
    #[serde(default)]
    pub downloaded: bool,
}

impl Chapter {
    pub fn from_entry(manga_id: i64, source_id: impl Into<String>, entry: ChapterEntry) -> Self {
        Self {
            id: TRANSIENT_ID,
            manga_id,
            source_id: source_id.into(),
            path: entry.path,
            url: entry.url,
            name: entry.name,
            uploaded_at: entry.uploaded_at,
            groups: entry.groups,
            ..Default::default()
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl Identity for Chapter {
    fn id(&self) -> i64 {
        self.id
    }

    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn path(&self) -> &str {
        &self.path
    }
}

impl PartialEq for Chapter {
    fn eq(&self, other: &Self) -> bool {
        self.same_identity(other)
    }
}
