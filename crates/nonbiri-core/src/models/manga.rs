//! Detail records.

use serde::{Deserialize, Serialize};

use super::{Identity, TRANSIENT_ID};

/// Publication status reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MangaStatus {
    #[default]
    Unknown,
    Ongoing,
    Completed,
    Hiatus,
    Cancelled,
}

impl MangaStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Unknown => 0,
            Self::Ongoing => 1,
            Self::Completed => 2,
            Self::Hiatus => 3,
            Self::Cancelled => 4,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::Ongoing,
            2 => Self::Completed,
            3 => Self::Hiatus,
            4 => Self::Cancelled,
            _ => Self::Unknown,
        }
    }
}

/// The user's reading state for a saved manga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    #[default]
    None,
    Reading,
    Planned,
    OnHold,
    Dropped,
    Completed,
}

impl std::str::FromStr for ReadingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "reading" => Ok(Self::Reading),
            "planned" => Ok(Self::Planned),
            "on_hold" | "onhold" => Ok(Self::OnHold),
            "dropped" => Ok(Self::Dropped),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown reading status: {}", other)),
        }
    }
}

/// A detail record as produced by a module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MangaEntry {
    /// Source-relative path, unique within one source.
    pub path: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub cover_url: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: MangaStatus,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl MangaEntry {
    pub fn new(path: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}

/// One page of a listing, with a flag telling whether more pages follow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MangaPage {
    pub entries: Vec<MangaEntry>,
    pub has_next: bool,
}

/// A detail record owned by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manga {
    /// Durable id, or `0` while transient.
    #[serde(default)]
    pub id: i64,
    pub source_id: String,
    pub path: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub cover_url: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: MangaStatus,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub reading_status: ReadingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Manga {
    /// Wrap a freshly fetched entry into a transient manga.
    pub fn from_entry(source_id: impl Into<String>, entry: MangaEntry) -> Self {
        Self {
            id: TRANSIENT_ID,
            source_id: source_id.into(),
            path: entry.path,
            url: entry.url,
            cover_url: entry.cover_url,
            title: entry.title,
            description: entry.description,
            status: entry.status,
            authors: entry.authors,
            artists: entry.artists,
            genres: entry.genres,
            reading_status: ReadingStatus::None,
            added_at: None,
            updated_at: None,
        }
    }

    /// Copy the source-provided fields of `entry` over this record, keeping
    /// identity and user state.
    pub fn apply_entry(&mut self, entry: MangaEntry) {
        self.url = entry.url;
        self.cover_url = entry.cover_url;
        self.title = entry.title;
        self.description = entry.description;
        self.status = entry.status;
        self.authors = entry.authors;
        self.artists = entry.artists;
        self.genres = entry.genres;
    }
}

impl Identity for Manga {
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

impl PartialEq for Manga {
    fn eq(&self, other: &Self) -> bool {
        self.same_identity(other)
    }
}
