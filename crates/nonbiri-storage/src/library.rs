//! Library Storage
//!
//! Persistent storage for saved manga and their chapters. Every multi-row
//! write (a record plus its path index and tag links) runs in one redb write
//! transaction that is aborted on the first failing step.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use nonbiri_core::models::{Chapter, Identity, Manga, ReadingStatus};
use redb::{
    Database, ReadTransaction, ReadableMultimapTable, ReadableTable, WriteTransaction,
};

use crate::error::{Error, Result};
use crate::schema::{
    next_id, Tag, TagKind, WriteTables, CHAPTER, CHAPTER_BY_PATH, MANGA, MANGA_BY_PATH,
    MANGA_CHAPTERS, SEQUENCE,
};

/// Library storage
#[derive(Clone)]
pub struct LibraryStore {
    db: Arc<Database>,
    /// Path to the database file, `None` when in memory
    path: Option<PathBuf>,
}

impl LibraryStore {
    /// Open or create a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = if path_ref.exists() {
            Database::open(path_ref)?
        } else {
            Database::create(path_ref)?
        };

        let store = Self {
            db: Arc::new(db),
            path: Some(path_ref.to_path_buf()),
        };
        store.ensure_tables()?;
        tracing::debug!(path = %path_ref.display(), "Opened library store");
        Ok(store)
    }

    /// Create a store backed by memory only.
    pub fn memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())?;
        let store = Self {
            db: Arc::new(db),
            path: None,
        };
        store.ensure_tables()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Ensure all required tables exist
    fn ensure_tables(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        drop(WriteTables::open(&txn)?);
        txn.commit()?;
        Ok(())
    }

    /// Run `f` in a write transaction; commit on success, abort otherwise.
    fn write<T>(&self, f: impl FnOnce(&mut WriteTables<'_>) -> Result<T>) -> Result<T> {
        let txn: WriteTransaction = self.db.begin_write()?;
        let outcome = {
            let mut tables = WriteTables::open(&txn)?;
            f(&mut tables)
        };

        match outcome {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = txn.abort() {
                    tracing::warn!(error = %abort, "Failed to abort library transaction");
                }
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Manga
    // ------------------------------------------------------------------

    /// Insert or update a manga with its tags.
    ///
    /// An existing row is found by durable id first, then by
    /// `(source, path)`. Tag links are replaced wholesale. Returns the stored
    /// copy.
    pub fn save_manga(&self, manga: &Manga) -> Result<Manga> {
        validate_identity("manga", manga)?;
        let now = Utc::now().timestamp();

        let id = self.write(|t| {
            let by_id = if manga.is_durable() {
                t.manga.get(manga.id)?.map(|_| manga.id)
            } else {
                None
            };
            let existing_id = match by_id {
                Some(id) => Some(id),
                None => t
                    .manga_by_path
                    .get((manga.source_id.as_str(), manga.path.as_str()))?
                    .map(|g| g.value()),
            };

            let previous: Option<Manga> = match existing_id {
                Some(id) => match t.manga.get(id)? {
                    Some(raw) => Some(serde_json::from_slice(raw.value())?),
                    None => None,
                },
                None => None,
            };

            let id = match existing_id {
                Some(id) => id,
                None => next_id(&mut t.sequence, "manga")?,
            };

            let owner = t
                .manga_by_path
                .get((manga.source_id.as_str(), manga.path.as_str()))?
                .map(|g| g.value());
            if let Some(owner) = owner.filter(|&owner| owner != id) {
                return Err(Error::InvalidInput(format!(
                    "{}:{} already belongs to manga {}",
                    manga.source_id, manga.path, owner
                )));
            }

            let mut record = manga.clone();
            record.id = id;
            record.updated_at = Some(now);
            record.added_at = previous.as_ref().and_then(|p| p.added_at).or(Some(now));
            if let Some(previous) = &previous {
                // A fresh fetch carries no user state.
                if !manga.is_durable() {
                    record.reading_status = previous.reading_status;
                }
                if (previous.source_id.as_str(), previous.path.as_str())
                    != (record.source_id.as_str(), record.path.as_str())
                {
                    t.manga_by_path
                        .remove((previous.source_id.as_str(), previous.path.as_str()))?;
                }
            }

            t.manga.insert(id, encode_manga(&record)?.as_slice())?;
            t.manga_by_path
                .insert((record.source_id.as_str(), record.path.as_str()), id)?;

            t.authors
                .replace_links(&mut t.sequence, id, &clean_names(&manga.authors))?;
            t.artists
                .replace_links(&mut t.sequence, id, &clean_names(&manga.artists))?;
            t.genres
                .replace_links(&mut t.sequence, id, &clean_names(&manga.genres))?;
            Ok(id)
        })?;

        tracing::debug!(manga_id = id, source = %manga.source_id, path = %manga.path, "Saved manga");
        self.get_manga(id)?
            .ok_or_else(|| Error::NotFound(format!("manga {}", id)))
    }

    pub fn get_manga(&self, id: i64) -> Result<Option<Manga>> {
        let txn = self.db.begin_read()?;
        read_manga(&txn, id)
    }

    pub fn find_manga_id(&self, source_id: &str, path: &str) -> Result<Option<i64>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(MANGA_BY_PATH)?;
        Ok(table.get((source_id, path))?.map(|g| g.value()))
    }

    pub fn find_manga(&self, source_id: &str, path: &str) -> Result<Option<Manga>> {
        let txn = self.db.begin_read()?;
        let id = {
            let table = txn.open_table(MANGA_BY_PATH)?;
            let id = table.get((source_id, path))?.map(|g| g.value());
            id
        };
        match id {
            Some(id) => read_manga(&txn, id),
            None => Ok(None),
        }
    }

    /// All saved manga, by id.
    pub fn list_manga(&self) -> Result<Vec<Manga>> {
        let txn = self.db.begin_read()?;
        let ids = {
            let table = txn.open_table(MANGA)?;
            let mut ids = Vec::new();
            for entry in table.iter()? {
                let (key, _) = entry?;
                ids.push(key.value());
            }
            ids
        };

        let mut list = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(manga) = read_manga(&txn, id)? {
                list.push(manga);
            }
        }
        Ok(list)
    }

    pub fn set_reading_status(&self, id: i64, status: ReadingStatus) -> Result<Manga> {
        let now = Utc::now().timestamp();
        self.write(|t| {
            let mut record: Manga = match t.manga.get(id)? {
                Some(raw) => serde_json::from_slice(raw.value())?,
                None => return Err(Error::NotFound(format!("manga {}", id))),
            };
            record.reading_status = status;
            record.updated_at = Some(now);
            t.manga.insert(id, encode_manga(&record)?.as_slice())?;
            Ok(())
        })?;

        self.get_manga(id)?
            .ok_or_else(|| Error::NotFound(format!("manga {}", id)))
    }

    /// Delete a manga with its chapters and links. Tag rows are shared and
    /// stay.
    pub fn delete_manga(&self, id: i64) -> Result<bool> {
        let existed = self.write(|t| {
            let record: Manga = match t.manga.remove(id)? {
                Some(raw) => serde_json::from_slice(raw.value())?,
                None => return Ok(false),
            };
            t.manga_by_path
                .remove((record.source_id.as_str(), record.path.as_str()))?;
            t.authors.unlink_all(id)?;
            t.artists.unlink_all(id)?;
            t.genres.unlink_all(id)?;

            let chapter_ids = t
                .manga_chapters
                .remove_all(id)?
                .map(|r| r.map(|g| g.value()))
                .collect::<std::result::Result<Vec<i64>, _>>()?;
            for chapter_id in chapter_ids {
                let chapter: Option<Chapter> = match t.chapter.remove(chapter_id)? {
                    Some(raw) => Some(serde_json::from_slice(raw.value())?),
                    None => None,
                };
                if let Some(chapter) = chapter {
                    t.chapter_by_path
                        .remove((chapter.source_id.as_str(), chapter.path.as_str()))?;
                }
                t.groups.unlink_all(chapter_id)?;
            }
            Ok(true)
        })?;

        if existed {
            tracing::debug!(manga_id = id, "Deleted manga");
        }
        Ok(existed)
    }

    // ------------------------------------------------------------------
    // Chapters
    // ------------------------------------------------------------------

    /// Insert or update chapters of a saved manga in one transaction.
    ///
    /// Existing rows are matched by `(source, path)`; reading progress and
    /// recorded pages survive a refresh that does not carry them.
    pub fn save_chapters(&self, manga_id: i64, chapters: &[Chapter]) -> Result<Vec<Chapter>> {
        let now = Utc::now().timestamp();

        let ids = self.write(|t| {
            if t.manga.get(manga_id)?.is_none() {
                return Err(Error::NotFound(format!("manga {}", manga_id)));
            }

            let mut ids = Vec::with_capacity(chapters.len());
            for chapter in chapters {
                validate_identity("chapter", chapter)?;

                let existing_id = t
                    .chapter_by_path
                    .get((chapter.source_id.as_str(), chapter.path.as_str()))?
                    .map(|g| g.value());
                let previous: Option<Chapter> = match existing_id {
                    Some(id) => match t.chapter.get(id)? {
                        Some(raw) => Some(serde_json::from_slice(raw.value())?),
                        None => None,
                    },
                    None => None,
                };
                let id = match existing_id {
                    Some(id) => id,
                    None => next_id(&mut t.sequence, "chapter")?,
                };

                let mut record = chapter.clone();
                record.id = id;
                record.manga_id = manga_id;
                record.added_at = previous.as_ref().and_then(|p| p.added_at).or(Some(now));
                if let Some(previous) = previous {
                    if previous.manga_id != manga_id {
                        t.manga_chapters.remove(previous.manga_id, id)?;
                    }
                    record.last_read_at = record.last_read_at.or(previous.last_read_at);
                    record.last_page_read = record.last_page_read.or(previous.last_page_read);
                    record.downloaded |= previous.downloaded;
                    if record.pages.is_empty() {
                        record.pages = previous.pages;
                    }
                }

                t.chapter.insert(id, encode_chapter(&record)?.as_slice())?;
                t.chapter_by_path
                    .insert((record.source_id.as_str(), record.path.as_str()), id)?;
                t.manga_chapters.insert(manga_id, id)?;
                t.groups
                    .replace_links(&mut t.sequence, id, &clean_names(&chapter.groups))?;
                ids.push(id);
            }
            Ok(ids)
        })?;

        tracing::debug!(manga_id, count = ids.len(), "Saved chapters");
        let txn = self.db.begin_read()?;
        let mut saved = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(chapter) = read_chapter(&txn, id)? {
                saved.push(chapter);
            }
        }
        Ok(saved)
    }

    /// Update a single saved chapter.
    pub fn save_chapter(&self, chapter: &Chapter) -> Result<Chapter> {
        if chapter.manga_id <= 0 {
            return Err(Error::InvalidInput(format!(
                "chapter {} has no saved manga",
                chapter.path
            )));
        }
        self.save_chapters(chapter.manga_id, std::slice::from_ref(chapter))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("chapter {}", chapter.path)))
    }

    /// Chapters of a manga in the order they were first saved.
    pub fn chapters(&self, manga_id: i64) -> Result<Vec<Chapter>> {
        let txn = self.db.begin_read()?;
        let mut ids = {
            let table = txn.open_multimap_table(MANGA_CHAPTERS)?;
            let mut ids = Vec::new();
            for value in table.get(manga_id)? {
                ids.push(value?.value());
            }
            ids
        };
        ids.sort_unstable();

        let mut chapters = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(chapter) = read_chapter(&txn, id)? {
                chapters.push(chapter);
            }
        }
        Ok(chapters)
    }

    pub fn get_chapter(&self, id: i64) -> Result<Option<Chapter>> {
        let txn = self.db.begin_read()?;
        read_chapter(&txn, id)
    }

    pub fn find_chapter(&self, source_id: &str, path: &str) -> Result<Option<Chapter>> {
        let txn = self.db.begin_read()?;
        let id = {
            let table = txn.open_table(CHAPTER_BY_PATH)?;
            let id = table.get((source_id, path))?.map(|g| g.value());
            id
        };
        match id {
            Some(id) => read_chapter(&txn, id),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    /// Every stored tag of `kind`, by id.
    pub fn tags(&self, kind: TagKind) -> Result<Vec<Tag>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(kind.names())?;
        let mut tags = Vec::new();
        for entry in table.iter()? {
            let (id, name) = entry?;
            tags.push(Tag {
                id: id.value(),
                name: name.value().to_string(),
            });
        }
        Ok(tags)
    }

    /// Last id handed out for `entity` ("manga", "chapter" or a tag kind).
    pub fn last_id(&self, entity: &str) -> Result<i64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SEQUENCE)?;
        Ok(table.get(entity)?.map(|g| g.value()).unwrap_or(0))
    }
}

fn validate_identity(what: &str, entity: &dyn Identity) -> Result<()> {
    if entity.source_id().trim().is_empty() {
        return Err(Error::InvalidInput(format!("{} without source", what)));
    }
    if entity.path().trim().is_empty() {
        return Err(Error::InvalidInput(format!("{} without path", what)));
    }
    Ok(())
}

/// Drop blank names; the tag tables reject them.
fn clean_names(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

fn encode_manga(manga: &Manga) -> Result<Vec<u8>> {
    let mut record = manga.clone();
    record.authors.clear();
    record.artists.clear();
    record.genres.clear();
    Ok(serde_json::to_vec(&record)?)
}

fn encode_chapter(chapter: &Chapter) -> Result<Vec<u8>> {
    let mut record = chapter.clone();
    record.groups.clear();
    Ok(serde_json::to_vec(&record)?)
}

fn read_tags(txn: &ReadTransaction, kind: TagKind, owner: i64) -> Result<Vec<String>> {
    let names = txn.open_table(kind.names())?;
    let links = txn.open_multimap_table(kind.links())?;

    let mut out = Vec::new();
    for link in links.get(owner)? {
        let tag_id = link?.value();
        if let Some(name) = names.get(tag_id)? {
            out.push(name.value().to_string());
        }
    }
    Ok(out)
}

fn read_manga(txn: &ReadTransaction, id: i64) -> Result<Option<Manga>> {
    let table = txn.open_table(MANGA)?;
    let mut manga: Manga = match table.get(id)? {
        Some(raw) => serde_json::from_slice(raw.value())?,
        None => return Ok(None),
    };
    manga.id = id;
    manga.authors = read_tags(txn, TagKind::Author, id)?;
    manga.artists = read_tags(txn, TagKind::Artist, id)?;
    manga.genres = read_tags(txn, TagKind::Genre, id)?;
    Ok(Some(manga))
}

fn read_chapter(txn: &ReadTransaction, id: i64) -> Result<Option<Chapter>> {
    let table = txn.open_table(CHAPTER)?;
    let mut chapter: Chapter = match table.get(id)? {
        Some(raw) => serde_json::from_slice(raw.value())?,
        None => return Ok(None),
    };
    chapter.id = id;
    chapter.groups = read_tags(txn, TagKind::Group, id)?;
    Ok(Some(chapter))
}
