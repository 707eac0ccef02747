//! Table layout.
//!
//! Records are JSON blobs keyed by id. Tag names live in their own tables and
//! are linked to records through multimap junctions, so a record blob never
//! carries its tags.

use std::fmt;

use redb::{
    MultimapTable, MultimapTableDefinition, ReadableTable, Table, TableDefinition,
    WriteTransaction,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// Detail records: id -> Manga (JSON, tags stripped)
pub(crate) const MANGA: TableDefinition<i64, &[u8]> = TableDefinition::new("manga");
// (source, path) -> manga id
pub(crate) const MANGA_BY_PATH: TableDefinition<(&str, &str), i64> =
    TableDefinition::new("manga_by_path");

// Sub-records: id -> Chapter (JSON, groups stripped)
pub(crate) const CHAPTER: TableDefinition<i64, &[u8]> = TableDefinition::new("chapter");
// (source, path) -> chapter id
pub(crate) const CHAPTER_BY_PATH: TableDefinition<(&str, &str), i64> =
    TableDefinition::new("chapter_by_path");
// manga id -> chapter ids
pub(crate) const MANGA_CHAPTERS: MultimapTableDefinition<i64, i64> =
    MultimapTableDefinition::new("manga_chapters");

// Id counters by entity name
pub(crate) const SEQUENCE: TableDefinition<&str, i64> = TableDefinition::new("sequence");

const AUTHOR: TableDefinition<i64, &str> = TableDefinition::new("author");
const AUTHOR_BY_NAME: TableDefinition<&str, i64> = TableDefinition::new("author_by_name");
const MANGA_AUTHOR: MultimapTableDefinition<i64, i64> = MultimapTableDefinition::new("manga_author");

const ARTIST: TableDefinition<i64, &str> = TableDefinition::new("artist");
const ARTIST_BY_NAME: TableDefinition<&str, i64> = TableDefinition::new("artist_by_name");
const MANGA_ARTIST: MultimapTableDefinition<i64, i64> = MultimapTableDefinition::new("manga_artist");

const GENRE: TableDefinition<i64, &str> = TableDefinition::new("genre");
const GENRE_BY_NAME: TableDefinition<&str, i64> = TableDefinition::new("genre_by_name");
const MANGA_GENRE: MultimapTableDefinition<i64, i64> = MultimapTableDefinition::new("manga_genre");

const GROUP: TableDefinition<i64, &str> = TableDefinition::new("scan_group");
const GROUP_BY_NAME: TableDefinition<&str, i64> = TableDefinition::new("scan_group_by_name");
const CHAPTER_GROUP: MultimapTableDefinition<i64, i64> =
    MultimapTableDefinition::new("chapter_group");

/// A normalized tag table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    Author,
    Artist,
    Genre,
    /// Scanlation group, attached to chapters.
    Group,
}

impl TagKind {
    pub const ALL: [TagKind; 4] = [Self::Author, Self::Artist, Self::Genre, Self::Group];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Artist => "artist",
            Self::Genre => "genre",
            Self::Group => "group",
        }
    }

    pub(crate) fn names(self) -> TableDefinition<'static, i64, &'static str> {
        match self {
            Self::Author => AUTHOR,
            Self::Artist => ARTIST,
            Self::Genre => GENRE,
            Self::Group => GROUP,
        }
    }

    pub(crate) fn by_name(self) -> TableDefinition<'static, &'static str, i64> {
        match self {
            Self::Author => AUTHOR_BY_NAME,
            Self::Artist => ARTIST_BY_NAME,
            Self::Genre => GENRE_BY_NAME,
            Self::Group => GROUP_BY_NAME,
        }
    }

    pub(crate) fn links(self) -> MultimapTableDefinition<'static, i64, i64> {
        match self {
            Self::Author => MANGA_AUTHOR,
            Self::Artist => MANGA_ARTIST,
            Self::Genre => MANGA_GENRE,
            Self::Group => CHAPTER_GROUP,
        }
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// Allocate the next id for `key`.
pub(crate) fn next_id(sequence: &mut Table<'_, &'static str, i64>, key: &str) -> Result<i64> {
    let current = sequence.get(key)?.map(|g| g.value()).unwrap_or(0);
    let next = current + 1;
    sequence.insert(key, next)?;
    Ok(next)
}

/// One tag kind's tables, opened in a write transaction.
pub(crate) struct TagTables<'txn> {
    kind: TagKind,
    names: Table<'txn, i64, &'static str>,
    by_name: Table<'txn, &'static str, i64>,
    links: MultimapTable<'txn, i64, i64>,
}

impl<'txn> TagTables<'txn> {
    fn open(txn: &'txn WriteTransaction, kind: TagKind) -> Result<Self> {
        Ok(Self {
            kind,
            names: txn.open_table(kind.names())?,
            by_name: txn.open_table(kind.by_name())?,
            links: txn.open_multimap_table(kind.links())?,
        })
    }

    /// Look up a tag by case-insensitive name, inserting it if absent. The
    /// stored name keeps the casing it was first seen with.
    pub(crate) fn resolve(
        &mut self,
        sequence: &mut Table<'_, &'static str, i64>,
        name: &str,
    ) -> Result<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput(format!("empty {} name", self.kind)));
        }
        let key = name.to_lowercase();

        let existing = self.by_name.get(key.as_str())?.map(|g| g.value());
        if let Some(id) = existing {
            return Ok(id);
        }

        let id = next_id(sequence, self.kind.as_str())?;
        self.names.insert(id, name)?;
        self.by_name.insert(key.as_str(), id)?;
        Ok(id)
    }

    /// Replace every link of `owner` with links to `names`.
    pub(crate) fn replace_links(
        &mut self,
        sequence: &mut Table<'_, &'static str, i64>,
        owner: i64,
        names: &[String],
    ) -> Result<()> {
        self.links.remove_all(owner)?;
        for name in names {
            let tag_id = self.resolve(sequence, name)?;
            self.links.insert(owner, tag_id)?;
        }
        Ok(())
    }

    pub(crate) fn unlink_all(&mut self, owner: i64) -> Result<()> {
        self.links.remove_all(owner)?;
        Ok(())
    }
}

/// Every table, opened once for a write transaction.
pub(crate) struct WriteTables<'txn> {
    pub manga: Table<'txn, i64, &'static [u8]>,
    pub manga_by_path: Table<'txn, (&'static str, &'static str), i64>,
    pub chapter: Table<'txn, i64, &'static [u8]>,
    pub chapter_by_path: Table<'txn, (&'static str, &'static str), i64>,
    pub manga_chapters: MultimapTable<'txn, i64, i64>,
    pub sequence: Table<'txn, &'static str, i64>,
    pub authors: TagTables<'txn>,
    pub artists: TagTables<'txn>,
    pub genres: TagTables<'txn>,
    pub groups: TagTables<'txn>,
}

impl<'txn> WriteTables<'txn> {
    pub(crate) fn open(txn: &'txn WriteTransaction) -> Result<Self> {
        Ok(Self {
            manga: txn.open_table(MANGA)?,
            manga_by_path: txn.open_table(MANGA_BY_PATH)?,
            chapter: txn.open_table(CHAPTER)?,
            chapter_by_path: txn.open_table(CHAPTER_BY_PATH)?,
            manga_chapters: txn.open_multimap_table(MANGA_CHAPTERS)?,
            sequence: txn.open_table(SEQUENCE)?,
            authors: TagTables::open(txn, TagKind::Author)?,
            artists: TagTables::open(txn, TagKind::Artist)?,
            genres: TagTables::open(txn, TagKind::Genre)?,
            groups: TagTables::open(txn, TagKind::Group)?,
        })
    }
}
