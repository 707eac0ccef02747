//! Library persistence for Nonbiri.
//!
//! Saved manga, their chapters and the normalized author/artist/genre/group
//! tags live in a single redb database. Each save is one transaction: either
//! every row of it lands or none does.
//!
//! ```no_run
//! use nonbiri_storage::LibraryStore;
//!
//! let store = LibraryStore::open("data/nonbiri.redb")?;
//! for manga in store.list_manga()? {
//!     println!("{} {}", manga.id, manga.title);
//! }
//! # Ok::<(), nonbiri_storage::Error>(())
//! ```

pub mod error;
pub mod library;
pub mod schema;

pub use error::{Error, Result};
pub use library::LibraryStore;
pub use schema::{Tag, TagKind};
