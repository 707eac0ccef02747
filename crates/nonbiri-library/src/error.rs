//! Error types for library operations.

use thiserror::Error;

use nonbiri_core::{ErrorKind, ExtensionError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Registry lookup or module fetch failure.
    #[error(transparent)]
    Extension(#[from] ExtensionError),

    /// Library store failure.
    #[error(transparent)]
    Storage(#[from] nonbiri_storage::Error),

    #[error("Manga not found: {0}")]
    MangaNotFound(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Extension(e) => e.kind(),
            Error::Storage(e) => e.kind(),
            Error::MangaNotFound(_) => ErrorKind::NotFound,
        }
    }
}
