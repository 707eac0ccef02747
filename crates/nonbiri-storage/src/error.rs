//! Error types for the storage crate.

use thiserror::Error;

use nonbiri_core::ErrorKind;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record blob failed to encode or decode.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Any redb failure.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing identity, or a `(source, path)` owned by another record.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::Serialization(_) | Error::Storage(_) => ErrorKind::Storage,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Every redb failure surfaces as [`Error::Storage`] tagged with its stage.
macro_rules! redb_errors {
    ($($ty:ident => $stage:literal),* $(,)?) => {
        $(
            impl From<redb::$ty> for Error {
                fn from(e: redb::$ty) -> Self {
                    Error::Storage(format!("{} failed: {}", $stage, e))
                }
            }
        )*
    };
}

redb_errors! {
    Error => "database",
    DatabaseError => "open",
    TransactionError => "transaction",
    TableError => "table",
    StorageError => "read/write",
    CommitError => "commit",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(Error::NotFound("manga 1".into()).kind(), ErrorKind::NotFound);
        assert_eq!(Error::InvalidInput("x".into()).kind(), ErrorKind::InvalidInput);

        let io: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(io.kind(), ErrorKind::Storage);

        let json: Error = serde_json::from_str::<u8>("x").unwrap_err().into();
        assert!(matches!(json, Error::Serialization(_)));
    }
}
