//! Core types and runtime for Nonbiri.
//!
//! This crate defines the domain entities, the extension runtime (module ABI,
//! capability table, loader and registry), the generic entity cache and the
//! shared configuration.

pub mod cache;
pub mod config;
pub mod extension;
pub mod models;

pub use cache::LruCache;
pub use config::{CacheConfig, Config, ConfigError};
pub use extension::{
    Capabilities, ErrorKind, Extension, ExtensionError, ExtensionMetadata, ExtensionRegistry,
    LoadedExtension,
};
pub use models::{
    cache_key, Chapter, ChapterEntry, FilterDescriptor, FilterOption, FilterValue, Identity,
    Manga, MangaEntry, MangaPage, MangaStatus, ReadingStatus,
};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::config::{defaults, env_vars, Config};
    pub use crate::extension::{
        Capabilities, ErrorKind, Extension, ExtensionError, ExtensionMetadata, ExtensionRegistry,
        HttpRequest, HttpResponse, HttpTransport, Result,
    };
    pub use crate::models::{
        ChapterEntry, FilterDescriptor, FilterValue, MangaEntry, MangaPage, MangaStatus,
    };
}
