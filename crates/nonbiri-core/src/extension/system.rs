//! Nonbiri extension system - source module interface
//!
//! This module defines what a source module looks like from the host:
//! - Descriptive metadata (id, name, base URL, language, version, maturity)
//! - Fetch operations (latest listing, search, detail, chapters, pages)
//! - Optional search filters and module preferences
//!
//! # FFI Exports for Dynamic Loading
//!
//! Modules must export these symbols for dynamic loading:
//! - `nonbiri_extension_init(*const Capabilities)` -> u32 (ABI version)
//! - `nonbiri_extension_create()` -> *mut Box<dyn Extension>

use serde::{Deserialize, Serialize};

use crate::models::{ChapterEntry, FilterDescriptor, FilterValue, MangaEntry, MangaPage};

// ============================================================================
// ABI
// ============================================================================

/// ABI version for dynamic loading
/// Incremented when breaking changes are made to the extension interface
pub const ABI_VERSION: u32 = 1;

/// Symbol of the capability-injection entry point.
pub const INIT_SYMBOL: &[u8] = b"nonbiri_extension_init";

/// Symbol of the factory entry point.
pub const CREATE_SYMBOL: &[u8] = b"nonbiri_extension_create";

/// Signature of the capability-injection entry point.
pub type InitFn = unsafe extern "C" fn(*const super::Capabilities) -> u32;

/// Signature of the factory entry point.
///
/// Returns a thin pointer to a boxed trait object; null means the module
/// could not produce an instance.
#[allow(improper_ctypes_definitions)]
pub type CreateFn = unsafe extern "C" fn() -> *mut Box<dyn Extension>;

// ============================================================================
// Extension Trait
// ============================================================================

/// A content provider.
///
/// Implemented once per module and handed to the host through the factory
/// entry point. All methods are blocking; the host calls them from request
/// threads, possibly concurrently.
pub trait Extension: Send + Sync {
    /// Get extension metadata
    fn metadata(&self) -> &ExtensionMetadata;

    /// Latest updates, one page at a time (pages start at 1).
    fn latest(&self, page: u32) -> Result<MangaPage>;

    /// Search by free-text query and module-specific filters.
    fn search(&self, page: u32, query: &str, filters: &[FilterValue]) -> Result<MangaPage>;

    /// Full detail record for a source-relative path.
    fn manga(&self, path: &str) -> Result<MangaEntry>;

    /// Chapter listing for a manga path.
    fn chapters(&self, path: &str) -> Result<Vec<ChapterEntry>>;

    /// Page image URLs for a chapter path.
    fn pages(&self, path: &str) -> Result<Vec<String>>;

    /// Optional: search filters the module understands
    fn filters(&self) -> Vec<FilterDescriptor> {
        Vec::new()
    }

    /// Optional: current module preferences
    fn preferences(&self) -> Option<serde_json::Value> {
        None
    }

    /// Optional: update module preferences, returning the new values
    fn set_preferences(&self, _values: &serde_json::Value) -> Result<serde_json::Value> {
        Err(ExtensionError::NotSupported(format!(
            "{} does not support preferences",
            self.metadata().id
        )))
    }
}

/// Extension metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionMetadata {
    /// Unique extension identifier, stable across versions
    pub id: String,
    /// Display name
    pub name: String,
    /// Base address of the provider
    pub base_url: String,
    /// Language tag
    pub language: String,
    /// Version string as published by the module
    pub version: String,
    /// Whether the provider serves adult content
    #[serde(default)]
    pub is_nsfw: bool,
}

impl ExtensionMetadata {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            base_url: String::new(),
            language: String::from("en"),
            version: version.into(),
            is_nsfw: false,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_nsfw(mut self, is_nsfw: bool) -> Self {
        self.is_nsfw = is_nsfw;
        self
    }

    /// Parse the version as semver, if it is one.
    pub fn semver(&self) -> Option<semver::Version> {
        semver::Version::parse(self.version.trim_start_matches('v')).ok()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Coarse classification of a failure, for callers mapping errors to
/// responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown provider, module or entity.
    NotFound,
    /// Already loaded or installed.
    Conflict,
    /// Download or network failure, including non-success status.
    Transport,
    /// Missing entry point, null instance or ABI mismatch.
    Abi,
    /// Filesystem, transaction or write failure.
    Storage,
    /// The module itself failed to produce a result.
    Source,
    /// Malformed input or document.
    InvalidInput,
}

/// Extension errors
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    #[error("Extension not found: {0}")]
    NotFound(String),

    #[error("Extension not loaded: {0}")]
    NotLoaded(String),

    #[error("Extension already loaded: {0}")]
    AlreadyLoaded(String),

    #[error("Extension already installed: {0}")]
    AlreadyInstalled(String),

    #[error("Download failed: {url} returned status {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Checksum mismatch for {id}: expected {expected}, got {got}")]
    ChecksumMismatch {
        id: String,
        expected: String,
        got: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Load failed: {0}")]
    LoadFailed(String),

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Incompatible ABI version: expected {expected}, got {got}")]
    IncompatibleVersion { expected: u32, got: u32 },

    #[error("Factory returned no instance: {0}")]
    NullInstance(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExtensionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::NotLoaded(_) => ErrorKind::NotFound,
            Self::AlreadyLoaded(_) | Self::AlreadyInstalled(_) => ErrorKind::Conflict,
            Self::DownloadFailed { .. } | Self::ChecksumMismatch { .. } | Self::Transport(_) => {
                ErrorKind::Transport
            }
            Self::LoadFailed(_)
            | Self::SymbolNotFound(_)
            | Self::IncompatibleVersion { .. }
            | Self::NullInstance(_) => ErrorKind::Abi,
            Self::InvalidFormat(_) | Self::Json(_) => ErrorKind::InvalidInput,
            Self::NotSupported(_) | Self::Fetch(_) => ErrorKind::Source,
            Self::Io(_) => ErrorKind::Storage,
        }
    }
}

/// Result type for extension operations
pub type Result<T> = std::result::Result<T, ExtensionError>;

// ============================================================================
// Tests
// ============================================================================
