//! Remote extension index.
//!
//! The index is a JSON object keyed by extension id; each value describes one
//! installable module:
//!
//! ```json
//! {
//!   "mangadex": {
//!     "name": "MangaDex",
//!     "baseUrl": "https://mangadex.org",
//!     "language": "en",
//!     "version": "1.2.0",
//!     "isNsfw": false,
//!     "path": "linux/libmangadex.so"
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::system::{ExtensionError, ExtensionMetadata, Result};

/// One installable module as published by the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionDescriptor {
    /// Filled from the document key.
    #[serde(skip)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub language: String,
    pub version: String,
    #[serde(default)]
    pub is_nsfw: bool,
    /// Download path relative to the index base URL.
    #[serde(default)]
    pub path: String,
    /// Hex-encoded SHA-256 of the module file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl ExtensionDescriptor {
    /// Describe a loaded module, as the index builder publishes it.
    pub fn from_metadata(meta: &ExtensionMetadata, path: impl Into<String>) -> Self {
        Self {
            id: meta.id.clone(),
            name: meta.name.clone(),
            base_url: meta.base_url.clone(),
            language: meta.language.clone(),
            version: meta.version.clone(),
            is_nsfw: meta.is_nsfw,
            path: path.into(),
            sha256: None,
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }

    /// Local file name the module is installed under.
    pub fn file_name(&self) -> String {
        Path::new(&self.path)
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| module_file_name(&self.id))
    }

    /// Absolute download address for this module.
    pub fn download_url(&self, index_base_url: &str) -> String {
        let base = index_base_url.trim_end_matches('/');
        if self.path.is_empty() {
            format!("{}/{}/{}", base, platform_dir(), module_file_name(&self.id))
        } else {
            format!("{}/{}", base, self.path.trim_start_matches('/'))
        }
    }
}

/// Parse an index document.
pub fn parse_index(bytes: &[u8]) -> Result<HashMap<String, ExtensionDescriptor>> {
    let document: HashMap<String, ExtensionDescriptor> = serde_json::from_slice(bytes)
        .map_err(|e| ExtensionError::InvalidFormat(format!("Invalid extension index: {}", e)))?;

    Ok(document
        .into_iter()
        .map(|(id, mut descriptor)| {
            descriptor.id = id.clone();
            (id, descriptor)
        })
        .collect())
}

/// Serialize descriptors into an index document, keys sorted.
pub fn render_index<'a>(
    descriptors: impl IntoIterator<Item = &'a ExtensionDescriptor>,
) -> Result<String> {
    let document: BTreeMap<&str, &ExtensionDescriptor> = descriptors
        .into_iter()
        .map(|d| (d.id.as_str(), d))
        .collect();
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Address of the platform's index document under `base_url`.
pub fn index_url(base_url: &str) -> String {
    format!("{}/{}.json", base_url.trim_end_matches('/'), platform_dir())
}

/// Platform directory name used by the published index.
pub fn platform_dir() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else {
        "linux"
    }
}

/// Platform file name for a module id.
pub fn module_file_name(id: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.dll", id)
    } else if cfg!(target_os = "macos") {
        format!("lib{}.dylib", id)
    } else {
        format!("lib{}.so", id)
    }
}

/// Compute the hex-encoded SHA-256 of `bytes`.
pub fn compute_sha256(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
