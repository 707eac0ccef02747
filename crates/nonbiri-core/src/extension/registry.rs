//! Extension registry for managing dynamically loaded modules.
//!
//! The registry provides:
//! - Module lifecycle (load, unload, install, update, remove)
//! - Discovery of installed modules at start-up
//! - The remote index, refreshed on a cooldown
//!
//! The loaded set and the index sit behind independent locks. Whenever both
//! are needed they are taken in the order `loaded` then `index`. Native loader
//! calls and network transfers run outside both locks; only the map mutation
//! itself is done under the write lock.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::capability::{Capabilities, HttpRequest};
use super::handle::LoadedExtension;
use super::index::{compute_sha256, index_url, module_file_name, parse_index, ExtensionDescriptor};
use super::loader::{discover_modules, ModuleLoader, NativeModuleLoader};
use super::system::{ExtensionError, ExtensionMetadata, Result, ABI_VERSION};
use crate::config::{defaults, Config};

/// Semantic relation between an installed version and the published one.
///
/// Informational only; the update flag itself is an exact string mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionChange {
    Same,
    Upgrade,
    Downgrade,
    /// Versions differ but at least one is not semver.
    Unknown,
}

impl VersionChange {
    pub fn between(installed: &str, published: &str) -> Self {
        if installed == published {
            return Self::Same;
        }

        let parse = |v: &str| semver::Version::parse(v.trim_start_matches('v')).ok();
        match (parse(installed), parse(published)) {
            (Some(a), Some(b)) => {
                let ordering = (a.major, a.minor, a.patch)
                    .cmp(&(b.major, b.minor, b.patch))
                    .then_with(|| a.pre.cmp(&b.pre));
                match ordering {
                    Ordering::Less => Self::Upgrade,
                    Ordering::Greater => Self::Downgrade,
                    // Only build metadata differs.
                    Ordering::Equal => Self::Same,
                }
            }
            _ => Self::Unknown,
        }
    }
}

/// Update flag for a loaded version against the index.
fn has_update(version: &str, descriptor: Option<&ExtensionDescriptor>) -> bool {
    descriptor.map(|d| d.version != version).unwrap_or(false)
}

/// Information about a loaded extension.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionInfo {
    #[serde(flatten)]
    pub metadata: ExtensionMetadata,
    /// Module file it was loaded from
    pub path: PathBuf,
    pub has_update: bool,
    /// Version published by the index, if listed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_change: Option<VersionChange>,
    pub loaded_at: chrono::DateTime<chrono::Utc>,
}

/// An index descriptor annotated with local state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub id: String,
    #[serde(flatten)]
    pub descriptor: ExtensionDescriptor,
    pub installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,
    pub has_update: bool,
}

/// Registry for managing extensions.
pub struct ExtensionRegistry {
    /// Loaded extensions by id
    loaded: RwLock<HashMap<String, Arc<LoadedExtension>>>,
    /// Remote index by id
    index: RwLock<HashMap<String, ExtensionDescriptor>>,
    /// Time of the last refresh attempt; serializes refreshes
    refresh_gate: Mutex<Option<Instant>>,
    /// One install/remove at a time
    install_lock: Mutex<()>,
    capabilities: Capabilities,
    loader: Box<dyn ModuleLoader>,
    install_dir: PathBuf,
    index_base_url: String,
    index_cooldown: Duration,
}

impl ExtensionRegistry {
    /// Create a registry over `install_dir` using the native loader.
    pub fn new(capabilities: Capabilities, install_dir: impl Into<PathBuf>) -> Self {
        Self {
            loaded: RwLock::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
            refresh_gate: Mutex::new(None),
            install_lock: Mutex::new(()),
            capabilities,
            loader: Box::new(NativeModuleLoader::new()),
            install_dir: install_dir.into(),
            index_base_url: defaults::INDEX_BASE_URL.to_string(),
            index_cooldown: Duration::from_secs(defaults::INDEX_COOLDOWN_SECS),
        }
    }

    pub fn from_config(config: &Config, capabilities: Capabilities) -> Self {
        Self::new(capabilities, &config.extensions_dir)
            .with_index_base_url(&config.index_base_url)
            .with_index_cooldown(config.index_cooldown())
    }

    pub fn with_loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_index_base_url(mut self, url: impl Into<String>) -> Self {
        self.index_base_url = url.into();
        self
    }

    pub fn with_index_cooldown(mut self, cooldown: Duration) -> Self {
        self.index_cooldown = cooldown;
        self
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Get a loaded extension by id.
    pub fn get(&self, id: &str) -> Option<Arc<LoadedExtension>> {
        self.loaded.read().get(id).cloned()
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.loaded.read().contains_key(id)
    }

    /// Snapshot of the loaded set, sorted by id.
    pub fn list(&self) -> Vec<ExtensionInfo> {
        let loaded = self.loaded.read();
        let index = self.index.read();

        let mut infos: Vec<ExtensionInfo> = loaded
            .values()
            .map(|ext| {
                let meta = ext.metadata();
                let published = index.get(&meta.id);
                ExtensionInfo {
                    metadata: meta.clone(),
                    path: ext.path().to_path_buf(),
                    has_update: ext.has_update(),
                    latest_version: published.map(|d| d.version.clone()),
                    version_change: published
                        .map(|d| VersionChange::between(&meta.version, &d.version)),
                    loaded_at: ext.loaded_at(),
                }
            })
            .collect();
        infos.sort_by(|a, b| a.metadata.id.cmp(&b.metadata.id));
        infos
    }

    /// Snapshot of the remote index, sorted by id.
    pub fn list_index(&self) -> Vec<IndexEntry> {
        let loaded = self.loaded.read();
        let index = self.index.read();

        let mut entries: Vec<IndexEntry> = index
            .values()
            .map(|descriptor| {
                let installed_version = loaded
                    .get(&descriptor.id)
                    .map(|ext| ext.metadata().version.clone());
                IndexEntry {
                    id: descriptor.id.clone(),
                    descriptor: descriptor.clone(),
                    installed: installed_version.is_some(),
                    has_update: installed_version
                        .as_deref()
                        .map(|v| has_update(v, Some(descriptor)))
                        .unwrap_or(false),
                    installed_version,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    /// One index descriptor.
    pub fn descriptor(&self, id: &str) -> Option<ExtensionDescriptor> {
        self.index.read().get(id).cloned()
    }

    /// Describe every loaded module as an index entry.
    ///
    /// Download paths are relative to the parent of the install directory
    /// (`<dir name>/<file name>`), matching a published `<dir>.json` placed
    /// next to the directory.
    pub fn build_index(&self) -> Result<Vec<ExtensionDescriptor>> {
        let dir_name = self
            .install_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let loaded: Vec<Arc<LoadedExtension>> = self.loaded.read().values().cloned().collect();
        let mut descriptors = Vec::with_capacity(loaded.len());
        for ext in loaded {
            let file_name = ext
                .path()
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .unwrap_or_else(|| module_file_name(ext.id()));
            let path = if dir_name.is_empty() {
                file_name
            } else {
                format!("{}/{}", dir_name, file_name)
            };
            let bytes = fs::read(ext.path())?;
            descriptors.push(
                ExtensionDescriptor::from_metadata(ext.metadata(), path)
                    .with_sha256(compute_sha256(&bytes)),
            );
        }
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(descriptors)
    }

    // ------------------------------------------------------------------
    // Structural mutations
    // ------------------------------------------------------------------

    /// Load every module present in the install directory.
    ///
    /// Failures are logged and skipped. Returns the ids that were loaded.
    pub fn discover(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for path in discover_modules(&self.install_dir) {
            match self.load(&path) {
                Ok(ext) => ids.push(ext.id().to_string()),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to load extension");
                }
            }
        }
        tracing::info!(count = ids.len(), dir = %self.install_dir.display(), "Discovered extensions");
        ids
    }

    /// Load a module file.
    ///
    /// Fails with [`ExtensionError::AlreadyLoaded`] if its id is present. Any
    /// failure after the file was opened releases the handle before
    /// returning, and leaves the loaded set untouched.
    pub fn load(&self, path: &Path) -> Result<Arc<LoadedExtension>> {
        let start = Instant::now();

        let library = self.loader.open(path)?;
        let abi = library.init(&self.capabilities)?;
        if abi != ABI_VERSION {
            return Err(ExtensionError::IncompatibleVersion {
                expected: ABI_VERSION,
                got: abi,
            });
        }
        let instance = library.create()?;
        let loaded = Arc::new(LoadedExtension::new(library, instance));
        let id = loaded.id().to_string();

        let mut extensions = self.loaded.write();
        if extensions.contains_key(&id) {
            drop(extensions);
            return Err(ExtensionError::AlreadyLoaded(id));
        }
        loaded.set_has_update(has_update(
            &loaded.metadata().version,
            self.index.read().get(&id),
        ));
        extensions.insert(id.clone(), Arc::clone(&loaded));
        drop(extensions);

        tracing::info!(
            extension_id = %id,
            version = %loaded.metadata().version,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded extension"
        );
        Ok(loaded)
    }

    /// Unload an extension.
    ///
    /// The instance is destroyed, then its library released, once the last
    /// outstanding reference is dropped.
    pub fn unload(&self, id: &str) -> Result<()> {
        let removed = self.loaded.write().remove(id);
        match removed {
            Some(ext) => {
                let path = ext.path().to_path_buf();
                drop(ext);
                tracing::info!(extension_id = %id, path = %path.display(), "Unloaded extension");
                Ok(())
            }
            None => Err(ExtensionError::NotLoaded(id.to_string())),
        }
    }

    /// Download and load a module listed in the index.
    pub fn install(&self, id: &str, force_update: bool) -> Result<Arc<LoadedExtension>> {
        let _guard = self.install_lock.lock();

        let descriptor = self
            .descriptor(id)
            .ok_or_else(|| ExtensionError::NotFound(id.to_string()))?;

        if !force_update && self.is_loaded(id) {
            return Err(ExtensionError::AlreadyInstalled(id.to_string()));
        }

        fs::create_dir_all(&self.install_dir)?;
        let path = self.install_dir.join(descriptor.file_name());

        if self.is_loaded(id) || path.exists() {
            if let Err(e) = self.unload(id) {
                tracing::debug!(extension_id = %id, error = %e, "Stale module was not loaded");
            }
        }
        if path.exists() {
            fs::remove_file(&path)?;
        }

        let bytes = self.download(&descriptor)?;
        let part = part_path(&path);
        fs::write(&part, &bytes)?;
        if let Err(e) = fs::rename(&part, &path) {
            let _ = fs::remove_file(&part);
            return Err(e.into());
        }

        tracing::info!(
            extension_id = %id,
            version = %descriptor.version,
            bytes = bytes.len(),
            "Installed extension"
        );
        self.load(&path)
    }

    /// Reinstall the latest published version.
    pub fn update(&self, id: &str) -> Result<Arc<LoadedExtension>> {
        self.install(id, true)
    }

    /// Unload an extension if loaded and delete its module file.
    pub fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.install_lock.lock();

        let loaded_path = self.get(id).map(|ext| ext.path().to_path_buf());
        if loaded_path.is_some() {
            if let Err(e) = self.unload(id) {
                tracing::warn!(extension_id = %id, error = %e, "Failed to unload before removal");
            }
        }

        let path = loaded_path.unwrap_or_else(|| self.install_dir.join(self.file_name_for(id)));
        if !path.exists() {
            return Err(ExtensionError::NotFound(id.to_string()));
        }
        fs::remove_file(&path)?;

        tracing::info!(extension_id = %id, path = %path.display(), "Removed extension");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Index
    // ------------------------------------------------------------------

    /// Refresh the index unless the last attempt is within the cooldown.
    ///
    /// Returns `true` if a fetch was performed. A failed fetch still starts a
    /// new cooldown window.
    pub fn refresh_index(&self) -> Result<bool> {
        let mut gate = self.refresh_gate.lock();
        if let Some(last) = *gate {
            if last.elapsed() < self.index_cooldown {
                tracing::debug!(
                    remaining_secs = (self.index_cooldown - last.elapsed()).as_secs(),
                    "Index refresh skipped, cooldown active"
                );
                return Ok(false);
            }
        }
        *gate = Some(Instant::now());

        let url = index_url(&self.index_base_url);
        let start = Instant::now();
        let response = self.capabilities.http().execute(HttpRequest::get(&url))?;
        if !response.is_success() {
            return Err(ExtensionError::DownloadFailed {
                url,
                status: response.status,
            });
        }
        let descriptors = parse_index(&response.body)?;
        let count = descriptors.len();

        *self.index.write() = descriptors;
        self.recompute_updates();

        tracing::info!(
            count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Refreshed extension index"
        );
        Ok(true)
    }

    /// Refresh the index regardless of the cooldown.
    pub fn force_refresh_index(&self) -> Result<bool> {
        *self.refresh_gate.lock() = None;
        self.refresh_index()
    }

    fn recompute_updates(&self) {
        let loaded = self.loaded.read();
        let index = self.index.read();
        for (id, ext) in loaded.iter() {
            ext.set_has_update(has_update(&ext.metadata().version, index.get(id)));
        }
    }

    fn file_name_for(&self, id: &str) -> String {
        self.index
            .read()
            .get(id)
            .map(|d| d.file_name())
            .unwrap_or_else(|| module_file_name(id))
    }

    fn download(&self, descriptor: &ExtensionDescriptor) -> Result<Vec<u8>> {
        let url = descriptor.download_url(&self.index_base_url);
        tracing::info!(extension_id = %descriptor.id, url = %url, "Downloading extension");

        let response = self.capabilities.http().execute(HttpRequest::get(&url))?;
        if !response.is_success() {
            return Err(ExtensionError::DownloadFailed {
                url,
                status: response.status,
            });
        }

        if let Some(expected) = &descriptor.sha256 {
            let got = compute_sha256(&response.body);
            if !got.eq_ignore_ascii_case(expected) {
                return Err(ExtensionError::ChecksumMismatch {
                    id: descriptor.id.clone(),
                    expected: expected.clone(),
                    got,
                });
            }
        }

        Ok(response.body)
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}
