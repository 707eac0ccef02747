//! A module loader that never touches the platform loader.
//!
//! A "module file" is a JSON [`ModuleSpec`]. Opening it counts a handle;
//! dropping the returned library counts a release.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nonbiri_core::extension::{
    Capabilities, Extension, ExtensionError, ModuleLibrary, ModuleLoader, Result, ABI_VERSION,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::extension::MockExtension;

/// How a fake module behaves when loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleBehavior {
    #[default]
    Ok,
    MissingInit,
    MissingCreate,
    NullInstance,
}

/// Contents of a fake module file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub id: String,
    pub version: String,
    #[serde(default = "default_abi")]
    pub abi: u32,
    #[serde(default)]
    pub behavior: ModuleBehavior,
}

fn default_abi() -> u32 {
    ABI_VERSION
}

impl ModuleSpec {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            abi: ABI_VERSION,
            behavior: ModuleBehavior::Ok,
        }
    }

    pub fn with_abi(mut self, abi: u32) -> Self {
        self.abi = abi;
        self
    }

    pub fn with_behavior(mut self, behavior: ModuleBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Write the module into `dir` under `file_name`.
    pub fn write(&self, dir: &Path, file_name: &str) -> std::io::Result<PathBuf> {
        let path = dir.join(file_name);
        std::fs::write(&path, self.to_bytes())?;
        Ok(path)
    }
}

/// Counts opened and released module handles.
#[derive(Debug, Default)]
pub struct HandleCounter {
    opened: AtomicUsize,
    released: AtomicUsize,
    initialized: AtomicUsize,
}

impl HandleCounter {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Handles currently open.
    pub fn live(&self) -> usize {
        self.opened() - self.released()
    }

    /// Calls to the capability-injection entry point.
    pub fn initialized(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }
}

type Factory = Arc<dyn Fn(&ModuleSpec) -> MockExtension + Send + Sync>;

/// [`ModuleLoader`] over fake module files.
#[derive(Clone, Default)]
pub struct MockModuleLoader {
    handles: Arc<HandleCounter>,
    factories: Arc<RwLock<HashMap<String, Factory>>>,
}

impl MockModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handles(&self) -> Arc<HandleCounter> {
        Arc::clone(&self.handles)
    }

    /// Build instances for module `id` with `factory` instead of an empty
    /// [`MockExtension`].
    pub fn with_factory(
        self,
        id: &str,
        factory: impl Fn(&ModuleSpec) -> MockExtension + Send + Sync + 'static,
    ) -> Self {
        self.factories
            .write()
            .insert(id.to_string(), Arc::new(factory));
        self
    }
}

impl ModuleLoader for MockModuleLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleLibrary>> {
        let bytes = std::fs::read(path)
            .map_err(|_| ExtensionError::NotFound(path.display().to_string()))?;
        let spec: ModuleSpec = serde_json::from_slice(&bytes).map_err(|e| {
            ExtensionError::LoadFailed(format!("Failed to load library {}: {}", path.display(), e))
        })?;

        self.handles.opened.fetch_add(1, Ordering::SeqCst);
        let factory = self.factories.read().get(&spec.id).cloned();
        Ok(Box::new(MockLibrary {
            spec,
            path: path.to_path_buf(),
            handles: Arc::clone(&self.handles),
            factory,
        }))
    }
}

struct MockLibrary {
    spec: ModuleSpec,
    path: PathBuf,
    handles: Arc<HandleCounter>,
    factory: Option<Factory>,
}

impl ModuleLibrary for MockLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn init(&self, _capabilities: &Capabilities) -> Result<u32> {
        if self.spec.behavior == ModuleBehavior::MissingInit {
            return Err(ExtensionError::SymbolNotFound(
                "nonbiri_extension_init".into(),
            ));
        }
        self.handles.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(self.spec.abi)
    }

    fn create(&self) -> Result<Box<dyn Extension>> {
        match self.spec.behavior {
            ModuleBehavior::MissingCreate => Err(ExtensionError::SymbolNotFound(
                "nonbiri_extension_create".into(),
            )),
            ModuleBehavior::NullInstance => {
                Err(ExtensionError::NullInstance(self.path.display().to_string()))
            }
            _ => {
                let instance = match &self.factory {
                    Some(factory) => factory(&self.spec),
                    None => MockExtension::new(&self.spec.id, &self.spec.version),
                };
                Ok(Box::new(instance))
            }
        }
    }
}

impl Drop for MockLibrary {
    fn drop(&mut self) {
        self.handles.released.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(path = %self.path.display(), "Released mock module");
    }
}
