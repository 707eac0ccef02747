//! A loaded module: one open library and the instance it produced.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use super::loader::ModuleLibrary;
use super::system::{Extension, ExtensionMetadata};

/// Owns an extension instance together with the library backing its code.
///
/// The library is never exposed on its own. On drop the instance is
/// destroyed first and the library released second, so no instance code
/// runs after its mapping is gone.
pub struct LoadedExtension {
    // Fields drop in declaration order: `instance` must stay above `library`.
    instance: Box<dyn Extension>,
    library: Box<dyn ModuleLibrary>,
    has_update: AtomicBool,
    loaded_at: DateTime<Utc>,
}

impl LoadedExtension {
    pub(crate) fn new(library: Box<dyn ModuleLibrary>, instance: Box<dyn Extension>) -> Self {
        Self {
            instance,
            library,
            has_update: AtomicBool::new(false),
            loaded_at: Utc::now(),
        }
    }

    pub fn extension(&self) -> &dyn Extension {
        self.instance.as_ref()
    }

    pub fn metadata(&self) -> &ExtensionMetadata {
        self.instance.metadata()
    }

    pub fn id(&self) -> &str {
        &self.metadata().id
    }

    /// Module file this instance was loaded from.
    pub fn path(&self) -> &Path {
        self.library.path()
    }

    /// Whether the index publishes a different version than the loaded one.
    pub fn has_update(&self) -> bool {
        self.has_update.load(Ordering::Acquire)
    }

    pub(crate) fn set_has_update(&self, value: bool) {
        self.has_update.store(value, Ordering::Release);
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

impl fmt::Debug for LoadedExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedExtension")
            .field("id", &self.id())
            .field("version", &self.metadata().version)
            .field("path", &self.path())
            .field("has_update", &self.has_update())
            .finish()
    }
}
