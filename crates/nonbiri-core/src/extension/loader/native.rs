//! Native module loader using libloading.
//!
//! Loads modules compiled as dynamic libraries (.so, .dylib, .dll) and
//! resolves their entry points by exact symbol name.

use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use super::{is_native_extension, ModuleLibrary, ModuleLoader};
use crate::extension::capability::Capabilities;
use crate::extension::system::{
    CreateFn, Extension, ExtensionError, InitFn, Result, CREATE_SYMBOL, INIT_SYMBOL,
};

/// An open native library.
pub struct NativeModule {
    library: Library,
    path: PathBuf,
}

impl NativeModule {
    fn symbol_name(symbol: &[u8]) -> String {
        String::from_utf8_lossy(symbol).into_owned()
    }
}

impl ModuleLibrary for NativeModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn init(&self, capabilities: &Capabilities) -> Result<u32> {
        let init: Symbol<InitFn> = unsafe { self.library.get(INIT_SYMBOL) }.map_err(|e| {
            ExtensionError::SymbolNotFound(format!("{}: {}", Self::symbol_name(INIT_SYMBOL), e))
        })?;

        // The table outlives the call; modules clone what they keep.
        let version = unsafe { init(capabilities as *const Capabilities) };
        Ok(version)
    }

    fn create(&self) -> Result<Box<dyn Extension>> {
        let create: Symbol<CreateFn> = unsafe { self.library.get(CREATE_SYMBOL) }.map_err(|e| {
            ExtensionError::SymbolNotFound(format!("{}: {}", Self::symbol_name(CREATE_SYMBOL), e))
        })?;

        let raw = unsafe { create() };
        if raw.is_null() {
            return Err(ExtensionError::NullInstance(self.path.display().to_string()));
        }

        // SAFETY: the factory hands over a pointer produced by `Box::into_raw`.
        let boxed = unsafe { Box::from_raw(raw) };
        Ok(*boxed)
    }
}

/// Loader for native modules.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeModuleLoader;

impl NativeModuleLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLoader for NativeModuleLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleLibrary>> {
        if !path.is_file() {
            return Err(ExtensionError::NotFound(path.display().to_string()));
        }

        if !is_native_extension(path) {
            return Err(ExtensionError::InvalidFormat(format!(
                "Not a native library file: {}",
                path.display()
            )));
        }

        let library = unsafe { Library::new(path) }.map_err(|e| {
            ExtensionError::LoadFailed(format!("Failed to load library {}: {}", path.display(), e))
        })?;

        tracing::debug!(path = %path.display(), "Opened native module");

        Ok(Box::new(NativeModule {
            library,
            path: path.to_path_buf(),
        }))
    }
}
