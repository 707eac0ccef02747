//! Module loaders.
//!
//! A [`ModuleLoader`] turns a file on disk into a [`ModuleLibrary`], an open
//! platform handle from which the two entry points are invoked. The registry
//! only sees these traits, so tests can substitute an in-process loader.

pub mod native;

pub use native::{NativeModule, NativeModuleLoader};

use std::path::{Path, PathBuf};

use super::capability::Capabilities;
use super::system::{Extension, Result};

/// An open module file.
///
/// Dropping the value releases the platform handle. Any instance obtained
/// from [`create`](ModuleLibrary::create) must be dropped first.
pub trait ModuleLibrary: Send + Sync {
    /// File the module was opened from.
    fn path(&self) -> &Path;

    /// Invoke the capability-injection entry point; returns the module's ABI
    /// version.
    fn init(&self, capabilities: &Capabilities) -> Result<u32>;

    /// Invoke the factory entry point.
    fn create(&self) -> Result<Box<dyn Extension>>;
}

/// Opens module files.
pub trait ModuleLoader: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleLibrary>>;
}

/// Check if a file has the platform's shared-library suffix.
pub fn is_native_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| matches!(ext, "so" | "dylib" | "dll"))
        .unwrap_or(false)
}

/// Module files in `dir`, sorted by name. A missing directory yields nothing.
pub fn discover_modules(dir: &Path) -> Vec<PathBuf> {
    let mut modules: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_native_extension(path))
            .collect(),
        Err(_) => Vec::new(),
    };
    modules.sort();
    modules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_native_extension() {
        assert!(is_native_extension(Path::new("libmangadex.so")));
        assert!(is_native_extension(Path::new("mangadex.dll")));
        assert!(is_native_extension(Path::new("libmangadex.dylib")));
        assert!(!is_native_extension(Path::new("libmangadex.so.part")));
        assert!(!is_native_extension(Path::new("linux.json")));
    }

    #[test]
    fn test_discover_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("libb.so"), b"").unwrap();
        std::fs::write(dir.path().join("liba.so"), b"").unwrap();
        std::fs::write(dir.path().join("liba.so.part"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let found = discover_modules(dir.path());
        let names: Vec<_> = found
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(names, vec!["liba.so", "libb.so"]);
    }

    #[test]
    fn test_discover_missing_dir() {
        assert!(discover_modules(Path::new("/nonexistent/nonbiri/extensions")).is_empty());
    }
}
