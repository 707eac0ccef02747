//! Extension runtime for Nonbiri.
//!
//! Extensions are dynamically loaded modules (.so/.dylib/.dll), one per
//! content provider. Each is built and shipped independently of the host.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  ExtensionRegistry                  │
//! │  - Loaded set (load, unload, install, remove)       │
//! │  - Remote index, refreshed on a cooldown            │
//! └─────────────────────────────────────────────────────┘
//!                          │
//!          ┌───────────────┼───────────────┐
//!          ▼               ▼               ▼
//!   ┌─────────────┐ ┌─────────────┐ ┌─────────────┐
//!   │ModuleLoader │ │LoadedExt.   │ │Capabilities │
//!   │(libloading) │ │instance+lib │ │(HTTP table) │
//!   └─────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! # Module ABI
//!
//! Modules must export these symbols for dynamic loading:
//! - `nonbiri_extension_init(*const Capabilities)` -> u32 (ABI version)
//! - `nonbiri_extension_create()` -> *mut Box<dyn Extension>
//!
//! # Usage
//!
//! ```rust,ignore
//! use nonbiri_core::extension::{Capabilities, ExtensionRegistry, ReqwestTransport};
//!
//! let transport = ReqwestTransport::new(Duration::from_secs(30))?;
//! let registry = ExtensionRegistry::new(Capabilities::new(Arc::new(transport)), "extensions");
//! registry.discover();
//! registry.refresh_index()?;
//! registry.install("mangadex", false)?;
//!
//! let ext = registry.get("mangadex").unwrap();
//! let page = ext.extension().latest(1)?;
//! ```

pub mod capability;
pub mod handle;
pub mod index;
pub mod loader;
pub mod registry;
pub mod system;

pub use capability::{
    Capabilities, HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport,
    TransportError,
};
pub use handle::LoadedExtension;
pub use index::{
    compute_sha256, index_url, module_file_name, parse_index, render_index, ExtensionDescriptor,
};
pub use loader::{is_native_extension, ModuleLibrary, ModuleLoader, NativeModuleLoader};
pub use registry::{ExtensionInfo, ExtensionRegistry, IndexEntry, VersionChange};
pub use system::{
    CreateFn, ErrorKind, Extension, ExtensionError, ExtensionMetadata, InitFn, Result,
    ABI_VERSION, CREATE_SYMBOL, INIT_SYMBOL,
};
