//! Nonbiri Extension SDK
//!
//! Everything a source module needs: the [`Extension`] trait and entity
//! types, the [`export_extension!`] macro that emits the two entry points the
//! host resolves, and an [`http`] helper that routes requests through the
//! host's capability table instead of a client linked into the module.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use nonbiri_extension_sdk::prelude::*;
//!
//! struct Example {
//!     meta: ExtensionMetadata,
//! }
//!
//! impl Example {
//!     fn new() -> Self {
//!         Self {
//!             meta: ExtensionMetadata::new("example", "Example", "1.0.0")
//!                 .with_base_url("https://example.org"),
//!         }
//!     }
//! }
//!
//! impl Extension for Example {
//!     fn metadata(&self) -> &ExtensionMetadata {
//!         &self.meta
//!     }
//!
//!     fn latest(&self, page: u32) -> Result<MangaPage> {
//!         let body = http::get_text(&format!("https://example.org/latest?page={}", page))?;
//!         // parse body...
//!         Ok(MangaPage::default())
//!     }
//!     // search, manga, chapters, pages...
//! }
//!
//! export_extension!(Example::new);
//! ```
//!
//! Build the crate as a `cdylib`; the resulting file is what the host loads.

#[macro_use]
pub mod macros;
pub mod http;

pub use nonbiri_core::extension::{
    Capabilities, Extension, ExtensionError, ExtensionMetadata, HttpRequest, HttpResponse,
    Result, ABI_VERSION,
};
pub use nonbiri_core::models::{
    ChapterEntry, FilterDescriptor, FilterOption, FilterValue, MangaEntry, MangaPage, MangaStatus,
};

/// Prelude module with common imports
pub mod prelude {
    pub use crate::http;
    pub use crate::{
        export_extension, ChapterEntry, Extension, ExtensionError, ExtensionMetadata,
        FilterDescriptor, FilterOption, FilterValue, HttpRequest, HttpResponse, MangaEntry,
        MangaPage, MangaStatus, Result,
    };
    pub use serde_json::{json, Value};
}
