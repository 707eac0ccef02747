//! Fetch-through caching and library reconciliation.
//!
//! [`Library`] sits between the extension registry and the library store.
//! Reads consult the entity caches, then the store, then the module; saves
//! write the durable copy and evict the transient one.

pub mod caches;
pub mod error;
pub mod service;

pub use caches::EntityCaches;
pub use error::{Error, Result};
pub use service::{Library, Listing};
