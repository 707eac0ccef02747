//! Testing utilities for Nonbiri
//!
//! This crate provides in-process doubles for the extension runtime:
//! - A source with canned data that counts its fetches
//! - A module loader that reads module descriptions from plain files and
//!   counts opened and released handles
//! - An HTTP transport with scripted responses

pub mod extension;
pub mod loader;
pub mod transport;

pub use extension::{FetchCounts, MockExtension};
pub use loader::{HandleCounter, MockModuleLoader, ModuleBehavior, ModuleSpec};
pub use transport::MockTransport;
