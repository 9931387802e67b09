//! bundle-loader - discovers, caches and prepares file-system extension bundles
//!
//! An extension is a folder tree whose folder postfixes (`.tab`, `.panel`,
//! `.pushbutton`, ...) name the kind of each node. The loader parses that
//! tree, caches it keyed by a content hash, turns every command leaf into an
//! invocable artifact and registers the extension's hook scripts with the
//! host.

pub mod cache;
pub mod components;
pub mod config;
pub mod error;
pub mod hooks;
pub mod kinds;
pub mod loader;
pub mod parser;
pub mod synth;

pub use config::LoaderConfig;
pub use error::{LoaderError, Result};
pub use loader::{ExtensionLoader, LoadReport, LoadSource};
