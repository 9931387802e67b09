//! Component model for bundle-loader
//!
//! The in-memory form of a bundle tree: [`Extension`] roots, [`Component`]
//! nodes, command metadata, context rules and the identity rules that give
//! every bundle a stable `unique_name`.

pub mod context;
pub mod identity;
pub mod layout;
pub mod metadata;
pub mod types;

pub use context::{AvailabilityContext, ContextClause, ContextExpr, ContextRule, ContextSpec};
pub use identity::{cleanup_identifier, split_bundle_name, unique_name_for};
pub use layout::display_order;
pub use metadata::{BundleMetadata, LegacyScriptParams};
pub use types::{
    CommandBundle, Component, ComponentBody, ContainerInfo, EngineOptions, Extension,
    ExtensionManifest, ExtensionType, ScriptLanguage, HOOKS_DIR_NAME, LIBRARY_DIR_NAME,
    LIB_EXTENSION_POSTFIX, UI_EXTENSION_POSTFIX,
};
