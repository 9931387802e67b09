//! Component kinds for bundle-loader
//!
//! A kind is recognised purely by its folder postfix (`.tab`, `.pushbutton`,
//! ...). Each [`KindSpec`] carries the functions that build a component from
//! its folder and restore one from a text cache record, plus the roles of
//! the children it accepts. New kinds are added by registering a spec with
//! the [`KindRegistry`]; the parser never names a concrete kind.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::components::ComponentBody;
use crate::error::Result;

pub mod builtin;
pub mod registry;
pub mod scripts;

pub use builtin::builtin_kinds;
pub use registry::KindRegistry;
pub use scripts::BundleScripts;

/// Structural role of a kind. Parents accept children by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KindRole {
    Extension,
    Library,
    Tab,
    Panel,
    Stack,
    /// Button groups (pulldowns, split buttons).
    Group,
    Command,
}

/// Builds the payload of a component from its folder.
pub type BuildFn = fn(dir: &Path, spec: &KindSpec) -> Result<ComponentBody>;

/// Restores the payload of a component from text-cache attributes.
pub type RestoreFn =
    fn(spec: &KindSpec, attributes: serde_json::Value) -> std::result::Result<ComponentBody, String>;

/// One registered component kind.
#[derive(Clone)]
pub struct KindSpec {
    /// Tag stored on components and in text cache records.
    pub kind_id: String,
    /// Folder postfix including the dot, compared case-insensitively.
    pub postfix: String,
    pub role: KindRole,
    pub is_container: bool,
    /// Roles this kind accepts as children (empty for leaves).
    pub accepts: Vec<KindRole>,
    pub build: BuildFn,
    pub restore: RestoreFn,
}

impl KindSpec {
    pub fn new(
        kind_id: impl Into<String>,
        postfix: impl Into<String>,
        role: KindRole,
        build: BuildFn,
        restore: RestoreFn,
    ) -> Self {
        Self {
            kind_id: kind_id.into(),
            postfix: postfix.into(),
            role,
            is_container: false,
            accepts: Vec::new(),
            build,
            restore,
        }
    }

    /// Mark this kind as a container accepting the given child roles.
    pub fn container(mut self, accepts: &[KindRole]) -> Self {
        self.is_container = true;
        self.accepts = accepts.to_vec();
        self
    }

    /// Whether a bundle folder name carries this kind's postfix.
    pub fn matches_folder(&self, folder_name: &str) -> bool {
        match crate::components::split_bundle_name(folder_name) {
            Some((_, postfix)) => postfix.eq_ignore_ascii_case(&self.postfix),
            None => false,
        }
    }

    pub fn accepts_role(&self, role: KindRole) -> bool {
        self.accepts.contains(&role)
    }
}

impl fmt::Debug for KindSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindSpec")
            .field("kind_id", &self.kind_id)
            .field("postfix", &self.postfix)
            .field("role", &self.role)
            .field("is_container", &self.is_container)
            .field("accepts", &self.accepts)
            .finish()
    }
}
