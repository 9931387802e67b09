//! Kind registry
//!
//! Holds the registered [`KindSpec`]s and answers the two questions the
//! pipeline asks: "which kind is this folder?" (parser) and "which kind has
//! this id?" (text cache restore).

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use crate::components::ExtensionType;
use crate::error::{LoaderError, Result};

use super::builtin::builtin_kinds;
use super::{KindRole, KindSpec};

/// Registry of component kinds, indexed by kind id.
///
/// Postfixes are unique across kinds: registering a spec whose postfix is
/// already claimed by a different kind id fails and leaves the registry
/// unchanged. Registering an existing kind id replaces that kind.
pub struct KindRegistry {
    kinds: Vec<KindSpec>,
    by_id: HashMap<String, usize>,
}

impl KindRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            kinds: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// Create a registry holding every builtin kind.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for spec in builtin_kinds() {
            registry.insert(spec);
        }
        registry
    }

    /// Register a kind.
    ///
    /// # Errors
    /// `LoaderError::Config` if another kind already uses the same postfix.
    pub fn register(&mut self, spec: KindSpec) -> Result<()> {
        if let Some(existing) = self
            .kinds
            .iter()
            .find(|k| k.postfix.eq_ignore_ascii_case(&spec.postfix) && k.kind_id != spec.kind_id)
        {
            return Err(LoaderError::Config(format!(
                "Postfix '{}' of kind '{}' conflicts with existing kind '{}'",
                spec.postfix, spec.kind_id, existing.kind_id
            )));
        }

        info!(
            kind = %spec.kind_id,
            postfix = %spec.postfix,
            role = ?spec.role,
            "Registered component kind"
        );
        self.insert(spec);
        Ok(())
    }

    fn insert(&mut self, spec: KindSpec) {
        match self.by_id.get(&spec.kind_id) {
            Some(&index) => self.kinds[index] = spec,
            None => {
                self.by_id.insert(spec.kind_id.clone(), self.kinds.len());
                self.kinds.push(spec);
            }
        }
    }

    /// Look up a kind by id.
    pub fn get(&self, kind_id: &str) -> Option<&KindSpec> {
        self.by_id.get(kind_id).map(|&index| &self.kinds[index])
    }

    /// Find the kind of the folder at `path`, restricted to `accepted` roles.
    ///
    /// Only the folder name's postfix is inspected, plus a check that the
    /// path is an existing directory.
    pub fn match_path(&self, path: &Path, accepted: &[KindRole]) -> Option<&KindSpec> {
        if !path.is_dir() {
            return None;
        }
        let folder_name = path.file_name()?.to_string_lossy();
        let found = self
            .kinds
            .iter()
            .find(|k| accepted.contains(&k.role) && k.matches_folder(&folder_name));
        if found.is_none() {
            debug!(path = %path.display(), "No accepted kind matches folder");
        }
        found
    }

    /// Registered kinds in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = &KindSpec> {
        self.kinds.iter()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// Child roles accepted directly under an extension root.
pub fn root_child_roles(extension_type: ExtensionType) -> &'static [KindRole] {
    match extension_type {
        ExtensionType::Ui => &[KindRole::Tab],
        ExtensionType::Library => &[],
    }
}
