//! Bundle tree parser for bundle-loader
//!
//! Walks an extension folder and builds its [`Component`] tree. The parser
//! knows no concrete kinds: every folder is matched against the
//! [`KindRegistry`], restricted to the roles its parent accepts. Children keep
//! filesystem enumeration order.
//!
//! Failures are isolated per bundle. A bundle that cannot be built is logged
//! and skipped, and a folder that cannot be listed yields no children. Only a
//! missing extension root is an error.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::components::types::ICON_FILE_NAME;
use crate::components::{Component, Extension, ExtensionType, LIBRARY_DIR_NAME};
use crate::error::{LoaderError, Result};
use crate::kinds::registry::root_child_roles;
use crate::kinds::{KindRegistry, KindRole, KindSpec};

/// Whether a folder entry is ignored by the walk.
fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

/// Discover extension folders directly under `root`.
///
/// Returns `(path, type)` for every `*.extension` and `*.lib` folder sorted
/// by path, without parsing them.
///
/// # Errors
/// `LoaderError::Structural` if `root` is not a directory.
pub fn discover_extensions(root: &Path) -> Result<Vec<(PathBuf, ExtensionType)>> {
    if !root.is_dir() {
        return Err(LoaderError::structural(
            root,
            "extension root is not a directory",
        ));
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Unreadable entry in extension root");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_hidden(&name) {
            continue;
        }
        if let Some(extension_type) = ExtensionType::from_folder_name(&name) {
            debug!(path = %path.display(), kind = ?extension_type, "Discovered extension folder");
            found.push((path, extension_type));
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

/// Builds component trees using a kind registry.
pub struct TreeParser<'a> {
    registry: &'a KindRegistry,
}

impl<'a> TreeParser<'a> {
    pub fn new(registry: &'a KindRegistry) -> Self {
        Self { registry }
    }

    /// Populate the children of an extension stub.
    ///
    /// # Errors
    /// `LoaderError::Structural` if the extension folder no longer exists.
    pub fn parse(&self, mut extension: Extension) -> Result<Extension> {
        if !extension.directory.is_dir() {
            return Err(LoaderError::structural(
                &extension.directory,
                "extension directory does not exist",
            ));
        }

        let accepted = root_child_roles(extension.extension_type);
        extension.children = self.parse_children(&extension.directory, accepted);
        extension.apply_templates();

        info!(
            extension = %extension.name,
            components = extension.component_count(),
            commands = extension.commands().len(),
            "Parsed extension"
        );
        Ok(extension)
    }

    /// Build a single command component from its bundle folder.
    ///
    /// # Errors
    /// `LoaderError::ComponentParse` if the folder is not a command bundle of
    /// a registered kind, or its metadata is invalid.
    pub fn parse_command_dir(&self, path: &Path) -> Result<Component> {
        let spec = self
            .registry
            .match_path(path, &[KindRole::Command])
            .ok_or_else(|| LoaderError::component(path, "not a command bundle"))?;
        self.build_component(path, spec)
    }

    fn parse_children(&self, dir: &Path, accepted: &[KindRole]) -> Vec<Component> {
        if accepted.is_empty() {
            return Vec::new();
        }

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Cannot list bundle folder, no children");
                return Vec::new();
            }
        };

        let mut children = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Unreadable folder entry, skipping");
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_hidden(&name) {
                continue;
            }
            let path = entry.path();
            let Some(spec) = self.registry.match_path(&path, accepted) else {
                continue;
            };

            match self.build_component(&path, spec) {
                Ok(component) => {
                    debug!(
                        kind = %component.kind_id,
                        unique_name = %component.unique_name,
                        "Parsed bundle"
                    );
                    children.push(component);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse bundle, skipping");
                }
            }
        }
        children
    }

    fn build_component(&self, path: &Path, spec: &KindSpec) -> Result<Component> {
        let body = (spec.build)(path, spec)?;
        let mut component = Component::for_directory(path, spec.kind_id.clone(), spec.is_container, body);

        if component.is_command() {
            component.search_paths.push(path.to_path_buf());
        }
        let lib_dir = path.join(LIBRARY_DIR_NAME);
        if lib_dir.is_dir() {
            component.search_paths.push(lib_dir);
        }
        let icon = path.join(ICON_FILE_NAME);
        if icon.is_file() {
            component.icon = Some(icon);
        }

        if spec.is_container {
            component.children = self.parse_children(path, &spec.accepts);
        }
        Ok(component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::HashMode;
    use crate::components::{ContextExpr, ScriptLanguage};
    use tempfile::TempDir;

    fn stub(dir: &Path) -> Extension {
        Extension::stub(dir, ExtensionType::Ui, "1", HashMode::Metadata).unwrap()
    }

    fn make_button(dir: &Path, script: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(script), "").unwrap();
    }

    #[test]
    fn test_discover_extensions() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("Tools.extension")).unwrap();
        fs::create_dir_all(tmp.path().join("Shared.lib")).unwrap();
        fs::create_dir_all(tmp.path().join(".Hidden.extension")).unwrap();
        fs::create_dir_all(tmp.path().join("random")).unwrap();
        fs::write(tmp.path().join("File.extension"), "").unwrap();

        let found = discover_extensions(tmp.path()).unwrap();
        assert_eq!(
            found,
            vec![
                (tmp.path().join("Shared.lib"), ExtensionType::Library),
                (tmp.path().join("Tools.extension"), ExtensionType::Ui),
            ]
        );
    }

    #[test]
    fn test_discover_missing_root_is_structural() {
        let err = discover_extensions(Path::new("/no/such/root")).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_end_to_end_single_button() {
        let tmp = TempDir::new().unwrap();
        let ext_dir = tmp.path().join("MyTools.extension");
        let button = ext_dir.join("Tab1.tab/PanelA.panel/RunIt.pushbutton");
        make_button(&button, "script.py");
        fs::write(button.join("bundle.yaml"), "context:\n  all-of: [wall, door]\n").unwrap();

        let registry = KindRegistry::with_builtin();
        let ext = TreeParser::new(&registry).parse(stub(&ext_dir)).unwrap();

        assert_eq!(ext.children.len(), 1);
        let tab = &ext.children[0];
        assert_eq!(tab.kind_id, "tab");
        let panel = &tab.children[0];
        assert_eq!(panel.kind_id, "panel");
        let run = &panel.children[0];
        assert_eq!(run.unique_name, "MyTools_Tab1_PanelA_RunIt");
        assert_eq!(run.search_paths, vec![button.clone()]);

        let bundle = run.command().unwrap();
        assert_eq!(bundle.script_language, ScriptLanguage::Python);
        let rule = bundle.context.as_ref().unwrap();
        assert!(matches!(
            &rule.clauses()[0].expr,
            ContextExpr::AllOf(terms) if terms == &vec!["wall".to_string(), "door".to_string()]
        ));
    }

    #[test]
    fn test_skips_hidden_and_unknown_folders() {
        let tmp = TempDir::new().unwrap();
        let ext_dir = tmp.path().join("T.extension");
        let panel = ext_dir.join("A.tab/P.panel");
        make_button(&panel.join("Good.pushbutton"), "script.py");
        make_button(&panel.join("_Hidden.pushbutton"), "script.py");
        make_button(&panel.join(".git.pushbutton"), "script.py");
        fs::create_dir_all(panel.join("notes")).unwrap();

        let registry = KindRegistry::with_builtin();
        let ext = TreeParser::new(&registry).parse(stub(&ext_dir)).unwrap();
        let panel = &ext.children[0].children[0];
        assert_eq!(panel.children.len(), 1);
        assert_eq!(panel.children[0].name, "Good");
    }

    #[test]
    fn test_role_filtering() {
        let tmp = TempDir::new().unwrap();
        let ext_dir = tmp.path().join("T.extension");
        // a button directly under a tab is not accepted there
        make_button(&ext_dir.join("A.tab/Stray.pushbutton"), "script.py");
        make_button(&ext_dir.join("A.tab/P.panel/Ok.pushbutton"), "script.py");
        // a panel directly under the extension is not accepted
        fs::create_dir_all(ext_dir.join("Loose.panel")).unwrap();

        let registry = KindRegistry::with_builtin();
        let ext = TreeParser::new(&registry).parse(stub(&ext_dir)).unwrap();
        assert_eq!(ext.children.len(), 1);
        let tab = &ext.children[0];
        assert_eq!(tab.children.len(), 1);
        assert_eq!(tab.children[0].kind_id, "panel");
    }

    #[test]
    fn test_failing_bundle_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let ext_dir = tmp.path().join("T.extension");
        let panel = ext_dir.join("A.tab/P.panel");
        make_button(&panel.join("Ok.pushbutton"), "script.py");
        let bad = panel.join("Bad.pushbutton");
        make_button(&bad, "script.py");
        fs::write(bad.join("bundle.yaml"), "title: [broken\n").unwrap();
        fs::create_dir_all(panel.join("NoLink.urlbutton")).unwrap();

        let registry = KindRegistry::with_builtin();
        let ext = TreeParser::new(&registry).parse(stub(&ext_dir)).unwrap();
        let panel = &ext.children[0].children[0];
        assert_eq!(panel.children.len(), 1);
        assert_eq!(panel.children[0].name, "Ok");
    }

    #[test]
    fn test_groups_and_lib_search_paths() {
        let tmp = TempDir::new().unwrap();
        let ext_dir = tmp.path().join("T.extension");
        let stack = ext_dir.join("A.tab/P.panel/S.stack");
        let pull = stack.join("More.pulldown");
        make_button(&pull.join("X.pushbutton"), "script.py");
        fs::create_dir_all(pull.join("lib")).unwrap();
        fs::write(pull.join("icon.png"), [0u8; 4]).unwrap();

        let registry = KindRegistry::with_builtin();
        let ext = TreeParser::new(&registry).parse(stub(&ext_dir)).unwrap();
        let stack_c = &ext.children[0].children[0].children[0];
        assert_eq!(stack_c.kind_id, "stack");
        let pull_c = &stack_c.children[0];
        assert_eq!(pull_c.kind_id, "pulldown");
        assert!(pull_c.is_container);
        assert_eq!(pull_c.search_paths, vec![pull.join("lib")]);
        assert_eq!(pull_c.icon, Some(pull.join("icon.png")));
        assert_eq!(pull_c.children[0].kind_id, "pushbutton");
    }

    #[test]
    fn test_missing_root_is_structural() {
        let tmp = TempDir::new().unwrap();
        let ext_dir = tmp.path().join("Gone.extension");
        fs::create_dir_all(&ext_dir).unwrap();
        let ext = stub(&ext_dir);
        fs::remove_dir_all(&ext_dir).unwrap();

        let registry = KindRegistry::with_builtin();
        let err = TreeParser::new(&registry).parse(ext).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_templates_applied_after_parse() {
        let tmp = TempDir::new().unwrap();
        let ext_dir = tmp.path().join("T.extension");
        let button = ext_dir.join("A.tab/P.panel/Go.pushbutton");
        make_button(&button, "script.py");
        fs::write(button.join("bundle.yaml"), "title: Go {{team}}\n").unwrap();
        fs::write(ext_dir.join("extension.json"), r#"{"templates": {"team": "BIM"}}"#).unwrap();

        let registry = KindRegistry::with_builtin();
        let ext = TreeParser::new(&registry).parse(stub(&ext_dir)).unwrap();
        assert_eq!(ext.commands()[0].title(), "Go BIM");
    }

    #[test]
    fn test_parse_command_dir() {
        let tmp = TempDir::new().unwrap();
        let button = tmp.path().join("T.extension/A.tab/P.panel/Go.pushbutton");
        make_button(&button, "script.rb");
        let registry = KindRegistry::with_builtin();
        let parser = TreeParser::new(&registry);

        let comp = parser.parse_command_dir(&button).unwrap();
        assert_eq!(comp.unique_name, "T_A_P_Go");
        assert_eq!(comp.command().unwrap().script_language, ScriptLanguage::Ruby);

        let panel = tmp.path().join("T.extension/A.tab/P.panel");
        assert!(parser.parse_command_dir(&panel).is_err());
    }

    #[test]
    fn test_library_extension_has_no_children() {
        let tmp = TempDir::new().unwrap();
        let lib_dir = tmp.path().join("Shared.lib");
        fs::create_dir_all(lib_dir.join("A.tab/P.panel")).unwrap();
        let stub = Extension::stub(&lib_dir, ExtensionType::Library, "1", HashMode::Metadata).unwrap();
        let registry = KindRegistry::with_builtin();
        let ext = TreeParser::new(&registry).parse(stub).unwrap();
        assert!(ext.children.is_empty());
    }
}
