//! Component model types.
//!
//! A parsed extension is a tree: the [`Extension`] root owns an ordered list
//! of [`Component`]s (tabs, panels, stacks, button groups and command leaves).
//! Every component knows its kind only through its `kind_id` string, so the
//! set of kinds stays open; the shape of its payload is one of
//! [`ComponentBody`]'s three variants.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::fingerprint::{content_hash, HashMode};
use crate::error::{LoaderError, Result};

use super::context::ContextRule;
use super::identity::{split_bundle_name, unique_name_for, UNIQUE_ID_SEPARATOR};

/// Folder postfix of UI extensions.
pub const UI_EXTENSION_POSTFIX: &str = ".extension";
/// Folder postfix of library-only extensions.
pub const LIB_EXTENSION_POSTFIX: &str = ".lib";
/// Extension manifest file name.
pub const EXTENSION_MANIFEST_FILE: &str = "extension.json";
/// Per-bundle library folder, added to search paths of all descendants.
pub const LIBRARY_DIR_NAME: &str = "lib";
/// Per-bundle hooks folder.
pub const HOOKS_DIR_NAME: &str = "hooks";
/// Default bundle icon.
pub const ICON_FILE_NAME: &str = "icon.png";
/// Extension startup scripts, in lookup order.
pub const STARTUP_SCRIPT_FILES: &[&str] = &["startup.py", "startup.cs", "startup.vb", "startup.rb"];

/// Kind id of separator layout markers.
pub const SEPARATOR_KIND: &str = "separator";
/// Kind id of slideout layout markers.
pub const SLIDEOUT_KIND: &str = "slideout";

// ---------------------------------------------------------------------------
// Script languages
// ---------------------------------------------------------------------------

/// Language (or non-script target) a command bundle runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptLanguage {
    /// Python on the host's embedded interpreter.
    Python,
    /// Python 3 script (`#! python3` hashbang).
    CPython,
    CSharp,
    VisualBasic,
    Ruby,
    Dynamo,
    Grasshopper,
    /// Static content placed into the document.
    Content,
    /// Hyperlink opened in a browser.
    Url,
    /// External assembly command class.
    Invoke,
    /// Link to another bundle's command or an assembly class.
    Link,
    /// Script bundle without a script file.
    Undetermined,
    /// Anything else, tagged by file extension.
    Unknown(String),
}

impl ScriptLanguage {
    /// Detect the language from a script path. `first_line` enables the
    /// CPython hashbang check for `.py` files.
    pub fn from_script_path(path: &Path, first_line: Option<&str>) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "py" => {
                let is_cpython = first_line
                    .map(|line| {
                        let compact: String = line.split_whitespace().collect();
                        compact.eq_ignore_ascii_case("#!python3")
                    })
                    .unwrap_or(false);
                if is_cpython {
                    ScriptLanguage::CPython
                } else {
                    ScriptLanguage::Python
                }
            }
            "cs" => ScriptLanguage::CSharp,
            "vb" => ScriptLanguage::VisualBasic,
            "rb" => ScriptLanguage::Ruby,
            "dyn" => ScriptLanguage::Dynamo,
            "gh" | "ghx" => ScriptLanguage::Grasshopper,
            other => ScriptLanguage::Unknown(other.to_string()),
        }
    }

    /// Whether the bundle needs a script file on disk to be runnable.
    pub fn requires_script(&self) -> bool {
        !matches!(
            self,
            ScriptLanguage::Content
                | ScriptLanguage::Url
                | ScriptLanguage::Invoke
                | ScriptLanguage::Link
        )
    }
}

// ---------------------------------------------------------------------------
// Component payloads
// ---------------------------------------------------------------------------

/// Engine flags a script command may request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Run in a fresh interpreter instead of a shared one.
    pub clean: bool,
    /// Load the full framework into the engine.
    pub full_frame: bool,
    /// Keep the engine alive after the command returns.
    pub persistent: bool,
}

/// Data carried by container bundles (tabs, panels, stacks, button groups).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Display title; defaults to the bundle name.
    pub title: Option<String>,
    /// Display order from bundle metadata (`---` separator, `>>>` slideout).
    pub layout: Vec<String>,
    pub collapsed: bool,
}

/// Metadata of a command leaf bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBundle {
    pub title: String,
    pub tooltip: Option<String>,
    pub author: Option<String>,
    pub help_url: Option<String>,
    pub min_host_version: Option<String>,
    pub max_host_version: Option<String>,
    pub min_framework_version: Option<String>,
    /// Script (or content) file the command runs.
    pub script_path: Option<PathBuf>,
    /// Alternate script run on modifier-click (or alternate content).
    pub config_script_path: Option<PathBuf>,
    pub context: Option<ContextRule>,
    pub script_language: ScriptLanguage,
    pub is_beta: bool,
    pub engine: EngineOptions,
    /// Target of URL buttons.
    pub hyperlink: Option<String>,
    /// Assembly of invoke and link buttons.
    pub assembly: Option<String>,
    pub command_class: Option<String>,
    pub availability_class: Option<String>,
    /// Unique name (or bundle name) of the command a link button forwards to.
    pub link_target: Option<String>,
}

impl CommandBundle {
    /// An empty bundle with the given title and language.
    pub fn new(title: impl Into<String>, script_language: ScriptLanguage) -> Self {
        Self {
            title: title.into(),
            tooltip: None,
            author: None,
            help_url: None,
            min_host_version: None,
            max_host_version: None,
            min_framework_version: None,
            script_path: None,
            config_script_path: None,
            context: None,
            script_language,
            is_beta: false,
            engine: EngineOptions::default(),
            hyperlink: None,
            assembly: None,
            command_class: None,
            availability_class: None,
            link_target: None,
        }
    }

    /// Whether a separate config script exists.
    pub fn has_config_script(&self) -> bool {
        self.config_script_path.is_some() && self.config_script_path != self.script_path
    }

    /// Substitute `{{key}}` tags from the extension manifest templates.
    pub fn apply_templates(&mut self, templates: &BTreeMap<String, String>) {
        if templates.is_empty() {
            return;
        }
        self.title = render_template(&self.title, templates);
        for field in [&mut self.tooltip, &mut self.author, &mut self.help_url] {
            if let Some(value) = field.as_mut() {
                *value = render_template(value, templates);
            }
        }
    }
}

fn render_template(value: &str, templates: &BTreeMap<String, String>) -> String {
    let mut out = value.to_string();
    for (key, replacement) in templates {
        let tag = format!("{{{{{}}}}}", key);
        if out.contains(&tag) {
            out = out.replace(&tag, replacement);
        }
    }
    out
}

/// Shape-specific payload of a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentBody {
    Container(ContainerInfo),
    Command(Box<CommandBundle>),
    /// Layout markers (separators, slideouts) carry nothing.
    Marker,
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A node of the parsed bundle tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Folder name without its kind postfix.
    pub name: String,
    /// Stable identity computed from the bundle path.
    pub unique_name: String,
    pub directory: PathBuf,
    pub kind_id: String,
    pub is_container: bool,
    /// Child components in filesystem enumeration order.
    pub children: Vec<Component>,
    /// Search paths contributed by this bundle (its `lib/`, and for commands
    /// the bundle folder itself).
    pub search_paths: Vec<PathBuf>,
    pub icon: Option<PathBuf>,
    pub body: ComponentBody,
}

impl Component {
    /// A bare component for `directory`, with identity fields derived from the path.
    pub fn for_directory(
        directory: &Path,
        kind_id: impl Into<String>,
        is_container: bool,
        body: ComponentBody,
    ) -> Self {
        let folder_name = directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = split_bundle_name(&folder_name)
            .map(|(stem, _)| stem.to_string())
            .unwrap_or(folder_name);
        Self {
            name,
            unique_name: unique_name_for(directory),
            directory: directory.to_path_buf(),
            kind_id: kind_id.into(),
            is_container,
            children: Vec::new(),
            search_paths: Vec::new(),
            icon: None,
            body,
        }
    }

    /// A separator or slideout marker placed under `parent`. The id uses
    /// `UNIQUE_ID_SEPARATOR` so it never equals a bundle's unique name.
    pub fn marker(kind_id: &str, parent: &Component, index: usize) -> Self {
        Self {
            name: kind_id.to_string(),
            unique_name: format!(
                "{}{}{}{}",
                parent.unique_name, UNIQUE_ID_SEPARATOR, kind_id, index
            ),
            directory: parent.directory.clone(),
            kind_id: kind_id.to_string(),
            is_container: false,
            children: Vec::new(),
            search_paths: Vec::new(),
            icon: None,
            body: ComponentBody::Marker,
        }
    }

    pub fn is_command(&self) -> bool {
        matches!(self.body, ComponentBody::Command(_))
    }

    pub fn is_marker(&self) -> bool {
        matches!(self.body, ComponentBody::Marker)
    }

    pub fn command(&self) -> Option<&CommandBundle> {
        match &self.body {
            ComponentBody::Command(bundle) => Some(bundle),
            _ => None,
        }
    }

    pub fn command_mut(&mut self) -> Option<&mut CommandBundle> {
        match &mut self.body {
            ComponentBody::Command(bundle) => Some(bundle),
            _ => None,
        }
    }

    pub fn container(&self) -> Option<&ContainerInfo> {
        match &self.body {
            ComponentBody::Container(info) => Some(info),
            _ => None,
        }
    }

    /// Title shown by the host.
    pub fn title(&self) -> &str {
        match &self.body {
            ComponentBody::Command(bundle) => &bundle.title,
            ComponentBody::Container(info) => info.title.as_deref().unwrap_or(&self.name),
            ComponentBody::Marker => &self.name,
        }
    }

    /// Override the display title.
    pub fn set_title(&mut self, title: impl Into<String>) {
        match &mut self.body {
            ComponentBody::Command(bundle) => bundle.title = title.into(),
            ComponentBody::Container(info) => info.title = Some(title.into()),
            ComponentBody::Marker => {}
        }
    }

    /// Bundle folder name (name + postfix as found on disk).
    pub fn bundle_name(&self) -> String {
        self.directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }

    /// Visit this component and all descendants depth-first, parents first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Component)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    fn walk_mut(&mut self, visit: &mut dyn FnMut(&mut Component)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }

    /// Whether any command leaf exists at or below this component.
    pub fn has_commands(&self) -> bool {
        let mut found = false;
        self.walk(&mut |c| found |= c.is_command());
        found
    }
}

// ---------------------------------------------------------------------------
// Extension
// ---------------------------------------------------------------------------

/// Whether an extension carries UI bundles or only shared code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtensionType {
    Ui,
    Library,
}

impl ExtensionType {
    pub fn postfix(self) -> &'static str {
        match self {
            ExtensionType::Ui => UI_EXTENSION_POSTFIX,
            ExtensionType::Library => LIB_EXTENSION_POSTFIX,
        }
    }

    pub fn kind_id(self) -> &'static str {
        match self {
            ExtensionType::Ui => "extension",
            ExtensionType::Library => "lib",
        }
    }

    /// Classify a folder name by its postfix.
    pub fn from_folder_name(name: &str) -> Option<Self> {
        let lowered = name.to_lowercase();
        [ExtensionType::Ui, ExtensionType::Library]
            .into_iter()
            .find(|t| lowered.len() > t.postfix().len() && lowered.ends_with(t.postfix()))
    }
}

/// Contents of an extension's `extension.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionManifest {
    pub description: Option<String>,
    pub author: Option<String>,
    /// Names of library extensions whose folders join this extension's search paths.
    pub dependencies: Vec<String>,
    /// `{{key}}` substitutions applied to command metadata.
    pub templates: BTreeMap<String, String>,
}

impl ExtensionManifest {
    /// Read the manifest of the extension at `dir`. A missing file yields the
    /// default manifest; a malformed one is an error.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(EXTENSION_MANIFEST_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn find_startup_script(directory: &Path) -> Option<PathBuf> {
    STARTUP_SCRIPT_FILES
        .iter()
        .map(|name| directory.join(name))
        .find(|path| path.is_file())
}

/// Root of a parsed bundle tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub name: String,
    pub unique_name: String,
    pub directory: PathBuf,
    pub kind_id: String,
    pub extension_type: ExtensionType,
    /// Fingerprint of the on-disk tree when this value was built.
    pub content_hash: String,
    /// Schema of the loader that built this value.
    pub schema_version: String,
    /// Extension-wide search paths: its own `lib/` plus merged library extensions.
    pub library_search_paths: Vec<PathBuf>,
    pub manifest: ExtensionManifest,
    /// Script run once after the extension loads.
    #[serde(default)]
    pub startup_script: Option<PathBuf>,
    pub children: Vec<Component>,
}

impl Extension {
    /// Create an unparsed extension for `directory`.
    ///
    /// Computes the content hash and reads the manifest. Fails with a
    /// structural error when the directory is missing.
    pub fn stub(
        directory: &Path,
        extension_type: ExtensionType,
        schema_version: &str,
        hash_mode: HashMode,
    ) -> Result<Self> {
        if !directory.is_dir() {
            return Err(LoaderError::structural(
                directory,
                "extension directory does not exist",
            ));
        }

        let folder_name = directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = split_bundle_name(&folder_name)
            .map(|(stem, _)| stem.to_string())
            .unwrap_or(folder_name);

        let manifest = match ExtensionManifest::load(directory) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(
                    extension = %name,
                    error = %e,
                    "Malformed extension manifest, using defaults"
                );
                ExtensionManifest::default()
            }
        };

        let lib_dir = directory.join(LIBRARY_DIR_NAME);
        let library_search_paths = if lib_dir.is_dir() {
            vec![lib_dir]
        } else {
            Vec::new()
        };

        Ok(Self {
            unique_name: unique_name_for(directory),
            name,
            directory: directory.to_path_buf(),
            kind_id: extension_type.kind_id().to_string(),
            extension_type,
            content_hash: content_hash(directory, hash_mode)?,
            schema_version: schema_version.to_string(),
            library_search_paths,
            manifest,
            startup_script: find_startup_script(directory),
            children: Vec::new(),
        })
    }

    /// Visit every component depth-first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Component)) {
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// All command leaves in depth-first order.
    pub fn commands(&self) -> Vec<&Component> {
        let mut out = Vec::new();
        self.walk(&mut |c| {
            if c.is_command() {
                out.push(c);
            }
        });
        out
    }

    /// Find a component by unique name.
    pub fn find(&self, unique_name: &str) -> Option<&Component> {
        let mut found = None;
        self.walk(&mut |c| {
            if found.is_none() && c.unique_name == unique_name {
                found = Some(c);
            }
        });
        found
    }

    /// Total number of components in the tree.
    pub fn component_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }

    /// Add a search path once.
    pub fn add_search_path(&mut self, path: PathBuf) {
        if !self.library_search_paths.contains(&path) {
            self.library_search_paths.push(path);
        }
    }

    /// Apply manifest templates to every command.
    pub fn apply_templates(&mut self) {
        let templates = self.manifest.templates.clone();
        if templates.is_empty() {
            return;
        }
        for child in &mut self.children {
            child.walk_mut(&mut |c| {
                if let Some(bundle) = c.command_mut() {
                    bundle.apply_templates(&templates);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_language_detection() {
        let py = Path::new("/x/script.py");
        assert_eq!(ScriptLanguage::from_script_path(py, None), ScriptLanguage::Python);
        assert_eq!(
            ScriptLanguage::from_script_path(py, Some("#! python3")),
            ScriptLanguage::CPython
        );
        assert_eq!(
            ScriptLanguage::from_script_path(Path::new("a.CS"), None),
            ScriptLanguage::CSharp
        );
        assert_eq!(
            ScriptLanguage::from_script_path(Path::new("a.ghx"), None),
            ScriptLanguage::Grasshopper
        );
        assert_eq!(
            ScriptLanguage::from_script_path(Path::new("a.lua"), None),
            ScriptLanguage::Unknown("lua".to_string())
        );
    }

    #[test]
    fn test_requires_script() {
        assert!(ScriptLanguage::Python.requires_script());
        assert!(ScriptLanguage::Undetermined.requires_script());
        assert!(!ScriptLanguage::Url.requires_script());
        assert!(!ScriptLanguage::Link.requires_script());
    }

    #[test]
    fn test_templates_substitute_liquid_tags() {
        let mut bundle = CommandBundle::new("Run {{team}}", ScriptLanguage::Python);
        bundle.tooltip = Some("Owned by {{team}}".to_string());
        bundle.author = Some("{{missing}}".to_string());
        let mut templates = BTreeMap::new();
        templates.insert("team".to_string(), "BIM".to_string());
        bundle.apply_templates(&templates);
        assert_eq!(bundle.title, "Run BIM");
        assert_eq!(bundle.tooltip.as_deref(), Some("Owned by BIM"));
        assert_eq!(bundle.author.as_deref(), Some("{{missing}}"));
    }

    #[test]
    fn test_component_identity_from_directory() {
        let dir = Path::new("/root/Tools.extension/Main.tab/Edit.panel/Flip doors.pushbutton");
        let comp = Component::for_directory(
            dir,
            "pushbutton",
            false,
            ComponentBody::Command(Box::new(CommandBundle::new("Flip doors", ScriptLanguage::Python))),
        );
        assert_eq!(comp.name, "Flip doors");
        assert_eq!(comp.unique_name, "Tools_Main_Edit_Flipdoors");
        assert_eq!(comp.bundle_name(), "Flip doors.pushbutton");
        assert!(comp.is_command());
    }

    #[test]
    fn test_extension_type_from_folder_name() {
        assert_eq!(
            ExtensionType::from_folder_name("MyTools.extension"),
            Some(ExtensionType::Ui)
        );
        assert_eq!(
            ExtensionType::from_folder_name("Shared.LIB"),
            Some(ExtensionType::Library)
        );
        assert_eq!(ExtensionType::from_folder_name(".extension"), None);
        assert_eq!(ExtensionType::from_folder_name("notes.txt"), None);
    }

    #[test]
    fn test_stub_missing_directory_is_structural() {
        let err = Extension::stub(
            Path::new("/definitely/not/here/X.extension"),
            ExtensionType::Ui,
            "1",
            HashMode::Metadata,
        )
        .unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_stub_reads_manifest_and_lib() {
        let tmp = TempDir::new().unwrap();
        let ext_dir = tmp.path().join("Tools.extension");
        fs::create_dir_all(ext_dir.join("lib")).unwrap();
        fs::write(
            ext_dir.join(EXTENSION_MANIFEST_FILE),
            r#"{"dependencies": ["Shared"], "templates": {"team": "BIM"}}"#,
        )
        .unwrap();

        let ext = Extension::stub(&ext_dir, ExtensionType::Ui, "1", HashMode::Metadata).unwrap();
        assert_eq!(ext.name, "Tools");
        assert_eq!(ext.kind_id, "extension");
        assert_eq!(ext.manifest.dependencies, vec!["Shared".to_string()]);
        assert_eq!(ext.library_search_paths, vec![ext_dir.join("lib")]);
        assert!(!ext.content_hash.is_empty());
        assert!(ext.children.is_empty());
    }

    #[test]
    fn test_stub_tolerates_malformed_manifest() {
        let tmp = TempDir::new().unwrap();
        let ext_dir = tmp.path().join("Tools.extension");
        fs::create_dir_all(&ext_dir).unwrap();
        fs::write(ext_dir.join(EXTENSION_MANIFEST_FILE), "{ broken").unwrap();

        let ext = Extension::stub(&ext_dir, ExtensionType::Ui, "1", HashMode::Metadata).unwrap();
        assert_eq!(ext.manifest, ExtensionManifest::default());
    }

    #[test]
    fn test_stub_finds_startup_script() {
        let tmp = TempDir::new().unwrap();
        let ext_dir = tmp.path().join("Tools.extension");
        fs::create_dir_all(ext_dir.join("hooks")).unwrap();
        fs::write(ext_dir.join("hooks").join("startup.py"), "").unwrap();

        let ext = Extension::stub(&ext_dir, ExtensionType::Ui, "1", HashMode::Metadata).unwrap();
        assert_eq!(ext.startup_script, None);

        fs::write(ext_dir.join("startup.cs"), "").unwrap();
        fs::write(ext_dir.join("startup.py"), "").unwrap();
        let ext = Extension::stub(&ext_dir, ExtensionType::Ui, "1", HashMode::Metadata).unwrap();
        assert_eq!(ext.startup_script, Some(ext_dir.join("startup.py")));
    }
}
