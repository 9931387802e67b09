//! Extension loading pipeline
//!
//! `ExtensionLoader` ties the pieces together for one host session:
//! discovery, parse-or-cache, library merging, synthesis and hook
//! registration. Failures stay inside the extension that caused them.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::cache::CacheStore;
use crate::components::{split_bundle_name, Extension, ExtensionType, ScriptLanguage};
use crate::config::LoaderConfig;
use crate::error::{LoaderError, Result};
use crate::hooks::{EventHost, HookRegistrar, HookReport};
use crate::kinds::scripts::read_first_line;
use crate::kinds::KindRegistry;
use crate::parser::{discover_extensions, TreeParser};
use crate::synth::strategies::script_invocable;
use crate::synth::{CommandArtifact, Invocable, SynthesisOutput, Synthesizer};

// ---------------------------------------------------------------------------
// Directory sources
// ---------------------------------------------------------------------------

/// Supplies the root folders scanned for extensions.
pub trait ExtensionDirectories {
    fn roots(&self) -> Vec<PathBuf>;
}

impl ExtensionDirectories for LoaderConfig {
    fn roots(&self) -> Vec<PathBuf> {
        self.extension_roots()
    }
}

impl ExtensionDirectories for Vec<PathBuf> {
    fn roots(&self) -> Vec<PathBuf> {
        self.clone()
    }
}

/// Startup script body with the extension folder ahead of its merged
/// search paths.
fn startup_invocable(extension: &Extension) -> Option<Arc<dyn Invocable>> {
    let script = extension.startup_script.as_ref()?;
    let first_line = read_first_line(script);
    let language = ScriptLanguage::from_script_path(script, first_line.as_deref());
    let mut search_paths = vec![extension.directory.clone()];
    for path in &extension.library_search_paths {
        if !search_paths.contains(path) {
            search_paths.push(path.clone());
        }
    }
    Some(script_invocable(language, script.clone(), search_paths))
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Where a loaded extension tree came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Walked from disk.
    Parsed,
    /// Restored from the cache file.
    Cache,
    /// Reused from this loader's previous run.
    Session,
}

/// One UI extension after the full pipeline.
#[derive(Debug)]
pub struct LoadedExtension {
    /// Extension tree with merged search paths.
    pub extension: Extension,
    pub source: LoadSource,
    pub synthesis: SynthesisOutput,
    pub hooks: HookReport,
    /// Startup script body, handed to the host once after loading.
    pub startup: Option<Arc<dyn Invocable>>,
}

/// Outcome of `load_all`.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub extensions: Vec<LoadedExtension>,
    /// Names of library extensions found.
    pub libraries: Vec<String>,
    /// Names skipped by the allow/block lists.
    pub disabled: Vec<String>,
    /// Errors that stopped a whole root or extension.
    pub failures: Vec<LoaderError>,
}

impl LoadReport {
    /// Find an artifact by unique name across all extensions.
    pub fn artifact(&self, unique_name: &str) -> Option<&CommandArtifact> {
        self.extensions
            .iter()
            .find_map(|loaded| loaded.synthesis.get(unique_name))
    }

    pub fn artifact_count(&self) -> usize {
        self.extensions.iter().map(|l| l.synthesis.len()).sum()
    }

    pub fn extension(&self, name: &str) -> Option<&LoadedExtension> {
        self.extensions
            .iter()
            .find(|l| l.extension.name.eq_ignore_ascii_case(name))
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Folder name without its extension postfix.
fn extension_name(path: &Path) -> String {
    let folder = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    split_bundle_name(&folder)
        .map(|(stem, _)| stem.to_string())
        .unwrap_or(folder)
}

/// Loads every extension under the configured roots.
pub struct ExtensionLoader {
    config: LoaderConfig,
    directories: Box<dyn ExtensionDirectories>,
    registry: KindRegistry,
    store: Option<CacheStore>,
    session: HashMap<PathBuf, Extension>,
    registrar: HookRegistrar,
}

impl ExtensionLoader {
    /// Loader with the builtin kinds, reading roots from `config`.
    pub fn new(config: LoaderConfig) -> Self {
        let directories = Box::new(config.clone());
        Self::with_parts(config, directories, KindRegistry::with_builtin())
    }

    pub fn with_parts(
        config: LoaderConfig,
        directories: Box<dyn ExtensionDirectories>,
        registry: KindRegistry,
    ) -> Self {
        let store = config
            .cache
            .enabled
            .then(|| CacheStore::from_config(&config.cache));
        Self {
            config,
            directories,
            registry,
            store,
            session: HashMap::new(),
            registrar: HookRegistrar::new(),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    pub fn cache_store(&self) -> Option<&CacheStore> {
        self.store.as_ref()
    }

    pub fn registrar(&self) -> &HookRegistrar {
        &self.registrar
    }

    /// Run the whole pipeline once.
    pub fn load_all(&mut self, host: &mut dyn EventHost) -> LoadReport {
        let mut report = LoadReport::default();
        let mut ui_dirs = Vec::new();
        let mut libraries: Vec<(String, PathBuf)> = Vec::new();

        for root in self.directories.roots() {
            let found = match discover_extensions(&root) {
                Ok(found) => found,
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "Skipping extension root");
                    report.failures.push(e);
                    continue;
                }
            };
            for (path, extension_type) in found {
                let name = extension_name(&path);
                if !self.config.is_extension_permitted(&name) {
                    debug!(extension = %name, "Extension disabled by configuration");
                    report.disabled.push(name);
                    continue;
                }
                match extension_type {
                    ExtensionType::Ui => ui_dirs.push(path),
                    ExtensionType::Library => libraries.push((name, path)),
                }
            }
        }
        report.libraries = libraries.iter().map(|(name, _)| name.clone()).collect();

        let mut seen = HashSet::new();
        for dir in ui_dirs {
            seen.insert(dir.clone());
            let (extension, source) = match self.parse_or_restore(&dir) {
                Ok(loaded) => loaded,
                Err(e) => {
                    error!(path = %dir.display(), error = %e, "Failed to load extension");
                    report.failures.push(e);
                    continue;
                }
            };
            let extension = self.merge_search_paths(extension, &libraries);

            let synthesis = Synthesizer::new(&self.config.host).synthesize(&extension);
            self.registrar.unregister_all(&extension, host);
            let hooks = self.registrar.register_all(&extension, host);
            let startup = startup_invocable(&extension);
            if let Some(script) = &extension.startup_script {
                info!(
                    extension = %extension.name,
                    script = %script.display(),
                    "Extension has a startup script"
                );
            }

            report.extensions.push(LoadedExtension {
                extension,
                source,
                synthesis,
                hooks,
                startup,
            });
        }
        self.session.retain(|dir, _| seen.contains(dir));

        info!(
            extensions = report.extensions.len(),
            libraries = report.libraries.len(),
            commands = report.artifact_count(),
            failures = report.failures.len(),
            "Loaded extensions"
        );
        report
    }

    /// Unregister every hook bound by earlier runs, then load again.
    pub fn reload(&mut self, host: &mut dyn EventHost) -> LoadReport {
        let mut removed = 0;
        for extension in self.session.values() {
            removed += self.registrar.unregister_all(extension, host);
        }
        debug!(hooks = removed, "Unregistered hooks before reload");
        self.load_all(host)
    }

    /// Fresh stub, then the session copy, the cache record, or a parse.
    fn parse_or_restore(&mut self, dir: &Path) -> Result<(Extension, LoadSource)> {
        let cache = &self.config.cache;
        let stub = Extension::stub(dir, ExtensionType::Ui, &cache.schema_version, cache.hash_mode)?;

        if let Some(previous) = self.session.get(dir) {
            if previous.content_hash == stub.content_hash
                && previous.schema_version == stub.schema_version
            {
                debug!(extension = %stub.name, "Reusing extension from session");
                return Ok((previous.clone(), LoadSource::Session));
            }
        }

        let mut restored = None;
        if let Some(store) = &self.store {
            if store.is_cache_valid(&stub) {
                match store.load(&stub, &self.registry) {
                    Ok(extension) => restored = Some(extension),
                    Err(e) => {
                        warn!(extension = %stub.name, error = %e, "Cache unusable, parsing instead")
                    }
                }
            }
        }

        let (extension, source) = match restored {
            Some(extension) => (extension, LoadSource::Cache),
            None => {
                let extension = TreeParser::new(&self.registry).parse(stub)?;
                if let Some(store) = &self.store {
                    if let Err(e) = store.store(&extension) {
                        warn!(extension = %extension.name, error = %e, "Failed to write extension cache");
                    }
                }
                (extension, LoadSource::Parsed)
            }
        };

        self.session.insert(dir.to_path_buf(), extension.clone());
        Ok((extension, source))
    }

    /// Add library dependencies and global search paths. The session and
    /// cache keep the unmerged tree.
    fn merge_search_paths(
        &self,
        mut extension: Extension,
        libraries: &[(String, PathBuf)],
    ) -> Extension {
        for dependency in extension.manifest.dependencies.clone() {
            match libraries
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&dependency))
            {
                Some((_, path)) => extension.add_search_path(path.clone()),
                None => warn!(
                    extension = %extension.name,
                    dependency = %dependency,
                    "Library dependency not found"
                ),
            }
        }
        for path in self.config.global_search_paths() {
            extension.add_search_path(path);
        }
        extension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::sample_extension_dir;
    use crate::components::AvailabilityContext;
    use crate::hooks::InMemoryEventHost;
    use crate::synth::{ExecutionContext, InvocationRequest};
    use std::fs;
    use tempfile::TempDir;

    fn config_for(tmp: &TempDir) -> LoaderConfig {
        let mut config = LoaderConfig::default();
        config.extension_dirs = vec![tmp.path().join("ext").display().to_string()];
        config.cache.dir = Some(tmp.path().join("cache").display().to_string());
        config
    }

    fn setup() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("ext");
        fs::create_dir_all(&root).unwrap();
        let ext = sample_extension_dir(&root);
        (tmp, ext)
    }

    #[test]
    fn test_load_all_end_to_end() {
        let (tmp, _) = setup();
        let mut host = InMemoryEventHost::new();
        let mut loader = ExtensionLoader::new(config_for(&tmp));

        let report = loader.load_all(&mut host);
        assert!(report.failures.is_empty());
        assert_eq!(report.extensions.len(), 1);
        assert_eq!(report.extensions[0].source, LoadSource::Parsed);

        let run = report.artifact("MyTools_Tab1_PanelA_RunIt").unwrap();
        assert_eq!(run.title, "Run It");
        assert!(run.is_available(&AvailabilityContext::with_selection(["Wall", "Door"])));
        assert!(!run.is_available(&AvailabilityContext::with_selection(["Wall"])));
        assert!(tmp.path().join("cache").join("bundleloader_cache_MyTools.bin").is_file());
    }

    #[test]
    fn test_startup_script_uses_extension_paths() {
        let (tmp, ext) = setup();
        let mut host = InMemoryEventHost::new();
        let report = ExtensionLoader::new(config_for(&tmp)).load_all(&mut host);

        let startup = report.extensions[0].startup.as_ref().unwrap();
        match startup.invoke(&ExecutionContext::default()) {
            InvocationRequest::RunScript {
                language,
                script,
                search_paths,
                ..
            } => {
                assert_eq!(language, ScriptLanguage::Python);
                assert_eq!(script, ext.join("startup.py"));
                assert_eq!(search_paths, vec![ext.clone(), ext.join("lib")]);
            }
            other => panic!("unexpected request: {:?}", other),
        }

        let mut host = InMemoryEventHost::new();
        let again = ExtensionLoader::new(config_for(&tmp)).load_all(&mut host);
        assert_eq!(again.extensions[0].source, LoadSource::Cache);
        assert!(again.extensions[0].startup.is_some());
    }

    #[test]
    fn test_no_startup_script_means_no_startup() {
        let (tmp, ext) = setup();
        fs::remove_file(ext.join("startup.py")).unwrap();
        let mut host = InMemoryEventHost::new();
        let report = ExtensionLoader::new(config_for(&tmp)).load_all(&mut host);
        assert!(report.extensions[0].startup.is_none());
    }

    #[test]
    fn test_second_loader_restores_from_cache() {
        let (tmp, _) = setup();
        let mut host = InMemoryEventHost::new();
        let first = ExtensionLoader::new(config_for(&tmp)).load_all(&mut host);

        let mut host = InMemoryEventHost::new();
        let second = ExtensionLoader::new(config_for(&tmp)).load_all(&mut host);
        assert_eq!(second.extensions[0].source, LoadSource::Cache);
        assert_eq!(first.extensions[0].extension, second.extensions[0].extension);
        assert_eq!(first.artifact_count(), second.artifact_count());
    }

    #[test]
    fn test_same_loader_reuses_session() {
        let (tmp, _) = setup();
        let mut host = InMemoryEventHost::new();
        let mut loader = ExtensionLoader::new(config_for(&tmp));
        loader.load_all(&mut host);
        let again = loader.load_all(&mut host);
        assert_eq!(again.extensions[0].source, LoadSource::Session);
    }

    #[test]
    fn test_schema_bump_forces_parse() {
        let (tmp, _) = setup();
        let mut host = InMemoryEventHost::new();
        ExtensionLoader::new(config_for(&tmp)).load_all(&mut host);

        let mut config = config_for(&tmp);
        config.cache.schema_version = "2".to_string();
        let report = ExtensionLoader::new(config).load_all(&mut host);
        assert_eq!(report.extensions[0].source, LoadSource::Parsed);
    }

    #[test]
    fn test_cache_disabled_writes_nothing() {
        let (tmp, _) = setup();
        let mut config = config_for(&tmp);
        config.cache.enabled = false;
        let mut loader = ExtensionLoader::new(config);
        assert!(loader.cache_store().is_none());

        let report = loader.load_all(&mut InMemoryEventHost::new());
        assert_eq!(report.extensions[0].source, LoadSource::Parsed);
        assert!(!tmp.path().join("cache").exists());
    }

    #[test]
    fn test_blocked_extension_is_skipped() {
        let (tmp, _) = setup();
        let mut config = config_for(&tmp);
        config.blocked_extensions = vec!["mytools".to_string()];
        let report = ExtensionLoader::new(config).load_all(&mut InMemoryEventHost::new());
        assert!(report.extensions.is_empty());
        assert_eq!(report.disabled, vec!["MyTools".to_string()]);
    }

    #[test]
    fn test_library_dependency_and_global_paths_are_merged() {
        let (tmp, ext) = setup();
        let shared = tmp.path().join("ext").join("Shared.lib");
        fs::create_dir_all(&shared).unwrap();
        fs::write(
            ext.join("extension.json"),
            r#"{"dependencies": ["shared", "Missing"]}"#,
        )
        .unwrap();

        let global = tmp.path().join("global");
        let mut config = config_for(&tmp);
        config.global_search_paths = vec![global.display().to_string()];

        let report = ExtensionLoader::new(config).load_all(&mut InMemoryEventHost::new());
        assert_eq!(report.libraries, vec!["Shared".to_string()]);

        let loaded = report.extension("MyTools").unwrap();
        assert_eq!(
            loaded.extension.library_search_paths,
            vec![ext.join("lib"), shared.clone(), global.clone()]
        );
        let run = report.artifact("MyTools_Tab1_PanelA_RunIt").unwrap();
        assert!(run.search_paths.contains(&shared));
        assert!(run.search_paths.contains(&global));
    }

    #[test]
    fn test_missing_root_does_not_stop_others() {
        let (tmp, _) = setup();
        let roots = vec![tmp.path().join("nowhere"), tmp.path().join("ext")];
        let mut loader = ExtensionLoader::with_parts(
            config_for(&tmp),
            Box::new(roots),
            KindRegistry::with_builtin(),
        );
        let report = loader.load_all(&mut InMemoryEventHost::new());
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].is_structural());
        assert_eq!(report.extensions.len(), 1);
    }

    #[test]
    fn test_reload_keeps_one_binding_per_hook() {
        let (tmp, ext) = setup();
        fs::create_dir_all(ext.join("hooks")).unwrap();
        fs::write(ext.join("hooks").join("doc-opened.py"), "").unwrap();
        fs::write(ext.join("hooks").join("app-init.py"), "").unwrap();

        let mut host = InMemoryEventHost::new();
        let mut loader = ExtensionLoader::new(config_for(&tmp));
        let report = loader.load_all(&mut host);
        assert_eq!(report.extensions[0].hooks.registered.len(), 2);
        assert_eq!(host.subscription_count(), 2);

        loader.reload(&mut host);
        loader.reload(&mut host);
        assert_eq!(host.subscription_count(), 2);
        assert_eq!(loader.registrar().registered_ids().len(), 2);
    }
}
