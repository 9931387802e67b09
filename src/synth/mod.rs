//! Command and availability synthesis for bundle-loader
//!
//! Walks a parsed extension once and turns every command leaf into a
//! [`CommandArtifact`] keyed by its unique name. Each artifact carries an
//! [`Invocable`] strategy chosen from a closed dispatch table, plus an
//! [`AvailabilityArtifact`] when the bundle declares a context rule.
//!
//! Failures stay per leaf: the leaf is logged, recorded in
//! [`SynthesisOutput::failures`] and left out.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::components::{CommandBundle, Component, Extension, ScriptLanguage};
use crate::config::HostConfig;
use crate::error::LoaderError;

pub mod artifact;
pub mod strategies;

pub use artifact::{
    AvailabilityArtifact, AvailabilityStrategy, CommandArtifact, DispatchKey, ExecutionContext,
    Invocable, InvocationRequest,
};

/// A leaf left out on purpose (no strategy, unsupported host).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedCommand {
    pub unique_name: String,
    pub reason: String,
}

/// Result of synthesizing one extension.
#[derive(Debug, Default)]
pub struct SynthesisOutput {
    pub artifacts: BTreeMap<String, CommandArtifact>,
    pub failures: Vec<LoaderError>,
    pub skipped: Vec<SkippedCommand>,
}

impl SynthesisOutput {
    pub fn get(&self, unique_name: &str) -> Option<&CommandArtifact> {
        self.artifacts.get(unique_name)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// A command leaf with its resolved search paths.
struct Leaf<'e> {
    component: &'e Component,
    bundle: &'e CommandBundle,
    search_paths: Vec<PathBuf>,
}

/// Builds command artifacts for a host.
pub struct Synthesizer<'a> {
    host: &'a HostConfig,
}

impl<'a> Synthesizer<'a> {
    pub fn new(host: &'a HostConfig) -> Self {
        Self { host }
    }

    /// Synthesize every command leaf of `extension`.
    ///
    /// Link buttons are resolved after all other leaves so they can point at
    /// any command of the same extension.
    pub fn synthesize(&self, extension: &Extension) -> SynthesisOutput {
        let mut leaves = Vec::new();
        for child in &extension.children {
            collect_leaves(child, &[], &extension.library_search_paths, &mut leaves);
        }

        let mut output = SynthesisOutput::default();
        let (links, direct): (Vec<_>, Vec<_>) = leaves
            .into_iter()
            .partition(|leaf| leaf.bundle.script_language == ScriptLanguage::Link);

        for leaf in direct.iter().chain(links.iter()) {
            let unique_name = &leaf.component.unique_name;
            if output.artifacts.contains_key(unique_name) {
                self.fail(&mut output, unique_name, "duplicate unique name");
                continue;
            }

            let Some(dispatch) = DispatchKey::for_language(&leaf.bundle.script_language) else {
                if leaf.bundle.script_language == ScriptLanguage::Undetermined {
                    self.fail(&mut output, unique_name, "missing script");
                } else {
                    warn!(
                        unique_name = %unique_name,
                        language = ?leaf.bundle.script_language,
                        "No dispatch strategy for script language, skipping"
                    );
                    output.skipped.push(SkippedCommand {
                        unique_name: unique_name.clone(),
                        reason: format!("unsupported language {:?}", leaf.bundle.script_language),
                    });
                }
                continue;
            };

            match self.build_artifact(leaf, dispatch, extension, &output.artifacts) {
                Ok(artifact) if !artifact.is_supported(self.host) => {
                    info!(
                        unique_name = %unique_name,
                        host_version = %self.host.version,
                        "Command not supported by host version, skipping"
                    );
                    output.skipped.push(SkippedCommand {
                        unique_name: unique_name.clone(),
                        reason: "unsupported host version".to_string(),
                    });
                }
                Ok(artifact) => {
                    debug!(
                        unique_name = %unique_name,
                        dispatch = ?artifact.dispatch,
                        has_availability = artifact.availability.is_some(),
                        "Synthesized command"
                    );
                    output.artifacts.insert(unique_name.clone(), artifact);
                }
                Err(reason) => self.fail(&mut output, unique_name, &reason),
            }
        }

        info!(
            extension = %extension.name,
            artifacts = output.artifacts.len(),
            failures = output.failures.len(),
            skipped = output.skipped.len(),
            "Synthesized extension commands"
        );
        output
    }

    fn fail(&self, output: &mut SynthesisOutput, unique_name: &str, reason: &str) {
        error!(unique_name = %unique_name, reason = %reason, "Failed to synthesize command");
        output
            .failures
            .push(LoaderError::synthesis(unique_name, reason));
    }

    fn build_artifact(
        &self,
        leaf: &Leaf<'_>,
        dispatch: DispatchKey,
        extension: &Extension,
        built: &BTreeMap<String, CommandArtifact>,
    ) -> Result<CommandArtifact, String> {
        let bundle = leaf.bundle;
        let script = || -> Result<PathBuf, String> {
            let path = bundle.script_path.clone().ok_or("missing script")?;
            if !path.is_file() {
                return Err(format!("script not found: {}", path.display()));
            }
            Ok(path)
        };

        let mut inherited = None;
        let invocable: Arc<dyn Invocable> = match dispatch {
            DispatchKey::InterpretedScript => Arc::new(strategies::InterpretedScript {
                language: bundle.script_language.clone(),
                script: script()?,
                config_script: bundle.config_script_path.clone(),
                search_paths: leaf.search_paths.clone(),
                engine: bundle.engine.clone(),
            }),
            DispatchKey::CompiledScript => Arc::new(strategies::CompiledScript {
                language: bundle.script_language.clone(),
                source: script()?,
                config_source: bundle.config_script_path.clone(),
                search_paths: leaf.search_paths.clone(),
            }),
            DispatchKey::InvokeAssembly => Arc::new(strategies::AssemblyCommand {
                assembly: bundle.assembly.clone().ok_or("missing assembly")?,
                command_class: bundle.command_class.clone(),
                search_paths: leaf.search_paths.clone(),
            }),
            DispatchKey::OpenUrl => Arc::new(strategies::OpenUrl {
                url: bundle.hyperlink.clone().ok_or("missing hyperlink")?,
            }),
            DispatchKey::StaticContent => Arc::new(strategies::StaticContent {
                content: script()?,
                alternate: bundle.config_script_path.clone(),
            }),
            DispatchKey::LinkedCommand => {
                let (invocable, target_strategy) = self.link_invocable(leaf, extension, built)?;
                inherited = target_strategy;
                invocable
            }
        };

        // a link without its own rule follows its target's availability
        let type_id = &leaf.component.unique_name;
        let availability = match &bundle.context {
            Some(rule) => Some(AvailabilityArtifact::new(type_id, rule)),
            None => inherited.map(|strategy| AvailabilityArtifact::with_strategy(type_id, strategy)),
        };

        Ok(CommandArtifact {
            type_id: leaf.component.unique_name.clone(),
            unique_name: leaf.component.unique_name.clone(),
            kind_id: leaf.component.kind_id.clone(),
            title: bundle.title.clone(),
            tooltip: bundle.tooltip.clone(),
            author: bundle.author.clone(),
            help_url: bundle.help_url.clone(),
            script_path: bundle.script_path.clone(),
            config_script_path: bundle.config_script_path.clone(),
            min_host_version: bundle.min_host_version.clone(),
            max_host_version: bundle.max_host_version.clone(),
            min_framework_version: bundle.min_framework_version.clone(),
            search_paths: leaf.search_paths.clone(),
            dispatch,
            is_beta: bundle.is_beta,
            invocable,
            availability,
        })
    }

    /// Resolve a link button. A named target must be another command of the
    /// same extension, matched by unique name or bundle name; without a
    /// target the link invokes its assembly directly. Also returns the
    /// target's availability strategy, if any.
    fn link_invocable(
        &self,
        leaf: &Leaf<'_>,
        extension: &Extension,
        built: &BTreeMap<String, CommandArtifact>,
    ) -> Result<(Arc<dyn Invocable>, Option<AvailabilityStrategy>), String> {
        let bundle = leaf.bundle;
        let Some(target) = bundle.link_target.as_deref() else {
            let assembly = bundle
                .assembly
                .clone()
                .ok_or("link button without target or assembly")?;
            let invocable: Arc<dyn Invocable> = Arc::new(strategies::AssemblyCommand {
                assembly,
                command_class: bundle.command_class.clone(),
                search_paths: leaf.search_paths.clone(),
            });
            return Ok((invocable, None));
        };

        let resolved = built.get(target).or_else(|| {
            extension
                .commands()
                .into_iter()
                .find(|c| c.name.eq_ignore_ascii_case(target) || c.bundle_name().eq_ignore_ascii_case(target))
                .and_then(|c| built.get(&c.unique_name))
        });
        match resolved {
            Some(artifact) if artifact.dispatch == DispatchKey::LinkedCommand => {
                Err(format!("link target '{}' is itself a link", target))
            }
            Some(artifact) => {
                let invocable: Arc<dyn Invocable> = Arc::new(strategies::LinkedCommand {
                    target_type_id: artifact.type_id.clone(),
                    target: Arc::clone(&artifact.invocable),
                });
                let strategy = artifact.availability.as_ref().map(|a| a.strategy.clone());
                Ok((invocable, strategy))
            }
            None => Err(format!("link target '{}' not found in extension", target)),
        }
    }
}

/// Collect command leaves depth-first. `ancestors` holds the search paths of
/// enclosing bundles, innermost last.
fn collect_leaves<'e>(
    component: &'e Component,
    ancestors: &[&'e [PathBuf]],
    extension_paths: &[PathBuf],
    out: &mut Vec<Leaf<'e>>,
) {
    if let Some(bundle) = component.command() {
        let mut search_paths: Vec<PathBuf> = Vec::new();
        let own = component.search_paths.iter();
        let inherited = ancestors.iter().rev().flat_map(|paths| paths.iter());
        for path in own.chain(inherited).chain(extension_paths.iter()) {
            if !search_paths.contains(path) {
                search_paths.push(path.clone());
            }
        }
        out.push(Leaf {
            component,
            bundle,
            search_paths,
        });
    }

    if component.children.is_empty() {
        return;
    }
    let mut nested: Vec<&'e [PathBuf]> = ancestors.to_vec();
    nested.push(component.search_paths.as_slice());
    for child in &component.children {
        collect_leaves(child, &nested, extension_paths, out);
    }
}
