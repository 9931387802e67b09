//! Synthesized command and availability artifacts.

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::components::{AvailabilityContext, ContextRule, EngineOptions, ScriptLanguage};
use crate::config::HostConfig;

/// Suffix of availability type ids.
pub const AVAILABILITY_SUFFIX: &str = "_avail";

/// How a command is executed. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchKey {
    /// Python, CPython or Ruby run by an embedded interpreter.
    InterpretedScript,
    /// C# or VB source compiled by the host before running.
    CompiledScript,
    /// A command class in an external assembly.
    InvokeAssembly,
    OpenUrl,
    StaticContent,
    /// Forwards to another command of the same extension.
    LinkedCommand,
}

impl DispatchKey {
    /// Dispatch key for a language, or `None` when no strategy exists.
    pub fn for_language(language: &ScriptLanguage) -> Option<Self> {
        match language {
            ScriptLanguage::Python | ScriptLanguage::CPython | ScriptLanguage::Ruby => {
                Some(DispatchKey::InterpretedScript)
            }
            ScriptLanguage::CSharp | ScriptLanguage::VisualBasic => {
                Some(DispatchKey::CompiledScript)
            }
            ScriptLanguage::Invoke => Some(DispatchKey::InvokeAssembly),
            ScriptLanguage::Url => Some(DispatchKey::OpenUrl),
            ScriptLanguage::Content => Some(DispatchKey::StaticContent),
            ScriptLanguage::Link => Some(DispatchKey::LinkedCommand),
            ScriptLanguage::Dynamo
            | ScriptLanguage::Grasshopper
            | ScriptLanguage::Undetermined
            | ScriptLanguage::Unknown(_) => None,
        }
    }
}

/// Per-click state the host passes to a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Modifier-click: run the config script / alternate content instead.
    pub config_mode: bool,
    /// Extra diagnostics requested by the user.
    pub debug_mode: bool,
}

/// What the host should do when a command is clicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationRequest {
    RunScript {
        language: ScriptLanguage,
        script: PathBuf,
        search_paths: Vec<PathBuf>,
        engine: EngineOptions,
        debug_mode: bool,
    },
    CompileAndRun {
        language: ScriptLanguage,
        source: PathBuf,
        search_paths: Vec<PathBuf>,
    },
    InvokeAssembly {
        assembly: String,
        command_class: Option<String>,
        search_paths: Vec<PathBuf>,
    },
    OpenUrl {
        url: String,
    },
    ShowContent {
        content: PathBuf,
    },
    /// Run another command's request on its behalf.
    Forward {
        target_type_id: String,
        request: Box<InvocationRequest>,
    },
}

/// A prepared command body. Implementations never execute anything; they
/// only describe the request for the host.
pub trait Invocable: Send + Sync + fmt::Debug {
    fn invoke(&self, ctx: &ExecutionContext) -> InvocationRequest;
}

/// How availability is decided for a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityStrategy {
    /// Available while anything is selected.
    Selection,
    /// Available even with no document open.
    ZeroDocument,
    /// Evaluates the rule; requires an open document.
    Compiled(ContextRule),
}

impl AvailabilityStrategy {
    /// Pick the cheapest strategy that implements `rule`.
    pub fn for_rule(rule: &ContextRule) -> Self {
        match rule.as_single_term() {
            Some(crate::components::context::SELECTION_TERM) => AvailabilityStrategy::Selection,
            Some(crate::components::context::ZERO_DOC_TERM) => AvailabilityStrategy::ZeroDocument,
            _ => AvailabilityStrategy::Compiled(rule.clone()),
        }
    }
}

/// Availability predicate attached to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityArtifact {
    pub type_id: String,
    pub strategy: AvailabilityStrategy,
}

impl AvailabilityArtifact {
    pub fn new(command_type_id: &str, rule: &ContextRule) -> Self {
        Self::with_strategy(command_type_id, AvailabilityStrategy::for_rule(rule))
    }

    pub fn with_strategy(command_type_id: &str, strategy: AvailabilityStrategy) -> Self {
        Self {
            type_id: format!("{}{}", command_type_id, AVAILABILITY_SUFFIX),
            strategy,
        }
    }

    /// Whether the command can run in the given host state.
    pub fn is_available(&self, ctx: &AvailabilityContext) -> bool {
        match &self.strategy {
            AvailabilityStrategy::Selection => ctx.document_open && !ctx.selection.is_empty(),
            AvailabilityStrategy::ZeroDocument => true,
            AvailabilityStrategy::Compiled(rule) => ctx.document_open && rule.evaluate(ctx),
        }
    }
}

/// One executable command produced from a leaf bundle.
#[derive(Debug, Clone)]
pub struct CommandArtifact {
    /// Host-visible type identity; equals the bundle's unique name.
    pub type_id: String,
    pub unique_name: String,
    pub kind_id: String,
    pub title: String,
    pub tooltip: Option<String>,
    pub author: Option<String>,
    pub help_url: Option<String>,
    pub script_path: Option<PathBuf>,
    pub config_script_path: Option<PathBuf>,
    pub min_host_version: Option<String>,
    pub max_host_version: Option<String>,
    pub min_framework_version: Option<String>,
    pub search_paths: Vec<PathBuf>,
    pub dispatch: DispatchKey,
    pub is_beta: bool,
    pub invocable: Arc<dyn Invocable>,
    pub availability: Option<AvailabilityArtifact>,
}

impl CommandArtifact {
    /// Build the host request for a click.
    pub fn invoke(&self, ctx: &ExecutionContext) -> InvocationRequest {
        self.invocable.invoke(ctx)
    }

    /// Availability in the given host state. Commands without a rule are
    /// available whenever a document is open.
    pub fn is_available(&self, ctx: &AvailabilityContext) -> bool {
        match &self.availability {
            Some(availability) => availability.is_available(ctx),
            None => ctx.document_open,
        }
    }

    /// Whether the host and framework versions satisfy the command's gates.
    pub fn is_supported(&self, host: &HostConfig) -> bool {
        let at_least = |min: &Option<String>, actual: &str| {
            min.as_deref()
                .map_or(true, |min| compare_versions(actual, min) != Ordering::Less)
        };
        let at_most = |max: &Option<String>, actual: &str| {
            max.as_deref()
                .map_or(true, |max| compare_versions(actual, max) != Ordering::Greater)
        };
        at_least(&self.min_host_version, &host.version)
            && at_most(&self.max_host_version, &host.version)
            && at_least(&self.min_framework_version, &host.framework_version)
    }
}

/// Compare dotted version strings numerically (`2023.1` < `2024`).
/// Non-numeric parts compare as zero; missing parts are zero.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.trim()
            .split(['.', '-', ' '])
            .map(|part| {
                let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    };
    let (a, b) = (parse(a), parse(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
