//! Invocation strategies, one per dispatch key.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::components::{EngineOptions, ScriptLanguage};

use super::artifact::{ExecutionContext, Invocable, InvocationRequest};

/// Picks the config script on modifier-click when one exists.
fn pick(primary: &Path, alternate: Option<&PathBuf>, ctx: &ExecutionContext) -> PathBuf {
    match alternate {
        Some(alt) if ctx.config_mode => alt.clone(),
        _ => primary.to_path_buf(),
    }
}

/// Body for a script run outside any button, such as a hook or the
/// extension startup script. Compiled languages go to the compiler.
pub fn script_invocable(
    language: ScriptLanguage,
    script: PathBuf,
    search_paths: Vec<PathBuf>,
) -> Arc<dyn Invocable> {
    match language {
        ScriptLanguage::CSharp | ScriptLanguage::VisualBasic => Arc::new(CompiledScript {
            language,
            source: script,
            config_source: None,
            search_paths,
        }),
        _ => Arc::new(InterpretedScript {
            language,
            script,
            config_script: None,
            search_paths,
            engine: Default::default(),
        }),
    }
}

#[derive(Debug)]
pub struct InterpretedScript {
    pub language: ScriptLanguage,
    pub script: PathBuf,
    pub config_script: Option<PathBuf>,
    pub search_paths: Vec<PathBuf>,
    pub engine: EngineOptions,
}

impl Invocable for InterpretedScript {
    fn invoke(&self, ctx: &ExecutionContext) -> InvocationRequest {
        InvocationRequest::RunScript {
            language: self.language.clone(),
            script: pick(&self.script, self.config_script.as_ref(), ctx),
            search_paths: self.search_paths.clone(),
            engine: self.engine.clone(),
            debug_mode: ctx.debug_mode,
        }
    }
}

#[derive(Debug)]
pub struct CompiledScript {
    pub language: ScriptLanguage,
    pub source: PathBuf,
    pub config_source: Option<PathBuf>,
    pub search_paths: Vec<PathBuf>,
}

impl Invocable for CompiledScript {
    fn invoke(&self, ctx: &ExecutionContext) -> InvocationRequest {
        InvocationRequest::CompileAndRun {
            language: self.language.clone(),
            source: pick(&self.source, self.config_source.as_ref(), ctx),
            search_paths: self.search_paths.clone(),
        }
    }
}

#[derive(Debug)]
pub struct AssemblyCommand {
    pub assembly: String,
    pub command_class: Option<String>,
    pub search_paths: Vec<PathBuf>,
}

impl Invocable for AssemblyCommand {
    fn invoke(&self, _ctx: &ExecutionContext) -> InvocationRequest {
        InvocationRequest::InvokeAssembly {
            assembly: self.assembly.clone(),
            command_class: self.command_class.clone(),
            search_paths: self.search_paths.clone(),
        }
    }
}

#[derive(Debug)]
pub struct OpenUrl {
    pub url: String,
}

impl Invocable for OpenUrl {
    fn invoke(&self, _ctx: &ExecutionContext) -> InvocationRequest {
        InvocationRequest::OpenUrl {
            url: self.url.clone(),
        }
    }
}

#[derive(Debug)]
pub struct StaticContent {
    pub content: PathBuf,
    pub alternate: Option<PathBuf>,
}

impl Invocable for StaticContent {
    fn invoke(&self, ctx: &ExecutionContext) -> InvocationRequest {
        InvocationRequest::ShowContent {
            content: pick(&self.content, self.alternate.as_ref(), ctx),
        }
    }
}

/// Forwards to another command's invocable.
#[derive(Debug)]
pub struct LinkedCommand {
    pub target_type_id: String,
    pub target: Arc<dyn Invocable>,
}

impl Invocable for LinkedCommand {
    fn invoke(&self, ctx: &ExecutionContext) -> InvocationRequest {
        InvocationRequest::Forward {
            target_type_id: self.target_type_id.clone(),
            request: Box::new(self.target.invoke(ctx)),
        }
    }
}
