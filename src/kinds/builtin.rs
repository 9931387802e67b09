//! Builtin component kinds.
//!
//! The static table below lists every kind the loader knows out of the box.
//! Containers share one build/restore pair; command kinds differ only in how
//! they decide their language and which metadata they require.

use std::path::Path;

use crate::components::{
    BundleMetadata, CommandBundle, ComponentBody, ContainerInfo, ContextRule, LegacyScriptParams,
    ScriptLanguage,
};
use crate::error::{LoaderError, Result};

use super::scripts::BundleScripts;
use super::{BuildFn, KindRole, KindSpec, RestoreFn};

struct BuiltinKind {
    kind_id: &'static str,
    postfix: &'static str,
    role: KindRole,
    accepts: &'static [KindRole],
    build: BuildFn,
}

const GROUP_CHILDREN: &[KindRole] = &[KindRole::Command];

const BUILTIN_KINDS: &[BuiltinKind] = &[
    BuiltinKind {
        kind_id: "tab",
        postfix: ".tab",
        role: KindRole::Tab,
        accepts: &[KindRole::Panel],
        build: build_container,
    },
    BuiltinKind {
        kind_id: "panel",
        postfix: ".panel",
        role: KindRole::Panel,
        accepts: &[KindRole::Stack, KindRole::Group, KindRole::Command],
        build: build_container,
    },
    BuiltinKind {
        kind_id: "stack",
        postfix: ".stack",
        role: KindRole::Stack,
        accepts: &[KindRole::Group, KindRole::Command],
        build: build_container,
    },
    BuiltinKind {
        kind_id: "pulldown",
        postfix: ".pulldown",
        role: KindRole::Group,
        accepts: GROUP_CHILDREN,
        build: build_container,
    },
    BuiltinKind {
        kind_id: "splitbutton",
        postfix: ".splitbutton",
        role: KindRole::Group,
        accepts: GROUP_CHILDREN,
        build: build_container,
    },
    BuiltinKind {
        kind_id: "splitpushbutton",
        postfix: ".splitpushbutton",
        role: KindRole::Group,
        accepts: GROUP_CHILDREN,
        build: build_container,
    },
    BuiltinKind {
        kind_id: "pushbutton",
        postfix: ".pushbutton",
        role: KindRole::Command,
        accepts: &[],
        build: build_script_command,
    },
    BuiltinKind {
        kind_id: "togglebutton",
        postfix: ".togglebutton",
        role: KindRole::Command,
        accepts: &[],
        build: build_script_command,
    },
    BuiltinKind {
        kind_id: "smartbutton",
        postfix: ".smartbutton",
        role: KindRole::Command,
        accepts: &[],
        build: build_script_command,
    },
    BuiltinKind {
        kind_id: "panelbutton",
        postfix: ".panelbutton",
        role: KindRole::Command,
        accepts: &[],
        build: build_script_command,
    },
    BuiltinKind {
        kind_id: "nobutton",
        postfix: ".nobutton",
        role: KindRole::Command,
        accepts: &[],
        build: build_script_command,
    },
    BuiltinKind {
        kind_id: "linkbutton",
        postfix: ".linkbutton",
        role: KindRole::Command,
        accepts: &[],
        build: build_link_command,
    },
    BuiltinKind {
        kind_id: "invokebutton",
        postfix: ".invokebutton",
        role: KindRole::Command,
        accepts: &[],
        build: build_invoke_command,
    },
    BuiltinKind {
        kind_id: "urlbutton",
        postfix: ".urlbutton",
        role: KindRole::Command,
        accepts: &[],
        build: build_url_command,
    },
    BuiltinKind {
        kind_id: "content",
        postfix: ".content",
        role: KindRole::Command,
        accepts: &[],
        build: build_content_command,
    },
];

/// Every builtin kind as a registrable spec.
pub fn builtin_kinds() -> Vec<KindSpec> {
    BUILTIN_KINDS
        .iter()
        .map(|k| {
            let restore: RestoreFn = if k.role == KindRole::Command {
                restore_command
            } else {
                restore_container
            };
            let spec = KindSpec::new(k.kind_id, k.postfix, k.role, k.build, restore);
            if k.accepts.is_empty() {
                spec
            } else {
                spec.container(k.accepts)
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

fn build_container(dir: &Path, _spec: &KindSpec) -> Result<ComponentBody> {
    let meta = BundleMetadata::load(dir)?.unwrap_or_default();
    Ok(ComponentBody::Container(ContainerInfo {
        title: meta.title,
        layout: meta.layout,
        collapsed: meta.collapsed,
    }))
}

fn restore_container(
    _spec: &KindSpec,
    attributes: serde_json::Value,
) -> std::result::Result<ComponentBody, String> {
    if attributes.is_null() {
        return Ok(ComponentBody::Container(ContainerInfo::default()));
    }
    serde_json::from_value::<ContainerInfo>(attributes)
        .map(ComponentBody::Container)
        .map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn restore_command(
    spec: &KindSpec,
    attributes: serde_json::Value,
) -> std::result::Result<ComponentBody, String> {
    serde_json::from_value::<CommandBundle>(attributes)
        .map(|bundle| ComponentBody::Command(Box::new(bundle)))
        .map_err(|e| format!("invalid {} attributes: {}", spec.kind_id, e))
}

/// Bundle metadata plus discovered files, shared by every command kind.
fn load_command(dir: &Path, language: Option<ScriptLanguage>) -> Result<CommandBundle> {
    let scripts = BundleScripts::discover(dir);
    let mut meta = BundleMetadata::load(dir)?.unwrap_or_default();

    let language = language.unwrap_or_else(|| scripts.language());
    if matches!(language, ScriptLanguage::Python | ScriptLanguage::CPython) {
        if let Some(script) = &scripts.script {
            LegacyScriptParams::read(script).fill(&mut meta);
        }
    }

    let context = match &meta.context {
        Some(spec) => ContextRule::parse(spec).map_err(|reason| LoaderError::component(dir, reason))?,
        None => None,
    };

    let default_title = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .and_then(|n| crate::components::split_bundle_name(&n).map(|(stem, _)| stem.to_string()))
        .unwrap_or_default();

    let mut bundle = CommandBundle::new(meta.title.unwrap_or(default_title), language);
    bundle.tooltip = meta.tooltip;
    bundle.author = meta.author;
    bundle.help_url = meta.help_url;
    bundle.min_host_version = meta.min_host_version;
    bundle.max_host_version = meta.max_host_version;
    bundle.min_framework_version = meta.min_framework_version;
    bundle.script_path = scripts.script;
    bundle.config_script_path = scripts.config;
    bundle.context = context;
    bundle.is_beta = meta.beta.unwrap_or(false);
    bundle.engine = meta.engine.unwrap_or_default();
    bundle.hyperlink = meta.hyperlink;
    bundle.assembly = meta.assembly;
    bundle.command_class = meta.command_class;
    bundle.availability_class = meta.availability_class;
    bundle.link_target = meta.target;

    if bundle.script_language == ScriptLanguage::Content {
        bundle.script_path = scripts.content;
        bundle.config_script_path = scripts.alt_content;
    }
    Ok(bundle)
}

fn command_body(bundle: CommandBundle) -> ComponentBody {
    ComponentBody::Command(Box::new(bundle))
}

/// Script commands keep an undetermined language when no script exists;
/// synthesis reports that leaf instead of the whole parse failing.
fn build_script_command(dir: &Path, _spec: &KindSpec) -> Result<ComponentBody> {
    load_command(dir, None).map(command_body)
}

fn build_url_command(dir: &Path, _spec: &KindSpec) -> Result<ComponentBody> {
    let bundle = load_command(dir, Some(ScriptLanguage::Url))?;
    if bundle.hyperlink.as_deref().map_or(true, str::is_empty) {
        return Err(LoaderError::component(dir, "url button without hyperlink"));
    }
    Ok(command_body(bundle))
}

fn build_invoke_command(dir: &Path, _spec: &KindSpec) -> Result<ComponentBody> {
    let bundle = load_command(dir, Some(ScriptLanguage::Invoke))?;
    if bundle.assembly.is_none() {
        return Err(LoaderError::component(dir, "invoke button without assembly"));
    }
    Ok(command_body(bundle))
}

fn build_link_command(dir: &Path, _spec: &KindSpec) -> Result<ComponentBody> {
    let bundle = load_command(dir, Some(ScriptLanguage::Link))?;
    if bundle.link_target.is_none() && bundle.assembly.is_none() {
        return Err(LoaderError::component(
            dir,
            "link button without target or assembly",
        ));
    }
    Ok(command_body(bundle))
}

fn build_content_command(dir: &Path, _spec: &KindSpec) -> Result<ComponentBody> {
    let bundle = load_command(dir, Some(ScriptLanguage::Content))?;
    if bundle.script_path.is_none() {
        return Err(LoaderError::component(dir, "content button without content file"));
    }
    Ok(command_body(bundle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn spec(kind_id: &str) -> KindSpec {
        builtin_kinds()
            .into_iter()
            .find(|k| k.kind_id == kind_id)
            .unwrap()
    }

    fn bundle_dir(tmp: &TempDir, name: &str) -> std::path::PathBuf {
        let dir = tmp.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn command(body: ComponentBody) -> CommandBundle {
        match body {
            ComponentBody::Command(bundle) => *bundle,
            other => panic!("expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_builtin_table_postfixes_unique() {
        let kinds = builtin_kinds();
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a.postfix, b.postfix);
                assert_ne!(a.kind_id, b.kind_id);
            }
        }
    }

    #[test]
    fn test_container_roles() {
        assert!(spec("tab").accepts_role(KindRole::Panel));
        assert!(spec("panel").accepts_role(KindRole::Group));
        assert!(spec("pulldown").is_container);
        assert!(!spec("pulldown").accepts_role(KindRole::Group));
        assert!(!spec("pushbutton").is_container);
    }

    #[test]
    fn test_build_container_reads_layout() {
        let tmp = TempDir::new().unwrap();
        let dir = bundle_dir(&tmp, "Edit.panel");
        fs::write(dir.join("bundle.yaml"), "title: Editing\nlayout: [B, A]\n").unwrap();
        let body = build_container(&dir, &spec("panel")).unwrap();
        let ComponentBody::Container(info) = body else {
            panic!("expected container");
        };
        assert_eq!(info.title.as_deref(), Some("Editing"));
        assert_eq!(info.layout, vec!["B", "A"]);
    }

    #[test]
    fn test_build_script_command() {
        let tmp = TempDir::new().unwrap();
        let dir = bundle_dir(&tmp, "RunIt.pushbutton");
        fs::write(dir.join("script.py"), "__title__ = 'Run!'\nprint(1)\n").unwrap();
        fs::write(dir.join("bundle.yaml"), "context:\n  all-of: [wall, door]\n").unwrap();

        let bundle = command(build_script_command(&dir, &spec("pushbutton")).unwrap());
        assert_eq!(bundle.title, "Run!");
        assert_eq!(bundle.script_language, ScriptLanguage::Python);
        assert_eq!(bundle.script_path, Some(dir.join("script.py")));
        assert!(bundle.context.is_some());
    }

    #[test]
    fn test_script_command_defaults_title_to_name() {
        let tmp = TempDir::new().unwrap();
        let dir = bundle_dir(&tmp, "Flip Doors.pushbutton");
        fs::write(dir.join("script.cs"), "class X {}").unwrap();
        let bundle = command(build_script_command(&dir, &spec("pushbutton")).unwrap());
        assert_eq!(bundle.title, "Flip Doors");
        assert_eq!(bundle.script_language, ScriptLanguage::CSharp);
    }

    #[test]
    fn test_script_command_without_script_is_undetermined() {
        let tmp = TempDir::new().unwrap();
        let dir = bundle_dir(&tmp, "Empty.pushbutton");
        let bundle = command(build_script_command(&dir, &spec("pushbutton")).unwrap());
        assert_eq!(bundle.script_language, ScriptLanguage::Undetermined);
    }

    #[test]
    fn test_bad_context_key_is_component_error() {
        let tmp = TempDir::new().unwrap();
        let dir = bundle_dir(&tmp, "Bad.pushbutton");
        fs::write(dir.join("script.py"), "").unwrap();
        fs::write(dir.join("bundle.yaml"), "context:\n  sometimes: [wall]\n").unwrap();
        let err = build_script_command(&dir, &spec("pushbutton")).unwrap_err();
        assert!(matches!(err, LoaderError::ComponentParse { .. }));
    }

    #[test]
    fn test_url_button_requires_hyperlink() {
        let tmp = TempDir::new().unwrap();
        let dir = bundle_dir(&tmp, "Docs.urlbutton");
        assert!(build_url_command(&dir, &spec("urlbutton")).is_err());

        fs::write(dir.join("bundle.yaml"), "hyperlink: https://example.com/docs\n").unwrap();
        let bundle = command(build_url_command(&dir, &spec("urlbutton")).unwrap());
        assert_eq!(bundle.script_language, ScriptLanguage::Url);
        assert_eq!(bundle.hyperlink.as_deref(), Some("https://example.com/docs"));
    }

    #[test]
    fn test_link_button_target() {
        let tmp = TempDir::new().unwrap();
        let dir = bundle_dir(&tmp, "Again.linkbutton");
        fs::write(dir.join("bundle.yaml"), "target: Tools_Main_Edit_RunIt\n").unwrap();
        let bundle = command(build_link_command(&dir, &spec("linkbutton")).unwrap());
        assert_eq!(bundle.link_target.as_deref(), Some("Tools_Main_Edit_RunIt"));
    }

    #[test]
    fn test_content_button_uses_content_files() {
        let tmp = TempDir::new().unwrap();
        let dir = bundle_dir(&tmp, "Family.content");
        assert!(build_content_command(&dir, &spec("content")).is_err());

        fs::write(dir.join("content.rfa"), "").unwrap();
        fs::write(dir.join("other.rfa"), "").unwrap();
        let bundle = command(build_content_command(&dir, &spec("content")).unwrap());
        assert_eq!(bundle.script_path, Some(dir.join("content.rfa")));
        assert_eq!(bundle.config_script_path, Some(dir.join("other.rfa")));
    }

    #[test]
    fn test_restore_roundtrip_through_attributes() {
        let mut bundle = CommandBundle::new("Run", ScriptLanguage::Ruby);
        bundle.tooltip = Some("tip".into());
        let value = serde_json::to_value(&bundle).unwrap();
        let restored = command(restore_command(&spec("pushbutton"), value).unwrap());
        assert_eq!(restored, bundle);

        let err = restore_command(&spec("pushbutton"), serde_json::json!({"bogus": 1}));
        assert!(err.is_err());
    }
}
