//! `tree` and `hash` commands.

use std::path::Path;

use anyhow::{bail, Context, Result};

use bundle_loader::cache::{content_hash, HashMode};
use bundle_loader::components::{display_order, Component, Extension, ExtensionType};
use bundle_loader::kinds::KindRegistry;
use bundle_loader::parser::TreeParser;
use bundle_loader::LoaderConfig;

fn render_component(component: &Component, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    if component.is_marker() {
        out.push_str(&format!("{}-- {}\n", indent, component.kind_id));
        return;
    }
    out.push_str(&format!(
        "{}{} \"{}\" ({})\n",
        indent,
        component.kind_id,
        component.title(),
        component.unique_name
    ));
    for child in display_order(component) {
        render_component(&child, depth + 1, out);
    }
}

/// Indented tree in display order.
pub(crate) fn render_tree(extension: &Extension) -> String {
    let mut out = format!("{} ({})\n", extension.name, extension.unique_name);
    for child in &extension.children {
        render_component(child, 1, &mut out);
    }
    out
}

pub(crate) fn cmd_tree(config_path: Option<&Path>, path: &Path) -> Result<()> {
    let config = LoaderConfig::load(config_path).context("Failed to load configuration")?;
    let folder = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let Some(extension_type) = ExtensionType::from_folder_name(&folder) else {
        bail!("{} is not an extension folder", path.display());
    };

    let stub = Extension::stub(
        path,
        extension_type,
        &config.cache.schema_version,
        config.cache.hash_mode,
    )
    .with_context(|| format!("Failed to read {}", path.display()))?;
    let registry = KindRegistry::with_builtin();
    let extension = TreeParser::new(&registry)
        .parse(stub)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    print!("{}", render_tree(&extension));
    Ok(())
}

pub(crate) fn cmd_hash(path: &Path, content: bool) -> Result<()> {
    let mode = if content {
        HashMode::Content
    } else {
        HashMode::Metadata
    };
    let hash = content_hash(path, mode).with_context(|| format!("Failed to hash {}", path.display()))?;
    println!("{}", hash);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_render_tree_follows_layout() {
        let tmp = TempDir::new().unwrap();
        let panel = tmp.path().join("Demo.extension/Main.tab/Tools.panel");
        for name in ["Alpha", "Beta"] {
            let button = panel.join(format!("{}.pushbutton", name));
            fs::create_dir_all(&button).unwrap();
            fs::write(button.join("script.py"), "").unwrap();
        }
        fs::write(panel.join("bundle.yaml"), "layout: [Beta, \"---\", Alpha]\n").unwrap();

        let stub = Extension::stub(
            &tmp.path().join("Demo.extension"),
            ExtensionType::Ui,
            "1",
            HashMode::Metadata,
        )
        .unwrap();
        let registry = KindRegistry::with_builtin();
        let extension = TreeParser::new(&registry).parse(stub).unwrap();

        let text = render_tree(&extension);
        let beta = text.find("Demo_Main_Tools_Beta").unwrap();
        let separator = text.find("-- separator").unwrap();
        let alpha = text.find("Demo_Main_Tools_Alpha").unwrap();
        assert!(beta < separator && separator < alpha);
    }

    #[test]
    fn test_hash_command_in_both_modes() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("script.py"), "print('x')\n").unwrap();
        assert!(cmd_hash(tmp.path(), false).is_ok());
        assert!(cmd_hash(tmp.path(), true).is_ok());
        assert!(cmd_hash(&tmp.path().join("missing"), true).is_err());
    }
}
