//! Bundle metadata files and legacy script parameters.
//!
//! A bundle may describe itself in `bundle.yaml` (or `bundle.yml` /
//! `bundle.json`). Python scripts can also carry module-level assignments
//! such as `__title__ = 'Flip'`; those fill only the fields the metadata file
//! left unset.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::error::{LoaderError, Result};

use super::context::ContextSpec;
use super::types::EngineOptions;

/// Metadata file names in lookup order.
pub const METADATA_FILES: &[&str] = &["bundle.yaml", "bundle.yml", "bundle.json"];

/// Parsed contents of a bundle metadata file.
///
/// Every field is optional; unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BundleMetadata {
    pub title: Option<String>,
    #[serde(alias = "tooltips")]
    pub tooltip: Option<String>,
    #[serde(alias = "authors")]
    pub author: Option<String>,
    pub context: Option<ContextSpec>,
    #[serde(
        alias = "min_revit_version",
        alias = "min_revit_ver",
        deserialize_with = "version_string"
    )]
    pub min_host_version: Option<String>,
    #[serde(
        alias = "max_revit_version",
        alias = "max_revit_ver",
        deserialize_with = "version_string"
    )]
    pub max_host_version: Option<String>,
    #[serde(alias = "min_pyrevit_version", deserialize_with = "version_string")]
    pub min_framework_version: Option<String>,
    #[serde(alias = "helpurl")]
    pub help_url: Option<String>,
    #[serde(alias = "is_beta")]
    pub beta: Option<bool>,
    pub engine: Option<EngineOptions>,
    pub hyperlink: Option<String>,
    pub assembly: Option<String>,
    pub command_class: Option<String>,
    pub availability_class: Option<String>,
    /// Link target of link buttons.
    #[serde(alias = "link")]
    pub target: Option<String>,
    /// Display order of a container's children.
    pub layout: Vec<String>,
    pub collapsed: bool,
}

/// Accept versions written either as strings or as bare numbers.
fn version_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawVersion {
        Text(String),
        Int(i64),
        Float(f64),
    }

    let raw: Option<RawVersion> = Option::deserialize(deserializer)?;
    Ok(raw.map(|value| match value {
        RawVersion::Text(text) => text.trim().to_string(),
        RawVersion::Int(number) => number.to_string(),
        RawVersion::Float(number) => number.to_string(),
    }))
}

impl BundleMetadata {
    /// Find the metadata file inside a bundle folder.
    pub fn locate(dir: &Path) -> Option<PathBuf> {
        METADATA_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Load the metadata of the bundle at `dir`.
    ///
    /// Returns `Ok(None)` when the bundle has no metadata file, and a
    /// component error when the file exists but cannot be parsed.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let Some(path) = Self::locate(dir) else {
            return Ok(None);
        };
        let content = fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(Some(Self::default()));
        }
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let parsed = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        };
        parsed
            .map(Some)
            .map_err(|reason| LoaderError::component(&path, reason))
    }
}

// ---------------------------------------------------------------------------
// Legacy script parameters
// ---------------------------------------------------------------------------

static PARAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?ms)^__(\w+)__\s*=\s*(?:"""(.*?)"""|'''(.*?)'''|"([^"\n]*)"|'([^'\n]*)'|(True|False|[0-9][0-9.]*))"#,
    )
    .expect("legacy parameter pattern is valid")
});

static DOCSTRING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)\A(?:\s*#[^\n]*\n)*\s*(?:"""(.*?)"""|'''(.*?)''')"#)
        .expect("docstring pattern is valid")
});

/// Module-level `__name__ = value` assignments found in a Python script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyScriptParams {
    values: HashMap<String, String>,
}

impl LegacyScriptParams {
    /// Scan script source text.
    pub fn from_source(source: &str) -> Self {
        let mut values = HashMap::new();
        for caps in PARAM_RE.captures_iter(source) {
            let key = caps[1].to_lowercase();
            let value = (2..=6)
                .find_map(|i| caps.get(i))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            values.entry(key).or_insert(value);
        }
        if !values.contains_key("doc") {
            if let Some(caps) = DOCSTRING_RE.captures(source) {
                if let Some(doc) = caps.get(1).or_else(|| caps.get(2)) {
                    values.insert("doc".to_string(), doc.as_str().trim().to_string());
                }
            }
        }
        Self { values }
    }

    /// Read and scan a script file. Unreadable files yield no parameters.
    pub fn read(script: &Path) -> Self {
        fs::read_to_string(script)
            .map(|source| Self::from_source(&source))
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fill fields of `meta` that are still unset.
    pub fn fill(&self, meta: &mut BundleMetadata) {
        fill_text(&mut meta.title, self.get("title"));
        fill_text(&mut meta.tooltip, self.get("doc"));
        fill_text(&mut meta.author, self.get("author"));
        fill_text(&mut meta.help_url, self.get("helpurl"));
        fill_text(&mut meta.min_host_version, self.get("min_revit_ver"));
        fill_text(&mut meta.max_host_version, self.get("max_revit_ver"));
        if meta.context.is_none() {
            if let Some(context) = self.get("context").filter(|c| !c.is_empty()) {
                meta.context = Some(ContextSpec::Text(context.to_string()));
            }
        }
        if meta.beta.is_none() {
            meta.beta = self.get("beta").map(|b| b.eq_ignore_ascii_case("true"));
        }
    }
}

fn fill_text(slot: &mut Option<String>, value: Option<&str>) {
    if slot.is_none() {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            *slot = Some(value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_yaml_metadata() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("bundle.yaml"),
            "title: Run It\ntooltip: Runs it\ncontext:\n  all-of: [wall, door]\nmin_revit_version: 2021\nengine:\n  clean: true\n",
        )
        .unwrap();

        let meta = BundleMetadata::load(tmp.path()).unwrap().unwrap();
        assert_eq!(meta.title.as_deref(), Some("Run It"));
        assert_eq!(meta.tooltip.as_deref(), Some("Runs it"));
        assert_eq!(meta.min_host_version.as_deref(), Some("2021"));
        assert!(meta.engine.unwrap().clean);
        assert!(matches!(meta.context, Some(ContextSpec::Map(_))));
    }

    #[test]
    fn test_load_json_metadata() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("bundle.json"),
            r#"{"title": "Docs", "hyperlink": "https://example.com", "max_revit_version": "2024"}"#,
        )
        .unwrap();

        let meta = BundleMetadata::load(tmp.path()).unwrap().unwrap();
        assert_eq!(meta.hyperlink.as_deref(), Some("https://example.com"));
        assert_eq!(meta.max_host_version.as_deref(), Some("2024"));
    }

    #[test]
    fn test_missing_metadata_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(BundleMetadata::load(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn test_malformed_metadata_is_component_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("bundle.yaml"), "title: [unclosed\n").unwrap();
        let err = BundleMetadata::load(tmp.path()).unwrap_err();
        assert!(matches!(err, LoaderError::ComponentParse { .. }));
    }

    #[test]
    fn test_layout_list() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("bundle.yaml"),
            "layout:\n  - Second\n  - \"---\"\n  - First\n",
        )
        .unwrap();
        let meta = BundleMetadata::load(tmp.path()).unwrap().unwrap();
        assert_eq!(meta.layout, vec!["Second", "---", "First"]);
    }

    #[test]
    fn test_legacy_params() {
        let source = r#"# -*- coding: utf-8 -*-
"""Flips the selected doors."""
__title__ = 'Flip\nDoors'
__author__ = "Jane"
__context__ = 'selection'
__min_revit_ver__ = 2020
__beta__ = True
"#;
        let params = LegacyScriptParams::from_source(source);
        assert_eq!(params.get("title"), Some("Flip\\nDoors"));
        assert_eq!(params.get("author"), Some("Jane"));
        assert_eq!(params.get("doc"), Some("Flips the selected doors."));
        assert_eq!(params.get("min_revit_ver"), Some("2020"));

        let mut meta = BundleMetadata {
            author: Some("From yaml".to_string()),
            ..Default::default()
        };
        params.fill(&mut meta);
        assert_eq!(meta.author.as_deref(), Some("From yaml"));
        assert_eq!(meta.tooltip.as_deref(), Some("Flips the selected doors."));
        assert_eq!(meta.beta, Some(true));
        assert_eq!(
            meta.context,
            Some(ContextSpec::Text("selection".to_string()))
        );
    }

    #[test]
    fn test_doc_assignment_wins_over_docstring() {
        let source = "\"\"\"Module doc.\"\"\"\n__doc__ = \"\"\"Explicit\ndoc\"\"\"\n";
        let params = LegacyScriptParams::from_source(source);
        assert_eq!(params.get("doc"), Some("Explicit\ndoc"));
    }

    #[test]
    fn test_no_params() {
        assert!(LegacyScriptParams::from_source("print('hi')\n").is_empty());
    }
}
