//! Versioned JSON cache codec.
//!
//! The first line of the file is the compact [`CacheHeader`]; the rest is a
//! body holding the extension record and a tree of tagged child records.
//! Validity checks read the first line only. Each child record names its
//! `kind_id`; restoring looks the kind up in the [`KindRegistry`] and hands
//! the record's attributes to that kind's restorer.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::components::{Component, ComponentBody, Extension, ExtensionManifest, ExtensionType};
use crate::error::{LoaderError, Result};
use crate::kinds::registry::root_child_roles;
use crate::kinds::{KindRegistry, KindRole};

use super::{CacheCodec, CacheHeader};

/// JSON codec (`.json` files).
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

/// Everything after the header line.
#[derive(Debug, Serialize, Deserialize)]
struct Body {
    extension: ExtensionRecord,
    children: Vec<ComponentRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExtensionRecord {
    name: String,
    unique_name: String,
    kind_id: String,
    extension_type: ExtensionType,
    /// Schema of the loader that parsed the tree.
    schema_version: String,
    library_search_paths: Vec<PathBuf>,
    manifest: ExtensionManifest,
    startup_script: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ComponentRecord {
    kind_id: String,
    name: String,
    unique_name: String,
    directory: PathBuf,
    #[serde(default)]
    search_paths: Vec<PathBuf>,
    #[serde(default)]
    icon: Option<PathBuf>,
    #[serde(default)]
    attributes: serde_json::Value,
    #[serde(default)]
    children: Vec<ComponentRecord>,
}

impl ComponentRecord {
    fn from_component(component: &Component) -> Result<Self> {
        let attributes = match &component.body {
            ComponentBody::Container(info) => serde_json::to_value(info)?,
            ComponentBody::Command(bundle) => serde_json::to_value(bundle.as_ref())?,
            ComponentBody::Marker => serde_json::Value::Null,
        };
        Ok(Self {
            kind_id: component.kind_id.clone(),
            name: component.name.clone(),
            unique_name: component.unique_name.clone(),
            directory: component.directory.clone(),
            search_paths: component.search_paths.clone(),
            icon: component.icon.clone(),
            attributes,
            children: component
                .children
                .iter()
                .map(Self::from_component)
                .collect::<Result<_>>()?,
        })
    }

    /// Rebuild the component, restoring children before attaching them.
    /// Returns the component and its kind's role.
    fn restore(self, registry: &KindRegistry) -> Result<(Component, KindRole)> {
        let spec = registry.get(&self.kind_id).ok_or_else(|| {
            LoaderError::component(&self.directory, format!("unknown kind '{}'", self.kind_id))
        })?;

        let mut children = Vec::with_capacity(self.children.len());
        for record in self.children {
            let (child, role) = record.restore(registry)?;
            if !spec.accepts_role(role) {
                return Err(LoaderError::component(
                    &child.directory,
                    format!("kind '{}' does not accept {:?} children", spec.kind_id, role),
                ));
            }
            children.push(child);
        }

        let body = (spec.restore)(spec, self.attributes)
            .map_err(|reason| LoaderError::component(&self.directory, reason))?;

        let component = Component {
            name: self.name,
            unique_name: self.unique_name,
            directory: self.directory,
            kind_id: self.kind_id,
            is_container: spec.is_container,
            children,
            search_paths: self.search_paths,
            icon: self.icon,
            body,
        };
        Ok((component, spec.role))
    }
}

impl CacheCodec for TextCodec {
    fn name(&self) -> &'static str {
        "text"
    }

    fn file_extension(&self) -> &'static str {
        "json"
    }

    fn layout_tag(&self) -> &'static str {
        "json2"
    }

    fn encode(&self, header: &CacheHeader, extension: &Extension) -> Result<Vec<u8>> {
        let body = Body {
            extension: ExtensionRecord {
                name: extension.name.clone(),
                unique_name: extension.unique_name.clone(),
                kind_id: extension.kind_id.clone(),
                extension_type: extension.extension_type,
                schema_version: extension.schema_version.clone(),
                library_search_paths: extension.library_search_paths.clone(),
                manifest: extension.manifest.clone(),
                startup_script: extension.startup_script.clone(),
            },
            children: extension
                .children
                .iter()
                .map(ComponentRecord::from_component)
                .collect::<Result<_>>()?,
        };
        // compact JSON never contains a raw newline
        let mut out = serde_json::to_vec(header)?;
        out.push(b'\n');
        out.extend(serde_json::to_vec_pretty(&body)?);
        Ok(out)
    }

    fn read_header(&self, path: &Path) -> Result<CacheHeader> {
        let mut line = String::new();
        BufReader::new(File::open(path)?).read_line(&mut line)?;
        Ok(serde_json::from_str(line.trim_end())?)
    }

    fn decode(&self, path: &Path, registry: &KindRegistry) -> Result<Extension> {
        let content = fs::read_to_string(path)?;
        let (header_line, body) = content
            .split_once('\n')
            .ok_or_else(|| LoaderError::component(path, "cache file has no body"))?;
        let header: CacheHeader = serde_json::from_str(header_line)?;
        let body: Body = serde_json::from_str(body)?;
        let record = body.extension;
        let accepted = root_child_roles(record.extension_type);

        let mut children = Vec::with_capacity(body.children.len());
        for child in body.children {
            let (component, role) = child.restore(registry)?;
            if !accepted.contains(&role) {
                return Err(LoaderError::component(
                    &component.directory,
                    format!("extension does not accept {:?} children", role),
                ));
            }
            children.push(component);
        }

        Ok(Extension {
            name: record.name,
            unique_name: record.unique_name,
            directory: header.directory,
            kind_id: record.kind_id,
            extension_type: record.extension_type,
            content_hash: header.content_hash,
            schema_version: record.schema_version,
            library_search_paths: record.library_search_paths,
            manifest: record.manifest,
            startup_script: record.startup_script,
            children,
        })
    }
}
