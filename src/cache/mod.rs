//! Extension cache for bundle-loader
//!
//! A parsed [`Extension`] is persisted so later sessions can skip the tree
//! walk. The file starts with a [`CacheHeader`]; the record is reused only
//! while the header's directory, schema version and content hash all match
//! the freshly stubbed extension. Two codecs implement [`CacheCodec`]: a
//! compact binary blob and a versioned JSON tree. The configuration picks
//! one; files are never sniffed.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::components::Extension;
use crate::config::CacheConfig;
use crate::error::{LoaderError, Result};
use crate::kinds::KindRegistry;

pub mod binary;
pub mod fingerprint;
pub mod text;

pub use binary::BinaryCodec;
pub use fingerprint::{content_hash, HashMode};
pub use text::TextCodec;

/// Fields checked before a cache record is reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHeader {
    /// Codec that wrote the file.
    pub format: String,
    pub directory: PathBuf,
    /// Effective schema: configured version plus the codec layout tag.
    pub schema_version: String,
    pub content_hash: String,
    pub written_at: DateTime<Utc>,
}

impl CacheHeader {
    /// Whether this header describes the given extension state.
    /// The write timestamp is ignored.
    pub fn matches(&self, directory: &Path, schema_version: &str, content_hash: &str) -> bool {
        self.directory == directory
            && self.schema_version == schema_version
            && self.content_hash == content_hash
    }
}

/// An encoding of a cached extension.
pub trait CacheCodec: Send + Sync {
    /// Short codec name stored in the header.
    fn name(&self) -> &'static str;

    /// Cache file extension (without dot).
    fn file_extension(&self) -> &'static str;

    /// Revision of the on-disk layout. Folded into the effective schema
    /// version so a layout change invalidates old files.
    fn layout_tag(&self) -> &'static str;

    /// Encode the header and the whole extension.
    fn encode(&self, header: &CacheHeader, extension: &Extension) -> Result<Vec<u8>>;

    /// Read only the header of a cache file.
    fn read_header(&self, path: &Path) -> Result<CacheHeader>;

    /// Decode a whole cache file.
    fn decode(&self, path: &Path, registry: &KindRegistry) -> Result<Extension>;
}

/// Cache files of one configured codec inside one folder.
pub struct CacheStore {
    codec: Box<dyn CacheCodec>,
    dir: PathBuf,
    file_prefix: String,
}

impl CacheStore {
    /// Create a store from configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        let codec: Box<dyn CacheCodec> = if config.binary {
            Box::new(BinaryCodec)
        } else {
            Box::new(TextCodec)
        };
        Self::new(codec, config.resolved_dir(), config.file_prefix.clone())
    }

    pub fn new(codec: Box<dyn CacheCodec>, dir: PathBuf, file_prefix: impl Into<String>) -> Self {
        Self {
            codec,
            dir,
            file_prefix: file_prefix.into(),
        }
    }

    pub fn codec_name(&self) -> &'static str {
        self.codec.name()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file of the extension named `extension_name`.
    pub fn cache_path(&self, extension_name: &str) -> PathBuf {
        self.dir.join(format!(
            "{}cache_{}.{}",
            self.file_prefix,
            extension_name,
            self.codec.file_extension()
        ))
    }

    /// Schema version written into headers for an extension built with `schema_version`.
    pub fn effective_schema(&self, schema_version: &str) -> String {
        format!("{}:{}", schema_version, self.codec.layout_tag())
    }

    fn header_for(&self, extension: &Extension) -> CacheHeader {
        CacheHeader {
            format: self.codec.name().to_string(),
            directory: extension.directory.clone(),
            schema_version: self.effective_schema(&extension.schema_version),
            content_hash: extension.content_hash.clone(),
            written_at: Utc::now(),
        }
    }

    fn header_matches(&self, header: &CacheHeader, stub: &Extension) -> bool {
        header.matches(
            &stub.directory,
            &self.effective_schema(&stub.schema_version),
            &stub.content_hash,
        )
    }

    /// Whether a reusable cache record exists for `stub`.
    ///
    /// Reads only the header. Missing, unreadable and stale files are all
    /// reported as `false`.
    pub fn is_cache_valid(&self, stub: &Extension) -> bool {
        let path = self.cache_path(&stub.name);
        if !path.is_file() {
            debug!(extension = %stub.name, "No cache file");
            return false;
        }
        match self.codec.read_header(&path) {
            Ok(header) => {
                let valid = self.header_matches(&header, stub);
                debug!(
                    extension = %stub.name,
                    valid,
                    written_at = %header.written_at,
                    "Checked cache header"
                );
                valid
            }
            Err(e) => {
                warn!(extension = %stub.name, error = %e, "Unreadable cache header");
                false
            }
        }
    }

    /// Restore the cached extension for `stub`.
    ///
    /// # Errors
    /// `LoaderError::CacheRead` when the file is missing, corrupt, stale, or
    /// references an unknown kind.
    pub fn load(&self, stub: &Extension, registry: &KindRegistry) -> Result<Extension> {
        let read_error = |reason: String| LoaderError::CacheRead {
            extension: stub.name.clone(),
            reason,
        };
        let path = self.cache_path(&stub.name);
        let header = self
            .codec
            .read_header(&path)
            .map_err(|e| read_error(e.to_string()))?;
        if !self.header_matches(&header, stub) {
            return Err(read_error("cache record is stale".to_string()));
        }
        let extension = self
            .codec
            .decode(&path, registry)
            .map_err(|e| read_error(e.to_string()))?;
        info!(
            extension = %extension.name,
            codec = self.codec.name(),
            components = extension.component_count(),
            "Restored extension from cache"
        );
        Ok(extension)
    }

    /// Persist `extension`, replacing any previous record atomically.
    ///
    /// # Errors
    /// `LoaderError::CacheWrite` when encoding or any file operation fails.
    pub fn store(&self, extension: &Extension) -> Result<()> {
        let write_error = |reason: String| LoaderError::CacheWrite {
            extension: extension.name.clone(),
            reason,
        };
        let header = self.header_for(extension);
        let bytes = self
            .codec
            .encode(&header, extension)
            .map_err(|e| write_error(e.to_string()))?;

        fs::create_dir_all(&self.dir).map_err(|e| write_error(e.to_string()))?;
        let path = self.cache_path(&extension.name);
        let temp_path = path.with_file_name(format!(
            "{}.tmp",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        ));

        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&temp_path, &path)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&temp_path);
            return Err(write_error(e.to_string()));
        }

        debug!(
            extension = %extension.name,
            path = %path.display(),
            bytes = bytes.len(),
            "Stored extension cache"
        );
        Ok(())
    }

    /// Remove the cache file of one extension. Returns whether a file existed.
    pub fn invalidate(&self, extension_name: &str) -> Result<bool> {
        let path = self.cache_path(extension_name);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        info!(extension = %extension_name, "Invalidated extension cache");
        Ok(true)
    }

    /// Remove every cache file this store owns. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        if !self.dir.is_dir() {
            return Ok(0);
        }
        let prefix = format!("{}cache_", self.file_prefix);
        let suffix = format!(".{}", self.codec.file_extension());
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) && name.ends_with(&suffix) {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        info!(dir = %self.dir.display(), removed, "Cleared extension caches");
        Ok(removed)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::path::{Path, PathBuf};

    use tempfile::TempDir;

    use crate::components::{Extension, ExtensionType};
    use crate::kinds::KindRegistry;
    use crate::parser::TreeParser;

    use super::HashMode;

    /// Build `MyTools.extension` with one tab, panel, stack, pulldown and buttons.
    pub fn sample_extension_dir(root: &Path) -> PathBuf {
        let ext = root.join("MyTools.extension");
        let panel = ext.join("Tab1.tab").join("PanelA.panel");
        let run = panel.join("RunIt.pushbutton");
        fs::create_dir_all(&run).unwrap();
        fs::write(run.join("script.py"), "__title__ = 'Run It'\n").unwrap();
        fs::write(run.join("bundle.yaml"), "context:\n  all-of: [wall, door]\n").unwrap();

        let stack = panel.join("Stack1.stack");
        let pull = stack.join("More.pulldown");
        fs::create_dir_all(pull.join("A.pushbutton")).unwrap();
        fs::create_dir_all(pull.join("B.pushbutton")).unwrap();
        fs::write(pull.join("A.pushbutton").join("script.cs"), "class A {}").unwrap();
        fs::write(pull.join("B.pushbutton").join("script.py"), "").unwrap();
        fs::write(pull.join("bundle.yaml"), "title: More Tools\nlayout: [B, A]\n").unwrap();

        let url = panel.join("Docs.urlbutton");
        fs::create_dir_all(&url).unwrap();
        fs::write(url.join("bundle.yaml"), "hyperlink: https://example.com\n").unwrap();
        fs::create_dir_all(ext.join("lib")).unwrap();
        fs::write(ext.join("startup.py"), "").unwrap();
        ext
    }

    pub fn parsed_sample(tmp: &TempDir) -> Extension {
        let dir = sample_extension_dir(tmp.path());
        let registry = KindRegistry::with_builtin();
        let stub = Extension::stub(&dir, ExtensionType::Ui, "1", HashMode::Metadata).unwrap();
        TreeParser::new(&registry).parse(stub).unwrap()
    }
}
