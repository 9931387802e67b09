//! Loader configuration
//!
//! `LoaderConfig` is read from `~/.bundle-loader/config.json` (every field is
//! optional) and then patched from `BUNDLE_LOADER_*` environment variables.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::fingerprint::HashMode;
use crate::error::{LoaderError, Result};

/// Environment variable overriding `extension_dirs` (path-list separated).
pub const ENV_EXTENSION_DIRS: &str = "BUNDLE_LOADER_EXTENSION_DIRS";
/// Environment variable overriding `cache.dir`.
pub const ENV_CACHE_DIR: &str = "BUNDLE_LOADER_CACHE_DIR";
/// Environment variable overriding `cache.binary` (`true`/`false`/`1`/`0`).
pub const ENV_BINARY_CACHE: &str = "BUNDLE_LOADER_BINARY_CACHE";
/// Environment variable overriding `host.version`.
pub const ENV_HOST_VERSION: &str = "BUNDLE_LOADER_HOST_VERSION";

const CONFIG_DIR_NAME: &str = ".bundle-loader";
const CONFIG_FILE_NAME: &str = "config.json";

/// Top-level loader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Root folders scanned for `*.extension` and `*.lib` folders.
    pub extension_dirs: Vec<String>,
    /// Extension names to load. Empty means all.
    pub allowed_extensions: Vec<String>,
    /// Extension names never loaded. Takes precedence over the allowlist.
    pub blocked_extensions: Vec<String>,
    /// Search paths appended to every extension.
    pub global_search_paths: Vec<String>,
    pub host: HostConfig,
    pub cache: CacheConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extension_dirs: vec![format!("~/{}/extensions", CONFIG_DIR_NAME)],
            allowed_extensions: Vec::new(),
            blocked_extensions: Vec::new(),
            global_search_paths: Vec::new(),
            host: HostConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Versions of the running host, used for command version gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub version: String,
    pub framework_version: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            version: "2024".to_string(),
            framework_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Binary codec when true, text codec otherwise.
    pub binary: bool,
    /// Cache folder. Defaults to the platform cache dir.
    pub dir: Option<String>,
    /// Prefix of cache file names.
    pub file_prefix: String,
    pub hash_mode: HashMode,
    /// Bumping this invalidates every existing cache file.
    pub schema_version: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: true,
            dir: None,
            file_prefix: "bundleloader_".to_string(),
            hash_mode: HashMode::Metadata,
            schema_version: "1".to_string(),
        }
    }
}

impl CacheConfig {
    /// Resolved cache folder.
    pub fn resolved_dir(&self) -> PathBuf {
        match &self.dir {
            Some(dir) => expand_home(dir),
            None => dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("bundle-loader"),
        }
    }
}

impl LoaderConfig {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            LoaderError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            LoaderError::Config(format!("Invalid config {}: {}", path.display(), e))
        })
    }

    /// Read the config from `path` (or the default location) and apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `BUNDLE_LOADER_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dirs) = lookup(ENV_EXTENSION_DIRS) {
            self.extension_dirs = std::env::split_paths(&dirs)
                .map(|p| p.to_string_lossy().into_owned())
                .filter(|p| !p.is_empty())
                .collect();
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            self.cache.dir = Some(dir);
        }
        if let Some(flag) = lookup(ENV_BINARY_CACHE) {
            match flag.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => self.cache.binary = true,
                "0" | "false" | "no" => self.cache.binary = false,
                other => warn!(value = %other, "Ignoring invalid {}", ENV_BINARY_CACHE),
            }
        }
        if let Some(version) = lookup(ENV_HOST_VERSION) {
            self.host.version = version;
        }
    }

    /// Whether an extension is permitted by the allow/block lists.
    ///
    /// Names compare case-insensitively; the blocklist wins.
    pub fn is_extension_permitted(&self, name: &str) -> bool {
        let listed = |list: &[String]| list.iter().any(|n| n.eq_ignore_ascii_case(name));
        if listed(&self.blocked_extensions) {
            return false;
        }
        self.allowed_extensions.is_empty() || listed(&self.allowed_extensions)
    }

    /// Extension root folders with `~` expanded.
    pub fn extension_roots(&self) -> Vec<PathBuf> {
        self.extension_dirs.iter().map(|d| expand_home(d)).collect()
    }

    /// Global search paths with `~` expanded.
    pub fn global_search_paths(&self) -> Vec<PathBuf> {
        self.global_search_paths.iter().map(|d| expand_home(d)).collect()
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().unwrap_or_default().join(rest),
        None if path == "~" => dirs::home_dir().unwrap_or_default(),
        None => PathBuf::from(path),
    }
}
