//! Error types for bundle-loader
//!
//! This module defines all error types used throughout the loader pipeline.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! Errors are scoped to the smallest unit that failed (one bundle, one cache
//! operation, one artifact, one hook). Only [`LoaderError::Structural`] is
//! allowed to abort a whole extension, and the loader catches even that per
//! extension.

use std::path::PathBuf;

use thiserror::Error;

/// The primary error type for bundle-loader operations.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// The extension root (or a search root) does not exist or is not a directory.
    #[error("Structural error: {path}: {reason}")]
    Structural { path: PathBuf, reason: String },

    /// One bundle is malformed (bad metadata, unreadable folder, etc.)
    #[error("Component parse error at {path}: {reason}")]
    ComponentParse { path: PathBuf, reason: String },

    /// The cache store could not be read; callers treat this as a cache miss.
    #[error("Cache read error for '{extension}': {reason}")]
    CacheRead { extension: String, reason: String },

    /// The cache store could not be written; the next session re-parses.
    #[error("Cache write error for '{extension}': {reason}")]
    CacheWrite { extension: String, reason: String },

    /// A command or availability artifact could not be produced.
    #[error("Synthesis error for '{unique_name}': {reason}")]
    Synthesis { unique_name: String, reason: String },

    /// A hook could not be registered with the host.
    #[error("Hook registration error for '{hook_id}': {reason}")]
    HookRegistration { hook_id: String, reason: String },

    /// Configuration-related errors (invalid config file, bad override, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML bundle metadata errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Binary cache encoding errors
    #[error("Binary encoding error: {0}")]
    Bincode(#[from] bincode::Error),
}

impl LoaderError {
    pub fn structural(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Structural {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn component(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ComponentParse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn synthesis(unique_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Synthesis {
            unique_name: unique_name.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error aborts a whole extension (as opposed to one unit).
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Structural { .. })
    }
}

/// A specialized `Result` type for bundle-loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;
