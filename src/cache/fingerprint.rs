//! Content hash of an extension folder.
//!
//! The hash covers the recursive listing under the extension: relative path,
//! size and modification time of every file (or the file bytes in
//! [`HashMode::Content`]). Entries are visited in sorted order, so the hash
//! does not depend on how the filesystem enumerates them.

use std::fs;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{LoaderError, Result};

/// Folded in place of the fingerprint of an entry that cannot be read.
const UNREADABLE_MARKER: &[u8] = b"unreadable";

/// What each file contributes to the content hash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashMode {
    /// Relative path, size and modification time.
    #[default]
    Metadata,
    /// Relative path and file bytes.
    Content,
}

/// Compute the content hash of the folder at `root` as lowercase hex.
///
/// Only a missing root is an error. Entries that cannot be listed or read
/// are logged and hashed as unreadable, so they still change the hash
/// without failing the whole extension.
pub fn content_hash(root: &Path, mode: HashMode) -> Result<String> {
    if !root.is_dir() {
        return Err(LoaderError::structural(root, "cannot hash a missing directory"));
    }

    let mut hasher = Sha256::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .follow_links(false);

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                fold_file(&mut hasher, root, entry.path(), mode)
            }
            Ok(_) => {}
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Unlistable entry in extension, hashing as unreadable"
                );
                fold_marker(&mut hasher, &relative_path(root, &path));
            }
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn fold_marker(hasher: &mut Sha256, relative: &str) {
    hasher.update(relative.as_bytes());
    hasher.update([0u8]);
    hasher.update(UNREADABLE_MARKER);
}

fn fold_file(hasher: &mut Sha256, root: &Path, path: &Path, mode: HashMode) {
    let relative = relative_path(root, path);
    match file_fingerprint(path, mode) {
        Ok(fingerprint) => {
            hasher.update(relative.as_bytes());
            hasher.update([0u8]);
            hasher.update(fingerprint);
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Unreadable file in extension, hashing as unreadable"
            );
            fold_marker(hasher, &relative);
        }
    }
}

/// Per-file bytes folded into the hash.
fn file_fingerprint(path: &Path, mode: HashMode) -> io::Result<Vec<u8>> {
    match mode {
        HashMode::Metadata => {
            let meta = fs::symlink_metadata(path)?;
            let modified = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            let mut bytes = meta.len().to_le_bytes().to_vec();
            bytes.extend_from_slice(&modified.to_le_bytes());
            Ok(bytes)
        }
        HashMode::Content => Ok(Sha256::digest(fs::read(path)?).to_vec()),
    }
}
