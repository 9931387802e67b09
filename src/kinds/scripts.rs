//! Script and content file discovery inside a command bundle.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::components::types::ICON_FILE_NAME;
use crate::components::ScriptLanguage;

/// File-name endings that mark a bundle's main script.
pub const SCRIPT_POSTFIXES: &[&str] = &[
    "script.py",
    "script.cs",
    "script.vb",
    "script.rb",
    "script.dyn",
    "script.gh",
    "script.ghx",
];

/// File-name endings that mark the alternate (modifier-click) script.
pub const CONFIG_POSTFIXES: &[&str] = &[
    "config.py",
    "config.cs",
    "config.vb",
    "config.rb",
    "config.dyn",
    "config.gh",
    "config.ghx",
];

const CONTENT_PREFIX: &str = "content";
const ALT_CONTENT_PREFIX: &str = "other";
const CONTENT_SUFFIX: &str = ".rfa";

/// Files found in one command bundle folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleScripts {
    pub script: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub content: Option<PathBuf>,
    pub alt_content: Option<PathBuf>,
    pub icon: Option<PathBuf>,
}

impl BundleScripts {
    /// Scan `dir` (non-recursively). File names are visited in sorted order so
    /// the first match is stable across platforms.
    pub fn discover(dir: &Path) -> Self {
        let mut names: Vec<String> = match fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();

        let mut found = Self::default();
        for name in &names {
            let lowered = name.to_lowercase();
            let path = dir.join(name);
            if found.script.is_none() && ends_with_any(&lowered, SCRIPT_POSTFIXES) {
                found.script = Some(path);
            } else if found.config.is_none() && ends_with_any(&lowered, CONFIG_POSTFIXES) {
                found.config = Some(path);
            } else if lowered.ends_with(CONTENT_SUFFIX) {
                if lowered.starts_with(CONTENT_PREFIX) {
                    // the unversioned file wins over versioned variants
                    if found.content.is_none() || lowered == "content.rfa" {
                        found.content = Some(path);
                    }
                } else if lowered.starts_with(ALT_CONTENT_PREFIX) && found.alt_content.is_none() {
                    found.alt_content = Some(path);
                }
            } else if lowered == ICON_FILE_NAME {
                found.icon = Some(path);
            }
        }
        found
    }

    /// Language of the main script, or `Undetermined` when there is none.
    pub fn language(&self) -> ScriptLanguage {
        match &self.script {
            Some(path) => {
                let first_line = read_first_line(path);
                ScriptLanguage::from_script_path(path, first_line.as_deref())
            }
            None => ScriptLanguage::Undetermined,
        }
    }
}

fn ends_with_any(name: &str, postfixes: &[&str]) -> bool {
    postfixes.iter().any(|p| name.ends_with(p))
}

pub(crate) fn read_first_line(path: &Path) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).ok()?;
    Some(line.trim_end().to_string())
}
