//! Stable identities for bundles.
//!
//! A bundle's `unique_name` is computed from the text of its path alone, so a
//! fresh parse and a cache-restored parse of the same files always agree and
//! the host can keep its bindings across reloads.

use std::path::{Component as PathComponent, Path};

use super::types::{LIB_EXTENSION_POSTFIX, UI_EXTENSION_POSTFIX};

/// Separator placed between the cleaned bundle names of a unique name.
///
/// `_` never survives [`cleanup_identifier`], so joined names cannot collide.
pub const UNIQUE_NAME_SEPARATOR: &str = "_";

/// Separator used in composite ids (hooks, availability types).
pub const UNIQUE_ID_SEPARATOR: char = '-';

/// Replacement table for characters that cannot appear in an identifier.
const SPECIAL_CHARS: &[(char, &str)] = &[
    (' ', ""),
    ('~', ""),
    ('!', "EXCLAM"),
    ('@', "AT"),
    ('#', "SHARP"),
    ('$', "DOLLAR"),
    ('%', "PERCENT"),
    ('^', ""),
    ('&', "AND"),
    ('*', "STAR"),
    ('+', "PLUS"),
    (';', ""),
    (':', ""),
    (',', ""),
    ('"', ""),
    ('\'', ""),
    ('{', ""),
    ('}', ""),
    ('[', ""),
    (']', ""),
    ('(', ""),
    (')', ""),
    ('-', "MINUS"),
    ('=', "EQUALS"),
    ('<', ""),
    ('>', ""),
    ('?', "QMARK"),
    ('.', "DOT"),
    ('_', "UNDERS"),
    ('|', "VERT"),
    ('/', ""),
    ('\\', ""),
];

/// Replace every special character in `input` with its identifier-safe form.
///
/// Characters listed in `skip` are kept verbatim.
///
/// ```
/// use bundle_loader::components::cleanup_identifier;
///
/// assert_eq!(cleanup_identifier("TEST@Some*<value>", &[]), "TESTATSomeSTARvalue");
/// assert_eq!(cleanup_identifier("doc-opened", &['-']), "doc-opened");
/// ```
pub fn cleanup_identifier(input: &str, skip: &[char]) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if skip.contains(&ch) {
            out.push(ch);
            continue;
        }
        match SPECIAL_CHARS.iter().find(|(special, _)| *special == ch) {
            Some((_, replacement)) => out.push_str(replacement),
            None => out.push(ch),
        }
    }
    out
}

/// Split a bundle folder name into `(name, postfix)` at the last dot.
///
/// Returns `None` when the name has no postfix (no dot, or a leading dot only).
pub fn split_bundle_name(folder_name: &str) -> Option<(&str, &str)> {
    let idx = folder_name.rfind('.')?;
    if idx == 0 || idx == folder_name.len() - 1 {
        return None;
    }
    Some((&folder_name[..idx], &folder_name[idx..]))
}

/// Compute the unique name of the bundle at `path`.
///
/// Every path segment from the owning extension folder downwards that carries
/// a bundle postfix contributes its cleaned name. Segments above the extension
/// are ignored, so moving the whole install root does not change identities.
/// When no extension folder appears in the path the bundle's own name is used.
pub fn unique_name_for(path: &Path) -> String {
    let mut pieces: Vec<String> = Vec::new();
    let mut inside_extension = false;

    for part in path.components() {
        let PathComponent::Normal(os_name) = part else {
            continue;
        };
        let segment = os_name.to_string_lossy();
        let lowered = segment.to_lowercase();
        if lowered.ends_with(UI_EXTENSION_POSTFIX) || lowered.ends_with(LIB_EXTENSION_POSTFIX) {
            // nested extension folders restart the identity
            inside_extension = true;
            pieces.clear();
        }
        if !inside_extension {
            continue;
        }
        if let Some((stem, _)) = split_bundle_name(&segment) {
            pieces.push(cleanup_identifier(stem, &[]));
        }
    }

    if pieces.is_empty() {
        let fallback = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = split_bundle_name(&fallback)
            .map(|(stem, _)| stem.to_string())
            .unwrap_or(fallback);
        return cleanup_identifier(&stem, &[]);
    }

    pieces.join(UNIQUE_NAME_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_cleanup_replaces_special_chars() {
        assert_eq!(cleanup_identifier("Flip doors", &[]), "Flipdoors");
        assert_eq!(cleanup_identifier("a.b_c-d", &[]), "aDOTbUNDERScMINUSd");
        assert_eq!(cleanup_identifier("a-b", &['-']), "a-b");
    }

    #[test]
    fn test_split_bundle_name() {
        assert_eq!(
            split_bundle_name("RunIt.pushbutton"),
            Some(("RunIt", ".pushbutton"))
        );
        assert_eq!(split_bundle_name("My.Tools.extension"), Some(("My.Tools", ".extension")));
        assert_eq!(split_bundle_name("hooks"), None);
        assert_eq!(split_bundle_name(".hidden"), None);
        assert_eq!(split_bundle_name("trailing."), None);
    }

    #[test]
    fn test_unique_name_from_bundle_path() {
        let path = PathBuf::from(
            "/opt/host/MyTools.extension/Tab1.tab/PanelA.panel/Flip doors.pushbutton",
        );
        assert_eq!(unique_name_for(&path), "MyTools_Tab1_PanelA_Flipdoors");
    }

    #[test]
    fn test_unique_name_ignores_segments_above_extension() {
        let a = PathBuf::from("/a/b.tab/MyTools.extension/Tab1.tab");
        let b = PathBuf::from("/elsewhere/MyTools.extension/Tab1.tab");
        assert_eq!(unique_name_for(&a), unique_name_for(&b));
    }

    #[test]
    fn test_unique_name_is_deterministic() {
        let path = PathBuf::from("/x/Tools.extension/T.tab/P.panel/Stack3.stack/B.pushbutton");
        let first = unique_name_for(&path);
        for _ in 0..5 {
            assert_eq!(unique_name_for(&path), first);
        }
    }

    #[test]
    fn test_unique_name_does_not_collide_on_concatenation() {
        let a = PathBuf::from("/x/Tools.extension/ab.tab/c.panel");
        let b = PathBuf::from("/x/Tools.extension/a.tab/bc.panel");
        assert_ne!(unique_name_for(&a), unique_name_for(&b));
    }

    #[test]
    fn test_unique_name_without_extension_uses_own_name() {
        let path = PathBuf::from("/tmp/Loose Tool.pushbutton");
        assert_eq!(unique_name_for(&path), "LooseTool");
    }
}
