//! Host event names and hook file-name matching.

/// Event fired before a host command runs; its target is the command id.
pub const COMMAND_BEFORE_EXEC: &str = "command-before-exec";

/// Every host event a hook script can bind to.
pub const HOOK_EVENTS: &[&str] = &[
    "app-closing",
    "app-idling",
    "app-init",
    COMMAND_BEFORE_EXEC,
    "dialog-showing",
    "doc-changed",
    "doc-closed",
    "doc-closing",
    "doc-created",
    "doc-creating",
    "doc-opened",
    "doc-opening",
    "doc-printed",
    "doc-printing",
    "doc-saved-as",
    "doc-saved",
    "doc-saving-as",
    "doc-saving",
    "doc-synced",
    "doc-syncing",
    "doc-worksharing-enabled",
    "dock-focus-changed",
    "dock-visibility-changed",
    "fabparts-browser-changed",
    "failure-processing",
    "family-loaded",
    "family-loading",
    "file-exported",
    "file-exporting",
    "file-imported",
    "file-importing",
    "formula-editing",
    "link-opened",
    "link-opening",
    "options-showing",
    "progress-changed",
    "type-duplicated",
    "type-duplicating",
    "view-activated",
    "view-activating",
    "view-exported",
    "view-exporting",
    "view-printed",
    "view-printing",
    "worksharing-ops-progress-changed",
];

/// Whether `name` is a known event.
pub fn is_known_event(name: &str) -> bool {
    HOOK_EVENTS.iter().any(|e| e.eq_ignore_ascii_case(name))
}

/// Split a hook file stem into `(event, target)`.
///
/// Accepts `<event>`, `<event>[<target>]` and `<event>-<target>`. When
/// several events prefix the stem the longest one wins, so `doc-saved-as`
/// is never read as `doc-saved` with target `as`.
pub fn match_event(stem: &str) -> Option<(&'static str, Option<String>)> {
    let event = HOOK_EVENTS
        .iter()
        .copied()
        .filter(|e| stem.get(..e.len()).map_or(false, |p| p.eq_ignore_ascii_case(e)))
        .max_by_key(|e| e.len())?;

    let rest = stem.get(event.len()..)?;
    if rest.is_empty() {
        return Some((event, None));
    }
    if let Some(inner) = rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        let target = inner.trim();
        return Some((event, (!target.is_empty()).then(|| target.to_string())));
    }
    if let Some(target) = rest.strip_prefix('-') {
        let target = target.trim();
        if !target.is_empty() {
            return Some((event, Some(target.to_string())));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_event() {
        assert_eq!(match_event("doc-opened"), Some(("doc-opened", None)));
        assert_eq!(match_event("APP-INIT"), Some(("app-init", None)));
    }

    #[test]
    fn test_longest_event_wins() {
        assert_eq!(match_event("doc-saved-as"), Some(("doc-saved-as", None)));
        assert_eq!(
            match_event("doc-saved-backup"),
            Some(("doc-saved", Some("backup".to_string())))
        );
    }

    #[test]
    fn test_bracket_target() {
        assert_eq!(
            match_event("command-before-exec[ID_OBJECTS_WALL]"),
            Some((COMMAND_BEFORE_EXEC, Some("ID_OBJECTS_WALL".to_string())))
        );
        assert_eq!(match_event("doc-opened[]"), Some(("doc-opened", None)));
    }

    #[test]
    fn test_unknown_or_malformed() {
        assert_eq!(match_event("startup"), None);
        assert_eq!(match_event("doc-opened2"), None);
        assert_eq!(match_event("doc-opened-"), None);
    }

    #[test]
    fn test_events_unique() {
        for (i, a) in HOOK_EVENTS.iter().enumerate() {
            assert!(!HOOK_EVENTS[i + 1..].contains(a), "duplicate event {}", a);
        }
        assert!(is_known_event("View-Activated"));
    }
}
