//! Display order of a container's children.
//!
//! The parser keeps children in filesystem enumeration order. Containers may
//! declare a `layout` list in their metadata; hosts that build UI call
//! [`display_order`] to get the children in the declared order with layout
//! markers spliced in.

use super::types::{Component, SEPARATOR_KIND, SLIDEOUT_KIND};

/// Layout entry that inserts a separator.
pub const SEPARATOR_ITEM: &str = "---";
/// Layout entry that inserts a slideout.
pub const SLIDEOUT_ITEM: &str = ">>>";

/// A layout entry split into the referenced name and an optional title override,
/// e.g. `Flip[title:Flip Doors]`.
fn split_directive(item: &str) -> (&str, Option<&str>) {
    let item = item.trim();
    if let (Some(open), true) = (item.find('['), item.ends_with(']')) {
        let name = item[..open].trim();
        let directive = &item[open + 1..item.len() - 1];
        if let Some((key, value)) = directive.split_once(':') {
            if key.trim().eq_ignore_ascii_case("title") {
                return (name, Some(value.trim()));
            }
        }
        return (name, None);
    }
    (item, None)
}

fn matches_item(child: &Component, name: &str) -> bool {
    child.name.eq_ignore_ascii_case(name) || child.bundle_name().eq_ignore_ascii_case(name)
}

/// Children of `parent` in display order.
///
/// Listed children come first in layout order, unlisted ones follow in
/// enumeration order. Separator and slideout entries become marker components;
/// markers are never emitted last, and repeated entries are ignored. Without
/// a layout the children are returned as-is.
pub fn display_order(parent: &Component) -> Vec<Component> {
    let layout = parent
        .container()
        .map(|info| info.layout.as_slice())
        .unwrap_or_default();
    if layout.is_empty() {
        return parent.children.clone();
    }

    let mut placed = vec![false; parent.children.len()];
    let mut ordered: Vec<Component> = Vec::with_capacity(parent.children.len());

    for (index, item) in layout.iter().enumerate() {
        let marker_kind = match item.trim() {
            SEPARATOR_ITEM => Some(SEPARATOR_KIND),
            SLIDEOUT_ITEM => Some(SLIDEOUT_KIND),
            _ => None,
        };
        if let Some(kind) = marker_kind {
            // markers directly after another marker or at the start are dropped
            if ordered.last().map_or(false, |last| !last.is_marker()) {
                ordered.push(Component::marker(kind, parent, index));
            }
            continue;
        }

        let (name, title) = split_directive(item);
        let found = parent
            .children
            .iter()
            .enumerate()
            .find(|(i, child)| !placed[*i] && matches_item(child, name));
        if let Some((i, child)) = found {
            placed[i] = true;
            let mut child = child.clone();
            if let Some(title) = title {
                child.set_title(title);
            }
            ordered.push(child);
        }
    }

    for (i, child) in parent.children.iter().enumerate() {
        if !placed[i] {
            ordered.push(child.clone());
        }
    }

    while ordered.last().map_or(false, Component::is_marker) {
        ordered.pop();
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::types::{ComponentBody, ContainerInfo, CommandBundle, ScriptLanguage};
    use std::path::Path;

    fn button(name: &str) -> Component {
        Component::for_directory(
            &Path::new("/x/T.extension/A.tab/P.panel").join(format!("{}.pushbutton", name)),
            "pushbutton",
            false,
            ComponentBody::Command(Box::new(CommandBundle::new(name, ScriptLanguage::Python))),
        )
    }

    fn panel(layout: &[&str], children: &[&str]) -> Component {
        let mut panel = Component::for_directory(
            Path::new("/x/T.extension/A.tab/P.panel"),
            "panel",
            true,
            ComponentBody::Container(ContainerInfo {
                layout: layout.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }),
        );
        panel.children = children.iter().map(|n| button(n)).collect();
        panel
    }

    fn names(items: &[Component]) -> Vec<String> {
        items.iter().map(|c| c.name.clone()).collect()
    }

    #[test]
    fn test_no_layout_keeps_enumeration_order() {
        let p = panel(&[], &["b", "a", "c"]);
        assert_eq!(names(&display_order(&p)), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_layout_orders_then_appends_unlisted() {
        let p = panel(&["c", "---", "a"], &["a", "b", "c"]);
        assert_eq!(
            names(&display_order(&p)),
            vec!["c", "separator", "a", "b"]
        );
        assert_eq!(p.children.len(), 3);
    }

    #[test]
    fn test_markers_are_not_leading_trailing_or_doubled() {
        let p = panel(&["---", "a", "---", ">>>", "b", ">>>"], &["a", "b"]);
        let ordered = display_order(&p);
        assert_eq!(names(&ordered), vec!["a", "separator", "b"]);
        assert_eq!(ordered[1].kind_id, SEPARATOR_KIND);
    }

    #[test]
    fn test_marker_id_differs_from_bundle_named_like_it() {
        let p = panel(&["a", "---", "separator1"], &["a", "separator1"]);
        let ordered = display_order(&p);
        assert_eq!(names(&ordered), vec!["a", "separator", "separator1"]);
        assert_eq!(ordered[1].unique_name, "T_A_P-separator1");
        assert_eq!(ordered[2].unique_name, "T_A_P_separator1");
    }

    #[test]
    fn test_title_directive() {
        let p = panel(&["a[title:Alpha Tool]"], &["a"]);
        let ordered = display_order(&p);
        assert_eq!(ordered[0].title(), "Alpha Tool");
    }

    #[test]
    fn test_layout_accepts_bundle_folder_name() {
        let p = panel(&["b.pushbutton", "a"], &["a", "b"]);
        assert_eq!(names(&display_order(&p)), vec!["b", "a"]);
    }
}
