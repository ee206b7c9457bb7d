//! Plain-text rendering of vault views.

use keeda_core::{Entry, GroupNode, SearchResult, WeakPassword};
use std::fmt::Write;

/// A flattened tree item for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeItem {
    /// Depth level for indentation.
    pub depth: usize,
    pub kind: TreeItemKind,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeItemKind {
    Group,
    RecycleBin,
    Entry,
}

/// Flatten an ordered tree: each group, then its subgroups, then its entries.
pub fn flatten(root: &GroupNode, with_entries: bool) -> Vec<TreeItem> {
    enum Step<'a> {
        Group(&'a GroupNode, usize),
        Entry(&'a Entry, usize),
    }

    let mut items = Vec::new();
    let mut stack = vec![Step::Group(root, 0)];
    while let Some(step) = stack.pop() {
        match step {
            Step::Group(node, depth) => {
                items.push(TreeItem {
                    depth,
                    kind: if node.is_recycle_bin {
                        TreeItemKind::RecycleBin
                    } else {
                        TreeItemKind::Group
                    },
                    name: node.name.clone(),
                });
                if with_entries {
                    stack.extend(node.entries.iter().rev().map(|e| Step::Entry(e, depth + 1)));
                }
                stack.extend(node.subgroups.iter().rev().map(|g| Step::Group(g, depth + 1)));
            }
            Step::Entry(entry, depth) => items.push(TreeItem {
                depth,
                kind: TreeItemKind::Entry,
                name: entry.title().to_string(),
            }),
        }
    }
    items
}

pub fn render_tree(items: &[TreeItem]) -> String {
    let mut out = String::new();
    for item in items {
        let marker = match item.kind {
            TreeItemKind::Group => "+",
            TreeItemKind::RecycleBin => "x",
            TreeItemKind::Entry => "-",
        };
        let _ = writeln!(out, "{}{} {}", "  ".repeat(item.depth), marker, item.name);
    }
    out
}

pub fn render_search(results: &[SearchResult]) -> String {
    let mut out = String::new();
    for result in results {
        let _ = match result {
            SearchResult::Group { name, path, uuid, .. } => {
                writeln!(out, "[group] {name}  ({path})  {uuid}")
            }
            SearchResult::Entry {
                title,
                username,
                path,
                uuid,
                ..
            } => writeln!(out, "[entry] {title} <{username}>  ({path})  {uuid}"),
        };
    }
    out
}

pub fn render_audit(weak: &[WeakPassword]) -> String {
    let mut out = String::new();
    for item in weak {
        let _ = writeln!(
            out,
            "[{}] {}  ({})  {}",
            item.audit.strength, item.title, item.group, item.uuid
        );
    }
    out
}
