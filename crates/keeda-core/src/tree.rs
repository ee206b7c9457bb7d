//! Depth-first lookups over the group tree.
//!
//! Every walk uses an explicit stack so deeply nested (or hostile) trees
//! cannot exhaust the call stack. Siblings are visited in their stored order.

use crate::models::{Entry, Group, GroupNode};
use uuid::Uuid;

/// Pre-order iterator over a group and all of its descendants.
pub struct Groups<'a> {
    stack: Vec<&'a Group>,
}

impl<'a> Iterator for Groups<'a> {
    type Item = &'a Group;

    fn next(&mut self) -> Option<Self::Item> {
        let group = self.stack.pop()?;
        self.stack.extend(group.groups.iter().rev());
        Some(group)
    }
}

/// Walk `root` and its whole subtree, parents before children.
pub fn walk(root: &Group) -> Groups<'_> {
    Groups { stack: vec![root] }
}

/// Find a group by UUID anywhere under (and including) `root`.
pub fn find_group(root: &Group, id: Uuid) -> Option<&Group> {
    walk(root).find(|group| group.uuid == id)
}

pub fn find_group_mut(root: &mut Group, id: Uuid) -> Option<&mut Group> {
    let mut stack = vec![root];
    while let Some(group) = stack.pop() {
        if group.uuid == id {
            return Some(group);
        }
        stack.extend(group.groups.iter_mut().rev());
    }
    None
}

/// Find the group whose direct subgroups include `id`. The root has no parent.
pub fn find_parent_group(root: &Group, id: Uuid) -> Option<&Group> {
    walk(root).find(|group| group.groups.iter().any(|child| child.uuid == id))
}

pub fn find_parent_group_mut(root: &mut Group, id: Uuid) -> Option<&mut Group> {
    let mut stack = vec![root];
    while let Some(group) = stack.pop() {
        if group.groups.iter().any(|child| child.uuid == id) {
            return Some(group);
        }
        stack.extend(group.groups.iter_mut().rev());
    }
    None
}

/// Find an entry and the group that owns it.
pub fn find_entry_owner(root: &Group, entry_id: Uuid) -> Option<(&Group, &Entry)> {
    walk(root).find_map(|group| {
        group
            .entries
            .iter()
            .find(|entry| entry.uuid == entry_id)
            .map(|entry| (group, entry))
    })
}

/// Mutable variant of [`find_entry_owner`]; yields the owner and the entry's index.
pub fn find_entry_owner_mut(root: &mut Group, entry_id: Uuid) -> Option<(&mut Group, usize)> {
    let mut stack = vec![root];
    while let Some(group) = stack.pop() {
        if let Some(index) = group.entries.iter().position(|e| e.uuid == entry_id) {
            return Some((group, index));
        }
        stack.extend(group.groups.iter_mut().rev());
    }
    None
}

/// True when `id` is `group` itself or anywhere in its subtree.
pub fn subtree_contains(group: &Group, id: Uuid) -> bool {
    find_group(group, id).is_some()
}

/// Count entries in a group and all of its descendants.
pub fn count_entries(group: &Group) -> usize {
    walk(group).map(|g| g.entries.len()).sum()
}

/// Convert the tree into display form.
///
/// Each group's direct subgroups are stably sorted so the recycle bin comes
/// after all of its siblings; the relative order of the others is kept.
pub fn ordered_nodes(root: &Group, recycle_bin: Option<Uuid>) -> GroupNode {
    struct Frame<'a> {
        group: &'a Group,
        next_child: usize,
        built: Vec<GroupNode>,
    }

    impl<'a> Frame<'a> {
        fn new(group: &'a Group) -> Self {
            Self {
                group,
                next_child: 0,
                built: Vec::with_capacity(group.groups.len()),
            }
        }

        fn finish(self, recycle_bin: Option<Uuid>) -> GroupNode {
            let mut subgroups = self.built;
            subgroups.sort_by_key(|node| node.is_recycle_bin);
            GroupNode {
                uuid: self.group.uuid,
                name: self.group.name.clone(),
                icon: self.group.icon,
                allow_add: self.group.allow_add,
                is_recycle_bin: recycle_bin == Some(self.group.uuid),
                entries: self.group.entries.clone(),
                subgroups,
            }
        }
    }

    let mut parents: Vec<Frame<'_>> = Vec::new();
    let mut current = Frame::new(root);
    loop {
        let group = current.group;
        if let Some(child) = group.groups.get(current.next_child) {
            current.next_child += 1;
            parents.push(std::mem::replace(&mut current, Frame::new(child)));
            continue;
        }

        let node = current.finish(recycle_bin);
        match parents.pop() {
            Some(mut parent) => {
                parent.built.push(node);
                current = parent;
            }
            None => return node,
        }
    }
}
