//! Structural edits on an open vault.
//!
//! Every mutation resolves and validates all the groups it touches before
//! changing anything, so a failed call leaves the tree exactly as it was.

use crate::attributes::FieldValue;
use crate::error::{Result, VaultError};
use crate::models::{
    Entry, EntryFormData, Group, GroupNode, GroupRef, RecycleOutcome, Vault, RECYCLE_BIN_ICON,
    RECYCLE_BIN_NAME,
};
use crate::tree;
use uuid::Uuid;

/// Custom attribute recording where a recycled entry came from.
pub const ORIGINAL_GROUP_KEY: &str = "KeedaVault_OriginalGroup";

/// Changes applied by [`Vault::update_group`].
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    pub name: String,
    pub icon: Option<usize>,
    /// Move the group under this parent when it differs from the current one.
    pub parent: Option<Uuid>,
    pub allow_add: Option<bool>,
}

impl GroupUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

fn group_not_found(id: Uuid) -> VaultError {
    VaultError::NotFound(format!("group {id}"))
}

fn entry_not_found(id: Uuid) -> VaultError {
    VaultError::NotFound(format!("entry {id}"))
}

impl Vault {
    pub fn find_group(&self, id: Uuid) -> Option<&Group> {
        tree::find_group(&self.root, id)
    }

    pub fn find_entry_owner(&self, entry_id: Uuid) -> Option<(&Group, &Entry)> {
        tree::find_entry_owner(&self.root, entry_id)
    }

    pub fn find_entry(&self, entry_id: Uuid) -> Option<&Entry> {
        self.find_entry_owner(entry_id).map(|(_, entry)| entry)
    }

    /// Append a new group as the last child of `parent`.
    pub fn add_group(
        &mut self,
        parent: Uuid,
        name: &str,
        icon: Option<usize>,
        allow_add: Option<bool>,
    ) -> Result<&Group> {
        let parent_group =
            tree::find_group_mut(&mut self.root, parent).ok_or_else(|| group_not_found(parent))?;

        let mut group = Group::new(name);
        if let Some(icon) = icon {
            group.icon = icon;
        }
        group.allow_add = allow_add;
        tracing::debug!("Adding group {} under {}", group.uuid, parent);

        let index = parent_group.groups.len();
        parent_group.groups.push(group);
        Ok(&parent_group.groups[index])
    }

    /// Update a group's scalar fields and optionally move it.
    ///
    /// A move into the group itself or any of its descendants fails with
    /// [`VaultError::CycleDetected`]; nothing is changed in that case.
    pub fn update_group(&mut self, id: Uuid, update: &GroupUpdate) -> Result<&Group> {
        let group = tree::find_group(&self.root, id).ok_or_else(|| group_not_found(id))?;

        let mut relocation = None;
        if let Some(target) = update.parent {
            let current_parent = tree::find_parent_group(&self.root, id)
                .ok_or_else(|| VaultError::NotFound(format!("parent of group {id}")))?;
            if current_parent.uuid != target {
                if tree::find_group(&self.root, target).is_none() {
                    return Err(group_not_found(target));
                }
                if tree::subtree_contains(group, target) {
                    return Err(VaultError::CycleDetected(format!(
                        "cannot move group {id} into itself or its descendant {target}"
                    )));
                }
                relocation = Some((current_parent.uuid, target));
            }
        }

        if let Some((from, to)) = relocation {
            let old_parent =
                tree::find_group_mut(&mut self.root, from).ok_or_else(|| group_not_found(from))?;
            let index = old_parent
                .groups
                .iter()
                .position(|g| g.uuid == id)
                .ok_or_else(|| group_not_found(id))?;
            let moved = old_parent.groups.remove(index);
            tree::find_group_mut(&mut self.root, to)
                .ok_or_else(|| group_not_found(to))?
                .groups
                .push(moved);
            tracing::debug!("Moved group {} from {} to {}", id, from, to);
        }

        let group = tree::find_group_mut(&mut self.root, id).ok_or_else(|| group_not_found(id))?;
        group.name = update.name.clone();
        if let Some(icon) = update.icon {
            group.icon = icon;
        }
        if let Some(allow_add) = update.allow_add {
            group.allow_add = Some(allow_add);
        }
        group.touch();
        Ok(group)
    }

    /// Detach a group (and its whole subtree) from its parent.
    pub fn delete_group(&mut self, id: Uuid) -> Result<()> {
        if id == self.root.uuid {
            return Err(VaultError::InvalidOperation(
                "cannot delete the root group".to_string(),
            ));
        }
        let parent =
            tree::find_parent_group_mut(&mut self.root, id).ok_or_else(|| group_not_found(id))?;
        parent.groups.retain(|g| g.uuid != id);
        tracing::debug!("Deleted group {}", id);

        if let Some(bin) = self.recycle_bin {
            if self.find_group(bin).is_none() {
                self.recycle_bin = None;
            }
        }
        Ok(())
    }

    /// Create an entry from a canonical record in `group`.
    pub fn add_entry(&mut self, group: Uuid, data: &EntryFormData) -> Result<&Entry> {
        let target =
            tree::find_group_mut(&mut self.root, group).ok_or_else(|| group_not_found(group))?;
        let entry = Entry::from_form(data);
        tracing::debug!("Adding entry {} to group {}", entry.uuid, group);
        let index = target.entries.len();
        target.entries.push(entry);
        Ok(&target.entries[index])
    }

    /// Apply a canonical record to the entry named by `data.uuid`.
    ///
    /// When `data.group_uuid` names a different group the entry is moved
    /// there first (appended last).
    pub fn update_entry(&mut self, data: &EntryFormData) -> Result<&Entry> {
        let id = data.uuid.ok_or_else(|| {
            VaultError::InvalidOperation("entry UUID required for update".to_string())
        })?;
        let (owner, _) = tree::find_entry_owner(&self.root, id).ok_or_else(|| entry_not_found(id))?;
        let owner = owner.uuid;

        if let Some(target) = data.group_uuid.filter(|target| *target != owner) {
            self.relocate_entry(id, owner, target)?;
        }

        let (group, index) =
            tree::find_entry_owner_mut(&mut self.root, id).ok_or_else(|| entry_not_found(id))?;
        let entry = &mut group.entries[index];
        entry.apply_form(data);
        tracing::debug!("Updated entry {}", id);
        Ok(entry)
    }

    /// Detach an entry from its group.
    pub fn delete_entry(&mut self, id: Uuid) -> Result<Entry> {
        let (group, index) =
            tree::find_entry_owner_mut(&mut self.root, id).ok_or_else(|| entry_not_found(id))?;
        tracing::debug!("Deleted entry {} from group {}", id, group.uuid);
        Ok(group.entries.remove(index))
    }

    /// Move an entry to `target` without touching its fields.
    pub fn move_entry(&mut self, id: Uuid, target: Uuid) -> Result<()> {
        let (owner, _) = tree::find_entry_owner(&self.root, id).ok_or_else(|| entry_not_found(id))?;
        let owner = owner.uuid;
        if owner == target {
            return Ok(());
        }
        self.relocate_entry(id, owner, target)?;
        if let Some((group, index)) = tree::find_entry_owner_mut(&mut self.root, id) {
            group.entries[index].touch();
        }
        Ok(())
    }

    fn relocate_entry(&mut self, id: Uuid, from: Uuid, to: Uuid) -> Result<()> {
        if tree::find_group(&self.root, to).is_none() {
            return Err(group_not_found(to));
        }
        let source =
            tree::find_group_mut(&mut self.root, from).ok_or_else(|| group_not_found(from))?;
        let index = source
            .entries
            .iter()
            .position(|e| e.uuid == id)
            .ok_or_else(|| entry_not_found(id))?;
        let entry = source.entries.remove(index);
        tree::find_group_mut(&mut self.root, to)
            .ok_or_else(|| group_not_found(to))?
            .entries
            .push(entry);
        tracing::debug!("Moved entry {} from {} to {}", id, from, to);
        Ok(())
    }

    /// Soft-delete an entry.
    ///
    /// Entries already in the recycle bin are removed for good; anything else
    /// is moved into the bin (created on demand) with its origin recorded.
    pub fn recycle_entry(&mut self, id: Uuid) -> Result<RecycleOutcome> {
        let (owner, _) = tree::find_entry_owner(&self.root, id).ok_or_else(|| entry_not_found(id))?;
        let owner = owner.uuid;

        if self.is_recycle_bin(owner) {
            self.delete_entry(id)?;
            return Ok(RecycleOutcome::Deleted);
        }

        let bin = self.ensure_recycle_bin();
        self.relocate_entry(id, owner, bin)?;
        let (group, index) =
            tree::find_entry_owner_mut(&mut self.root, id).ok_or_else(|| entry_not_found(id))?;
        let entry = &mut group.entries[index];
        entry
            .fields
            .custom
            .insert(ORIGINAL_GROUP_KEY.to_string(), FieldValue::Plain(owner.to_string()));
        entry.touch();
        Ok(RecycleOutcome::Recycled)
    }

    /// Move a recycled entry back to where it came from, or to the root when
    /// that group no longer exists.
    pub fn restore_entry(&mut self, id: Uuid) -> Result<GroupRef> {
        let (owner, _) = tree::find_entry_owner(&self.root, id).ok_or_else(|| entry_not_found(id))?;
        let owner = owner.uuid;
        if !self.is_recycle_bin(owner) {
            return Err(VaultError::InvalidOperation(format!(
                "entry {id} is not in the recycle bin"
            )));
        }
        let destination = self.original_group_of(id)?;

        if destination.uuid != owner {
            self.relocate_entry(id, owner, destination.uuid)?;
        }
        let (group, index) =
            tree::find_entry_owner_mut(&mut self.root, id).ok_or_else(|| entry_not_found(id))?;
        let entry = &mut group.entries[index];
        entry.fields.custom.remove(ORIGINAL_GROUP_KEY);
        entry.touch();
        tracing::debug!("Restored entry {} to {}", id, destination.uuid);
        Ok(destination)
    }

    /// The group a recycled entry was deleted from; the root when unknown.
    pub fn original_group_of(&self, id: Uuid) -> Result<GroupRef> {
        let entry = self.find_entry(id).ok_or_else(|| entry_not_found(id))?;
        let original = entry
            .fields
            .custom
            .get(ORIGINAL_GROUP_KEY)
            .and_then(|raw| Uuid::parse_str(raw.as_str()).ok())
            .and_then(|uuid| self.find_group(uuid))
            .unwrap_or(&self.root);
        Ok(GroupRef::from(original))
    }

    /// Permanently remove every entry in the recycle bin.
    pub fn empty_recycle_bin(&mut self) -> Result<usize> {
        let bin = self
            .recycle_bin
            .ok_or_else(|| VaultError::InvalidOperation("vault has no recycle bin".to_string()))?;
        let group = tree::find_group_mut(&mut self.root, bin).ok_or_else(|| {
            VaultError::InvalidOperation("recycle bin group is missing".to_string())
        })?;
        let removed = group.entries.len();
        group.entries.clear();
        tracing::info!("Emptied recycle bin ({} entries)", removed);
        Ok(removed)
    }

    pub fn is_recycle_bin_group(&self, id: Uuid) -> bool {
        self.is_recycle_bin(id) && self.find_group(id).is_some()
    }

    pub fn is_entry_in_recycle_bin(&self, id: Uuid) -> bool {
        self.find_entry_owner(id)
            .is_some_and(|(group, _)| self.is_recycle_bin(group.uuid))
    }

    /// Return the recycle bin's UUID, creating the group under the root when
    /// it is missing or the metadata points nowhere.
    fn ensure_recycle_bin(&mut self) -> Uuid {
        if let Some(bin) = self.recycle_bin.filter(|bin| self.find_group(*bin).is_some()) {
            return bin;
        }
        let mut bin = Group::new(RECYCLE_BIN_NAME);
        bin.icon = RECYCLE_BIN_ICON;
        let uuid = bin.uuid;
        self.root.groups.push(bin);
        self.recycle_bin = Some(uuid);
        tracing::info!("Created recycle bin {}", uuid);
        uuid
    }

    /// Display form of the whole tree, recycle bin sorted last among siblings.
    pub fn list_groups_ordered(&self) -> GroupNode {
        tree::ordered_nodes(&self.root, self.recycle_bin)
    }

    /// Total number of entries in the vault, recycle bin included.
    pub fn entry_count(&self) -> usize {
        tree::count_entries(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str) -> EntryFormData {
        EntryFormData {
            title: title.to_string(),
            password: "pw".into(),
            ..EntryFormData::default()
        }
    }

    fn vault_with(names: &[&str]) -> (Vault, Vec<Uuid>) {
        let mut vault = Vault::new("Test");
        let root = vault.root.uuid;
        let ids = names
            .iter()
            .map(|name| vault.add_group(root, name, None, None).unwrap().uuid)
            .collect();
        (vault, ids)
    }

    #[test]
    fn add_group_appends_last_and_requires_parent() {
        let (mut vault, ids) = vault_with(&["General", "Email"]);
        let added = vault.add_group(ids[0], "Work", Some(12), Some(true)).unwrap();
        assert_eq!((added.icon, added.allow_add), (12, Some(true)));
        assert_eq!(vault.root.groups.last().unwrap().uuid, ids[1]);

        let err = vault.add_group(Uuid::new_v4(), "Nope", None, None).unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }

    #[test]
    fn update_group_renames_without_moving() {
        let (mut vault, ids) = vault_with(&["General"]);
        let before = vault.find_group(ids[0]).unwrap().last_modified;
        let mut update = GroupUpdate::rename("Personal");
        update.parent = Some(vault.root.uuid);
        let group = vault.update_group(ids[0], &update).unwrap();
        assert_eq!(group.name, "Personal");
        assert!(group.last_modified >= before);
        assert_eq!(vault.root.groups.len(), 1);
    }

    #[test]
    fn move_into_descendant_is_rejected_unchanged() {
        let (mut vault, ids) = vault_with(&["A", "B"]);
        let child = vault.add_group(ids[0], "A1", None, None).unwrap().uuid;
        let before = vault.clone();

        let mut update = GroupUpdate::rename("renamed");
        update.parent = Some(child);
        let err = vault.update_group(ids[0], &update).unwrap_err();
        assert!(matches!(err, VaultError::CycleDetected(_)));

        update.parent = Some(ids[0]);
        let err = vault.update_group(ids[0], &update).unwrap_err();
        assert!(matches!(err, VaultError::CycleDetected(_)));
        assert_eq!(vault, before);
    }

    #[test]
    fn move_to_missing_parent_fails() {
        let (mut vault, ids) = vault_with(&["A"]);
        let mut update = GroupUpdate::rename("A");
        update.parent = Some(Uuid::new_v4());
        assert!(matches!(
            vault.update_group(ids[0], &update),
            Err(VaultError::NotFound(_))
        ));

        // The root has no parent to move away from.
        update.parent = Some(ids[0]);
        let root = vault.root.uuid;
        assert!(matches!(
            vault.update_group(root, &update),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn move_group_appends_under_new_parent() {
        let (mut vault, ids) = vault_with(&["A", "B", "C"]);
        let mut update = GroupUpdate::rename("A");
        update.parent = Some(ids[2]);
        vault.update_group(ids[0], &update).unwrap();

        let order: Vec<_> = vault.root.groups.iter().map(|g| g.uuid).collect();
        assert_eq!(order, [ids[1], ids[2]]);
        assert_eq!(vault.root.groups[1].groups[0].uuid, ids[0]);
    }

    #[test]
    fn delete_root_is_invalid() {
        let (mut vault, ids) = vault_with(&["A"]);
        let root = vault.root.uuid;
        assert!(matches!(
            vault.delete_group(root),
            Err(VaultError::InvalidOperation(_))
        ));
        vault.delete_group(ids[0]).unwrap();
        assert!(vault.find_group(ids[0]).is_none());
        assert!(matches!(vault.delete_group(ids[0]), Err(VaultError::NotFound(_))));
    }

    #[test]
    fn update_entry_moves_and_rewrites_fields() {
        let (mut vault, ids) = vault_with(&["A", "B"]);
        let id = vault.add_entry(ids[0], &record("Mail")).unwrap().uuid;

        let mut data = vault.find_entry(id).unwrap().to_form_data(ids[0]);
        data.group_uuid = Some(ids[1]);
        data.username = "bob".to_string();
        let updated = vault.update_entry(&data).unwrap();
        assert_eq!(updated.fields.username, "bob");

        let (owner, _) = vault.find_entry_owner(id).unwrap();
        assert_eq!(owner.uuid, ids[1]);
        assert!(vault.find_group(ids[0]).unwrap().entries.is_empty());
    }

    #[test]
    fn update_entry_requires_uuid_and_known_target() {
        let (mut vault, ids) = vault_with(&["A"]);
        assert!(matches!(
            vault.update_entry(&record("x")),
            Err(VaultError::InvalidOperation(_))
        ));

        let id = vault.add_entry(ids[0], &record("Mail")).unwrap().uuid;
        let mut data = vault.find_entry(id).unwrap().to_form_data(Uuid::new_v4());
        data.title = "changed".to_string();
        assert!(matches!(vault.update_entry(&data), Err(VaultError::NotFound(_))));
        assert_eq!(vault.find_entry(id).unwrap().title(), "Mail");
    }

    #[test]
    fn delete_entry_detaches_it() {
        let (mut vault, ids) = vault_with(&["A"]);
        let id = vault.add_entry(ids[0], &record("Mail")).unwrap().uuid;
        let removed = vault.delete_entry(id).unwrap();
        assert_eq!(removed.title(), "Mail");
        assert!(vault.find_entry(id).is_none());
        assert!(matches!(vault.delete_entry(id), Err(VaultError::NotFound(_))));
    }

    #[test]
    fn recycle_then_restore_round_trip() {
        let (mut vault, ids) = vault_with(&["A"]);
        let id = vault.add_entry(ids[0], &record("Mail")).unwrap().uuid;
        assert!(matches!(
            vault.restore_entry(id),
            Err(VaultError::InvalidOperation(_))
        ));

        assert_eq!(vault.recycle_entry(id).unwrap(), RecycleOutcome::Recycled);
        assert!(vault.is_entry_in_recycle_bin(id));
        let bin = vault.recycle_bin.unwrap();
        assert!(vault.is_recycle_bin_group(bin));
        assert_eq!(vault.original_group_of(id).unwrap().uuid, ids[0]);

        let restored = vault.restore_entry(id).unwrap();
        assert_eq!(restored.name, "A");
        let entry = vault.find_entry(id).unwrap();
        assert!(!entry.fields.custom.contains_key(ORIGINAL_GROUP_KEY));
        assert!(!vault.is_entry_in_recycle_bin(id));
    }

    #[test]
    fn recycling_twice_deletes_permanently() {
        let (mut vault, ids) = vault_with(&["A"]);
        let id = vault.add_entry(ids[0], &record("Mail")).unwrap().uuid;
        vault.recycle_entry(id).unwrap();
        assert_eq!(vault.recycle_entry(id).unwrap(), RecycleOutcome::Deleted);
        assert!(vault.find_entry(id).is_none());
    }

    #[test]
    fn restore_falls_back_to_root() {
        let (mut vault, ids) = vault_with(&["A"]);
        let id = vault.add_entry(ids[0], &record("Mail")).unwrap().uuid;
        vault.recycle_entry(id).unwrap();
        vault.delete_group(ids[0]).unwrap();

        let restored = vault.restore_entry(id).unwrap();
        assert_eq!(restored.uuid, vault.root.uuid);
        assert_eq!(vault.root.entries.len(), 1);
    }

    #[test]
    fn empty_recycle_bin_counts_removed_entries() {
        let (mut vault, ids) = vault_with(&["A"]);
        assert!(matches!(
            vault.empty_recycle_bin(),
            Err(VaultError::InvalidOperation(_))
        ));
        for title in ["one", "two"] {
            let id = vault.add_entry(ids[0], &record(title)).unwrap().uuid;
            vault.recycle_entry(id).unwrap();
        }
        assert_eq!(vault.empty_recycle_bin().unwrap(), 2);
        assert_eq!(vault.entry_count(), 0);
    }

    #[test]
    fn move_entry_is_noop_for_same_group() {
        let (mut vault, ids) = vault_with(&["A", "B"]);
        let id = vault.add_entry(ids[0], &record("Mail")).unwrap().uuid;
        vault.move_entry(id, ids[0]).unwrap();
        assert_eq!(vault.find_entry_owner(id).unwrap().0.uuid, ids[0]);
        vault.move_entry(id, ids[1]).unwrap();
        assert_eq!(vault.find_entry_owner(id).unwrap().0.uuid, ids[1]);
        assert!(matches!(
            vault.move_entry(id, Uuid::new_v4()),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn deleting_the_recycle_bin_clears_metadata() {
        let (mut vault, ids) = vault_with(&["A"]);
        let id = vault.add_entry(ids[0], &record("Mail")).unwrap().uuid;
        vault.recycle_entry(id).unwrap();
        let bin = vault.recycle_bin.unwrap();
        vault.delete_group(bin).unwrap();
        assert_eq!(vault.recycle_bin, None);
    }
}
