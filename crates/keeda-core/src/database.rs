//! KeePass (KDBX) container boundary.
//!
//! The engine never reads the serialized layout itself: a [`ContainerFormat`]
//! turns bytes into a [`Vault`] and back. [`KdbxFormat`] is the `keepass`
//! crate implementation; its key-derivation settings are passed in
//! explicitly when it is constructed.
//!
//! Writing a file goes through [`save_with`]: the encrypted bytes are opened
//! again before anything on disk changes, the previous file is copied to a
//! timestamped backup, and the new file replaces the old one atomically.

use crate::attributes::{AttributeBag, Attributes, FieldValue};
use crate::error::{Result, VaultError};
use crate::models::{now, Entry, Group, ProtectedValue, Vault, DEFAULT_GROUP_ICON};
use chrono::{NaiveDateTime, Utc};
use keepass::config::DatabaseConfig;
use keepass::db::{CustomDataItem, History, Node, Value};
use keepass::{Database, DatabaseKey};
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Group custom-data key holding the "allow add" flag.
pub const ALLOW_ADD_KEY: &str = "keedavault_allow_add";

/// Groups created in every new vault, in order.
pub const DEFAULT_GROUPS: [&str; 6] = [
    "General",
    "Windows",
    "Network",
    "Internet",
    "eMail",
    "Homebanking",
];

/// Timestamp format embedded in backup file names.
const BACKUP_STAMP: &str = "%Y-%m-%dT%H-%M-%S";
const BACKUP_EXTENSION: &str = ".kdbx";

/// Opaque create/unlock/save API over an encrypted container.
pub trait ContainerFormat: Send + Sync {
    /// The container's own document model, ready to be encrypted.
    type Document: Send + 'static;

    /// Decrypt and parse a container.
    ///
    /// Fails with [`VaultError::DecryptionFailed`] on a wrong password and
    /// [`VaultError::ParseFailed`] on a corrupt structure.
    fn open(&self, data: &[u8], password: &ProtectedValue) -> Result<Vault>;

    /// Convert a vault into an owned document. Cheap; no key derivation.
    fn prepare(&self, vault: &Vault) -> Result<Self::Document>;

    /// Serialize and encrypt a prepared document.
    fn seal(&self, document: Self::Document, password: &ProtectedValue) -> Result<Vec<u8>>;

    /// Serialize and encrypt a vault.
    fn save(&self, vault: &Vault, password: &ProtectedValue) -> Result<Vec<u8>> {
        self.seal(self.prepare(vault)?, password)
    }

    /// Build a new vault with the standard default groups.
    fn create(&self, name: &str) -> Vault {
        let mut vault = Vault::new(name);
        for group in DEFAULT_GROUPS {
            vault.root.groups.push(Group::new(group));
        }
        vault
    }
}

/// The parsed KeePass database a vault was opened from.
///
/// Entry history, binary fields, group notes, metadata and header
/// attachments are not part of the engine's tree; they live here and are
/// merged back in on save.
#[derive(Clone)]
pub struct KdbxSource(Arc<Database>);

impl KdbxSource {
    pub fn database(&self) -> &Database {
        &self.0
    }
}

impl fmt::Debug for KdbxSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KdbxSource(..)")
    }
}

impl PartialEq for KdbxSource {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// KDBX 4 via the `keepass` crate.
#[derive(Debug, Clone)]
pub struct KdbxFormat {
    config: DatabaseConfig,
}

impl KdbxFormat {
    /// `config` carries the cipher and key-derivation settings used when saving.
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }
}

impl Default for KdbxFormat {
    fn default() -> Self {
        Self::new(DatabaseConfig::default())
    }
}

impl ContainerFormat for KdbxFormat {
    type Document = Database;

    fn open(&self, data: &[u8], password: &ProtectedValue) -> Result<Vault> {
        let key = DatabaseKey::new().with_password(password.expose());
        let mut reader = data;
        let db = Database::open(&mut reader, key)?;
        let mut vault = vault_from_keepass(&db);
        vault.source = Some(KdbxSource(Arc::new(db)));
        Ok(vault)
    }

    fn prepare(&self, vault: &Vault) -> Result<Database> {
        let mut db = Database::new(self.config.clone());
        let previous = match &vault.source {
            Some(KdbxSource(source)) => {
                db.meta = source.meta.clone();
                db.header_attachments = source.header_attachments.clone();
                db.deleted_objects = source.deleted_objects.clone();
                Previous::index(&source.root)
            }
            None => Previous::default(),
        };
        db.meta.database_name = Some(vault.name.clone());
        db.meta.recyclebin_uuid = vault.recycle_bin;
        db.meta.recyclebin_enabled = Some(vault.recycle_bin.is_some());
        db.root = group_to_keepass(&vault.root, &previous);
        Ok(db)
    }

    fn seal(&self, db: Database, password: &ProtectedValue) -> Result<Vec<u8>> {
        let key = DatabaseKey::new().with_password(password.expose());
        let mut out = Vec::new();
        db.save(&mut out, key)?;
        Ok(out)
    }
}

/// How [`save_with`] replaces a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOptions {
    /// Copy the existing file to `<name>.backup.<timestamp>.kdbx` first.
    pub backup: bool,
    /// Backups kept per database; older ones are deleted.
    pub max_backups: usize,
    /// Decrypt the new bytes again before the file is replaced.
    pub verify: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            backup: true,
            max_backups: 2,
            verify: true,
        }
    }
}

/// Read and unlock a container file. Key derivation runs on the blocking pool.
pub async fn unlock<F>(path: impl AsRef<Path>, password: ProtectedValue, format: F) -> Result<Vault>
where
    F: ContainerFormat + 'static,
{
    let path = path.as_ref();
    let data = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => VaultError::NotFound(format!("{}: {e}", path.display())),
        _ => VaultError::from(e),
    })?;

    let vault = tokio::task::spawn_blocking(move || format.open(&data, &password))
        .await
        .map_err(|e| VaultError::InvalidOperation(format!("unlock task failed: {e}")))??;

    tracing::info!(
        "Unlocked {} ({} entries)",
        path.display(),
        vault.entry_count()
    );
    Ok(vault)
}

/// Encrypt `vault` and replace the file at `path` with default [`SaveOptions`].
pub async fn save<F>(
    vault: &Vault,
    path: impl AsRef<Path>,
    password: ProtectedValue,
    format: F,
) -> Result<()>
where
    F: ContainerFormat + 'static,
{
    save_with(vault, path, password, format, &SaveOptions::default()).await
}

/// Encrypt `vault` and atomically replace the file at `path`.
///
/// When verification fails the existing file is left untouched.
pub async fn save_with<F>(
    vault: &Vault,
    path: impl AsRef<Path>,
    password: ProtectedValue,
    format: F,
    options: &SaveOptions,
) -> Result<()>
where
    F: ContainerFormat + 'static,
{
    let path = path.as_ref().to_path_buf();
    let document = format.prepare(vault)?;
    let options = options.clone();
    let target = path.clone();

    tokio::task::spawn_blocking(move || {
        write_container(&format, document, &password, &target, &options)
    })
    .await
    .map_err(|e| VaultError::InvalidOperation(format!("save task failed: {e}")))??;

    tracing::info!("Saved database to {}", path.display());
    Ok(())
}

fn write_container<F: ContainerFormat>(
    format: &F,
    document: F::Document,
    password: &ProtectedValue,
    path: &Path,
    options: &SaveOptions,
) -> Result<()> {
    let bytes = format.seal(document, password)?;
    if options.verify {
        format.open(&bytes, password).map_err(|e| {
            VaultError::InvalidOperation(format!("written data failed verification: {e}"))
        })?;
        tracing::debug!("Verified {} bytes for {}", bytes.len(), path.display());
    }

    if options.backup && path.exists() {
        match backup_file(path) {
            Ok(backup) => {
                tracing::info!("Backed up {} to {}", path.display(), backup.display());
                if let Err(e) = cleanup_backups(path, options.max_backups) {
                    tracing::warn!("Failed to clean up old backups of {}: {e}", path.display());
                }
            }
            Err(e) => tracing::warn!("Proceeding without backup of {}: {e}", path.display()),
        }
    }

    let mut file = tempfile::NamedTempFile::new_in(parent_dir(path))?;
    file.write_all(&bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| VaultError::from(e.error))?;
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn backup_prefix(path: &Path) -> io::Result<String> {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no usable file name in {}", path.display()),
            )
        })?;
    Ok(format!("{stem}.backup."))
}

/// `<dir>/<stem>.backup.<YYYY-MM-DDTHH-MM-SS>.kdbx`
fn backup_path(path: &Path, time: NaiveDateTime) -> io::Result<PathBuf> {
    let name = format!(
        "{}{}{BACKUP_EXTENSION}",
        backup_prefix(path)?,
        time.format(BACKUP_STAMP)
    );
    Ok(parent_dir(path).join(name))
}

fn backup_file(path: &Path) -> io::Result<PathBuf> {
    let backup = backup_path(path, Utc::now().naive_utc())?;
    std::fs::copy(path, &backup)?;
    Ok(backup)
}

/// Delete all but the newest `keep` backups of `path`. Files whose name does
/// not carry a readable timestamp are left alone.
pub(crate) fn cleanup_backups(path: &Path, keep: usize) -> io::Result<usize> {
    let prefix = backup_prefix(path)?;
    let mut backups = Vec::new();
    for item in std::fs::read_dir(parent_dir(path))? {
        let item = item?;
        let name = item.file_name();
        let Some(stamp) = name
            .to_str()
            .and_then(|name| name.strip_prefix(prefix.as_str()))
            .and_then(|rest| rest.strip_suffix(BACKUP_EXTENSION))
        else {
            continue;
        };
        match NaiveDateTime::parse_from_str(stamp, BACKUP_STAMP) {
            Ok(time) => backups.push((time, item.path())),
            Err(_) => tracing::debug!("Skipping backup with unreadable timestamp: {:?}", name),
        }
    }

    backups.sort_by(|a, b| b.0.cmp(&a.0));
    let mut removed = 0;
    for (_, stale) in backups.iter().skip(keep) {
        std::fs::remove_file(stale)?;
        tracing::debug!("Removed old backup {}", stale.display());
        removed += 1;
    }
    Ok(removed)
}

/// Groups and entries of the database a vault was opened from, by UUID.
#[derive(Default)]
struct Previous<'a> {
    groups: HashMap<Uuid, &'a keepass::db::Group>,
    entries: HashMap<Uuid, &'a keepass::db::Entry>,
}

impl<'a> Previous<'a> {
    fn index(root: &'a keepass::db::Group) -> Self {
        let mut index = Self::default();
        let mut stack = vec![root];
        while let Some(group) = stack.pop() {
            index.groups.insert(group.uuid, group);
            for node in &group.children {
                match node {
                    Node::Group(child) => stack.push(child),
                    Node::Entry(entry) => {
                        index.entries.insert(entry.uuid, entry);
                    }
                }
            }
        }
        index
    }
}

fn vault_from_keepass(db: &Database) -> Vault {
    let recycle_bin = match db.meta.recyclebin_enabled {
        Some(false) => None,
        _ => db.meta.recyclebin_uuid,
    };
    Vault {
        name: db
            .meta
            .database_name
            .clone()
            .unwrap_or_else(|| db.root.name.clone()),
        root: group_from_keepass(&db.root),
        recycle_bin,
        source: None,
    }
}

/// Convert a keepass group tree, keeping UUIDs and child order.
fn group_from_keepass(root: &keepass::db::Group) -> Group {
    struct Frame<'a> {
        source: &'a keepass::db::Group,
        next_child: usize,
        built: Group,
    }

    let frame = |source: &keepass::db::Group| Group {
        uuid: source.uuid,
        name: source.name.clone(),
        icon: source.icon_id.unwrap_or(DEFAULT_GROUP_ICON),
        allow_add: read_allow_add(source),
        entries: Vec::new(),
        groups: Vec::new(),
        created: source.times.get_creation().copied().unwrap_or_else(now),
        last_modified: source
            .times
            .get_last_modification()
            .copied()
            .unwrap_or_else(now),
    };

    let mut parents: Vec<Frame<'_>> = Vec::new();
    let mut current = Frame {
        source: root,
        next_child: 0,
        built: frame(root),
    };
    loop {
        let source = current.source;
        if let Some(node) = source.children.get(current.next_child) {
            current.next_child += 1;
            match node {
                Node::Entry(e) => current.built.entries.push(entry_from_keepass(e)),
                Node::Group(g) => {
                    let child = Frame {
                        source: g,
                        next_child: 0,
                        built: frame(g),
                    };
                    parents.push(std::mem::replace(&mut current, child));
                }
            }
            continue;
        }

        match parents.pop() {
            Some(mut parent) => {
                parent.built.groups.push(current.built);
                current = parent;
            }
            None => return current.built,
        }
    }
}

fn read_allow_add(group: &keepass::db::Group) -> Option<bool> {
    match group.custom_data.items.get(ALLOW_ADD_KEY)?.value.as_ref()? {
        Value::Unprotected(s) => s.parse().ok(),
        _ => None,
    }
}

fn entry_from_keepass(ke: &keepass::db::Entry) -> Entry {
    let mut bag = AttributeBag::new();
    for (key, val) in &ke.fields {
        match val {
            Value::Unprotected(s) => {
                bag.insert(key.clone(), FieldValue::Plain(s.clone()));
            }
            Value::Protected(_) => match ke.get(key) {
                Some(s) => {
                    bag.insert(key.clone(), FieldValue::Protected(ProtectedValue::new(s)));
                }
                None => tracing::warn!("Protected field {} of entry {} is not UTF-8", key, ke.uuid),
            },
            _ => tracing::debug!("Binary field {} of entry {} stays in the source", key, ke.uuid),
        }
    }

    let times = &ke.times;
    Entry {
        uuid: ke.uuid,
        icon: ke.icon_id.unwrap_or(0),
        fields: Attributes::from_bag(&bag),
        tags: ke.tags.clone(),
        created: times.get_creation().copied().unwrap_or_else(now),
        last_modified: times.get_last_modification().copied().unwrap_or_else(now),
        expiry: if times.expires {
            times.get_expiry().copied()
        } else {
            None
        },
    }
}

/// Convert our tree back into keepass nodes (groups after entries, per level).
///
/// Groups and entries found in `previous` start from their stored state, so
/// anything the engine does not model survives the rewrite.
fn group_to_keepass(root: &Group, previous: &Previous<'_>) -> keepass::db::Group {
    struct Frame<'a> {
        source: &'a Group,
        next_child: usize,
        built: keepass::db::Group,
    }

    let frame = |source: &Group| {
        let mut kg = keepass::db::Group::new(&source.name);
        if let Some(old) = previous.groups.get(&source.uuid) {
            kg.notes = old.notes.clone();
            kg.custom_icon_uuid = old.custom_icon_uuid;
            kg.times = old.times.clone();
            kg.custom_data = old.custom_data.clone();
            kg.is_expanded = old.is_expanded;
            kg.default_autotype_sequence = old.default_autotype_sequence.clone();
            kg.enable_autotype = old.enable_autotype.clone();
            kg.enable_searching = old.enable_searching.clone();
            kg.last_top_visible_entry = old.last_top_visible_entry;
        }
        kg.uuid = source.uuid;
        kg.icon_id = Some(source.icon);
        match source.allow_add {
            Some(allow_add) => {
                kg.custom_data.items.insert(
                    ALLOW_ADD_KEY.to_string(),
                    CustomDataItem {
                        value: Some(Value::Unprotected(allow_add.to_string())),
                        last_modification_time: Some(source.last_modified),
                    },
                );
            }
            None => {
                kg.custom_data.items.remove(ALLOW_ADD_KEY);
            }
        }
        kg.times.set_creation(source.created);
        kg.times.set_last_modification(source.last_modified);
        kg.children.extend(source.entries.iter().map(|e| {
            Node::Entry(entry_to_keepass(e, previous.entries.get(&e.uuid).copied()))
        }));
        kg
    };

    let mut parents: Vec<Frame<'_>> = Vec::new();
    let mut current = Frame {
        source: root,
        next_child: 0,
        built: frame(root),
    };
    loop {
        let source = current.source;
        if let Some(child) = source.groups.get(current.next_child) {
            current.next_child += 1;
            let next = Frame {
                source: child,
                next_child: 0,
                built: frame(child),
            };
            parents.push(std::mem::replace(&mut current, next));
            continue;
        }

        match parents.pop() {
            Some(mut parent) => {
                parent.built.children.push(Node::Group(current.built));
                current = parent;
            }
            None => return current.built,
        }
    }
}

/// Write an entry, starting from its stored version when there is one.
///
/// Binary fields and other stored data are kept; string fields are replaced
/// by the entry's attributes. When those changed, the stored version is
/// pushed onto the entry's history.
fn entry_to_keepass(entry: &Entry, previous: Option<&keepass::db::Entry>) -> keepass::db::Entry {
    let mut ke = previous.cloned().unwrap_or_else(keepass::db::Entry::new);
    ke.uuid = entry.uuid;
    ke.icon_id = Some(entry.icon);
    ke.tags = entry.tags.clone();
    ke.fields.retain(|_, value| matches!(value, Value::Bytes(_)));
    for (key, value) in entry.fields.to_bag() {
        let value = match value {
            FieldValue::Plain(s) => Value::Unprotected(s),
            FieldValue::Protected(p) => Value::Protected(p.expose().as_bytes().into()),
        };
        ke.fields.insert(key, value);
    }
    ke.times.set_creation(entry.created);
    ke.times.set_last_modification(entry.last_modified);
    ke.times.expires = entry.expiry.is_some();
    if let Some(expiry) = entry.expiry {
        ke.times.set_expiry(expiry);
    }

    if let Some(old) = previous {
        if entry_from_keepass(old).fields != entry.fields {
            let mut snapshot = old.clone();
            snapshot.history = None;
            ke.history
                .get_or_insert_with(History::default)
                .add_entry(snapshot);
            tracing::debug!("Recorded history for entry {}", entry.uuid);
        }
    }
    ke
}
